//! Configuration loading
//!
//! Every tuning parameter of the core lives here and can be overridden from
//! a YAML or JSON file. The format is picked from the file extension.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulation::{ForceConfig, InitialLayout};
use crate::worker::{DEFAULT_REDUCED_MOTION_MAX_TICKS, StepMode, WorkerConfig};
use crate::zoom::ZoomThresholds;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file extension is not a supported config format
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A value parsed but makes no sense
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Collision passes per tick above this are rejected
pub const MAX_COLLISION_ITERATIONS: u32 = 16;

/// Physics worker settings as they appear in a config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Autonomous tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Only tick on explicit `tick` commands
    pub manual_stepping: bool,
    /// Skip animation and place nodes at their settled layout
    pub reduced_motion: bool,
    pub reduced_motion_max_ticks: usize,
    pub layout: InitialLayout,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            manual_stepping: false,
            reduced_motion: false,
            reduced_motion_max_ticks: DEFAULT_REDUCED_MOTION_MAX_TICKS,
            layout: InitialLayout::default(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstellationConfig {
    pub forces: ForceConfig,
    pub zoom: ZoomThresholds,
    pub worker: WorkerSettings,
}

impl ConstellationConfig {
    /// Load and validate a config file (`.yaml`, `.yml` or `.json`)
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let text = std::fs::read_to_string(path)?;

        let config: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the core misbehave
    ///
    /// Every check is written so that NaN fails it.
    pub fn validate(&self) -> ConfigResult<()> {
        let zoom = &self.zoom;
        check(zoom.campaign_to_hcp > 0.0, "zoom.campaign_to_hcp", || {
            format!("must be positive, got {}", zoom.campaign_to_hcp)
        })?;
        check(
            zoom.ecosystem_to_campaign > zoom.campaign_to_hcp,
            "zoom.ecosystem_to_campaign",
            || {
                format!(
                    "must be greater than campaign_to_hcp ({} <= {})",
                    zoom.ecosystem_to_campaign, zoom.campaign_to_hcp
                )
            },
        )?;

        let f = &self.forces;
        check(f.charge.is_finite(), "forces.charge", || {
            format!("must be finite, got {}", f.charge)
        })?;
        check(f.link_distance > 0.0, "forces.link_distance", || {
            format!("must be positive, got {}", f.link_distance)
        })?;
        check(
            f.min_link_distance > 0.0 && f.max_link_distance >= f.min_link_distance,
            "forces.min_link_distance",
            || "link distance bounds must be positive and ordered".to_string(),
        )?;
        check(
            f.link_strength >= 0.0 && f.link_strength.is_finite(),
            "forces.link_strength",
            || format!("must be non-negative, got {}", f.link_strength),
        )?;
        check(
            f.center_strength >= 0.0 && f.center_strength <= 1.0,
            "forces.center_strength",
            || format!("must be in [0, 1], got {}", f.center_strength),
        )?;
        check(
            f.node_radius >= 0.0 && f.node_radius.is_finite(),
            "forces.node_radius",
            || format!("must be non-negative, got {}", f.node_radius),
        )?;
        check(
            f.collision_strength >= 0.0 && f.collision_strength <= 1.0,
            "forces.collision_strength",
            || format!("must be in [0, 1], got {}", f.collision_strength),
        )?;
        check(
            f.collision_iterations <= MAX_COLLISION_ITERATIONS,
            "forces.collision_iterations",
            || {
                format!(
                    "must be at most {MAX_COLLISION_ITERATIONS}, got {}",
                    f.collision_iterations
                )
            },
        )?;
        check(
            f.velocity_decay >= 0.0 && f.velocity_decay <= 1.0,
            "forces.velocity_decay",
            || format!("must be in [0, 1], got {}", f.velocity_decay),
        )?;
        check(
            f.distance_min > 0.0 && f.distance_max > f.distance_min,
            "forces.distance_min",
            || "many-body distance bounds must be positive and ordered".to_string(),
        )?;
        check(f.max_velocity > 0.0, "forces.max_velocity", || {
            format!("must be positive, got {}", f.max_velocity)
        })?;
        check(f.alpha_min > 0.0 && f.alpha_min < 1.0, "forces.alpha_min", || {
            format!("must be in (0, 1), got {}", f.alpha_min)
        })?;
        check(f.alpha_decay_ticks >= 1.0, "forces.alpha_decay_ticks", || {
            format!("must be at least 1, got {}", f.alpha_decay_ticks)
        })?;
        check(f.initial_radius > 0.0, "forces.initial_radius", || {
            format!("must be positive, got {}", f.initial_radius)
        })?;

        check(
            self.worker.reduced_motion_max_ticks >= 1,
            "worker.reduced_motion_max_ticks",
            || "must be at least 1".to_string(),
        )?;
        Ok(())
    }

    /// Worker configuration derived from these settings
    pub fn worker_config(&self) -> WorkerConfig {
        let step_mode = if self.worker.manual_stepping {
            StepMode::Manual
        } else {
            StepMode::Timer {
                interval: Duration::from_millis(self.worker.tick_interval_ms),
            }
        };
        WorkerConfig {
            forces: self.forces.clone(),
            layout: self.worker.layout,
            step_mode,
            reduced_motion: self.worker.reduced_motion,
            reduced_motion_max_ticks: self.worker.reduced_motion_max_ticks,
        }
    }
}

fn check(ok: bool, field: &'static str, reason: impl FnOnce() -> String) -> ConfigResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: reason(),
        })
    }
}
