//! Semantic zoom
//!
//! Maps camera distance to a discrete zoom level and each level to a static
//! set of render parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default distance above which the camera shows the whole ecosystem
pub const DEFAULT_ECOSYSTEM_TO_CAMPAIGN: f32 = 400.0;

/// Default distance below which the camera shows individual HCPs
pub const DEFAULT_CAMPAIGN_TO_HCP: f32 = 150.0;

/// Discrete zoom level, ordered from farthest to closest camera
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ZoomLevel {
    #[default]
    Ecosystem,
    Campaign,
    Hcp,
}

impl ZoomLevel {
    /// All levels, farthest first
    pub const ORDER: [ZoomLevel; 3] = [ZoomLevel::Ecosystem, ZoomLevel::Campaign, ZoomLevel::Hcp];

    /// One step closer, or `None` at `Hcp`
    pub fn next(self) -> Option<ZoomLevel> {
        match self {
            ZoomLevel::Ecosystem => Some(ZoomLevel::Campaign),
            ZoomLevel::Campaign => Some(ZoomLevel::Hcp),
            ZoomLevel::Hcp => None,
        }
    }

    /// One step farther, or `None` at `Ecosystem`
    pub fn previous(self) -> Option<ZoomLevel> {
        match self {
            ZoomLevel::Ecosystem => None,
            ZoomLevel::Campaign => Some(ZoomLevel::Ecosystem),
            ZoomLevel::Hcp => Some(ZoomLevel::Campaign),
        }
    }

    /// Camera distance used when animating to this level
    pub fn canonical_distance(self) -> f32 {
        match self {
            ZoomLevel::Ecosystem => 600.0,
            ZoomLevel::Campaign => 275.0,
            ZoomLevel::Hcp => 90.0,
        }
    }

    /// Render parameters for this level
    pub fn config(self) -> &'static ZoomConfig {
        match self {
            ZoomLevel::Ecosystem => &ECOSYSTEM_CONFIG,
            ZoomLevel::Campaign => &CAMPAIGN_CONFIG,
            ZoomLevel::Hcp => &HCP_CONFIG,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ZoomLevel::Ecosystem => "ecosystem",
            ZoomLevel::Campaign => "campaign",
            ZoomLevel::Hcp => "hcp",
        }
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoomLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecosystem" => Ok(ZoomLevel::Ecosystem),
            "campaign" => Ok(ZoomLevel::Campaign),
            "hcp" => Ok(ZoomLevel::Hcp),
            other => Err(format!("unknown zoom level: {other}")),
        }
    }
}

/// Which node types show their labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelVisibility {
    pub channels: bool,
    pub campaigns: bool,
    pub hcps: bool,
}

/// Render parameters for one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomConfig {
    /// Multiplier on node size
    pub node_scale: f32,
    /// Base edge opacity (0-1)
    pub edge_opacity: f32,
    pub labels: LabelVisibility,
    /// Flow particles per edge (0-1)
    pub particle_density: f32,
}

static ECOSYSTEM_CONFIG: ZoomConfig = ZoomConfig {
    node_scale: 1.6,
    edge_opacity: 0.25,
    labels: LabelVisibility {
        channels: true,
        campaigns: false,
        hcps: false,
    },
    particle_density: 0.2,
};

static CAMPAIGN_CONFIG: ZoomConfig = ZoomConfig {
    node_scale: 1.0,
    edge_opacity: 0.45,
    labels: LabelVisibility {
        channels: true,
        campaigns: true,
        hcps: false,
    },
    particle_density: 0.5,
};

static HCP_CONFIG: ZoomConfig = ZoomConfig {
    node_scale: 0.7,
    edge_opacity: 0.7,
    labels: LabelVisibility {
        channels: true,
        campaigns: true,
        hcps: true,
    },
    particle_density: 1.0,
};

/// The two distances separating the three zoom levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomThresholds {
    pub ecosystem_to_campaign: f32,
    pub campaign_to_hcp: f32,
}

impl Default for ZoomThresholds {
    fn default() -> Self {
        Self {
            ecosystem_to_campaign: DEFAULT_ECOSYSTEM_TO_CAMPAIGN,
            campaign_to_hcp: DEFAULT_CAMPAIGN_TO_HCP,
        }
    }
}

impl ZoomThresholds {
    /// Zoom level for a camera distance
    pub fn level_for_distance(&self, distance: f32) -> ZoomLevel {
        zoom_level_from_distance(distance, self)
    }
}

/// `d > ecosystem_to_campaign` is ecosystem, `campaign_to_hcp < d <=
/// ecosystem_to_campaign` is campaign, anything closer is hcp.
///
/// NaN compares false everywhere and lands on `Hcp`.
pub fn zoom_level_from_distance(distance: f32, thresholds: &ZoomThresholds) -> ZoomLevel {
    if distance > thresholds.ecosystem_to_campaign {
        ZoomLevel::Ecosystem
    } else if distance > thresholds.campaign_to_hcp {
        ZoomLevel::Campaign
    } else {
        ZoomLevel::Hcp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_distance_bands() {
        let t = ZoomThresholds::default();

        assert_eq!(t.level_for_distance(1000.0), ZoomLevel::Ecosystem);
        assert_eq!(t.level_for_distance(400.5), ZoomLevel::Ecosystem);
        assert_eq!(t.level_for_distance(400.0), ZoomLevel::Campaign);
        assert_eq!(t.level_for_distance(150.5), ZoomLevel::Campaign);
        assert_eq!(t.level_for_distance(150.0), ZoomLevel::Hcp);
        assert_eq!(t.level_for_distance(0.0), ZoomLevel::Hcp);
    }

    #[test]
    fn closer_is_never_more_zoomed_out() {
        let t = ZoomThresholds::default();
        let distances: Vec<f32> = (0..=200).map(|i| i as f32 * 5.0).collect();

        for pair in distances.windows(2) {
            let near = t.level_for_distance(pair[0]);
            let far = t.level_for_distance(pair[1]);
            assert!(near >= far, "{} at {} vs {} at {}", near, pair[0], far, pair[1]);
        }
    }

    #[test]
    fn non_finite_distances() {
        let t = ZoomThresholds::default();
        assert_eq!(t.level_for_distance(f32::INFINITY), ZoomLevel::Ecosystem);
        assert_eq!(t.level_for_distance(f32::NEG_INFINITY), ZoomLevel::Hcp);
        assert_eq!(t.level_for_distance(f32::NAN), ZoomLevel::Hcp);
    }

    #[test]
    fn order_matches_camera_distance() {
        assert!(ZoomLevel::Ecosystem < ZoomLevel::Campaign);
        assert!(ZoomLevel::Campaign < ZoomLevel::Hcp);

        let t = ZoomThresholds::default();
        for level in ZoomLevel::ORDER {
            assert_eq!(t.level_for_distance(level.canonical_distance()), level);
        }
    }

    #[test]
    fn stepping_stops_at_boundaries() {
        assert_eq!(ZoomLevel::Hcp.next(), None);
        assert_eq!(ZoomLevel::Ecosystem.previous(), None);
        assert_eq!(ZoomLevel::Ecosystem.next(), Some(ZoomLevel::Campaign));
        assert_eq!(ZoomLevel::Hcp.previous(), Some(ZoomLevel::Campaign));
    }

    #[test]
    fn parses_level_names() {
        assert_eq!("HCP".parse::<ZoomLevel>(), Ok(ZoomLevel::Hcp));
        assert_eq!("campaign".parse::<ZoomLevel>(), Ok(ZoomLevel::Campaign));
        assert!("galaxy".parse::<ZoomLevel>().is_err());
    }

    #[test]
    fn zoom_config_table() {
        let table: String = ZoomLevel::ORDER
            .iter()
            .map(|level| {
                let c = level.config();
                format!(
                    "{:<9} scale={:.2} edges={:.2} labels=[{} {} {}] particles={:.2}\n",
                    level.as_str(),
                    c.node_scale,
                    c.edge_opacity,
                    c.labels.channels,
                    c.labels.campaigns,
                    c.labels.hcps,
                    c.particle_density,
                )
            })
            .collect();

        insta::assert_snapshot!(table);
    }
}
