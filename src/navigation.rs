//! Camera navigation
//!
//! Discrete zoom stepping along `ZoomLevel::ORDER`, the "north star"
//! reorientation, keyboard bindings and the L1/L2/L3 drill-down context.
//! Every command is a synchronous store update; the renderer picks up the
//! resulting camera request on its next frame.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::Position;
use crate::store::ConstellationStore;
use crate::zoom::ZoomLevel;

/// Which slice of the hierarchy is loaded
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "level")]
pub enum NavigationContext {
    /// Whole ecosystem
    #[default]
    L1,
    /// One channel
    L2 {
        channel_id: String,
        channel_label: String,
    },
    /// One campaign inside a channel
    L3 {
        channel_id: String,
        channel_label: String,
        campaign_id: String,
        campaign_name: String,
    },
}

impl NavigationContext {
    /// Zoom level that corresponds to this context
    pub fn zoom_level(&self) -> ZoomLevel {
        match self {
            NavigationContext::L1 => ZoomLevel::Ecosystem,
            NavigationContext::L2 { .. } => ZoomLevel::Campaign,
            NavigationContext::L3 { .. } => ZoomLevel::Hcp,
        }
    }

    /// Focus a channel; valid from any level
    pub fn drill_into_channel(
        &self,
        channel_id: impl Into<String>,
        channel_label: impl Into<String>,
    ) -> NavigationContext {
        NavigationContext::L2 {
            channel_id: channel_id.into(),
            channel_label: channel_label.into(),
        }
    }

    /// Focus a campaign of the current channel; `None` at L1
    pub fn drill_into_campaign(
        &self,
        campaign_id: impl Into<String>,
        campaign_name: impl Into<String>,
    ) -> Option<NavigationContext> {
        match self {
            NavigationContext::L1 => None,
            NavigationContext::L2 {
                channel_id,
                channel_label,
            }
            | NavigationContext::L3 {
                channel_id,
                channel_label,
                ..
            } => Some(NavigationContext::L3 {
                channel_id: channel_id.clone(),
                channel_label: channel_label.clone(),
                campaign_id: campaign_id.into(),
                campaign_name: campaign_name.into(),
            }),
        }
    }

    /// One level up; `None` at L1
    pub fn up(&self) -> Option<NavigationContext> {
        match self {
            NavigationContext::L1 => None,
            NavigationContext::L2 { .. } => Some(NavigationContext::L1),
            NavigationContext::L3 {
                channel_id,
                channel_label,
                ..
            } => Some(NavigationContext::L2 {
                channel_id: channel_id.clone(),
                channel_label: channel_label.clone(),
            }),
        }
    }

    /// Labels from the root down to this context
    pub fn breadcrumbs(&self) -> Vec<&str> {
        match self {
            NavigationContext::L1 => vec!["Ecosystem"],
            NavigationContext::L2 { channel_label, .. } => vec!["Ecosystem", channel_label.as_str()],
            NavigationContext::L3 {
                channel_label,
                campaign_name,
                ..
            } => vec!["Ecosystem", channel_label.as_str(), campaign_name.as_str()],
        }
    }
}

impl fmt::Display for NavigationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.breadcrumbs().join(" / "))
    }
}

/// A key press delivered by the host's keyboard handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Char(char),
}

/// What `handle_key` did with a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// An interceptor (story mode) consumed the key
    Intercepted,
    SelectionCleared,
    ZoomedIn,
    ZoomedOut,
    Reoriented,
    /// Bound, but nothing changed (e.g. zoom at a boundary)
    NoOp,
    /// Not bound to anything
    Ignored,
}

/// Gets first refusal on every key (story mode lives behind this)
pub trait KeyboardInterceptor: Send {
    /// Return `true` to consume the key
    fn intercept(&mut self, key: Key, store: &ConstellationStore) -> bool;
}

/// A mounted UI control that owns camera reorientation
pub trait ReorientControl: Send {
    fn reorient(&mut self, store: &mut ConstellationStore);
}

/// Zoom stepping, reorientation and key bindings
#[derive(Default)]
pub struct NavigationController {
    interceptor: Option<Box<dyn KeyboardInterceptor>>,
    reorient_control: Option<Box<dyn ReorientControl>>,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_interceptor(&mut self, interceptor: Option<Box<dyn KeyboardInterceptor>>) {
        self.interceptor = interceptor;
    }

    pub fn set_reorient_control(&mut self, control: Option<Box<dyn ReorientControl>>) {
        self.reorient_control = control;
    }

    /// Step one level closer; `false` at `Hcp`
    pub fn zoom_in(&self, store: &mut ConstellationStore) -> bool {
        match store.zoom_level().next() {
            Some(level) => {
                go_to(store, level, None);
                true
            }
            None => false,
        }
    }

    /// Step one level farther; `false` at `Ecosystem`
    pub fn zoom_out(&self, store: &mut ConstellationStore) -> bool {
        match store.zoom_level().previous() {
            Some(level) => {
                go_to(store, level, None);
                true
            }
            None => false,
        }
    }

    /// Reset to the canonical "north star" framing
    pub fn reorient(&mut self, store: &mut ConstellationStore) {
        match self.reorient_control.as_mut() {
            Some(control) => control.reorient(store),
            None => go_to(store, ZoomLevel::Ecosystem, Some(Position::ORIGIN)),
        }
    }

    /// Frame a freshly loaded navigation context
    pub fn enter_context(&self, store: &mut ConstellationStore, context: &NavigationContext) {
        go_to(store, context.zoom_level(), Some(Position::ORIGIN));
    }

    pub fn handle_key(&mut self, store: &mut ConstellationStore, key: Key) -> KeyOutcome {
        if let Some(interceptor) = self.interceptor.as_mut() {
            if interceptor.intercept(key, store) {
                return KeyOutcome::Intercepted;
            }
        }

        let changed = |done: bool, outcome: KeyOutcome| {
            if done { outcome } else { KeyOutcome::NoOp }
        };

        match key {
            Key::Escape => {
                store.clear_selection();
                KeyOutcome::SelectionCleared
            }
            Key::Char('+' | '=') => changed(self.zoom_in(store), KeyOutcome::ZoomedIn),
            Key::Char('-' | '_') => changed(self.zoom_out(store), KeyOutcome::ZoomedOut),
            Key::Char('n' | 'N') => {
                self.reorient(store);
                KeyOutcome::Reoriented
            }
            Key::Char(_) => KeyOutcome::Ignored,
        }
    }
}

fn go_to(store: &mut ConstellationStore, level: ZoomLevel, target: Option<Position>) {
    debug!(from = %store.zoom_level(), to = %level, "zoom transition");
    store.set_zoom_level(level);
    store.request_camera_animation(level, target);
}
