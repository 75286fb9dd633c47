//! Notifications Module - Transient user-visible messages
//!
//! A publish/subscribe store of active notifications with auto-dismiss
//! timers, a FIFO capacity cap and a periodic safety sweep.

mod manager;
mod progress;

pub use manager::{NotificationManager, Subscription};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub type NotificationId = Uuid;

/// Callback run when a notification action is triggered
pub type ActionEffect = Arc<dyn Fn() + Send + Sync>;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Visual weight of an action button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStyle {
    Primary,
    #[default]
    Secondary,
    Danger,
}

/// Action attached to a notification
#[derive(Clone)]
pub struct NotificationAction {
    pub label: String,
    pub effect: ActionEffect,
    pub style: ActionStyle,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, effect: ActionEffect) -> Self {
        Self {
            label: label.into(),
            effect,
            style: ActionStyle::default(),
        }
    }

    pub fn with_style(mut self, style: ActionStyle) -> Self {
        self.style = style;
        self
    }
}

impl fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

/// Read-only view of an active notification
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,

    /// Auto-dismiss delay; zero means the notification stays until dismissed
    pub duration: Duration,

    pub dismissible: bool,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// True when no auto-dismiss timer applies
    pub fn is_persistent(&self) -> bool {
        self.duration.is_zero()
    }
}

/// Options for [`NotificationManager::show`]
#[derive(Debug, Clone)]
pub struct NotificationOptions {
    pub kind: NotificationKind,

    /// `None` picks the kind's configured default
    pub duration: Option<Duration>,

    pub dismissible: bool,
    pub actions: Vec<NotificationAction>,
}

impl NotificationOptions {
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            duration: None,
            dismissible: true,
            actions: vec![],
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Never auto-dismiss
    pub fn persistent(self) -> Self {
        self.with_duration(Duration::ZERO)
    }

    pub fn with_dismissible(mut self, dismissible: bool) -> Self {
        self.dismissible = dismissible;
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self::new(NotificationKind::Info)
    }
}

/// Partial changes for [`NotificationManager::update`]
#[derive(Debug, Clone, Default)]
pub struct NotificationUpdate {
    pub kind: Option<NotificationKind>,
    pub duration: Option<Duration>,
    pub dismissible: Option<bool>,
    pub actions: Option<Vec<NotificationAction>>,
}

impl NotificationUpdate {
    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn dismissible(mut self, dismissible: bool) -> Self {
        self.dismissible = Some(dismissible);
        self
    }

    pub fn actions(mut self, actions: Vec<NotificationAction>) -> Self {
        self.actions = Some(actions);
        self
    }
}

/// Notification manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Active notifications kept before the oldest is evicted
    pub max_notifications: usize,

    /// Age after which the sweep purges an auto-dismissing entry
    pub max_age_ms: u64,

    /// Sweep period (0 disables the sweeper)
    pub sweep_interval_ms: u64,

    pub success_duration_ms: u64,
    pub info_duration_ms: u64,
    pub warning_duration_ms: u64,
    pub error_duration_ms: u64,

    /// Duration after a progress entry completes successfully
    pub progress_success_duration_ms: u64,

    /// Duration after a progress entry completes with an error
    pub progress_error_duration_ms: u64,
}

impl NotificationConfig {
    /// Default auto-dismiss duration for a kind
    pub fn duration_for(&self, kind: NotificationKind) -> Duration {
        let ms = match kind {
            NotificationKind::Success => self.success_duration_ms,
            NotificationKind::Info => self.info_duration_ms,
            NotificationKind::Warning => self.warning_duration_ms,
            NotificationKind::Error => self.error_duration_ms,
        };
        Duration::from_millis(ms)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_notifications: 5,
            max_age_ms: 60_000,
            sweep_interval_ms: 10_000,
            success_duration_ms: 4_000,
            info_duration_ms: 5_000,
            warning_duration_ms: 6_000,
            error_duration_ms: 8_000,
            progress_success_duration_ms: 3_000,
            progress_error_duration_ms: 5_000,
        }
    }
}
