//! Progress notifications on top of show/update

use super::{NotificationId, NotificationKind, NotificationManager, NotificationOptions, NotificationUpdate};
use std::time::Duration;

fn progress_message(label: &str, percent: Option<u8>) -> String {
    match percent {
        Some(percent) => format!("{}… {}%", label, percent.min(100)),
        None => format!("{}…", label),
    }
}

impl NotificationManager {
    /// Show a persistent progress notification
    pub fn show_progress(&self, label: &str, percent: Option<u8>) -> NotificationId {
        self.show(
            progress_message(label, percent),
            NotificationOptions::new(NotificationKind::Info)
                .persistent()
                .with_dismissible(false),
        )
    }

    pub fn update_progress(&self, id: NotificationId, label: &str, percent: u8) -> bool {
        self.update(id, progress_message(label, Some(percent)), NotificationUpdate::default())
    }

    /// Finish a progress notification as success or error; it then
    /// auto-dismisses after the configured completion duration
    pub fn complete_progress(&self, id: NotificationId, label: &str, success: bool) -> bool {
        let config = self.config();
        let (kind, duration_ms) = if success {
            (NotificationKind::Success, config.progress_success_duration_ms)
        } else {
            (NotificationKind::Error, config.progress_error_duration_ms)
        };

        self.update(
            id,
            label,
            NotificationUpdate::default()
                .kind(kind)
                .duration(Duration::from_millis(duration_ms))
                .dismissible(true),
        )
    }
}
