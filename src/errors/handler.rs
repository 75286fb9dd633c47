//! Error handling front door: classify, log, notify, report

use super::{classify, recovery_plan, should_report, user_facing_message, ErrorContext, StorageError};
use crate::notifications::{ActionEffect, ActionStyle, NotificationAction, NotificationManager};
use std::sync::Arc;

/// External error-reporting collaborator
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &StorageError);
}

/// Reporter that writes reportable errors to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &StorageError) {
        tracing::error!(
            kind = %error.kind,
            correlation_id = error.correlation_id.as_deref().unwrap_or("-"),
            details = ?error.details,
            "Reported storage error: {}",
            error.message
        );
    }
}

/// Turns raw failures into user-visible notifications and reports
#[derive(Clone, Default)]
pub struct ErrorHandler {
    notifier: Option<NotificationManager>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show handled errors through this notification manager
    pub fn with_notifier(mut self, notifier: NotificationManager) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Forward reportable errors to this reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Classify `err`, surface it to the user and report it if needed.
    ///
    /// A "Retry" action is attached when the error is retryable and a
    /// `retry` effect was supplied.
    pub fn handle(
        &self,
        err: &anyhow::Error,
        context: Option<&ErrorContext>,
        retry: Option<ActionEffect>,
    ) -> StorageError {
        let error = classify(err, context);
        let plan = recovery_plan(&error);

        tracing::warn!(
            kind = %error.kind,
            recoverable = error.recoverable,
            "Handling storage error: {}",
            error.message
        );

        if let Some(notifier) = &self.notifier {
            let mut actions = Vec::new();
            if let (true, Some(effect)) = (plan.can_retry, retry) {
                actions.push(NotificationAction::new("Retry", effect).with_style(ActionStyle::Primary));
            }
            notifier.error_with_actions(user_facing_message(&error), actions);
        }

        self.report(&error);
        error
    }

    /// Forward `error` to the reporter when it is reportable.
    /// Returns whether it was forwarded.
    pub fn report(&self, error: &StorageError) -> bool {
        match &self.reporter {
            Some(reporter) if should_report(error) => {
                reporter.report(error);
                true
            }
            _ => false,
        }
    }
}
