//! Notification Manager - sole owner of the active notification list

use super::{
    Notification, NotificationAction, NotificationConfig, NotificationId, NotificationKind,
    NotificationOptions, NotificationUpdate,
};
use crate::clock::{default_clock, SharedClock};

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

type Subscriber = Arc<dyn Fn(&[Notification]) + Send + Sync>;

/// Active notification plus its timer bookkeeping
struct Entry {
    notification: Notification,

    /// Bumped on every (re)schedule; a timer only expires its own generation
    generation: u64,

    /// When the current timer was armed
    scheduled_at: Instant,

    timer: Option<JoinHandle<()>>,
}

impl Entry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct State {
    /// Oldest first
    entries: Vec<Entry>,
    subscribers: Vec<(u64, Subscriber)>,

    /// Snapshots waiting for delivery, in mutation order
    pending: VecDeque<Vec<Notification>>,
    delivering: bool,

    next_subscriber_id: u64,
    next_generation: u64,
    sweeper: Option<JoinHandle<()>>,
    disposed: bool,
}

impl State {
    fn snapshot(&self) -> Vec<Notification> {
        self.entries.iter().map(|e| e.notification.clone()).collect()
    }

    fn position(&self, id: NotificationId) -> Option<usize> {
        self.entries.iter().position(|e| e.notification.id == id)
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Abort every outstanding timer, including the sweeper
    fn release_timers(&mut self) {
        for entry in &mut self.entries {
            entry.cancel_timer();
        }
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

struct Inner {
    config: NotificationConfig,
    clock: SharedClock,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().release_timers();
    }
}

/// Publish/subscribe store of transient notifications.
///
/// Cloning yields another handle to the same store. Must be created inside
/// a Tokio runtime since timers are spawned tasks.
///
/// The capacity cap is FIFO: when full, the oldest notification is evicted
/// regardless of its kind.
#[derive(Clone)]
pub struct NotificationManager {
    inner: Arc<Inner>,
}

/// Handle returned by [`NotificationManager::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Stop receiving snapshots. Returns false if already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut state = inner.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(id, _)| *id != self.id);
        before != state.subscribers.len()
    }
}

impl NotificationManager {
    /// Create a manager driven by the tokio clock
    pub fn new(config: NotificationConfig) -> Self {
        Self::with_clock(config, default_clock())
    }

    /// Create a manager driven by `clock`
    pub fn with_clock(config: NotificationConfig, clock: SharedClock) -> Self {
        let sweep_interval = Duration::from_millis(config.sweep_interval_ms);
        let manager = Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: Mutex::new(State::default()),
            }),
        };

        if !sweep_interval.is_zero() {
            let sweeper = manager.spawn_sweeper(sweep_interval);
            manager.inner.state.lock().sweeper = Some(sweeper);
        }

        manager
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.inner.config
    }

    /// Show a notification and return its id
    pub fn show(&self, message: impl Into<String>, options: NotificationOptions) -> NotificationId {
        let id = Uuid::new_v4();
        let duration = options
            .duration
            .unwrap_or_else(|| self.inner.config.duration_for(options.kind));

        let notification = Notification {
            id,
            message: message.into(),
            kind: options.kind,
            created_at: Utc::now(),
            duration,
            dismissible: options.dismissible,
            actions: options.actions,
        };

        let mut state = self.inner.state.lock();
        if state.disposed {
            tracing::warn!("Ignoring notification on disposed manager: {}", notification.message);
            return id;
        }

        let generation = state.next_generation();
        state.entries.push(Entry {
            notification,
            generation,
            scheduled_at: self.inner.clock.now(),
            timer: self.arm(id, generation, duration),
        });

        let cap = self.inner.config.max_notifications.max(1);
        while state.entries.len() > cap {
            let mut evicted = state.entries.remove(0);
            evicted.cancel_timer();
            tracing::debug!(id = %evicted.notification.id, "Evicted oldest notification");
        }

        self.publish(state);
        id
    }

    /// Replace the message and apply partial changes.
    /// Returns false if `id` is not active.
    pub fn update(
        &self,
        id: NotificationId,
        message: impl Into<String>,
        changes: NotificationUpdate,
    ) -> bool {
        let mut state = self.inner.state.lock();
        let generation = state.next_generation();
        let now = self.inner.clock.now();

        let Some(entry) = state.entries.iter_mut().find(|e| e.notification.id == id) else {
            return false;
        };

        entry.cancel_timer();

        let notification = &mut entry.notification;
        notification.message = message.into();
        if let Some(kind) = changes.kind {
            notification.kind = kind;
        }
        if let Some(duration) = changes.duration {
            notification.duration = duration;
        }
        if let Some(dismissible) = changes.dismissible {
            notification.dismissible = dismissible;
        }
        if let Some(actions) = changes.actions {
            notification.actions = actions;
        }
        let duration = notification.duration;

        entry.generation = generation;
        entry.scheduled_at = now;
        entry.timer = self.arm(id, generation, duration);

        self.publish(state);
        true
    }

    /// Remove a notification. Unknown ids are ignored.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut state = self.inner.state.lock();
        let Some(pos) = state.position(id) else {
            return false;
        };

        let mut entry = state.entries.remove(pos);
        entry.cancel_timer();

        self.publish(state);
        true
    }

    /// Register a snapshot callback, invoked after every mutation
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Notification]) + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        state.next_subscriber_id += 1;
        let id = state.next_subscriber_id;
        state.subscribers.push((id, Arc::new(callback)));

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Purge auto-dismissing entries whose timer should long have fired.
    /// Returns the number purged.
    pub fn sweep(&self) -> usize {
        let now = self.inner.clock.now();
        let max_age = Duration::from_millis(self.inner.config.max_age_ms);

        let mut state = self.inner.state.lock();
        let before = state.entries.len();

        state.entries.retain_mut(|entry| {
            let limit = max_age.max(entry.notification.duration);
            let stale = !entry.notification.is_persistent()
                && now.saturating_duration_since(entry.scheduled_at) > limit;
            if stale {
                entry.cancel_timer();
            }
            !stale
        });

        let purged = before - state.entries.len();
        if purged > 0 {
            tracing::debug!(purged, "Swept stale notifications");
            self.publish(state);
        }
        purged
    }

    /// Run the effect of the action labelled `label`
    pub fn invoke_action(&self, id: NotificationId, label: &str) -> bool {
        let effect = {
            let state = self.inner.state.lock();
            state
                .entries
                .iter()
                .find(|e| e.notification.id == id)
                .and_then(|e| e.notification.actions.iter().find(|a| a.label == label))
                .map(|a| a.effect.clone())
        };

        match effect {
            Some(effect) => {
                effect();
                true
            }
            None => false,
        }
    }

    /// Current snapshot, oldest first
    pub fn active(&self) -> Vec<Notification> {
        self.inner.state.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear down: cancel every timer, drop entries and subscribers
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        state.disposed = true;
        state.release_timers();
        state.entries.clear();
        state.subscribers.clear();
        state.pending.clear();
        tracing::debug!("Notification manager disposed");
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, NotificationOptions::new(NotificationKind::Success))
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, NotificationOptions::new(NotificationKind::Info))
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, NotificationOptions::new(NotificationKind::Warning))
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, NotificationOptions::new(NotificationKind::Error))
    }

    /// Error notification carrying action buttons
    pub fn error_with_actions(
        &self,
        message: impl Into<String>,
        actions: Vec<NotificationAction>,
    ) -> NotificationId {
        let options = NotificationOptions {
            actions,
            ..NotificationOptions::new(NotificationKind::Error)
        };
        self.show(message, options)
    }

    /// Persistent, non-dismissible notification; must be updated or dismissed
    pub fn loading(&self, message: impl Into<String>) -> NotificationId {
        self.show(
            message,
            NotificationOptions::new(NotificationKind::Info)
                .persistent()
                .with_dismissible(false),
        )
    }

    fn arm(&self, id: NotificationId, generation: u64, duration: Duration) -> Option<JoinHandle<()>> {
        if duration.is_zero() {
            return None;
        }

        let weak = Arc::downgrade(&self.inner);
        let sleep = self.inner.clock.sleep(duration);
        Some(tokio::spawn(async move {
            sleep.await;
            if let Some(inner) = weak.upgrade() {
                NotificationManager { inner }.expire(id, generation);
            }
        }))
    }

    fn expire(&self, id: NotificationId, generation: u64) {
        let mut state = self.inner.state.lock();
        let Some(pos) = state
            .entries
            .iter()
            .position(|e| e.notification.id == id && e.generation == generation)
        else {
            return;
        };

        state.entries.remove(pos);
        tracing::debug!(id = %id, "Notification auto-dismissed");
        self.publish(state);
    }

    fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let clock = self.inner.clock.clone();

        tokio::spawn(async move {
            loop {
                clock.sleep(interval).await;
                match weak.upgrade() {
                    Some(inner) => {
                        NotificationManager { inner }.sweep();
                    }
                    None => break,
                }
            }
        })
    }

    /// Queue the current snapshot and deliver queued snapshots in order.
    ///
    /// Only one caller delivers at a time; a mutation made while another
    /// delivery is in flight (including from inside a subscriber) is
    /// delivered by that caller after the current snapshot.
    fn publish<'a>(&'a self, mut state: MutexGuard<'a, State>) {
        let snapshot = state.snapshot();
        state.pending.push_back(snapshot);
        if state.delivering {
            return;
        }
        state.delivering = true;

        loop {
            let Some(snapshot) = state.pending.pop_front() else {
                state.delivering = false;
                return;
            };
            let subscribers: Vec<Subscriber> =
                state.subscribers.iter().map(|(_, s)| s.clone()).collect();
            drop(state);

            for subscriber in subscribers {
                if catch_unwind(AssertUnwindSafe(|| subscriber(&snapshot))).is_err() {
                    tracing::error!("Notification subscriber panicked; continuing delivery");
                }
            }

            state = self.inner.state.lock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Clock whose timers never fire
    struct StalledClock;

    impl Clock for StalledClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
            Box::pin(futures::future::pending())
        }
    }

    fn manager() -> NotificationManager {
        NotificationManager::new(NotificationConfig::default())
    }

    fn recorder(manager: &NotificationManager) -> Arc<Mutex<Vec<Vec<String>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.subscribe(move |snapshot| {
            sink.lock()
                .push(snapshot.iter().map(|n| n.message.clone()).collect());
        });
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_then_dismiss_cancels_timer() {
        let manager = manager();
        let seen = recorder(&manager);

        let id = manager.info("hello");
        assert!(manager.dismiss(id));
        assert_eq!(seen.lock().last().unwrap().len(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;

        // show + dismiss only; no late expiry delivery
        assert_eq!(seen.lock().len(), 2);
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_dismiss() {
        let manager = manager();
        manager.info("short lived");
        let id = manager.loading("stays");

        tokio::time::sleep(Duration::from_millis(5_100)).await;

        let active = manager.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert!(active[0].is_persistent());
        assert!(!active[0].dismissible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_lasts_longer_than_info() {
        let manager = manager();
        manager.info("info");
        manager.error("error");

        tokio::time::sleep(Duration::from_secs(6)).await;
        let active = manager.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, NotificationKind::Error);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_eviction() {
        let manager = manager();
        for i in 0..6 {
            manager.show(format!("msg {}", i), NotificationOptions::new(NotificationKind::Info).persistent());
        }

        let messages: Vec<String> = manager.active().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["msg 1", "msg 2", "msg 3", "msg 4", "msg 5"]);
    }

    #[tokio::test]
    async fn test_eviction_ignores_severity() {
        let manager = manager();
        manager.error("important");
        for i in 0..5 {
            manager.info(format!("chatter {}", i));
        }

        assert!(manager.active().iter().all(|n| n.kind == NotificationKind::Info));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_reschedules_timer() {
        let manager = manager();
        let id = manager.info("first");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(manager.update(id, "second", NotificationUpdate::default().kind(NotificationKind::Warning)));

        // The original 5s timer would have fired here
        tokio::time::sleep(Duration::from_secs(2)).await;
        let active = manager.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "second");
        assert_eq!(active[0].kind, NotificationKind::Warning);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let manager = manager();
        let seen = recorder(&manager);

        assert!(!manager.update(Uuid::new_v4(), "nope", NotificationUpdate::default()));
        assert!(!manager.dismiss(Uuid::new_v4()));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let manager = manager();
        manager.subscribe(|_| panic!("bad subscriber"));
        let seen = recorder(&manager);

        manager.info("still delivered");

        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let manager = manager();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let subscription = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.info("one");
        assert!(subscription.unsubscribe());
        manager.info("two");

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reentrant_subscriber_preserves_order() {
        let manager = manager();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = manager.clone();
        let sink = seen.clone();
        manager.subscribe(move |snapshot| {
            sink.lock().push(snapshot.len());
            if snapshot.len() == 1 {
                handle.info("nested");
            }
        });

        manager.info("outer");

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_purges_stuck_entries() {
        let config = NotificationConfig {
            sweep_interval_ms: 0,
            ..Default::default()
        };
        let manager = NotificationManager::with_clock(config, Arc::new(StalledClock));

        manager.info("stuck");
        manager.loading("persistent");
        assert_eq!(manager.sweep(), 0);

        tokio::time::advance(Duration::from_secs(30)).await;
        manager.info("fresh");
        assert_eq!(manager.sweep(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(manager.sweep(), 1);
        assert_eq!(manager.sweep(), 0);

        let messages: Vec<String> = manager.active().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["persistent", "fresh"]);
    }

    /// Clock that only lets sweeper-interval sleeps complete
    struct SweepOnlyClock {
        interval: Duration,
    }

    impl Clock for SweepOnlyClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            if duration == self.interval {
                Box::pin(tokio::time::sleep(duration))
            } else {
                Box::pin(futures::future::pending())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_purges_stuck_entries() {
        let config = NotificationConfig::default();
        let clock = Arc::new(SweepOnlyClock {
            interval: Duration::from_millis(config.sweep_interval_ms),
        });
        let manager = NotificationManager::with_clock(config, clock);
        let seen = recorder(&manager);

        manager.info("stuck");
        manager.loading("persistent");

        // Timer never fires and the entry is not yet older than max age
        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(manager.len(), 2);

        // max age (60s) plus one sweep interval (10s)
        tokio::time::sleep(Duration::from_secs(16)).await;
        let active = manager.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "persistent");
        assert_eq!(seen.lock().last().unwrap(), &vec!["persistent".to_string()]);

        manager.dispose();
    }

    #[tokio::test]
    async fn test_invoke_action() {
        let manager = manager();
        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = clicks.clone();
        let id = manager.error_with_actions(
            "failed",
            vec![NotificationAction::new(
                "Retry",
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )],
        );

        assert!(manager.invoke_action(id, "Retry"));
        assert!(!manager.invoke_action(id, "Cancel"));
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_clears_everything() {
        let manager = manager();
        let seen = recorder(&manager);
        manager.info("a");
        manager.error("b");

        manager.dispose();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert!(manager.is_empty());
        assert_eq!(seen.lock().len(), 2);

        manager.info("after dispose");
        assert!(manager.is_empty());
    }
}
