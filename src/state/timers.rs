use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Which stage of the question cycle a scheduled task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One-second tick loop counting an active question down.
    Countdown,
    /// Single delayed task ending the inter-question pause.
    Pause,
}

struct ArmedTimer {
    kind: TimerKind,
    task: JoinHandle<()>,
}

/// Session-keyed registry of the scheduled timer tasks.
///
/// At most one timer exists per session id: installing a new one always
/// replaces, and aborts, whatever was armed before. That guarantee is what
/// prevents orphaned tick loops and duplicate auto-advances.
pub struct TimerRegistry {
    timers: DashMap<Uuid, ArmedTimer>,
}

impl TimerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
        }
    }

    /// Install a timer task for a session, aborting any previously armed one.
    ///
    /// The insert happens before the abort so a timer task may install its
    /// successor as its own final action: aborting the finished predecessor
    /// is then a no-op as long as nothing awaits afterwards.
    pub fn install(&self, session_id: Uuid, kind: TimerKind, task: JoinHandle<()>) {
        if let Some(previous) = self.timers.insert(session_id, ArmedTimer { kind, task }) {
            previous.task.abort();
        }
    }

    /// Cancel and forget the timer armed for a session, if any.
    pub fn cancel(&self, session_id: Uuid) {
        if let Some((_, armed)) = self.timers.remove(&session_id) {
            armed.task.abort();
        }
    }

    /// Kind of the timer currently armed for a session, if its task is still live.
    pub fn armed_kind(&self, session_id: Uuid) -> Option<TimerKind> {
        self.timers.get(&session_id).and_then(|entry| {
            if entry.value().task.is_finished() {
                None
            } else {
                Some(entry.value().kind)
            }
        })
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };
    use std::time::Duration;

    fn fired_after_sleep(flag: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_the_armed_task() {
        let registry = TimerRegistry::new();
        let session = Uuid::new_v4();
        let fired = Arc::new(AtomicBool::new(false));

        registry.install(session, TimerKind::Pause, fired_after_sleep(fired.clone()));
        assert_eq!(registry.armed_kind(session), Some(TimerKind::Pause));

        registry.cancel(session);
        assert_eq!(registry.armed_kind(session), None);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn install_replaces_and_aborts_the_previous_timer() {
        let registry = TimerRegistry::new();
        let session = Uuid::new_v4();
        let first_fired = Arc::new(AtomicBool::new(false));
        let second_fired = Arc::new(AtomicBool::new(false));

        registry.install(
            session,
            TimerKind::Countdown,
            fired_after_sleep(first_fired.clone()),
        );
        registry.install(
            session,
            TimerKind::Pause,
            fired_after_sleep(second_fired.clone()),
        );
        assert_eq!(registry.armed_kind(session), Some(TimerKind::Pause));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!first_fired.load(Ordering::SeqCst));
        assert!(second_fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn timers_for_distinct_sessions_do_not_interfere() {
        let registry = TimerRegistry::new();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();

        registry.install(
            session_a,
            TimerKind::Countdown,
            tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await }),
        );
        registry.install(
            session_b,
            TimerKind::Pause,
            tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await }),
        );

        registry.cancel(session_a);
        assert_eq!(registry.armed_kind(session_a), None);
        assert_eq!(registry.armed_kind(session_b), Some(TimerKind::Pause));
    }
}
