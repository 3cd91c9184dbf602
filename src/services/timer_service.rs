//! Countdown and pause scheduling. One timer task per session, tracked in
//! the [`TimerRegistry`](crate::state::TimerRegistry); arming always replaces
//! whatever was armed before, so a session can never run two clocks at once.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::{
        events,
        session_service::{self, AutoOutcome},
    },
    state::{SessionPhase, SharedState, TimerKind},
};

/// Tick granularity of the countdown loop.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Whole seconds left until `deadline`, clamped at zero.
///
/// Derived from the absolute deadline every time it is needed, never from a
/// relative counter: any observer, however late it connects, computes the
/// same value.
pub fn remaining_seconds(deadline: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let delta = deadline - now;
    if delta.is_negative() {
        0
    } else {
        delta.whole_seconds() as u64
    }
}

/// Start the countdown loop for a session's active question.
pub fn arm_countdown(state: &SharedState, session_id: Uuid) {
    let task = tokio::spawn(run_countdown(state.clone(), session_id));
    state.timers().install(session_id, TimerKind::Countdown, task);
}

/// Start the inter-question pause after `expired_index` ran out.
pub fn arm_pause(state: &SharedState, session_id: Uuid, expired_index: usize) {
    let task = tokio::spawn(run_pause(state.clone(), session_id, expired_index));
    state.timers().install(session_id, TimerKind::Pause, task);
}

/// Cancel whatever timer is armed for the session, e.g. when its room
/// empties. The session record keeps its absolute deadline, so a later
/// [`resume_if_needed`] picks up where the clock left off.
pub fn suspend(state: &SharedState, session_id: Uuid) {
    state.timers().cancel(session_id);
}

/// Re-arm the session's timer after a reconnect, deriving the stage from the
/// stored state: an active deadline restarts the countdown, a started session
/// without one is mid-pause and gets a fresh pause window.
pub async fn resume_if_needed(state: &SharedState, session_id: Uuid) -> Result<(), ServiceError> {
    if state.timers().armed_kind(session_id).is_some() {
        return Ok(());
    }

    let snapshot = state.sessions().snapshot(session_id).await?;
    if snapshot.phase != SessionPhase::Started {
        return Ok(());
    }

    match (
        snapshot.current_question_index,
        snapshot.current_question_ends_at,
    ) {
        (Some(_), Some(_)) => arm_countdown(state, session_id),
        (Some(index), None) => arm_pause(state, session_id, index),
        _ => {}
    }
    Ok(())
}

async fn run_countdown(state: SharedState, session_id: Uuid) {
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let snapshot = match state.sessions().snapshot(session_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // A dead timer is a degraded state the host can recover from
                // with a manual advance; a crashed scheduler is not.
                warn!(%session_id, error = %err, "countdown tick failed; cancelling timer");
                events::broadcast_session_error(&state, session_id, "question timer stopped");
                return;
            }
        };

        let (SessionPhase::Started, Some(index), Some(deadline)) = (
            snapshot.phase,
            snapshot.current_question_index,
            snapshot.current_question_ends_at,
        ) else {
            debug!(%session_id, "countdown superseded; stopping");
            return;
        };

        let time_left = remaining_seconds(deadline, OffsetDateTime::now_utc());
        events::broadcast_timer_update(&state, session_id, index, time_left);
        if time_left == 0 {
            break;
        }
    }

    if let Err(err) = process_expiry(&state, session_id).await {
        warn!(%session_id, error = %err, "failed to process question expiry");
        events::broadcast_session_error(&state, session_id, "failed to process question expiry");
    }
}

/// Handle a question running out: clear the deadline (entering the pause),
/// reveal updated scores, and schedule the auto-advance.
///
/// The transition is guarded on the deadline actually being exhausted, so a
/// manual advance or finish that raced the last tick wins and the expiry
/// becomes a no-op. That guard is what makes the expiry fire exactly once.
pub(crate) async fn process_expiry(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(), ServiceError> {
    let now = OffsetDateTime::now_utc();
    let expired = state
        .sessions()
        .transition(session_id, |session| {
            match (session.phase, session.current_question_ends_at) {
                (SessionPhase::Started, Some(deadline))
                    if remaining_seconds(deadline, now) == 0 =>
                {
                    let index = session.current_question_index.ok_or_else(|| {
                        ServiceError::Internal("started session has no current question".into())
                    })?;
                    session.current_question_ends_at = None;
                    Ok(Some(index))
                }
                _ => Ok(None),
            }
        })
        .await?;

    let Some(index) = expired else {
        debug!(%session_id, "expiry superseded by a manual transition");
        return Ok(());
    };

    events::broadcast_timer_expired(state, session_id, index);
    // The just-expired question is now revealed, so it counts.
    session_service::broadcast_full_scores(state, session_id).await?;
    events::broadcast_pause_start(state, session_id, state.config().pause_seconds());
    arm_pause(state, session_id, index);
    Ok(())
}

async fn run_pause(state: SharedState, session_id: Uuid, expired_index: usize) {
    sleep(state.config().pause_duration()).await;

    match session_service::auto_continue(&state, session_id, expired_index).await {
        Ok(AutoOutcome::Advanced) => {
            // Re-arming from inside the session's own timer task must be the
            // task's final action: install aborts this task's handle.
            arm_countdown(&state, session_id);
        }
        Ok(AutoOutcome::Finished | AutoOutcome::Superseded) => {}
        Err(err) => {
            warn!(%session_id, error = %err, "auto-advance after pause failed");
            events::broadcast_session_error(&state, session_id, "automatic advance failed");
        }
    }
}
