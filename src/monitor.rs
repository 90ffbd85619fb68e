use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::model::SessionStatus;
use crate::notify::Notice;
use crate::observability;

/// Background task that enforces time-driven transitions nobody's request
/// triggers: expiring unclaimed preorders past their grace period and
/// flagging active sessions that overstayed their estimated end.
pub struct Monitor {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Monitor {
    pub fn start(engine: Arc<Engine>, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => sweep(&engine).await,
                    _ = rx.changed() => {
                        tracing::info!("monitor shutting down");
                        break;
                    }
                }
            }
        });
        Self { shutdown, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// One monitor pass. Public so tests can drive passes deterministically
/// without the timer.
pub async fn sweep(engine: &Engine) {
    let now = engine.clock.now();
    let grace = engine.cfg.grace;

    // Collect under the read lock, mutate under the write lock. A session
    // claimed or cancelled in between simply drops out of the cancel path.
    let stale: Vec<_> = {
        let state = engine.lot.read().await;
        state
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Preorder && now > s.window.start + grace)
            .map(|s| s.id)
            .collect()
    };

    let mut notices = Vec::new();
    if !stale.is_empty() {
        let mut state = engine.lot.write().await;
        for session_id in stale {
            // Re-verify under the write lock: a gate entry or cancel may
            // have won the lock in between, and cancel_locked on its own
            // would take down a session that just went Active.
            let still_stale = state.session(session_id).is_some_and(|s| {
                s.status == SessionStatus::Preorder && now > s.window.start + grace
            });
            if !still_stale {
                tracing::debug!(session_id, "expiry skipped, session changed state");
                continue;
            }
            match engine.cancel_locked(&mut state, session_id, "expired") {
                Ok(dispatch) => {
                    metrics::counter!(observability::MONITOR_EXPIRED_TOTAL).increment(1);
                    tracing::info!(session_id, "unclaimed reservation expired");
                    notices.push(dispatch);
                }
                Err(err) => {
                    // Lost the race to a gate entry or a cancel.
                    tracing::debug!(session_id, %err, "expiry skipped");
                }
            }
        }
    }

    // Late-pickup pass: one notice per lateness episode. An extension
    // resets the flag, starting a fresh episode.
    {
        let mut state = engine.lot.write().await;
        let overdue: Vec<_> = state
            .sessions
            .values()
            .filter(|s| {
                s.status == SessionStatus::Active && now > s.window.end && !s.late_notified
            })
            .map(|s| s.id)
            .collect();
        for session_id in overdue {
            if let Some(session) = state.session_mut(session_id) {
                session.late = true;
                session.late_notified = true;
                metrics::counter!(observability::MONITOR_LATE_NOTICES_TOTAL).increment(1);
                tracing::info!(
                    session_id,
                    user_id = session.user_id,
                    estimated_end = %session.window.end,
                    "late pickup"
                );
                notices.push((
                    session.user_id,
                    Notice::LatePickup {
                        session_id,
                        estimated_end: session.window.end,
                    },
                ));
            }
        }
    }

    for (user_id, notice) in notices {
        engine.notify.send(user_id, notice);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::config::LotConfig;
    use crate::engine::Engine;
    use crate::model::{Role, SessionStatus};
    use crate::notify::NotifyHub;

    use super::sweep;

    #[tokio::test]
    async fn sweep_spares_session_activated_while_queued() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let engine = Arc::new(Engine::new(
            LotConfig::default(),
            clock.clone(),
            Arc::new(NotifyHub::new()),
        ));
        let user = engine
            .create_user("dana", "Dana", "050", "d@x.y", "11-222-33", Role::Subscriber)
            .unwrap()
            .id;
        let reserved = t0 + Duration::hours(26);
        let receipt = engine.make_reservation(user, reserved).await.unwrap();

        // Hold the state lock so both tasks read their clocks first and
        // queue behind it: the sweep sees the reservation past grace, the
        // gate entry sees it still inside. The fair lock grants the
        // sweep's read, then the entry's write, then the sweep's write.
        let gate = engine.lot.write().await;

        clock.set(reserved + Duration::minutes(16));
        let sweeper = {
            let engine = engine.clone();
            tokio::spawn(async move { sweep(&engine).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        clock.set(reserved + Duration::minutes(14));
        let arrival = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.enter_with_reservation(receipt.session_id, user).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        drop(gate);
        let entry = arrival.await.unwrap().unwrap();
        sweeper.await.unwrap();

        // The sweep must notice the activation and leave the session alone.
        let state = engine.lot.read().await;
        let session = state.session(receipt.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert!(state.spots[entry.spot_id as usize - 1].occupied);
    }
}
