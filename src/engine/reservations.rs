use chrono::{DateTime, Utc};

use crate::model::*;
use crate::notify::Notice;

use super::availability::{self, AdmissionRule};
use super::{Engine, EngineError};

impl Engine {
    /// Current lot snapshot plus the lenient "can a reservation be placed
    /// right now" verdict.
    pub async fn check_availability(&self) -> AvailabilityReport {
        let state = self.lot.read().await;
        let now = self.now();
        let window = Window::from_start(now, self.cfg.default_duration);
        AvailabilityReport {
            total_spots: self.cfg.total_spots,
            free_now: state.free_now(),
            reservations_open: availability::within_rule(
                AdmissionRule::Lenient,
                &self.cfg,
                &state,
                &window,
            ),
        }
    }

    /// Worst-case free-spot count over an arbitrary window. Query surface
    /// for clients probing a slot before committing to it.
    pub async fn min_available(&self, window: Window) -> u32 {
        let state = self.lot.read().await;
        availability::min_available(&state, &window, self.cfg.sweep_step)
    }

    /// Place an advance reservation for `[start, start + 4h)`.
    ///
    /// Admission is the strict rule: at every sampled instant of the window
    /// the lot must keep strictly more than 40% of its spots free after
    /// this reservation's peers are counted. Passing the rule does not
    /// guarantee a single spot is free for the whole window under first-fit
    /// assignment; that case fails with `NoSpotForWindow`.
    pub async fn make_reservation(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
    ) -> Result<ReservationReceipt, EngineError> {
        self.user(user_id)?;
        let now = self.now();
        if start < now + self.cfg.min_advance {
            return Err(EngineError::TooSoon);
        }
        if start > now + self.cfg.max_advance {
            return Err(EngineError::TooFar);
        }
        let window = Window::from_start(start, self.cfg.default_duration);

        let (receipt, notice) = {
            let mut state = self.lot.write().await;

            let available = availability::min_available(&state, &window, self.cfg.sweep_step);
            let required = self.cfg.required_free();
            if available <= required {
                return Err(EngineError::RuleViolated {
                    available,
                    required,
                });
            }
            let spot_id = availability::find_spot_for_window(&state, &window)
                .ok_or(EngineError::NoSpotForWindow)?;

            let id = state.allocate_session_id();
            state.sessions.insert(
                id,
                Session {
                    id,
                    user_id,
                    spot_id: Some(spot_id),
                    placed_at: now,
                    window,
                    actual_start: None,
                    actual_end: None,
                    order_type: OrderType::Reserved,
                    late: false,
                    extended: false,
                    status: SessionStatus::Preorder,
                    late_notified: false,
                },
            );
            tracing::info!(session_id = id, user_id, spot_id, start = %window.start, "reservation placed");
            (
                ReservationReceipt {
                    session_id: id,
                    spot_id,
                    window,
                },
                Notice::ReservationConfirmed {
                    session_id: id,
                    spot_id,
                    start: window.start,
                },
            )
        };
        self.notify.send(user_id, notice);
        Ok(receipt)
    }

    /// Cancel a session on the owner's behalf.
    pub async fn cancel_reservation_owned(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<(), EngineError> {
        {
            let state = self.lot.read().await;
            let session = state
                .session(session_id)
                .ok_or(EngineError::NotFound(session_id))?;
            self.check_owner(session, user_id)?;
        }
        self.cancel_reservation(session_id).await
    }

    /// Cancel a session without an ownership check (attendant surface, and
    /// the gate's expired-reservation path).
    pub async fn cancel_reservation(&self, session_id: SessionId) -> Result<(), EngineError> {
        let (user_id, notice) = {
            let mut state = self.lot.write().await;
            self.cancel_locked(&mut state, session_id, "user request")?
        };
        self.notify.send(user_id, notice);
        Ok(())
    }
}
