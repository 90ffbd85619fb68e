use crate::model::*;
use crate::notify::Notice;

use super::availability;
use super::{Engine, EngineError};

impl Engine {
    /// Spontaneous entry without a reservation. Exempt from the admission
    /// rules: a walk-in may take the very last free spot, as long as that
    /// spot is not protected for a reservation about to claim it.
    pub async fn enter_walk_in(&self, user_id: UserId) -> Result<EntryReceipt, EngineError> {
        self.user(user_id)?;
        let now = self.now();
        let mut state = self.lot.write().await;

        let already = state
            .sessions
            .values()
            .any(|s| s.user_id == user_id && s.status == SessionStatus::Active);
        if already {
            return Err(EngineError::AlreadyParked);
        }

        let spot_id = availability::find_spot_for_walk_in(&state, now, self.cfg.grace)
            .ok_or(EngineError::ParkingFull)?;

        let window = Window::from_start(now, self.cfg.default_duration);
        let id = state.allocate_session_id();
        state.sessions.insert(
            id,
            Session {
                id,
                user_id,
                spot_id: Some(spot_id),
                placed_at: now,
                window,
                actual_start: Some(now),
                actual_end: None,
                order_type: OrderType::WalkIn,
                late: false,
                extended: false,
                status: SessionStatus::Active,
                late_notified: false,
            },
        );
        state.set_occupied(spot_id, true);
        self.record_occupancy(&state);
        tracing::info!(session_id = id, user_id, spot_id, "walk-in entry");
        Ok(EntryReceipt {
            session_id: id,
            spot_id,
            estimated_end: window.end,
        })
    }

    /// Claim a preorder reservation at the gate.
    ///
    /// Same-day arrival within the grace period (early arrival included)
    /// activates the session on its reserved spot. Arrival more than the
    /// grace period after the start, or on a later day, cancels the
    /// reservation; arrival a day early rejects without cancelling.
    pub async fn enter_with_reservation(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<EntryReceipt, EngineError> {
        let now = self.now();
        let expired = {
            let mut state = self.lot.write().await;

            let session = state
                .session(session_id)
                .ok_or(EngineError::NotFound(session_id))?;
            self.check_owner(session, user_id)?;
            if session.status != SessionStatus::Preorder {
                return Err(EngineError::NotPreorder(session_id));
            }

            let start = session.window.start;
            if start.date_naive() > now.date_naive() {
                return Err(EngineError::FutureDate);
            }
            let stale = start.date_naive() < now.date_naive() || now > start + self.cfg.grace;
            if !stale {
                let spot_id = session.spot_id.ok_or(EngineError::NotFound(session_id))?;
                // Arrival lateness is logged only; the `late` flag is
                // reserved for overdue pickup and set at exit or by the
                // monitor.
                let late_arrival = now > start;
                let estimated_end = session.window.end;
                let session = state
                    .session_mut(session_id)
                    .ok_or(EngineError::NotFound(session_id))?;
                session.status = SessionStatus::Active;
                session.actual_start = Some(now);
                state.set_occupied(spot_id, true);
                self.record_occupancy(&state);
                tracing::info!(session_id, user_id, spot_id, late_arrival, "reservation claimed");
                return Ok(EntryReceipt {
                    session_id,
                    spot_id,
                    estimated_end,
                });
            }
            self.cancel_locked(&mut state, session_id, "expired")?
        };
        let (owner, notice) = expired;
        self.notify.send(owner, notice);
        Err(EngineError::ReservationExpired)
    }

    /// Close an active session on the owner's behalf.
    pub async fn exit_owned(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<ExitReceipt, EngineError> {
        {
            let state = self.lot.read().await;
            let session = state
                .session(session_id)
                .ok_or(EngineError::NotFound(session_id))?;
            self.check_owner(session, user_id)?;
        }
        self.exit(session_id).await
    }

    /// Close an active session without an ownership check (attendant-forced
    /// exit). The spot is released by recomputing its occupancy, so a
    /// racing release can never free it under another occupant.
    pub async fn exit(&self, session_id: SessionId) -> Result<ExitReceipt, EngineError> {
        let now = self.now();
        let mut state = self.lot.write().await;

        let session = state
            .session_mut(session_id)
            .ok_or(EngineError::NotFound(session_id))?;
        if session.status != SessionStatus::Active {
            return Err(EngineError::NotActive(session_id));
        }
        let late = now > session.window.end;
        session.status = SessionStatus::Finished;
        session.actual_end = Some(now);
        session.late = late;
        let spot_id = session.spot_id;
        let user_id = session.user_id;
        if let Some(spot_id) = spot_id {
            state.refresh_occupancy(spot_id);
        }
        self.record_occupancy(&state);
        tracing::info!(session_id, user_id, ?spot_id, late, "session finished");
        Ok(ExitReceipt {
            session_id,
            spot_id: spot_id.unwrap_or_default(),
            actual_end: now,
            late,
        })
    }

    /// Extend an active session's estimated end, once, on the owner's behalf.
    pub async fn extend_owned(
        &self,
        session_id: SessionId,
        user_id: UserId,
        hours: i64,
    ) -> Result<ExtensionReceipt, EngineError> {
        {
            let state = self.lot.read().await;
            let session = state
                .session(session_id)
                .ok_or(EngineError::NotFound(session_id))?;
            self.check_owner(session, user_id)?;
        }
        self.extend(session_id, hours).await
    }

    /// Extend an active session's estimated end by 1 to 4 whole hours.
    /// Allowed once per session, and only when no preorder reservation
    /// claims the spot during the added interval.
    pub async fn extend(
        &self,
        session_id: SessionId,
        hours: i64,
    ) -> Result<ExtensionReceipt, EngineError> {
        if hours < self.cfg.min_extension_hours || hours > self.cfg.max_extension_hours {
            return Err(EngineError::InvalidHours {
                min: self.cfg.min_extension_hours,
                max: self.cfg.max_extension_hours,
            });
        }
        let (user_id, notice, receipt) = {
            let now = self.now();
            let mut state = self.lot.write().await;

            let session = state
                .session(session_id)
                .ok_or(EngineError::NotFound(session_id))?;
            if session.status != SessionStatus::Active {
                return Err(EngineError::NotActive(session_id));
            }
            if session.extended {
                return Err(EngineError::AlreadyExtended);
            }
            let spot_id = session.spot_id.ok_or(EngineError::NotFound(session_id))?;
            let added = chrono::Duration::hours(hours);
            let extension = Window::new(session.window.end, session.window.end + added);
            let conflict = state
                .sessions
                .values()
                .any(|s| s.id != session_id && s.status == SessionStatus::Preorder
                    && s.blocks(spot_id, &extension));
            if conflict {
                return Err(EngineError::ExtensionConflict);
            }

            let session = state
                .session_mut(session_id)
                .ok_or(EngineError::NotFound(session_id))?;
            session.window.end = extension.end;
            session.extended = true;
            // The lateness episode the monitor was tracking ends here.
            session.late = now > session.window.end;
            session.late_notified = false;
            let user_id = session.user_id;
            let new_end = session.window.end;
            tracing::info!(session_id, user_id, hours, %new_end, "session extended");
            (
                user_id,
                Notice::Extended {
                    session_id,
                    added_hours: hours,
                    new_end,
                },
                ExtensionReceipt {
                    session_id,
                    new_end,
                },
            )
        };
        self.notify.send(user_id, notice);
        Ok(receipt)
    }

    /// Resend the parking code for the caller's active session.
    pub async fn recover_code(&self, user_id: UserId) -> Result<SessionId, EngineError> {
        self.user(user_id)?;
        let session_id = {
            let state = self.lot.read().await;
            state
                .sessions
                .values()
                .find(|s| s.user_id == user_id && s.status == SessionStatus::Active)
                .map(|s| s.id)
                .ok_or(EngineError::NoActiveSession)?
        };
        self.notify.send(user_id, Notice::CodeRecovery { session_id });
        Ok(session_id)
    }
}
