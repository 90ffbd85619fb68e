mod availability;
mod error;
mod lifecycle;
mod queries;
mod reservations;


pub use availability::{min_available, AdmissionRule};
pub use error::EngineError;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::config::LotConfig;
use crate::model::*;
use crate::notify::{Notice, NotifyHub};
use crate::observability;

/// The reservation engine. One instance per parking lot.
///
/// Every spot-affecting operation takes the `lot` write lock for its whole
/// check-then-act sequence, so availability checks, spot allocation and
/// session mutation are a single atomic step. Notices are dispatched only
/// after the lock is released; state is committed before anyone hears
/// about it.
pub struct Engine {
    pub(crate) cfg: LotConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) lot: RwLock<LotState>,
    pub(crate) users: DashMap<UserId, User>,
    pub(crate) usernames: DashMap<String, UserId>,
    next_user_id: AtomicU32,
    pub(crate) notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(cfg: LotConfig, clock: Arc<dyn Clock>, notify: Arc<NotifyHub>) -> Self {
        let lot = LotState::new(cfg.total_spots);
        Self {
            cfg,
            clock,
            lot: RwLock::new(lot),
            users: DashMap::new(),
            usernames: DashMap::new(),
            next_user_id: AtomicU32::new(1),
            notify,
        }
    }

    pub fn config(&self) -> &LotConfig {
        &self.cfg
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Store-level user provisioning. The request-surface registration path
    /// (`register_subscriber`) adds validation and the attendant gate on top.
    pub fn create_user(
        &self,
        username: &str,
        name: &str,
        phone: &str,
        email: &str,
        car_number: &str,
        role: Role,
    ) -> Result<User, EngineError> {
        let id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
        // Claim the username first; the entry API makes the claim atomic.
        use dashmap::mapref::entry::Entry;
        let claimed = match self.usernames.entry(username.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(id);
                true
            }
            Entry::Occupied(_) => false,
        };
        if !claimed {
            return Err(EngineError::UsernameTaken(username.to_string()));
        }
        let user = User {
            id,
            username: username.to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            email: email.to_string(),
            car_number: car_number.to_string(),
            role,
        };
        self.users.insert(id, user.clone());
        tracing::info!(user_id = id, username, ?role, "user created");
        Ok(user)
    }

    pub fn user(&self, user_id: UserId) -> Result<User, EngineError> {
        self.users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or(EngineError::UserNotFound)
    }

    /// Ownership gate for owned variants of cancel/exit/extend. Denials are
    /// logged and counted; the caller gets `AccessDenied`, never a
    /// not-found downgrade.
    pub(crate) fn check_owner(
        &self,
        session: &Session,
        user_id: UserId,
    ) -> Result<(), EngineError> {
        if session.user_id != user_id {
            tracing::warn!(
                session_id = session.id,
                owner = session.user_id,
                caller = user_id,
                "ownership check failed"
            );
            metrics::counter!(observability::ACCESS_DENIED_TOTAL).increment(1);
            return Err(EngineError::AccessDenied);
        }
        Ok(())
    }

    /// Cancel a session while holding the lot write lock. The single path
    /// for user cancels, expired-at-gate cancels and monitor expiry, so
    /// occupancy release and the terminal transition never diverge.
    ///
    /// Returns the notice to dispatch after the lock is dropped.
    pub(crate) fn cancel_locked(
        &self,
        state: &mut LotState,
        session_id: SessionId,
        reason: &str,
    ) -> Result<(UserId, Notice), EngineError> {
        let session = state
            .session_mut(session_id)
            .ok_or(EngineError::NotFound(session_id))?;
        if !session.status.is_open() {
            return Err(EngineError::AlreadyClosed(session_id));
        }
        session.status = SessionStatus::Cancelled;
        let user_id = session.user_id;
        let spot_id = session.spot_id;
        if let Some(spot_id) = spot_id {
            state.refresh_occupancy(spot_id);
        }
        self.record_occupancy(state);
        tracing::info!(session_id, user_id, reason, "session cancelled");
        Ok((
            user_id,
            Notice::ReservationCancelled {
                session_id,
                reason: reason.to_string(),
            },
        ))
    }

    pub(crate) fn record_occupancy(&self, state: &LotState) {
        metrics::gauge!(observability::SPOTS_OCCUPIED).set(state.occupied_now() as f64);
    }
}
