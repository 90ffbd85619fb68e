use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Register a new subscriber. Attendant-gated: `actor_id` must hold the
    /// attendant or manager role.
    pub fn register_subscriber(
        &self,
        actor_id: UserId,
        new: &NewSubscriber,
    ) -> Result<User, EngineError> {
        let actor = self.user(actor_id)?;
        if actor.role == Role::Subscriber {
            return Err(EngineError::AttendantRequired);
        }
        for (field, value) in [
            ("username", &new.username),
            ("name", &new.name),
            ("phone", &new.phone),
            ("email", &new.email),
            ("car number", &new.car_number),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::FieldRequired(field));
            }
        }
        self.create_user(
            &new.username,
            &new.name,
            &new.phone,
            &new.email,
            &new.car_number,
            Role::Subscriber,
        )
    }

    /// Update a subscriber's own contact details. Absent fields keep their
    /// current value; username and role never change here.
    pub fn update_subscriber(
        &self,
        user_id: UserId,
        update: &ContactUpdate,
    ) -> Result<User, EngineError> {
        let mut entry = self
            .users
            .get_mut(&user_id)
            .ok_or(EngineError::UserNotFound)?;
        if let Some(phone) = &update.phone {
            entry.phone = phone.clone();
        }
        if let Some(email) = &update.email {
            entry.email = email.clone();
        }
        if let Some(car_number) = &update.car_number {
            entry.car_number = car_number.clone();
        }
        tracing::info!(user_id, "contact details updated");
        Ok(entry.clone())
    }

    pub fn user_by_username(&self, username: &str) -> Result<User, EngineError> {
        let id = self
            .usernames
            .get(username)
            .map(|e| *e)
            .ok_or(EngineError::UserNotFound)?;
        self.user(id)
    }

    /// A user's full session history, oldest first. Terminal sessions are
    /// retained forever, so this is the complete record.
    pub async fn history(&self, user_id: UserId) -> Result<Vec<Session>, EngineError> {
        self.user(user_id)?;
        let state = self.lot.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Every currently active session (attendant dashboard view).
    pub async fn active_sessions(&self) -> Vec<Session> {
        let state = self.lot.read().await;
        state
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .cloned()
            .collect()
    }
}
