use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stable spot identifier, 1..=N, fixed at engine construction.
pub type SpotId = u32;
/// Monotonic session identifier, assigned at creation, never reused.
pub type SessionId = u64;
/// User identifier, assigned at registration.
pub type UserId = u32;

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn from_start(start: DateTime<Utc>, duration: Duration) -> Self {
        Self::new(start, start + duration)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// `start <= t < end`.
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Session state machine. Transitions are monotonic:
/// Preorder -> {Active, Cancelled}, Active -> {Finished, Cancelled}.
/// Terminal states are never left and sessions are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Preorder,
    Active,
    Finished,
    Cancelled,
}

impl SessionStatus {
    /// Preorder and Active sessions are the only ones that hold a claim on a
    /// spot's time; Finished/Cancelled are history.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Preorder | SessionStatus::Active)
    }
}

/// How the session came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Advance reservation, subject to the strict admission rule.
    Reserved,
    /// Spontaneous arrival, exempt from the admission rules.
    WalkIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Subscriber,
    Attendant,
    Manager,
}

/// One reservation-or-parking record. Terminal sessions are retained as
/// history, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// Assigned at allocation. Reservations and walk-ins always carry one;
    /// the field stays optional to represent pre-allocation records.
    pub spot_id: Option<SpotId>,
    pub placed_at: DateTime<Utc>,
    /// Estimated `[start, end)` window the session claims on its spot.
    pub window: Window,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub order_type: OrderType,
    pub late: bool,
    pub extended: bool,
    pub status: SessionStatus,
    /// Monitor idempotency flag: a late-pickup notice has been sent for the
    /// current lateness episode. Reset by extension (new episode).
    #[serde(skip_serializing)]
    pub late_notified: bool,
}

impl Session {
    /// True if this session blocks the given spot for any part of `window`.
    pub fn blocks(&self, spot_id: SpotId, window: &Window) -> bool {
        self.status.is_open() && self.spot_id == Some(spot_id) && self.window.overlaps(window)
    }
}

/// One physical, interchangeable parking unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Spot {
    pub id: SpotId,
    /// True iff exactly one Active session currently references this spot.
    pub occupied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub car_number: String,
    pub role: Role,
}

/// Registration payload for a new subscriber (attendant-gated operation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscriber {
    pub username: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub car_number: String,
}

/// Partial contact update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub car_number: Option<String>,
}

/// The critical shared resource: the spot pool plus every session record.
/// Guarded by one `RwLock` in the engine so every check-then-act sequence
/// (availability -> allocate -> create/mutate -> occupancy flip) is atomic.
#[derive(Debug)]
pub struct LotState {
    /// Index i holds spot id i+1.
    pub spots: Vec<Spot>,
    /// All sessions ever created, keyed by id; terminal ones are history.
    pub sessions: std::collections::BTreeMap<SessionId, Session>,
    next_session_id: SessionId,
}

impl LotState {
    pub fn new(total_spots: u32) -> Self {
        Self {
            spots: (1..=total_spots)
                .map(|id| Spot {
                    id,
                    occupied: false,
                })
                .collect(),
            sessions: std::collections::BTreeMap::new(),
            next_session_id: 1,
        }
    }

    pub fn allocate_session_id(&mut self) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id += 1;
        id
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn free_now(&self) -> u32 {
        self.spots.iter().filter(|s| !s.occupied).count() as u32
    }

    pub fn occupied_now(&self) -> u32 {
        self.spots.len() as u32 - self.free_now()
    }

    pub fn set_occupied(&mut self, spot_id: SpotId, occupied: bool) {
        if let Some(spot) = self.spots.get_mut(spot_id as usize - 1) {
            spot.occupied = occupied;
        }
    }

    /// Recompute a spot's occupancy from the Active sessions that reference
    /// it. Releasing through this keeps the occupancy invariant even when an
    /// overlapping release races (a spot is never double-freed under another
    /// occupant).
    pub fn refresh_occupancy(&mut self, spot_id: SpotId) {
        let held = self
            .sessions
            .values()
            .any(|s| s.status == SessionStatus::Active && s.spot_id == Some(spot_id));
        self.set_occupied(spot_id, held);
    }
}

// ── Operation result payloads ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    pub total_spots: u32,
    pub free_now: u32,
    /// Lenient admission rule: whether a "reserve right now" flow may proceed.
    pub reservations_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReservationReceipt {
    pub session_id: SessionId,
    pub spot_id: SpotId,
    pub window: Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryReceipt {
    pub session_id: SessionId,
    pub spot_id: SpotId,
    pub estimated_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitReceipt {
    pub session_id: SessionId,
    pub spot_id: SpotId,
    pub actual_end: DateTime<Utc>,
    pub late: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtensionReceipt {
    pub session_id: SessionId,
    pub new_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn window_basics() {
        let w = Window::new(t(9, 0), t(13, 0));
        assert_eq!(w.duration(), Duration::hours(4));
        assert!(w.covers(t(9, 0)));
        assert!(w.covers(t(12, 59)));
        assert!(!w.covers(t(13, 0))); // half-open
    }

    #[test]
    fn window_overlap() {
        let a = Window::new(t(9, 0), t(13, 0));
        let b = Window::new(t(12, 0), t(14, 0));
        let c = Window::new(t(13, 0), t(15, 0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn open_statuses() {
        assert!(SessionStatus::Preorder.is_open());
        assert!(SessionStatus::Active.is_open());
        assert!(!SessionStatus::Finished.is_open());
        assert!(!SessionStatus::Cancelled.is_open());
    }

    #[test]
    fn session_blocks_only_open_overlapping() {
        let window = Window::new(t(10, 0), t(14, 0));
        let mut s = Session {
            id: 1,
            user_id: 7,
            spot_id: Some(3),
            placed_at: t(8, 0),
            window,
            actual_start: None,
            actual_end: None,
            order_type: OrderType::Reserved,
            late: false,
            extended: false,
            status: SessionStatus::Preorder,
            late_notified: false,
        };
        assert!(s.blocks(3, &Window::new(t(13, 0), t(15, 0))));
        assert!(!s.blocks(4, &Window::new(t(13, 0), t(15, 0))));
        assert!(!s.blocks(3, &Window::new(t(14, 0), t(15, 0))));
        s.status = SessionStatus::Cancelled;
        assert!(!s.blocks(3, &Window::new(t(13, 0), t(15, 0))));
    }
}
