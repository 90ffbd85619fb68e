use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::config::LotConfig;
use crate::model::*;

// ── Availability sweep ────────────────────────────────────────────

/// Open (Preorder/Active) sessions whose window overlaps the query window.
pub fn open_overlapping<'a>(state: &'a LotState, window: &Window) -> Vec<&'a Session> {
    state
        .sessions
        .values()
        .filter(|s| s.status.is_open() && s.spot_id.is_some() && s.window.overlaps(window))
        .collect()
}

/// Minimum number of free spots at any sampled instant within `window`.
///
/// The window is swept at a fixed step (15 minutes canonically); at each
/// sample the distinct spots claimed by an overlapping open session are
/// counted. The window start is sampled, the end boundary is not. This is a
/// discretized worst case: gaps narrower than the step can be missed, which
/// is accepted behavior.
pub fn min_available(state: &LotState, window: &Window, step: Duration) -> u32 {
    let total = state.spots.len() as u32;
    let sessions = open_overlapping(state, window);

    let mut min_free = total;
    let mut t = window.start;
    while t < window.end {
        let mut claimed: HashSet<SpotId> = HashSet::new();
        for session in &sessions {
            if session.window.covers(t) {
                if let Some(spot_id) = session.spot_id {
                    claimed.insert(spot_id);
                }
            }
        }
        let free = total - claimed.len() as u32;
        min_free = min_free.min(free);
        t += step;
    }
    min_free
}

// ── Admission rules ──────────────────────────────────────────────

/// The two walk-in-protection rules. Walk-in entries themselves are exempt
/// from both and may take the last free spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionRule {
    /// Global "can reserve right now": free spots now >= total * threshold.
    Lenient,
    /// Per-slot reservation admission: minimum free spots across the whole
    /// window strictly greater than ceil(total * threshold).
    Strict,
}

pub fn within_rule(
    rule: AdmissionRule,
    cfg: &LotConfig,
    state: &LotState,
    window: &Window,
) -> bool {
    match rule {
        AdmissionRule::Lenient => {
            state.free_now() as f64 >= cfg.total_spots as f64 * cfg.reservation_threshold
        }
        AdmissionRule::Strict => {
            min_available(state, window, cfg.sweep_step) > cfg.required_free()
        }
    }
}

// ── Spot allocation ──────────────────────────────────────────────

/// First spot (ascending id) with no open session overlapping `window`.
/// First-fit, not load-balanced; the aggregate admission rule passing does
/// not guarantee this finds one.
pub fn find_spot_for_window(state: &LotState, window: &Window) -> Option<SpotId> {
    state
        .spots
        .iter()
        .map(|spot| spot.id)
        .find(|&spot_id| !state.sessions.values().any(|s| s.blocks(spot_id, window)))
}

/// First spot usable for an immediate walk-in entry: unoccupied, no open
/// session covering `now`, and no preorder starting within the grace window
/// on either side of `now` — that spot belongs to a reservation about to
/// claim it.
pub fn find_spot_for_walk_in(
    state: &LotState,
    now: DateTime<Utc>,
    grace: Duration,
) -> Option<SpotId> {
    state
        .spots
        .iter()
        .filter(|spot| !spot.occupied)
        .map(|spot| spot.id)
        .find(|&spot_id| {
            !state.sessions.values().any(|s| {
                s.status.is_open()
                    && s.spot_id == Some(spot_id)
                    && (s.window.covers(now)
                        || (s.status == SessionStatus::Preorder
                            && s.window.start >= now - grace
                            && s.window.start <= now + grace))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn w(start: DateTime<Utc>, end: DateTime<Utc>) -> Window {
        Window::new(start, end)
    }

    fn seed(state: &mut LotState, spot: SpotId, window: Window, status: SessionStatus) -> SessionId {
        let id = state.allocate_session_id();
        state.sessions.insert(
            id,
            Session {
                id,
                user_id: 1,
                spot_id: Some(spot),
                placed_at: window.start - Duration::days(1),
                window,
                actual_start: None,
                actual_end: None,
                order_type: OrderType::Reserved,
                late: false,
                extended: false,
                status,
                late_notified: false,
            },
        );
        id
    }

    fn step() -> Duration {
        Duration::minutes(15)
    }

    #[test]
    fn empty_lot_fully_available() {
        let state = LotState::new(10);
        let window = w(t(10, 0), t(14, 0));
        assert_eq!(min_available(&state, &window, step()), 10);
    }

    #[test]
    fn min_available_counts_distinct_spots() {
        let mut state = LotState::new(10);
        for spot in 1..=6 {
            seed(&mut state, spot, w(t(10, 0), t(14, 0)), SessionStatus::Preorder);
        }
        let window = w(t(10, 0), t(14, 0));
        assert_eq!(min_available(&state, &window, step()), 4);
    }

    #[test]
    fn min_available_takes_worst_sample() {
        let mut state = LotState::new(10);
        // Spot 1 busy in the first half, spots 2..=3 in the second: worst
        // instant has 2 claimed, not 3.
        seed(&mut state, 1, w(t(10, 0), t(12, 0)), SessionStatus::Active);
        seed(&mut state, 2, w(t(12, 0), t(14, 0)), SessionStatus::Preorder);
        seed(&mut state, 3, w(t(12, 0), t(14, 0)), SessionStatus::Preorder);
        let window = w(t(10, 0), t(14, 0));
        assert_eq!(min_available(&state, &window, step()), 8);
    }

    #[test]
    fn min_available_end_boundary_excluded() {
        let mut state = LotState::new(10);
        // Claim starting exactly at the window end must not count.
        seed(&mut state, 1, w(t(14, 0), t(18, 0)), SessionStatus::Preorder);
        let window = w(t(10, 0), t(14, 0));
        assert_eq!(min_available(&state, &window, step()), 10);
    }

    #[test]
    fn min_available_ignores_terminal_sessions() {
        let mut state = LotState::new(10);
        seed(&mut state, 1, w(t(10, 0), t(14, 0)), SessionStatus::Cancelled);
        seed(&mut state, 2, w(t(10, 0), t(14, 0)), SessionStatus::Finished);
        let window = w(t(10, 0), t(14, 0));
        assert_eq!(min_available(&state, &window, step()), 10);
    }

    #[test]
    fn min_available_bounded_by_pool() {
        let mut state = LotState::new(10);
        for spot in 1..=10 {
            seed(&mut state, spot, w(t(10, 0), t(14, 0)), SessionStatus::Active);
        }
        let window = w(t(10, 0), t(14, 0));
        assert_eq!(min_available(&state, &window, step()), 0);
    }

    #[test]
    fn strict_rule_needs_strictly_more_than_threshold() {
        let cfg = LotConfig::default();
        let window = w(t(10, 0), t(14, 0));

        // 6 booked -> 4 free: 4 > 4 is false, blocked.
        let mut state = LotState::new(10);
        for spot in 1..=6 {
            seed(&mut state, spot, window, SessionStatus::Preorder);
        }
        assert!(!within_rule(AdmissionRule::Strict, &cfg, &state, &window));

        // 5 booked -> 5 free: 5 > 4, allowed.
        let mut state = LotState::new(10);
        for spot in 1..=5 {
            seed(&mut state, spot, window, SessionStatus::Preorder);
        }
        assert!(within_rule(AdmissionRule::Strict, &cfg, &state, &window));
    }

    #[test]
    fn lenient_rule_allows_exactly_threshold() {
        let cfg = LotConfig::default();
        let mut state = LotState::new(10);
        for spot_id in 1..=6 {
            state.set_occupied(spot_id, true);
        }
        // 4 free >= 10 * 0.4 — lenient passes where strict would not.
        let window = w(t(10, 0), t(14, 0));
        assert!(within_rule(AdmissionRule::Lenient, &cfg, &state, &window));
        state.set_occupied(7, true);
        assert!(!within_rule(AdmissionRule::Lenient, &cfg, &state, &window));
    }

    #[test]
    fn first_fit_ascending() {
        let mut state = LotState::new(10);
        let window = w(t(10, 0), t(14, 0));
        seed(&mut state, 1, window, SessionStatus::Preorder);
        seed(&mut state, 2, window, SessionStatus::Active);
        assert_eq!(find_spot_for_window(&state, &window), Some(3));
    }

    #[test]
    fn adjacent_windows_share_a_spot() {
        let mut state = LotState::new(1);
        seed(&mut state, 1, w(t(10, 0), t(14, 0)), SessionStatus::Preorder);
        assert_eq!(
            find_spot_for_window(&state, &w(t(14, 0), t(18, 0))),
            Some(1)
        );
        assert_eq!(find_spot_for_window(&state, &w(t(13, 0), t(15, 0))), None);
    }

    #[test]
    fn walk_in_skips_occupied() {
        let mut state = LotState::new(3);
        state.set_occupied(1, true);
        let got = find_spot_for_walk_in(&state, t(10, 0), Duration::minutes(15));
        assert_eq!(got, Some(2));
    }

    #[test]
    fn walk_in_respects_grace_protection() {
        let mut state = LotState::new(1);
        // Reservation starts 10 minutes from now: spot is protected.
        seed(&mut state, 1, w(t(10, 10), t(14, 10)), SessionStatus::Preorder);
        assert_eq!(
            find_spot_for_walk_in(&state, t(10, 0), Duration::minutes(15)),
            None
        );
        // Reservation started 10 minutes ago and may still be claimed.
        let mut state = LotState::new(1);
        seed(&mut state, 1, w(t(9, 50), t(13, 50)), SessionStatus::Preorder);
        assert_eq!(
            find_spot_for_walk_in(&state, t(10, 0), Duration::minutes(15)),
            None
        );
    }

    #[test]
    fn walk_in_ignores_far_future_preorder() {
        let mut state = LotState::new(1);
        // Tomorrow's reservation does not protect the spot today.
        seed(
            &mut state,
            1,
            w(t(10, 0) + Duration::days(1), t(14, 0) + Duration::days(1)),
            SessionStatus::Preorder,
        );
        assert_eq!(
            find_spot_for_walk_in(&state, t(10, 0), Duration::minutes(15)),
            Some(1)
        );
    }
}
