use chrono::Duration;

/// Domain tunables for one parking lot. Compiled defaults match the canonical
/// deployment (10 interchangeable spots, 40% walk-in protection); the env
/// overrides exist mainly so the monitor cadence and grace can be tuned
/// without a rebuild.
#[derive(Debug, Clone)]
pub struct LotConfig {
    /// Fixed pool size, spot ids 1..=total_spots.
    pub total_spots: u32,
    /// Fraction of the pool that must stay free for walk-ins (0.4 = 40%).
    pub reservation_threshold: f64,
    /// Default session length for reservations and walk-ins.
    pub default_duration: Duration,
    /// Sampling step of the availability sweep.
    pub sweep_step: Duration,
    /// Shared 15-minute tolerance: late arrival against a reservation start,
    /// and the walk-in allocator's protection of about-to-be-claimed spots.
    /// One constant on purpose; the two enforcement sites must not drift.
    pub grace: Duration,
    /// Reservations must be placed at least this far ahead.
    pub min_advance: Duration,
    /// ...and at most this far ahead.
    pub max_advance: Duration,
    /// Allowed extension range in whole hours, inclusive.
    pub min_extension_hours: i64,
    pub max_extension_hours: i64,
    /// Cadence of the auto-cancellation monitor.
    pub monitor_interval: std::time::Duration,
}

impl Default for LotConfig {
    fn default() -> Self {
        Self {
            total_spots: 10,
            reservation_threshold: 0.4,
            default_duration: Duration::hours(4),
            sweep_step: Duration::minutes(15),
            grace: Duration::minutes(15),
            min_advance: Duration::hours(24),
            max_advance: Duration::days(7),
            min_extension_hours: 1,
            max_extension_hours: 4,
            monitor_interval: std::time::Duration::from_secs(30),
        }
    }
}

impl LotConfig {
    /// Spots that must remain free throughout a requested window for a
    /// reservation to be admitted: the strict rule requires strictly more
    /// than this many.
    pub fn required_free(&self) -> u32 {
        (self.total_spots as f64 * self.reservation_threshold).ceil() as u32
    }

    /// Read overrides from the environment. Unset or unparsable variables
    /// fall back to the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_parse::<u32>("VALET_TOTAL_SPOTS") {
            cfg.total_spots = n.max(1);
        }
        if let Some(secs) = env_parse::<u64>("VALET_MONITOR_INTERVAL_SECS") {
            cfg.monitor_interval = std::time::Duration::from_secs(secs.max(1));
        }
        if let Some(mins) = env_parse::<i64>("VALET_GRACE_MINUTES") {
            cfg.grace = Duration::minutes(mins.max(1));
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_required_free() {
        let cfg = LotConfig::default();
        // ceil(10 * 0.4) = 4; strict admission needs > 4 free throughout.
        assert_eq!(cfg.required_free(), 4);
    }

    #[test]
    fn required_free_rounds_up() {
        let cfg = LotConfig {
            total_spots: 7,
            ..LotConfig::default()
        };
        // ceil(7 * 0.4) = ceil(2.8) = 3
        assert_eq!(cfg.required_free(), 3);
    }
}
