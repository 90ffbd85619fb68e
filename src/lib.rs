//! Reservation and availability engine for a small fixed pool of parking
//! spots, served over a JSON-lines TCP surface.
//!
//! The engine tracks sessions (advance reservations and walk-in entries)
//! through their lifecycle, enforces the 40% walk-in-protection rule on
//! reservation admission, and runs a background monitor that expires
//! unclaimed reservations and flags overdue pickups.

pub mod clock;
pub mod config;
pub mod engine;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod observability;
pub mod wire;
