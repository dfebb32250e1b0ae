//! Violation Ledger
//!
//! Accumulated team-damage points per (offender, victim) pair.
//!
//! ## Record lifecycle
//!
//! - Created on the first scored event between the pair
//! - Points grow with events, shrink only by decay or forgiveness
//! - Grudged once the pair exceeds `max_points` (grudge mode only)
//! - Removed explicitly when points reach zero and no grudge holds it
//!
//! Decay is lazy: the owner calls [`Ledger::settle`] before reading.

#[allow(clippy::module_inception)]
mod ledger;
mod record;

pub use ledger::{Forgiven, Ledger, PlayerInfo, PointsEntry, RecordUpdate};
pub use record::{POINTS_EPSILON, PairKey, ViolationRecord};
