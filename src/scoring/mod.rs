//! Scoring Policy
//!
//! Pure mapping from a raw friendly-fire event to weighted points.
//!
//! ```text
//! kill   -> 100 * kill_multiplier[level]
//! damage -> min(amount, cap) * damage_multiplier[level]
//! ```
//!
//! The level is the highest configured threshold at or below the offender's
//! rank. All state lives in the ledger; nothing here mutates.

mod policy;

pub use policy::{EventKind, KILL_BASE_POINTS, LevelPolicy, ScoringPolicy};
