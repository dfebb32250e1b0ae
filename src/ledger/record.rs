//! Per-pair violation records
//!
//! A record exists while its points are above zero or it is grudged.
//! Decay is exponential by half-life and computed on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::players::{Player, PlayerId};

/// Below this a record counts as empty
pub const POINTS_EPSILON: f64 = 0.01;

/// Ordered (offender, victim) key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub offender: PlayerId,
    pub victim: PlayerId,
}

impl PairKey {
    pub fn new(offender: PlayerId, victim: PlayerId) -> Self {
        Self { offender, victim }
    }

    pub fn involves(&self, player: PlayerId) -> bool {
        self.offender == player || self.victim == player
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Display names cached at the last event, so records outlive connections
    pub offender_name: String,
    pub victim_name: String,

    pub points: f64,
    pub last_event: DateTime<Utc>,

    /// Anchor for the next decay computation
    pub decayed_at: DateTime<Utc>,

    pub grudged: bool,

    /// Ledger-wide order of the latest event on this pair
    pub sequence: u64,
}

impl ViolationRecord {
    pub fn new(offender: &Player, victim: &Player, now: DateTime<Utc>) -> Self {
        Self {
            offender_name: offender.name.clone(),
            victim_name: victim.name.clone(),
            points: 0.0,
            last_event: now,
            decayed_at: now,
            grudged: false,
            sequence: 0,
        }
    }

    /// Apply half-life decay up to `now`. A zero half-life disables decay.
    pub fn decay(&mut self, now: DateTime<Utc>, half_life_secs: u64) {
        if half_life_secs == 0 || now <= self.decayed_at {
            return;
        }

        let elapsed = (now - self.decayed_at).num_milliseconds() as f64 / 1000.0;
        let factor = 0.5f64.powf(elapsed / half_life_secs as f64);
        self.points *= factor;
        self.decayed_at = now;
    }

    /// Add points from a fresh event
    pub fn add(&mut self, points: f64, now: DateTime<Utc>) {
        self.points += points;
        if now > self.last_event {
            self.last_event = now;
        }
        if now > self.decayed_at {
            self.decayed_at = now;
        }
    }

    /// Grudge blocks forgiveness only while grudge mode is enabled
    pub fn blocks_forgiveness(&self, grudge_enabled: bool) -> bool {
        self.grudged && grudge_enabled
    }

    /// Nothing left to keep the record alive
    pub fn is_spent(&self) -> bool {
        self.points < POINTS_EPSILON && !self.grudged
    }
}
