//! Level Multiplier Tables and Event Scoring
//!
//! Offender rank resolves to the highest configured level at or below it.
//! Ranks below every configured level fail closed to the lowest level.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Points a single kill is worth before the level multiplier
pub const KILL_BASE_POINTS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Damage,
    Kill,
}

/// Per-level weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelPolicy {
    pub kill_multiplier: f64,
    pub damage_multiplier: f64,
    /// Suspension length in minutes for a first offence
    pub ban_length: u32,
}

impl LevelPolicy {
    pub fn new(kill_multiplier: f64, damage_multiplier: f64, ban_length: u32) -> Self {
        Self {
            kill_multiplier,
            damage_multiplier,
            ban_length,
        }
    }
}

/// Ordered level lookup, built from validated configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    table: BTreeMap<u32, LevelPolicy>,
    /// Lowest level, used when a rank sits below every threshold
    floor: (u32, LevelPolicy),
    /// Cap applied to a single damage report
    max_event_points: f64,
}

impl ScoringPolicy {
    pub fn new(table: BTreeMap<u32, LevelPolicy>, max_event_points: f64) -> Result<Self> {
        let floor = table
            .iter()
            .next()
            .map(|(level, policy)| (*level, *policy))
            .ok_or_else(|| anyhow::anyhow!("At least one level table is required"))?;

        for (level, policy) in &table {
            for (name, value) in [
                ("kill_multiplier", policy.kill_multiplier),
                ("damage_multiplier", policy.damage_multiplier),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(anyhow::anyhow!(
                        "Level {} has invalid {}: {}",
                        level,
                        name,
                        value
                    ));
                }
            }
        }

        if !max_event_points.is_finite() || max_event_points <= 0.0 {
            return Err(anyhow::anyhow!(
                "max_event_points must be positive, got {}",
                max_event_points
            ));
        }

        Ok(Self {
            table,
            floor,
            max_event_points,
        })
    }

    /// Highest configured level <= rank
    pub fn resolve_level(&self, rank: u32) -> (u32, LevelPolicy) {
        self.table
            .range(..=rank)
            .next_back()
            .map(|(level, policy)| (*level, *policy))
            .unwrap_or(self.floor)
    }

    /// Weighted points for one event. Damage is capped per report.
    pub fn score(&self, kind: EventKind, raw_amount: f64, rank: u32) -> f64 {
        let (_, policy) = self.resolve_level(rank);
        match kind {
            EventKind::Kill => KILL_BASE_POINTS * policy.kill_multiplier,
            EventKind::Damage => {
                let amount = if raw_amount.is_finite() {
                    raw_amount.clamp(0.0, self.max_event_points)
                } else {
                    0.0
                };
                amount * policy.damage_multiplier
            }
        }
    }

    /// Suspension minutes after `prior_cycles` earlier suspensions
    pub fn suspension_minutes(&self, rank: u32, prior_cycles: u32, escalation: f64) -> u32 {
        let (_, policy) = self.resolve_level(rank);
        let factor = escalation.max(1.0).powi(prior_cycles.min(i32::MAX as u32) as i32);
        let minutes = (policy.ban_length as f64 * factor).round();
        if minutes >= u32::MAX as f64 {
            u32::MAX
        } else {
            minutes as u32
        }
    }

    pub fn levels(&self) -> impl Iterator<Item = (&u32, &LevelPolicy)> {
        self.table.iter()
    }
}
