//! Violation Ledger
//!
//! Records live in an insertion-ordered map keyed by (offender, victim).
//! Removal is always an explicit step after zeroing.

use chrono::{DateTime, Utc};
use hashlink::LinkedHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScoreConfig;
use crate::error::TkError;
use crate::ledger::record::{PairKey, ViolationRecord};
use crate::messages::strip_colors;
use crate::players::{Player, PlayerId};

/// Result of adding points to a pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordUpdate {
    /// Accumulated points for the pair after the event
    pub pair_points: f64,
    pub created: bool,
    /// Grudge flag was set by this event
    pub became_grudged: bool,
}

/// One line of a breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsEntry {
    pub player: PlayerId,
    pub name: String,
    pub points: f64,
    pub grudged: bool,
}

/// A record removed by forgiveness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forgiven {
    pub offender: PlayerId,
    pub offender_name: String,
    pub points: f64,
}

/// Both directions of a player's standing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player: PlayerId,
    /// Total points as offender
    pub points: f64,
    /// Any outgoing record is grudged
    pub grudged: bool,
    /// Victims of this player, insertion order
    pub attacked: Vec<PointsEntry>,
    /// Offenders against this player, insertion order
    pub attacked_by: Vec<PointsEntry>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    records: LinkedHashMap<PairKey, ViolationRecord>,
    /// Bumped on every recorded event
    sequence: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, offender: PlayerId, victim: PlayerId) -> Option<&ViolationRecord> {
        self.records.get(&PairKey::new(offender, victim))
    }

    /// Add points for a same-team event. Grace and team checks happen upstream.
    pub fn record(
        &mut self,
        offender: &Player,
        victim: &Player,
        points: f64,
        now: DateTime<Utc>,
        settings: &ScoreConfig,
    ) -> RecordUpdate {
        let key = PairKey::new(offender.id, victim.id);
        let created = !self.records.contains_key(&key);
        if created {
            self.records
                .insert(key, ViolationRecord::new(offender, victim, now));
        }

        self.sequence += 1;
        let mut became_grudged = false;
        let mut pair_points = 0.0;
        if let Some(record) = self.records.get_mut(&key) {
            record.decay(now, settings.half_life);
            record.add(points, now);
            record.sequence = self.sequence;
            record.offender_name = offender.name.clone();
            record.victim_name = victim.name.clone();

            if settings.grudge_enabled && !record.grudged && record.points > settings.max_points {
                record.grudged = true;
                became_grudged = true;
            }
            pair_points = record.points;
        }

        debug!(
            offender = %offender.id,
            victim = %victim.id,
            points = points,
            pair_points = pair_points,
            created = created,
            "Recorded team damage"
        );

        RecordUpdate {
            pair_points,
            created,
            became_grudged,
        }
    }

    /// Decay one pair to `now`, dropping it if nothing is left
    pub fn decay(
        &mut self,
        offender: PlayerId,
        victim: PlayerId,
        now: DateTime<Utc>,
        half_life_secs: u64,
    ) -> Option<f64> {
        let key = PairKey::new(offender, victim);
        let record = self.records.get_mut(&key)?;
        record.decay(now, half_life_secs);
        if record.is_spent() {
            self.records.remove(&key);
            return None;
        }
        Some(record.points)
    }

    /// Lazily decay every record before a read or mutation
    pub fn settle(&mut self, now: DateTime<Utc>, half_life_secs: u64) {
        if half_life_secs == 0 {
            return;
        }
        let keys: Vec<PairKey> = self.records.keys().copied().collect();
        for key in keys {
            self.decay(key.offender, key.victim, now, half_life_secs);
        }
    }

    /// Zero and remove one pair unless a grudge blocks it
    pub fn forgive(
        &mut self,
        victim: PlayerId,
        offender: PlayerId,
        grudge_enabled: bool,
    ) -> Result<Forgiven, TkError> {
        let key = PairKey::new(offender, victim);
        let record = self
            .records
            .get(&key)
            .filter(|r| !r.is_spent())
            .ok_or(TkError::NothingToForgive)?;

        if record.blocks_forgiveness(grudge_enabled) {
            return Err(TkError::GrudgeBlocked {
                offender,
                offender_name: record.offender_name.clone(),
                points: record.points,
            });
        }

        let removed = self
            .records
            .remove(&key)
            .ok_or(TkError::NothingToForgive)?;

        Ok(Forgiven {
            offender,
            offender_name: removed.offender_name,
            points: removed.points,
        })
    }

    /// Forgive every forgivable record held by `victim`
    pub fn forgive_all(&mut self, victim: PlayerId, grudge_enabled: bool) -> Vec<Forgiven> {
        self.outstanding(victim, grudge_enabled)
            .into_iter()
            .filter_map(|entry| self.forgive(victim, entry.player, grudge_enabled).ok())
            .collect()
    }

    /// Forgive the victim's most recent attacker
    pub fn forgive_previous(
        &mut self,
        victim: PlayerId,
        grudge_enabled: bool,
    ) -> Result<Forgiven, TkError> {
        let latest = self
            .latest_outstanding(victim, grudge_enabled)
            .ok_or(TkError::NothingToForgive)?;
        self.forgive(victim, latest.player, grudge_enabled)
    }

    /// Administrative wipe of everything `offender` owes, grudges included.
    /// Returns the points cleared.
    pub fn clear(&mut self, offender: PlayerId) -> f64 {
        let keys: Vec<PairKey> = self
            .records
            .keys()
            .filter(|k| k.offender == offender)
            .copied()
            .collect();

        keys.into_iter()
            .filter_map(|k| self.records.remove(&k))
            .map(|r| r.points)
            .sum()
    }

    /// Drop every record involving the player in either role
    pub fn purge_player(&mut self, player: PlayerId) -> usize {
        let keys: Vec<PairKey> = self
            .records
            .keys()
            .filter(|k| k.involves(player))
            .copied()
            .collect();
        for key in &keys {
            self.records.remove(key);
        }
        keys.len()
    }

    /// Mark a pair grudged. Returns the pair's points.
    pub fn set_grudge(&mut self, victim: PlayerId, offender: PlayerId) -> Result<Forgiven, TkError> {
        let record = self
            .records
            .get_mut(&PairKey::new(offender, victim))
            .filter(|r| !r.is_spent())
            .ok_or(TkError::NothingToForgive)?;
        record.grudged = true;
        Ok(Forgiven {
            offender,
            offender_name: record.offender_name.clone(),
            points: record.points,
        })
    }

    /// Forgivable offenders against `victim`, insertion order
    pub fn outstanding(&self, victim: PlayerId, grudge_enabled: bool) -> Vec<PointsEntry> {
        self.records
            .iter()
            .filter(|(k, r)| {
                k.victim == victim && !r.is_spent() && !r.blocks_forgiveness(grudge_enabled)
            })
            .map(|(k, r)| PointsEntry {
                player: k.offender,
                name: r.offender_name.clone(),
                points: r.points,
                grudged: r.grudged,
            })
            .collect()
    }

    /// Forgivable record whose offender hit `victim` last
    pub fn latest_outstanding(&self, victim: PlayerId, grudge_enabled: bool) -> Option<PointsEntry> {
        self.records
            .iter()
            .filter(|(k, r)| {
                k.victim == victim && !r.is_spent() && !r.blocks_forgiveness(grudge_enabled)
            })
            .max_by_key(|(_, r)| r.sequence)
            .map(|(k, r)| PointsEntry {
                player: k.offender,
                name: r.offender_name.clone(),
                points: r.points,
                grudged: r.grudged,
            })
    }

    /// Most recently created grudged record against `victim`, if any
    pub fn latest_grudge(&self, victim: PlayerId) -> Option<Forgiven> {
        self.records
            .iter()
            .rev()
            .find(|(k, r)| k.victim == victim && r.grudged)
            .map(|(k, r)| Forgiven {
                offender: k.offender,
                offender_name: r.offender_name.clone(),
                points: r.points,
            })
    }

    pub fn offender_total(&self, offender: PlayerId) -> f64 {
        self.records
            .iter()
            .filter(|(k, _)| k.offender == offender)
            .map(|(_, r)| r.points)
            .sum()
    }

    pub fn has_outgoing(&self, offender: PlayerId) -> bool {
        self.records
            .iter()
            .any(|(k, r)| k.offender == offender && !r.is_spent())
    }

    /// Find a player by `@cid`, slot number or name among the names cached
    /// in the ledger. Used for targets that are no longer connected.
    pub fn known_player(&self, query: &str) -> Option<(PlayerId, String)> {
        let mut known: Vec<(PlayerId, String)> = Vec::new();
        for (key, record) in self.records.iter() {
            for (id, name) in [
                (key.offender, &record.offender_name),
                (key.victim, &record.victim_name),
            ] {
                if !known.iter().any(|(k, _)| *k == id) {
                    known.push((id, name.clone()));
                }
            }
        }

        let query = query.trim();
        if let Ok(cid) = query.trim_start_matches('@').parse::<u32>() {
            if let Some(found) = known.iter().find(|(id, _)| *id == PlayerId(cid)) {
                return Some(found.clone());
            }
        }

        let needle = query.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let clean = |name: &str| strip_colors(name).to_lowercase();

        let exact: Vec<&(PlayerId, String)> =
            known.iter().filter(|(_, n)| clean(n.as_str()) == needle).collect();
        if let [only] = exact.as_slice() {
            return Some((*only).clone());
        }

        let partial: Vec<&(PlayerId, String)> =
            known.iter().filter(|(_, n)| clean(n.as_str()).contains(&needle)).collect();
        match partial.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        }
    }

    /// Points owed and suffered, with per-counterpart breakdown
    pub fn info(&self, player: PlayerId) -> PlayerInfo {
        let mut attacked = Vec::new();
        let mut attacked_by = Vec::new();

        for (key, record) in self.records.iter() {
            if key.offender == player {
                attacked.push(PointsEntry {
                    player: key.victim,
                    name: record.victim_name.clone(),
                    points: record.points,
                    grudged: record.grudged,
                });
            } else if key.victim == player {
                attacked_by.push(PointsEntry {
                    player: key.offender,
                    name: record.offender_name.clone(),
                    points: record.points,
                    grudged: record.grudged,
                });
            }
        }

        PlayerInfo {
            player,
            points: attacked.iter().map(|e| e.points).sum(),
            grudged: attacked.iter().any(|e| e.grudged),
            attacked,
            attacked_by,
        }
    }
}
