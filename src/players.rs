//! Player identity as seen by the engine.
//!
//! The session layer owns connections; the engine only holds snapshots and
//! asks a [`PlayerDirectory`] who is still connected when it needs to
//! resolve a command target or act on a deferred timer.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TkError;
use crate::messages::strip_colors;

/// Connection slot id, rendered as `$cid` in messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
    /// Free-for-all, nobody is a teammate
    Free,
    Spectator,
    Unknown,
}

impl Team {
    /// Whether damage between the two teams counts as friendly fire
    pub fn is_teammate(&self, other: Team) -> bool {
        *self == other && matches!(self, Team::Red | Team::Blue)
    }
}

impl FromStr for Team {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "red" => Ok(Team::Red),
            "blue" => Ok(Team::Blue),
            "free" => Ok(Team::Free),
            "spectator" | "spec" => Ok(Team::Spectator),
            "unknown" => Ok(Team::Unknown),
            other => Err(anyhow::anyhow!("Unknown team: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,
    /// Admin rank, also indexes the level multiplier tables
    pub level: u32,
}

impl Player {
    pub fn new(id: u32, name: &str, team: Team, level: u32) -> Self {
        Self {
            id: PlayerId(id),
            name: name.to_string(),
            team,
            level,
        }
    }

    /// Name with color codes removed, used for matching
    pub fn clean_name(&self) -> String {
        strip_colors(&self.name)
    }
}

/// Read access to the external session layer
pub trait PlayerDirectory: Send + Sync {
    fn get(&self, id: PlayerId) -> Option<Player>;

    fn connected(&self) -> Vec<Player>;
}

/// In-memory directory for the console driver and tests
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    players: DashMap<PlayerId, Player>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn disconnect(&self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id).map(|(_, player)| player)
    }

    pub fn set_team(&self, id: PlayerId, team: Team) -> bool {
        match self.players.get_mut(&id) {
            Some(mut player) => {
                player.team = team;
                true
            }
            None => false,
        }
    }
}

impl PlayerDirectory for MemoryDirectory {
    fn get(&self, id: PlayerId) -> Option<Player> {
        self.players.get(&id).map(|entry| entry.value().clone())
    }

    fn connected(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self
            .players
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        players.sort_by_key(|p| p.id);
        players
    }
}

/// Resolve free text to exactly one connected player.
///
/// Accepts `@<cid>` or a bare slot number, then an exact (case-insensitive,
/// colors stripped) name, then a unique partial name.
pub fn resolve_target(directory: &dyn PlayerDirectory, query: &str) -> Result<Player, TkError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(TkError::InvalidTarget {
            query: String::new(),
            candidates: Vec::new(),
        });
    }

    let connected = directory.connected();

    if let Ok(cid) = query.trim_start_matches('@').parse::<u32>() {
        if let Some(player) = connected.iter().find(|p| p.id == PlayerId(cid)) {
            return Ok(player.clone());
        }
    }

    let needle = query.to_lowercase();
    let exact: Vec<&Player> = connected
        .iter()
        .filter(|p| p.clean_name().to_lowercase() == needle)
        .collect();
    if exact.len() == 1 {
        return Ok(exact[0].clone());
    }

    let partial: Vec<&Player> = connected
        .iter()
        .filter(|p| p.clean_name().to_lowercase().contains(&needle))
        .collect();
    match partial.as_slice() {
        [only] => Ok((*only).clone()),
        many => Err(TkError::InvalidTarget {
            query: query.to_string(),
            candidates: many.iter().map(|p| p.clean_name()).collect(),
        }),
    }
}
