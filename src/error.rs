//! Error taxonomy for the forgiveness and enforcement paths.
//!
//! None of these are fatal: each one is turned into a player-facing
//! message by the command surface and the session carries on.
//! Configuration problems are reported through `anyhow` at load time instead.

use crate::forgiveness::ForgiveCommand;
use crate::messages::MessageKey;
use crate::players::PlayerId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TkError {
    /// Target text did not resolve to exactly one connected player
    #[error("'{query}' does not match exactly one connected player ({} candidates)", candidates.len())]
    InvalidTarget {
        query: String,
        /// Display names of every partial match (empty when nothing matched)
        candidates: Vec<String>,
    },

    /// No outstanding, forgivable record for the target
    #[error("nothing to forgive")]
    NothingToForgive,

    /// The record is grudged while grudge mode is enabled
    #[error("{offender_name} is grudged at {points:.0} points")]
    GrudgeBlocked {
        offender: PlayerId,
        offender_name: String,
        points: f64,
    },

    /// A participant is no longer connected
    #[error("player {0} is not connected")]
    Disconnected(PlayerId),

    /// Issuer lacks the level required for the command
    #[error("!{command} requires level {required}")]
    Unauthorized {
        command: ForgiveCommand,
        required: u32,
    },
}

impl TkError {
    /// Template used to surface this error to the issuing player.
    ///
    /// Admin commands report an empty result as `no_punish`, victim
    /// commands as `no_forgive`.
    pub fn message_key(&self, command: ForgiveCommand) -> Option<MessageKey> {
        match self {
            TkError::InvalidTarget { candidates, .. } if candidates.len() > 1 => {
                Some(MessageKey::Players)
            }
            TkError::InvalidTarget { .. } | TkError::NothingToForgive => {
                if command.is_admin() {
                    Some(MessageKey::NoPunish)
                } else {
                    Some(MessageKey::NoForgive)
                }
            }
            TkError::GrudgeBlocked { .. } => Some(MessageKey::Grudged),
            TkError::Disconnected(_) | TkError::Unauthorized { .. } => None,
        }
    }
}
