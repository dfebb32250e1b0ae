//! Command names, aliases and authorization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::CommandLevels;
use crate::error::TkError;
use crate::players::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgiveCommand {
    /// Forgive one offender (the only one, or the named one)
    Forgive,
    ForgiveAll,
    /// Undo the latest addition
    ForgivePrev,
    ForgiveList,
    /// Read-only standing of a player
    ForgiveInfo,
    /// Admin wipe of a player's offences
    ForgiveClear,
    Grudge,
}

impl ForgiveCommand {
    pub const ALL: [ForgiveCommand; 7] = [
        ForgiveCommand::Forgive,
        ForgiveCommand::ForgiveAll,
        ForgiveCommand::ForgivePrev,
        ForgiveCommand::ForgiveList,
        ForgiveCommand::ForgiveInfo,
        ForgiveCommand::ForgiveClear,
        ForgiveCommand::Grudge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ForgiveCommand::Forgive => "forgive",
            ForgiveCommand::ForgiveAll => "forgiveall",
            ForgiveCommand::ForgivePrev => "forgiveprev",
            ForgiveCommand::ForgiveList => "forgivelist",
            ForgiveCommand::ForgiveInfo => "forgiveinfo",
            ForgiveCommand::ForgiveClear => "forgiveclear",
            ForgiveCommand::Grudge => "grudge",
        }
    }

    pub fn alias(&self) -> Option<&'static str> {
        match self {
            ForgiveCommand::Forgive => Some("f"),
            ForgiveCommand::ForgiveAll => Some("fa"),
            ForgiveCommand::ForgivePrev => Some("fp"),
            ForgiveCommand::ForgiveList => Some("fl"),
            ForgiveCommand::ForgiveInfo => Some("fi"),
            ForgiveCommand::ForgiveClear => Some("fc"),
            ForgiveCommand::Grudge => None,
        }
    }

    /// Issued about someone else rather than by the victim
    pub fn is_admin(&self) -> bool {
        matches!(self, ForgiveCommand::ForgiveInfo | ForgiveCommand::ForgiveClear)
    }

    /// Split `!name args` into a command and its argument text
    pub fn parse_line(line: &str) -> Option<(ForgiveCommand, &str)> {
        let line = line.trim();
        let rest = line.strip_prefix('!')?;
        let (word, args) = match rest.split_once(char::is_whitespace) {
            Some((word, args)) => (word, args.trim()),
            None => (rest, ""),
        };
        word.parse().ok().map(|command| (command, args))
    }
}

impl fmt::Display for ForgiveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ForgiveCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim().trim_start_matches('!').to_lowercase();
        ForgiveCommand::ALL
            .into_iter()
            .find(|c| c.name() == word || c.alias() == Some(word.as_str()))
            .ok_or_else(|| anyhow::anyhow!("Unknown command: {}", s))
    }
}

/// Hook into the host permission layer
pub trait CommandAuthorizer: Send + Sync {
    fn authorize(&self, issuer: &Player, command: ForgiveCommand) -> Result<(), TkError>;
}

/// Minimum player level per command
#[derive(Debug, Clone, Default)]
pub struct LevelAuthorizer {
    levels: CommandLevels,
}

impl LevelAuthorizer {
    pub fn new(levels: CommandLevels) -> Self {
        Self { levels }
    }

    pub fn required(&self, command: ForgiveCommand) -> u32 {
        match command {
            ForgiveCommand::Forgive => self.levels.forgive,
            ForgiveCommand::ForgiveAll => self.levels.forgive_all,
            ForgiveCommand::ForgivePrev => self.levels.forgive_prev,
            ForgiveCommand::ForgiveList => self.levels.forgive_list,
            ForgiveCommand::ForgiveInfo => self.levels.forgive_info,
            ForgiveCommand::ForgiveClear => self.levels.forgive_clear,
            ForgiveCommand::Grudge => self.levels.grudge,
        }
    }
}

impl CommandAuthorizer for LevelAuthorizer {
    fn authorize(&self, issuer: &Player, command: ForgiveCommand) -> Result<(), TkError> {
        let required = self.required(command);
        if issuer.level >= required {
            Ok(())
        } else {
            Err(TkError::Unauthorized { command, required })
        }
    }
}
