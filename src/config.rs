use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use tracing::{info, warn};

use crate::messages::MessageTemplates;
use crate::scoring::{EventKind, LevelPolicy, ScoringPolicy};

/// Upper bound for `round_grace` and `warn_duration` (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Full engine configuration; immutable once loaded, swapped whole on reload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Scoring and escalation settings
    pub settings: ScoreConfig,
    /// Player-facing message templates
    pub messages: MessageTemplates,
    /// Per-level tables keyed by level number
    pub level: BTreeMap<String, LevelPolicy>,
    /// Minimum player level per command
    pub commands: CommandLevels,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Pair points above which the pair becomes grudged
    pub max_points: f64,
    /// Ordered level thresholds; each needs a `[level.N]` table
    pub levels: Vec<u32>,
    /// Seconds after round start during which events are ignored
    pub round_grace: u64,
    /// Event kinds that may escalate to a warning
    pub issue_warning_on: Vec<EventKind>,
    /// Enable grudges (grudged records cannot be forgiven)
    pub grudge_enabled: bool,
    /// Send forgiveness confirmations privately instead of broadcasting
    pub private_messages: bool,
    /// Pair points at which a violation becomes reportable
    pub damage_threshold: f64,
    /// Warnings allowed before suspension
    pub warn_level: u32,
    /// Decay half-life in seconds (0 disables decay)
    pub half_life: u64,
    /// Seconds before the deferred auto-suspend / expiry timer fires
    pub warn_duration: u64,
    /// Cap on a single damage report before multipliers
    pub max_event_points: f64,
    /// Offenders at or above this level are never scored
    pub immune_level: Option<u32>,
    /// Ban length multiplier per previous suspension in the session
    pub suspension_escalation: f64,
    /// Remove a player's records when they disconnect
    pub purge_on_disconnect: bool,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            max_points: 400.0,
            levels: vec![0, 1, 2, 20, 40],
            round_grace: 7,
            issue_warning_on: vec![EventKind::Kill],
            grudge_enabled: true,
            private_messages: true,
            damage_threshold: 100.0,
            warn_level: 2,
            half_life: 0,
            warn_duration: 3600,
            max_event_points: 100.0,
            immune_level: None,
            suspension_escalation: 1.0,
            purge_on_disconnect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLevels {
    pub forgive: u32,
    pub forgive_all: u32,
    pub forgive_prev: u32,
    pub forgive_list: u32,
    pub grudge: u32,
    pub forgive_info: u32,
    pub forgive_clear: u32,
}

impl Default for CommandLevels {
    fn default() -> Self {
        Self {
            forgive: 0,
            forgive_all: 0,
            forgive_prev: 0,
            forgive_list: 0,
            grudge: 0,
            forgive_info: 20,
            forgive_clear: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Emit span open/close events
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_spans: false,
        }
    }
}

impl Default for WardenConfig {
    fn default() -> Self {
        let level = [
            (0, LevelPolicy::new(2.0, 1.0, 2)),
            (1, LevelPolicy::new(2.0, 1.0, 2)),
            (2, LevelPolicy::new(1.0, 0.5, 1)),
            (20, LevelPolicy::new(1.0, 0.5, 0)),
            (40, LevelPolicy::new(0.75, 0.5, 0)),
        ]
        .into_iter()
        .map(|(n, policy)| (n.to_string(), policy))
        .collect();

        Self {
            settings: ScoreConfig::default(),
            messages: MessageTemplates::default(),
            level,
            commands: CommandLevels::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WardenConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Invalid configuration document")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load from `TK_WARDEN_CONFIG` (or defaults), then apply environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("TK_WARDEN_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => {
                warn!("TK_WARDEN_CONFIG not set, using built-in defaults");
                Self::default()
            }
        };

        if let Ok(level) = env::var("TK_WARDEN_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(grace) = env::var("TK_WARDEN_ROUND_GRACE") {
            config.settings.round_grace = grace
                .parse()
                .context("Invalid TK_WARDEN_ROUND_GRACE value")?;
        }

        if let Ok(warn_level) = env::var("TK_WARDEN_WARN_LEVEL") {
            config.settings.warn_level = warn_level
                .parse()
                .context("Invalid TK_WARDEN_WARN_LEVEL value")?;
        }

        if let Ok(max_points) = env::var("TK_WARDEN_MAX_POINTS") {
            config.settings.max_points = max_points
                .parse()
                .context("Invalid TK_WARDEN_MAX_POINTS value")?;
        }

        if let Ok(half_life) = env::var("TK_WARDEN_HALF_LIFE") {
            config.settings.half_life = half_life
                .parse()
                .context("Invalid TK_WARDEN_HALF_LIFE value")?;
        }

        if let Ok(duration) = env::var("TK_WARDEN_WARN_DURATION") {
            config.settings.warn_duration = duration
                .parse()
                .context("Invalid TK_WARDEN_WARN_DURATION value")?;
        }

        if let Ok(grudge) = env::var("TK_WARDEN_GRUDGE_ENABLED") {
            config.settings.grudge_enabled = grudge
                .parse()
                .context("Invalid TK_WARDEN_GRUDGE_ENABLED value")?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate tables and thresholds. Any failure here is fatal at load.
    pub fn validate(&self) -> Result<()> {
        let s = &self.settings;

        if !s.max_points.is_finite() || s.max_points <= 0.0 {
            return Err(anyhow::anyhow!("max_points must be positive"));
        }

        if !s.damage_threshold.is_finite() || s.damage_threshold < 0.0 {
            return Err(anyhow::anyhow!("damage_threshold cannot be negative"));
        }

        if s.round_grace > MAX_WINDOW_SECS {
            return Err(anyhow::anyhow!(
                "round_grace must be at most {} seconds, got {}",
                MAX_WINDOW_SECS,
                s.round_grace
            ));
        }

        if s.warn_duration > MAX_WINDOW_SECS {
            return Err(anyhow::anyhow!(
                "warn_duration must be at most {} seconds, got {}",
                MAX_WINDOW_SECS,
                s.warn_duration
            ));
        }

        if !s.suspension_escalation.is_finite() || s.suspension_escalation < 1.0 {
            return Err(anyhow::anyhow!(
                "suspension_escalation must be at least 1.0, got {}",
                s.suspension_escalation
            ));
        }

        if s.levels.is_empty() {
            return Err(anyhow::anyhow!("At least one level must be configured"));
        }

        if s.levels.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(anyhow::anyhow!(
                "Level thresholds must be strictly increasing: {:?}",
                s.levels
            ));
        }

        for key in self.level.keys() {
            let parsed: u32 = key
                .parse()
                .with_context(|| format!("Level table key '{}' is not a number", key))?;
            if !s.levels.contains(&parsed) {
                return Err(anyhow::anyhow!(
                    "Level table {} is not listed in levels {:?}",
                    parsed,
                    s.levels
                ));
            }
        }

        // Multipliers and completeness are checked while building the policy
        self.scoring_policy()?;

        if s.issue_warning_on.is_empty() {
            warn!("issue_warning_on is empty, violations will never escalate");
        }

        self.messages.warn_unknown();

        Ok(())
    }

    /// Build the ordered level lookup
    pub fn scoring_policy(&self) -> Result<ScoringPolicy> {
        let mut table = BTreeMap::new();
        for level in &self.settings.levels {
            let policy = self
                .level
                .get(&level.to_string())
                .ok_or_else(|| anyhow::anyhow!("Missing table for level {}", level))?;
            table.insert(*level, *policy);
        }
        ScoringPolicy::new(table, self.settings.max_event_points)
    }
}
