//! Outbound capabilities
//!
//! The engine decides *that* and *for how long*; enforcement and delivery
//! belong to the host. Calls are fire-and-forget and are made after the
//! engine lock is released.

use std::sync::RwLock;
use tracing::{info, warn};

use crate::messages::{MessageKey, MessageTemplates, TemplateVars, strip_colors};
use crate::players::Player;

pub trait Enforcement: Send + Sync {
    fn warn(&self, player: &Player, reason_key: MessageKey, vars: &TemplateVars);

    fn suspend(&self, player: &Player, duration_minutes: u32, reason_key: MessageKey);

    fn broadcast(&self, key: MessageKey, vars: &TemplateVars);
}

pub trait Messenger: Send + Sync {
    /// Private message to one player
    fn tell(&self, player: &Player, text: &str);

    /// Public message to everyone
    fn say(&self, text: &str);
}

/// Side effect collected under the lock, delivered after it
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Warn {
        player: Player,
        key: MessageKey,
        vars: TemplateVars,
    },
    Suspend {
        player: Player,
        minutes: u32,
        key: MessageKey,
    },
    Broadcast {
        key: MessageKey,
        vars: TemplateVars,
    },
    Tell {
        player: Player,
        text: String,
    },
    Say {
        text: String,
    },
}

impl Directive {
    pub fn deliver(&self, enforcement: &dyn Enforcement, messenger: &dyn Messenger) {
        match self {
            Directive::Warn { player, key, vars } => enforcement.warn(player, *key, vars),
            Directive::Suspend {
                player,
                minutes,
                key,
            } => enforcement.suspend(player, *minutes, *key),
            Directive::Broadcast { key, vars } => enforcement.broadcast(*key, vars),
            Directive::Tell { player, text } => messenger.tell(player, text),
            Directive::Say { text } => messenger.say(text),
        }
    }
}

/// Logs every action instead of touching a game server
#[derive(Debug, Default)]
pub struct TracingSink {
    templates: RwLock<MessageTemplates>,
}

impl TracingSink {
    pub fn new(templates: MessageTemplates) -> Self {
        Self {
            templates: RwLock::new(templates),
        }
    }

    /// Swap the templates after a configuration reload
    pub fn set_templates(&self, templates: MessageTemplates) {
        *self.templates.write().unwrap_or_else(|e| e.into_inner()) = templates;
    }

    fn render(&self, key: MessageKey, vars: &TemplateVars) -> String {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        strip_colors(&templates.render(key, vars))
    }
}

impl Enforcement for TracingSink {
    fn warn(&self, player: &Player, reason_key: MessageKey, vars: &TemplateVars) {
        let reason = self.render(reason_key, vars);
        warn!(player = %player.id, name = %player.name, reason = %reason, "WARN");
    }

    fn suspend(&self, player: &Player, duration_minutes: u32, reason_key: MessageKey) {
        let reason = self.render(reason_key, &TemplateVars::new());
        warn!(
            player = %player.id,
            name = %player.name,
            minutes = duration_minutes,
            reason = %reason,
            "TEMPBAN"
        );
    }

    fn broadcast(&self, key: MessageKey, vars: &TemplateVars) {
        info!(text = %self.render(key, vars), "BROADCAST");
    }
}

impl Messenger for TracingSink {
    fn tell(&self, player: &Player, text: &str) {
        info!(to = %player.name, text = %strip_colors(text), "TELL");
    }

    fn say(&self, text: &str) {
        info!(text = %strip_colors(text), "SAY");
    }
}
