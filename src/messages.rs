//! Message templates and variable substitution
//!
//! All player-facing text comes from templates keyed by [`MessageKey`] with
//! `$name`-style variables. Templates may carry `^0`..`^9` color codes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    Ban,
    Forgive,
    Grudged,
    ForgiveMany,
    ForgiveWarning,
    NoForgive,
    NoPunish,
    Players,
    ForgiveInfo,
    GrudgeInfo,
    ForgiveClear,
    TkWarningReason,
    ForgiveHint,
}

impl MessageKey {
    pub const ALL: [MessageKey; 13] = [
        MessageKey::Ban,
        MessageKey::Forgive,
        MessageKey::Grudged,
        MessageKey::ForgiveMany,
        MessageKey::ForgiveWarning,
        MessageKey::NoForgive,
        MessageKey::NoPunish,
        MessageKey::Players,
        MessageKey::ForgiveInfo,
        MessageKey::GrudgeInfo,
        MessageKey::ForgiveClear,
        MessageKey::TkWarningReason,
        MessageKey::ForgiveHint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::Ban => "ban",
            MessageKey::Forgive => "forgive",
            MessageKey::Grudged => "grudged",
            MessageKey::ForgiveMany => "forgive_many",
            MessageKey::ForgiveWarning => "forgive_warning",
            MessageKey::NoForgive => "no_forgive",
            MessageKey::NoPunish => "no_punish",
            MessageKey::Players => "players",
            MessageKey::ForgiveInfo => "forgive_info",
            MessageKey::GrudgeInfo => "grudge_info",
            MessageKey::ForgiveClear => "forgive_clear",
            MessageKey::TkWarningReason => "tk_warning_reason",
            MessageKey::ForgiveHint => "forgive_hint",
        }
    }

    /// Stock text shipped with the plugin
    pub fn default_template(&self) -> &'static str {
        match self {
            MessageKey::Ban => "^7team damage over limit",
            MessageKey::Forgive => "^7$vname^7 has forgiven $aname [^3$points^7]",
            MessageKey::Grudged => "^7$vname^7 has a ^1grudge ^7against $aname [^3$points^7]",
            MessageKey::ForgiveMany => "^7$vname^7 has forgiven $attackers",
            MessageKey::ForgiveWarning => {
                "^1ALERT^7: $name^7 auto-kick if not forgiven. Type ^3!forgive $cid ^7to forgive. [^3damage: $points^7]"
            }
            MessageKey::NoForgive => "^7no one to forgive",
            MessageKey::NoPunish => "^7no one to punish",
            MessageKey::Players => "^7Forgive who? %s",
            MessageKey::ForgiveInfo => "^7$name^7 has ^3$points^7 TK points",
            MessageKey::GrudgeInfo => "^7$name^7 is ^1grudged ^3$points^7 TK points",
            MessageKey::ForgiveClear => "^7$name^7 cleared of ^3$points^7 TK points",
            MessageKey::TkWarningReason => {
                "^3Do not attack teammates, ^1Attacked: ^7$vname ^7[^3$points^7]"
            }
            MessageKey::ForgiveHint => "^7type ^3!fp ^7 to forgive",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named variables for one rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars(BTreeMap<&'static str, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.0.insert(name, value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Configured templates; missing keys fall back to the stock text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTemplates {
    overrides: BTreeMap<String, String>,
}

impl MessageTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: MessageKey, template: &str) {
        self.overrides
            .insert(key.as_str().to_string(), template.to_string());
    }

    pub fn template(&self, key: MessageKey) -> &str {
        self.overrides
            .get(key.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| key.default_template())
    }

    pub fn render(&self, key: MessageKey, vars: &TemplateVars) -> String {
        render(self.template(key), vars)
    }

    /// Render the `players` list template; `%s` or `$players` receives the list
    pub fn render_list(&self, key: MessageKey, list: &str) -> String {
        let template = self.template(key);
        if template.contains("$players") {
            render(template, &TemplateVars::new().with("players", list))
        } else {
            template.replacen("%s", list, 1)
        }
    }

    /// Keys present in the configuration that no template uses
    pub fn unknown_keys(&self) -> Vec<String> {
        self.overrides
            .keys()
            .filter(|k| !MessageKey::ALL.iter().any(|m| m.as_str() == k.as_str()))
            .cloned()
            .collect()
    }

    pub(crate) fn warn_unknown(&self) {
        for key in self.unknown_keys() {
            warn!(key = %key, "Ignoring unknown message template");
        }
    }
}

/// Substitute `$ident` occurrences; unknown variables are left as written
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut ident = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                ident.push(next);
                chars.next();
            } else {
                break;
            }
        }

        match vars.get(&ident) {
            Some(value) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(&ident);
            }
        }
    }

    out
}

/// Remove `^N` color codes
pub fn strip_colors(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

/// Points as shown to players (whole numbers)
pub fn format_points(points: f64) -> String {
    let rounded = points.round() as i64;
    rounded.to_string()
}
