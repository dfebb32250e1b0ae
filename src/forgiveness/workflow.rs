//! Forgiveness command execution and player-facing replies

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::WardenConfig;
use crate::enforcement::Directive;
use crate::error::TkError;
use crate::forgiveness::{CommandAuthorizer, ForgiveCommand, LevelAuthorizer};
use crate::ledger::{Forgiven, Ledger, PlayerInfo, PointsEntry};
use crate::messages::{MessageKey, MessageTemplates, TemplateVars, format_points};
use crate::players::{Player, PlayerId, resolve_target};
use crate::warden::{Warden, WardenState};

/// Result of a successful command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CommandOutcome {
    Forgiven(Vec<Forgiven>),
    /// Several candidates listed, nothing changed
    Listed(Vec<PointsEntry>),
    Info(PlayerInfo),
    Cleared { player: PlayerId, points: f64 },
    Grudged(Forgiven),
    /// Accepted but had no effect (grudges disabled)
    Unchanged,
}

/// `forgive_info` line plus the attacked / attacked-by breakdown
pub fn render_info(templates: &MessageTemplates, name: &str, info: &PlayerInfo) -> String {
    let key = if info.grudged {
        MessageKey::GrudgeInfo
    } else {
        MessageKey::ForgiveInfo
    };
    let mut text = templates.render(
        key,
        &TemplateVars::new()
            .with("name", name)
            .with("points", format_points(info.points)),
    );

    if !info.attacked.is_empty() {
        let attacked: Vec<String> = info
            .attacked
            .iter()
            .map(|e| format!("{} ({})", e.name, format_points(e.points)))
            .collect();
        text.push_str(", Attacked: ");
        text.push_str(&attacked.join(", "));
    }
    if !info.attacked_by.is_empty() {
        let attacked_by: Vec<String> = info
            .attacked_by
            .iter()
            .map(|e| format!("{} [{}]", e.name, format_points(e.points)))
            .collect();
        text.push_str(", Attacked By: ");
        text.push_str(&attacked_by.join(", "));
    }

    text
}

fn numbered_list(entries: &[PointsEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] {} [{}]", i + 1, e.name, format_points(e.points)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Warden {
    /// Parse and run a chat line. `None` if it is not a forgiveness command.
    pub async fn dispatch(
        &self,
        issuer: &Player,
        text: &str,
    ) -> Option<Result<CommandOutcome, TkError>> {
        let (command, args) = ForgiveCommand::parse_line(text)?;
        Some(self.handle_command(issuer, command, args).await)
    }

    /// Run one command on behalf of `issuer`. Failures are also reported
    /// to the issuer as a message where one applies.
    pub async fn handle_command(
        &self,
        issuer: &Player,
        command: ForgiveCommand,
        args: &str,
    ) -> Result<CommandOutcome, TkError> {
        let mut directives = Vec::new();
        let (result, config) = {
            let mut state = self.state.lock().await;
            state.settle(Utc::now());
            let config = Arc::clone(&state.config);
            let result = self.run_command(&mut state, issuer, command, args.trim(), &mut directives);
            (result, config)
        };

        match &result {
            Ok(_) => debug!(issuer = %issuer.id, command = %command, "Command completed"),
            Err(err) => self.report_error(&config, issuer, command, err, &mut directives),
        }

        self.deliver(directives);
        result
    }

    fn authorize(
        &self,
        config: &WardenConfig,
        issuer: &Player,
        command: ForgiveCommand,
    ) -> Result<(), TkError> {
        match &self.authorizer {
            Some(authorizer) => authorizer.authorize(issuer, command),
            None => LevelAuthorizer::new(config.commands.clone()).authorize(issuer, command),
        }
    }

    fn run_command(
        &self,
        state: &mut WardenState,
        issuer: &Player,
        command: ForgiveCommand,
        args: &str,
        out: &mut Vec<Directive>,
    ) -> Result<CommandOutcome, TkError> {
        let config = Arc::clone(&state.config);
        self.authorize(&config, issuer, command)?;
        if self.players.get(issuer.id).is_none() {
            return Err(TkError::Disconnected(issuer.id));
        }

        let grudge_enabled = config.settings.grudge_enabled;

        match command {
            ForgiveCommand::Forgive => {
                let offender = if args.is_empty() {
                    let outstanding = state.ledger.outstanding(issuer.id, grudge_enabled);
                    match outstanding.as_slice() {
                        [] => return Err(state.nothing_to_forgive(issuer.id)),
                        [only] => only.player,
                        _ => {
                            out.push(Directive::Tell {
                                player: issuer.clone(),
                                text: config
                                    .messages
                                    .render_list(MessageKey::Players, &numbered_list(&outstanding)),
                            });
                            return Ok(CommandOutcome::Listed(outstanding));
                        }
                    }
                } else {
                    self.resolve_known(&state.ledger, args)?.0
                };

                let forgiven = state.forgive_pair(issuer.id, offender)?;
                self.announce_forgiven(&config, issuer, std::slice::from_ref(&forgiven), out);
                Ok(CommandOutcome::Forgiven(vec![forgiven]))
            }

            ForgiveCommand::ForgiveAll => {
                let forgiven = state.ledger.forgive_all(issuer.id, grudge_enabled);
                if forgiven.is_empty() {
                    return Err(state.nothing_to_forgive(issuer.id));
                }
                for f in &forgiven {
                    state.after_forgiveness(f.offender, issuer.id);
                }

                info!(victim = %issuer.id, count = forgiven.len(), "Forgave all offenders");
                self.announce_forgiven(&config, issuer, &forgiven, out);
                Ok(CommandOutcome::Forgiven(forgiven))
            }

            ForgiveCommand::ForgivePrev => {
                let forgiven = match state.ledger.forgive_previous(issuer.id, grudge_enabled) {
                    Ok(forgiven) => forgiven,
                    Err(TkError::NothingToForgive) => {
                        return Err(state.nothing_to_forgive(issuer.id));
                    }
                    Err(err) => return Err(err),
                };
                state.after_forgiveness(forgiven.offender, issuer.id);

                info!(
                    victim = %issuer.id,
                    offender = %forgiven.offender,
                    points = forgiven.points,
                    "Forgave previous offender"
                );
                self.announce_forgiven(&config, issuer, std::slice::from_ref(&forgiven), out);
                Ok(CommandOutcome::Forgiven(vec![forgiven]))
            }

            ForgiveCommand::ForgiveList => {
                let outstanding = state.ledger.outstanding(issuer.id, grudge_enabled);
                if outstanding.is_empty() {
                    return Err(TkError::NothingToForgive);
                }
                out.push(Directive::Tell {
                    player: issuer.clone(),
                    text: config
                        .messages
                        .render_list(MessageKey::Players, &numbered_list(&outstanding)),
                });
                Ok(CommandOutcome::Listed(outstanding))
            }

            ForgiveCommand::ForgiveInfo => {
                let (target, name) = if args.is_empty() {
                    (issuer.id, issuer.name.clone())
                } else {
                    self.resolve_known(&state.ledger, args)?
                };
                let info = state.ledger.info(target);
                out.push(Directive::Tell {
                    player: issuer.clone(),
                    text: render_info(&config.messages, &name, &info),
                });
                Ok(CommandOutcome::Info(info))
            }

            ForgiveCommand::ForgiveClear => {
                let (target, name) = self.resolve_known(&state.ledger, args)?;
                if !state.ledger.has_outgoing(target) {
                    return Err(TkError::NothingToForgive);
                }
                let points = state.ledger.clear(target);
                state.reset_offender(target, false);

                info!(
                    admin = %issuer.id,
                    offender = %target,
                    points = points,
                    "Cleared offender's team damage"
                );
                out.push(Directive::Say {
                    text: config.messages.render(
                        MessageKey::ForgiveClear,
                        &TemplateVars::new()
                            .with("name", &name)
                            .with("points", format_points(points)),
                    ),
                });
                Ok(CommandOutcome::Cleared {
                    player: target,
                    points,
                })
            }

            ForgiveCommand::Grudge => {
                if !grudge_enabled {
                    debug!(victim = %issuer.id, "Grudges disabled, ignoring");
                    return Ok(CommandOutcome::Unchanged);
                }
                let offender = if args.is_empty() {
                    state
                        .ledger
                        .latest_outstanding(issuer.id, grudge_enabled)
                        .map(|e| e.player)
                        .ok_or(TkError::NothingToForgive)?
                } else {
                    self.resolve_known(&state.ledger, args)?.0
                };

                let grudge = state.ledger.set_grudge(issuer.id, offender)?;
                info!(victim = %issuer.id, offender = %offender, "Grudge set");

                let text = config.messages.render(
                    MessageKey::Grudged,
                    &TemplateVars::new()
                        .with("vname", &issuer.name)
                        .with("aname", &grudge.offender_name)
                        .with("points", format_points(grudge.points)),
                );
                self.notify(&config, issuer, &[grudge.offender], text, out);
                Ok(CommandOutcome::Grudged(grudge))
            }
        }
    }

    /// Connected players first, then names cached in the ledger for
    /// players who left with their records retained
    fn resolve_known(&self, ledger: &Ledger, query: &str) -> Result<(PlayerId, String), TkError> {
        match resolve_target(self.players.as_ref(), query) {
            Ok(player) => Ok((player.id, player.name)),
            Err(TkError::InvalidTarget { query, candidates }) if candidates.is_empty() => ledger
                .known_player(&query)
                .ok_or(TkError::InvalidTarget { query, candidates }),
            Err(err) => Err(err),
        }
    }

    fn announce_forgiven(
        &self,
        config: &WardenConfig,
        victim: &Player,
        forgiven: &[Forgiven],
        out: &mut Vec<Directive>,
    ) {
        let text = match forgiven {
            [one] => config.messages.render(
                MessageKey::Forgive,
                &TemplateVars::new()
                    .with("vname", &victim.name)
                    .with("aname", &one.offender_name)
                    .with("points", format_points(one.points)),
            ),
            many => {
                let names: Vec<&str> = many.iter().map(|f| f.offender_name.as_str()).collect();
                config.messages.render(
                    MessageKey::ForgiveMany,
                    &TemplateVars::new()
                        .with("vname", &victim.name)
                        .with("attackers", names.join(", ")),
                )
            }
        };

        let offenders: Vec<PlayerId> = forgiven.iter().map(|f| f.offender).collect();
        self.notify(config, victim, &offenders, text, out);
    }

    /// Private to the victim and any connected offenders, or public
    fn notify(
        &self,
        config: &WardenConfig,
        victim: &Player,
        offenders: &[PlayerId],
        text: String,
        out: &mut Vec<Directive>,
    ) {
        if !config.settings.private_messages {
            out.push(Directive::Say { text });
            return;
        }

        for offender in offenders.iter().filter_map(|id| self.players.get(*id)) {
            out.push(Directive::Tell {
                player: offender,
                text: text.clone(),
            });
        }
        out.push(Directive::Tell {
            player: victim.clone(),
            text,
        });
    }

    fn report_error(
        &self,
        config: &WardenConfig,
        issuer: &Player,
        command: ForgiveCommand,
        err: &TkError,
        out: &mut Vec<Directive>,
    ) {
        let Some(key) = err.message_key(command) else {
            warn!(issuer = %issuer.id, command = %command, error = %err, "Command rejected");
            return;
        };

        let text = match err {
            TkError::InvalidTarget { candidates, .. } if key == MessageKey::Players => {
                config.messages.render_list(key, &candidates.join(", "))
            }
            TkError::GrudgeBlocked {
                offender_name,
                points,
                ..
            } => config.messages.render(
                key,
                &TemplateVars::new()
                    .with("vname", &issuer.name)
                    .with("aname", offender_name)
                    .with("points", format_points(*points)),
            ),
            _ => config.messages.render(key, &TemplateVars::new()),
        };

        debug!(issuer = %issuer.id, command = %command, error = %err, "Command failed");
        out.push(Directive::Tell {
            player: issuer.clone(),
            text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::PlayerId;

    fn entry(id: u32, name: &str, points: f64) -> PointsEntry {
        PointsEntry {
            player: PlayerId(id),
            name: name.to_string(),
            points,
            grudged: false,
        }
    }

    #[test]
    fn test_numbered_list() {
        let list = numbered_list(&[entry(1, "Mike", 14.2), entry(2, "Bill", 84.0)]);
        assert_eq!(list, "[1] Mike [14], [2] Bill [84]");
    }

    #[test]
    fn test_render_info_breakdown() {
        let info = PlayerInfo {
            player: PlayerId(0),
            points: 206.0,
            grudged: false,
            attacked: vec![entry(1, "Mike", 200.0), entry(2, "Bill", 6.0)],
            attacked_by: vec![entry(1, "Mike", 27.0)],
        };
        let text = crate::messages::strip_colors(&render_info(&MessageTemplates::new(), "Joe", &info));
        assert_eq!(
            text,
            "Joe has 206 TK points, Attacked: Mike (200), Bill (6), Attacked By: Mike [27]"
        );
    }

    #[test]
    fn test_render_info_empty() {
        let info = PlayerInfo {
            player: PlayerId(0),
            points: 0.0,
            grudged: false,
            attacked: Vec::new(),
            attacked_by: Vec::new(),
        };
        let text = crate::messages::strip_colors(&render_info(&MessageTemplates::new(), "Joe", &info));
        assert_eq!(text, "Joe has 0 TK points");
    }
}
