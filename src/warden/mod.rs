//! Warden - Main Orchestrator
//!
//! Owns the ledger and offender states behind one lock, feeds game events
//! through scoring, ledger and escalation, and arms the deferred timers.
//! Enforcement and messaging side effects are collected while the lock is
//! held and delivered after it is released.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::WardenConfig;
use crate::enforcement::{Directive, Enforcement, Messenger};
use crate::error::TkError;
use crate::escalation::{
    EscalationState, OffenderState, PendingTimer, TimerToken, TimerVerdict, Transition,
};
use crate::forgiveness::CommandAuthorizer;
use crate::ledger::{Forgiven, Ledger, PlayerInfo, PointsEntry};
use crate::messages::{MessageKey, TemplateVars, format_points};
use crate::players::{Player, PlayerDirectory, PlayerId};
use crate::round::RoundClock;
use crate::scoring::{EventKind, KILL_BASE_POINTS, ScoringPolicy};

/// Why an event left no trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    SelfInflicted,
    CrossTeam,
    RoundGrace,
    Immune,
    NoPoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventOutcome {
    Ignored(IgnoreReason),
    /// Points added, no escalation
    Recorded { points: f64, pair_points: f64 },
    Warned {
        points: f64,
        pair_points: f64,
        count: u32,
        alert: bool,
    },
    Suspended { minutes: u32 },
}

/// Snapshot of one offender's escalation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffenderStatus {
    pub player: PlayerId,
    pub state: EscalationState,
    pub warnings: u32,
    pub timer_pending: bool,
    pub suspensions: u32,
    pub points: f64,
}

/// Everything guarded by the engine lock
pub(crate) struct WardenState {
    pub(crate) config: Arc<WardenConfig>,
    pub(crate) policy: ScoringPolicy,
    pub(crate) ledger: Ledger,
    pub(crate) offenders: HashMap<PlayerId, OffenderState>,
    next_token: u64,
}

impl WardenState {
    fn new(config: Arc<WardenConfig>, policy: ScoringPolicy) -> Self {
        Self {
            config,
            policy,
            ledger: Ledger::new(),
            offenders: HashMap::new(),
            next_token: 0,
        }
    }

    fn next_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }

    pub(crate) fn settle(&mut self, now: DateTime<Utc>) {
        let half_life = self.config.settings.half_life;
        self.ledger.settle(now, half_life);
    }

    /// Forgive one pair and unwind the warnings it caused
    pub(crate) fn forgive_pair(
        &mut self,
        victim: PlayerId,
        offender: PlayerId,
    ) -> Result<Forgiven, TkError> {
        let forgiven = self
            .ledger
            .forgive(victim, offender, self.config.settings.grudge_enabled)?;
        self.after_forgiveness(offender, victim);

        info!(
            victim = %victim,
            offender = %offender,
            points = forgiven.points,
            "Forgave team damage"
        );

        Ok(forgiven)
    }

    pub(crate) fn after_forgiveness(&mut self, offender: PlayerId, victim: PlayerId) {
        let still_owes = self.ledger.has_outgoing(offender);
        if let Some(state) = self.offenders.get_mut(&offender) {
            if let Some(timer) = state.on_forgiven(victim, still_owes) {
                info!(offender = %offender, "Cancelled pending auto-suspend");
                timer.cancel();
            }
        }
        self.prune(offender);
    }

    /// Drop an offender entry that carries no warnings, timer or history
    pub(crate) fn prune(&mut self, offender: PlayerId) {
        if self.offenders.get(&offender).is_some_and(OffenderState::is_idle) {
            self.offenders.remove(&offender);
            debug!(offender = %offender, "Dropped idle offender state");
        }
    }

    /// Error for a victim with nothing forgivable: grudge if one blocks it
    pub(crate) fn nothing_to_forgive(&self, victim: PlayerId) -> TkError {
        if self.config.settings.grudge_enabled {
            if let Some(grudge) = self.ledger.latest_grudge(victim) {
                return TkError::GrudgeBlocked {
                    offender: grudge.offender,
                    offender_name: grudge.offender_name,
                    points: grudge.points,
                };
            }
        }
        TkError::NothingToForgive
    }

    /// Return an offender to clean, cancelling any timer
    pub(crate) fn reset_offender(&mut self, offender: PlayerId, counted: bool) {
        if let Some(state) = self.offenders.get_mut(&offender) {
            if let Some(timer) = state.reset(counted) {
                timer.cancel();
            }
        }
        self.prune(offender);
    }

    /// Enforce a suspension synchronously and clear the offender's slate
    fn suspend(
        &mut self,
        offender: &Player,
        prior_cycles: u32,
        out: &mut Vec<Directive>,
    ) -> EventOutcome {
        let minutes = self.policy.suspension_minutes(
            offender.level,
            prior_cycles,
            self.config.settings.suspension_escalation,
        );
        let cleared = self.ledger.clear(offender.id);
        self.offenders.entry(offender.id).or_default();
        self.reset_offender(offender.id, true);

        warn!(
            offender = %offender.id,
            name = %offender.name,
            minutes = minutes,
            cleared_points = cleared,
            prior_cycles = prior_cycles,
            "Suspending offender for team damage"
        );

        out.push(Directive::Suspend {
            player: offender.clone(),
            minutes,
            key: MessageKey::Ban,
        });

        EventOutcome::Suspended { minutes }
    }
}

/// Entry point for events, commands and introspection. Cheap to clone.
#[derive(Clone)]
pub struct Warden {
    pub(crate) state: Arc<Mutex<WardenState>>,
    round: Arc<RoundClock>,
    pub(crate) players: Arc<dyn PlayerDirectory>,
    enforcement: Arc<dyn Enforcement>,
    messenger: Arc<dyn Messenger>,
    pub(crate) authorizer: Option<Arc<dyn CommandAuthorizer>>,
}

impl Warden {
    pub fn new(
        config: WardenConfig,
        players: Arc<dyn PlayerDirectory>,
        enforcement: Arc<dyn Enforcement>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self> {
        config.validate()?;
        let policy = config.scoring_policy()?;

        info!(
            warn_level = config.settings.warn_level,
            max_points = config.settings.max_points,
            damage_threshold = config.settings.damage_threshold,
            round_grace = config.settings.round_grace,
            "Team-kill warden initialized"
        );

        Ok(Self {
            state: Arc::new(Mutex::new(WardenState::new(Arc::new(config), policy))),
            round: Arc::new(RoundClock::new()),
            players,
            enforcement,
            messenger,
            authorizer: None,
        })
    }

    /// Replace the level-based default with the host permission layer
    pub fn with_authorizer(mut self, authorizer: Arc<dyn CommandAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn round_clock(&self) -> &RoundClock {
        &self.round
    }

    /// Current configuration snapshot
    pub async fn config(&self) -> Arc<WardenConfig> {
        Arc::clone(&self.state.lock().await.config)
    }

    /// Validate and swap the whole configuration. On error the old one stays.
    pub async fn reload(&self, config: WardenConfig) -> Result<()> {
        config.validate()?;
        let policy = config.scoring_policy()?;

        let mut state = self.state.lock().await;
        state.config = Arc::new(config);
        state.policy = policy;

        info!(
            warn_level = state.config.settings.warn_level,
            levels = ?state.config.settings.levels,
            "Configuration reloaded"
        );
        Ok(())
    }

    pub async fn on_damage(
        &self,
        attacker: &Player,
        victim: &Player,
        amount: f64,
        at: DateTime<Utc>,
    ) -> EventOutcome {
        self.handle_event(EventKind::Damage, attacker, victim, amount, at)
            .await
    }

    pub async fn on_kill(&self, attacker: &Player, victim: &Player, at: DateTime<Utc>) -> EventOutcome {
        self.handle_event(EventKind::Kill, attacker, victim, KILL_BASE_POINTS, at)
            .await
    }

    pub fn on_round_start(&self, at: DateTime<Utc>) {
        self.round.reset(at);
        info!(at = %at, "Round started");
    }

    /// Cancel the player's timer and forget them as an offender.
    /// Returns how many ledger records were purged.
    pub async fn on_disconnect(&self, player: PlayerId) -> usize {
        let mut state = self.state.lock().await;

        if let Some(mut offender) = state.offenders.remove(&player) {
            if let Some(timer) = offender.disarm() {
                timer.cancel();
            }
        }

        let purged = if state.config.settings.purge_on_disconnect {
            state.ledger.purge_player(player)
        } else {
            0
        };

        info!(player = %player, purged = purged, "Player disconnected");
        purged
    }

    async fn handle_event(
        &self,
        kind: EventKind,
        attacker: &Player,
        victim: &Player,
        amount: f64,
        at: DateTime<Utc>,
    ) -> EventOutcome {
        if attacker.id == victim.id {
            return EventOutcome::Ignored(IgnoreReason::SelfInflicted);
        }
        if !attacker.team.is_teammate(victim.team) {
            debug!(attacker = %attacker.id, victim = %victim.id, "Not a team event");
            return EventOutcome::Ignored(IgnoreReason::CrossTeam);
        }

        let mut directives = Vec::new();
        let outcome = {
            let mut state = self.state.lock().await;
            self.record_event(&mut state, kind, attacker, victim, amount, at, &mut directives)
        };

        self.deliver(directives);
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn record_event(
        &self,
        state: &mut WardenState,
        kind: EventKind,
        attacker: &Player,
        victim: &Player,
        amount: f64,
        at: DateTime<Utc>,
        out: &mut Vec<Directive>,
    ) -> EventOutcome {
        let config = Arc::clone(&state.config);
        let settings = &config.settings;

        if self.round.in_grace(at, settings.round_grace) {
            debug!(attacker = %attacker.id, victim = %victim.id, "Team damage in round grace");
            return EventOutcome::Ignored(IgnoreReason::RoundGrace);
        }

        if settings.immune_level.is_some_and(|level| attacker.level >= level) {
            return EventOutcome::Ignored(IgnoreReason::Immune);
        }

        let points = state.policy.score(kind, amount, attacker.level);
        if points <= 0.0 {
            return EventOutcome::Ignored(IgnoreReason::NoPoints);
        }

        state.settle(at);
        let update = state.ledger.record(attacker, victim, points, at, settings);

        if update.became_grudged {
            info!(
                offender = %attacker.id,
                victim = %victim.id,
                points = update.pair_points,
                "Pair exceeded max points, grudge set"
            );
        }

        let reportable = settings.issue_warning_on.contains(&kind)
            && update.pair_points >= settings.damage_threshold;
        if !reportable {
            return EventOutcome::Recorded {
                points,
                pair_points: update.pair_points,
            };
        }

        self.escalate(state, attacker, victim, points, update.pair_points, out)
    }

    fn escalate(
        &self,
        state: &mut WardenState,
        offender: &Player,
        victim: &Player,
        points: f64,
        pair_points: f64,
        out: &mut Vec<Directive>,
    ) -> EventOutcome {
        let config = Arc::clone(&state.config);
        let settings = &config.settings;

        let transition = state
            .offenders
            .entry(offender.id)
            .or_default()
            .on_violation(victim.id, settings.warn_level);

        let (count, alert, arm_timer) = match transition {
            Transition::Suspend { prior_cycles } => {
                return state.suspend(offender, prior_cycles, out);
            }
            Transition::Warn {
                count,
                alert,
                arm_timer,
            } => (count, alert, arm_timer),
        };

        info!(
            offender = %offender.id,
            victim = %victim.id,
            pair_points = pair_points,
            warnings = count,
            "Warning offender for team damage"
        );

        out.push(Directive::Warn {
            player: offender.clone(),
            key: MessageKey::TkWarningReason,
            vars: TemplateVars::new()
                .with("vname", &victim.name)
                .with("aname", &offender.name)
                .with("points", format_points(pair_points)),
        });
        out.push(Directive::Tell {
            player: victim.clone(),
            text: config.messages.render(
                MessageKey::ForgiveHint,
                &TemplateVars::new()
                    .with("aname", &offender.name)
                    .with("cid", offender.id),
            ),
        });

        if alert {
            let total = state.ledger.offender_total(offender.id);
            out.push(Directive::Broadcast {
                key: MessageKey::ForgiveWarning,
                vars: TemplateVars::new()
                    .with("name", &offender.name)
                    .with("cid", offender.id)
                    .with("points", format_points(total)),
            });
        }

        if arm_timer {
            let token = state.next_token();
            let warden = self.clone();
            let offender_id = offender.id;
            let timer = PendingTimer::spawn(
                token,
                Duration::from_secs(settings.warn_duration),
                async move { warden.fire_timer(offender_id, token).await },
            );
            if let Some(entry) = state.offenders.get_mut(&offender.id) {
                entry.arm(timer);
            }
        }

        EventOutcome::Warned {
            points,
            pair_points,
            count,
            alert,
        }
    }

    /// Deferred timer callback. Only acts if its token is still current.
    async fn fire_timer(&self, offender: PlayerId, token: TimerToken) {
        let mut directives = Vec::new();
        {
            let mut state = self.state.lock().await;
            state.settle(Utc::now());

            let warn_level = state.config.settings.warn_level;
            let still_owes = state.ledger.has_outgoing(offender);
            let verdict = match state.offenders.get_mut(&offender) {
                Some(entry) => entry.on_timer_fired(token, warn_level, still_owes),
                None => TimerVerdict::Stale,
            };

            match verdict {
                TimerVerdict::Stale => {
                    debug!(offender = %offender, token = token.0, "Ignoring stale timer");
                }
                TimerVerdict::Expire => {
                    info!(offender = %offender, "Warnings expired");
                    state.prune(offender);
                }
                TimerVerdict::Suspend { prior_cycles } => match self.players.get(offender) {
                    Some(player) => {
                        info!(offender = %offender, "Not forgiven in time, auto-suspending");
                        state.suspend(&player, prior_cycles, &mut directives);
                    }
                    None => {
                        warn!(error = %TkError::Disconnected(offender), "Skipping auto-suspend");
                    }
                },
            }
        }

        self.deliver(directives);
    }

    pub(crate) fn deliver(&self, directives: Vec<Directive>) {
        for directive in &directives {
            directive.deliver(self.enforcement.as_ref(), self.messenger.as_ref());
        }
    }

    /// Standing of a player in both directions
    pub async fn info(&self, player: PlayerId) -> PlayerInfo {
        let mut state = self.state.lock().await;
        state.settle(Utc::now());
        state.ledger.info(player)
    }

    /// Forgivable offenders against `victim`, insertion order
    pub async fn forgive_list(&self, victim: PlayerId) -> Vec<PointsEntry> {
        let mut state = self.state.lock().await;
        state.settle(Utc::now());
        let grudge_enabled = state.config.settings.grudge_enabled;
        state.ledger.outstanding(victim, grudge_enabled)
    }

    /// Offenders with live escalation state or a suspension history
    pub async fn tracked_offenders(&self) -> usize {
        self.state.lock().await.offenders.len()
    }

    pub async fn offender_status(&self, player: PlayerId) -> OffenderStatus {
        let mut state = self.state.lock().await;
        state.settle(Utc::now());
        let points = state.ledger.offender_total(player);

        match state.offenders.get(&player) {
            Some(entry) => OffenderStatus {
                player,
                state: entry.state(),
                warnings: entry.warning_count(),
                timer_pending: entry.has_pending_timer(),
                suspensions: entry.suspensions(),
                points,
            },
            None => OffenderStatus {
                player,
                state: EscalationState::Clean,
                warnings: 0,
                timer_pending: false,
                suspensions: 0,
                points,
            },
        }
    }
}
