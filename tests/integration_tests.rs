//! Integration tests for the team-kill warden
//!
//! These tests drive the engine end to end through its public API:
//! scoring, accumulation, warnings, alerts, suspension, the forgiveness
//! commands, deferred timers, round grace, disconnects and reload.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tk_warden::messages::strip_colors;
use tk_warden::{
    CommandOutcome, Enforcement, EscalationState, EventOutcome, IgnoreReason, MemoryDirectory,
    MessageKey, MessageTemplates, Messenger, Player, PlayerId, Team, TemplateVars, TkError,
    Warden, WardenConfig,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Player-visible action, color codes stripped
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Warn { player: String, text: String },
    Suspend { player: String, minutes: u32 },
    Broadcast(String),
    Tell { player: String, text: String },
    Say(String),
}

/// Records every outbound call with the rendered text
#[derive(Default)]
struct Recorder {
    templates: MessageTemplates,
    actions: Mutex<Vec<Action>>,
}

impl Recorder {
    fn push(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }

    fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.actions.lock().unwrap().clear();
    }

    fn warnings_for(&self, name: &str) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Warn { player, text } if player == name => Some(text),
                _ => None,
            })
            .collect()
    }

    fn suspensions(&self) -> Vec<(String, u32)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Suspend { player, minutes } => Some((player, minutes)),
                _ => None,
            })
            .collect()
    }

    fn broadcasts(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Broadcast(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn told(&self, name: &str) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Tell { player, text } if player == name => Some(text),
                _ => None,
            })
            .collect()
    }

    fn said(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Say(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Enforcement for Recorder {
    fn warn(&self, player: &Player, reason_key: MessageKey, vars: &TemplateVars) {
        self.push(Action::Warn {
            player: player.name.clone(),
            text: strip_colors(&self.templates.render(reason_key, vars)),
        });
    }

    fn suspend(&self, player: &Player, duration_minutes: u32, _reason_key: MessageKey) {
        self.push(Action::Suspend {
            player: player.name.clone(),
            minutes: duration_minutes,
        });
    }

    fn broadcast(&self, key: MessageKey, vars: &TemplateVars) {
        self.push(Action::Broadcast(strip_colors(&self.templates.render(key, vars))));
    }
}

impl Messenger for Recorder {
    fn tell(&self, player: &Player, text: &str) {
        self.push(Action::Tell {
            player: player.name.clone(),
            text: strip_colors(text),
        });
    }

    fn say(&self, text: &str) {
        self.push(Action::Say(strip_colors(text)));
    }
}

struct Harness {
    warden: Warden,
    recorder: Arc<Recorder>,
    players: Arc<MemoryDirectory>,
    joe: Player,
    mike: Player,
    bill: Player,
    admin: Player,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(WardenConfig::default())
    }

    fn with_config(config: WardenConfig) -> Self {
        let players = Arc::new(MemoryDirectory::new());
        let recorder = Arc::new(Recorder::default());

        let joe = Player::new(0, "Joe", Team::Red, 1);
        let mike = Player::new(1, "Mike", Team::Red, 1);
        let bill = Player::new(2, "Bill", Team::Red, 1);
        let admin = Player::new(3, "superadmin", Team::Red, 100);
        for p in [&joe, &mike, &bill, &admin] {
            players.connect(p.clone());
        }

        let warden = Warden::new(config, players.clone(), recorder.clone(), recorder.clone())
            .expect("default config is valid");

        Self {
            warden,
            recorder,
            players,
            joe,
            mike,
            bill,
            admin,
        }
    }

    async fn kill(&self, attacker: &Player, victim: &Player) -> EventOutcome {
        self.warden.on_kill(attacker, victim, Utc::now()).await
    }

    async fn damage(&self, attacker: &Player, victim: &Player, amount: f64) -> EventOutcome {
        self.warden.on_damage(attacker, victim, amount, Utc::now()).await
    }

    async fn say(&self, issuer: &Player, text: &str) -> Result<CommandOutcome, TkError> {
        self.warden
            .dispatch(issuer, text)
            .await
            .expect("line is a forgiveness command")
    }
}

// ============================================================================
// Scoring & Accumulation
// ============================================================================

#[tokio::test]
async fn test_kill_scores_level_multiplier() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;

    let info = h.warden.info(h.joe.id).await;
    assert_eq!(info.points, 200.0);
    assert_eq!(info.attacked.len(), 1);
    assert_eq!(info.attacked[0].name, "Mike");
}

#[tokio::test]
async fn test_damage_accumulates_without_warning() {
    let h = Harness::new();
    for _ in 0..5 {
        let outcome = h.damage(&h.joe, &h.mike, 34.0).await;
        assert!(matches!(outcome, EventOutcome::Recorded { .. }));
    }

    assert_eq!(h.warden.info(h.joe.id).await.points, 170.0);
    assert!(h.recorder.warnings_for("Joe").is_empty());
    assert_eq!(
        h.warden.offender_status(h.joe.id).await.state,
        EscalationState::Clean
    );
}

#[tokio::test]
async fn test_cross_team_and_self_damage_ignored() {
    let h = Harness::new();
    let enemy = Player::new(7, "Enemy", Team::Blue, 1);
    h.players.connect(enemy.clone());

    assert_eq!(
        h.kill(&h.joe, &enemy).await,
        EventOutcome::Ignored(IgnoreReason::CrossTeam)
    );
    assert_eq!(
        h.damage(&h.joe, &h.joe, 50.0).await,
        EventOutcome::Ignored(IgnoreReason::SelfInflicted)
    );
    assert!(h.recorder.actions().is_empty());
}

// ============================================================================
// Escalation
// ============================================================================

#[tokio::test]
async fn test_multikill_escalates_to_single_suspension() {
    let h = Harness::new();

    // First kill: one warning and a hint to the victim
    let outcome = h.kill(&h.joe, &h.mike).await;
    assert!(matches!(outcome, EventOutcome::Warned { count: 1, alert: false, .. }));
    assert_eq!(
        h.recorder.warnings_for("Joe"),
        vec!["Do not attack teammates, Attacked: Mike [200]"]
    );
    assert!(h.recorder.told("Mike").iter().any(|t| t.contains("!fp")));
    assert!(h.recorder.broadcasts().is_empty());

    // Second kill: last allowed warning plus the auto-kick alert
    let outcome = h.kill(&h.joe, &h.mike).await;
    assert!(matches!(outcome, EventOutcome::Warned { count: 2, alert: true, .. }));
    assert_eq!(h.recorder.warnings_for("Joe").len(), 2);
    let alerts = h.recorder.broadcasts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("auto-kick if not forgiven"));
    assert!(alerts[0].contains("!forgive 0"));

    // Third kill: exactly one suspension, slate wiped
    let outcome = h.kill(&h.joe, &h.mike).await;
    assert_eq!(outcome, EventOutcome::Suspended { minutes: 2 });
    assert_eq!(h.recorder.suspensions(), vec![("Joe".to_string(), 2)]);

    let status = h.warden.offender_status(h.joe.id).await;
    assert_eq!(status.state, EscalationState::Clean);
    assert_eq!(status.suspensions, 1);
    assert!(!status.timer_pending);
    assert_eq!(h.warden.info(h.joe.id).await.points, 0.0);
}

#[tokio::test]
async fn test_suspension_escalates_per_cycle() {
    let mut config = WardenConfig::default();
    config.settings.warn_level = 0;
    config.settings.suspension_escalation = 2.0;
    let h = Harness::with_config(config);

    assert_eq!(
        h.kill(&h.joe, &h.mike).await,
        EventOutcome::Suspended { minutes: 2 }
    );
    assert_eq!(
        h.kill(&h.joe, &h.mike).await,
        EventOutcome::Suspended { minutes: 4 }
    );
}

#[tokio::test]
async fn test_round_grace_only_after_round_start() {
    let h = Harness::new();

    // No round yet: no grace
    assert!(matches!(
        h.kill(&h.joe, &h.mike).await,
        EventOutcome::Warned { .. }
    ));

    let start = Utc::now();
    h.warden.on_round_start(start);
    assert_eq!(
        h.warden
            .on_kill(&h.joe, &h.bill, start + ChronoDuration::seconds(3))
            .await,
        EventOutcome::Ignored(IgnoreReason::RoundGrace)
    );
    assert!(matches!(
        h.warden
            .on_kill(&h.joe, &h.bill, start + ChronoDuration::seconds(8))
            .await,
        EventOutcome::Warned { .. }
    ));
}

// ============================================================================
// Forgiveness Commands
// ============================================================================

#[tokio::test]
async fn test_forgive_single_offender() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;
    h.recorder.clear();

    let outcome = h.say(&h.mike, "!forgive").await.unwrap();
    match outcome {
        CommandOutcome::Forgiven(forgiven) => {
            assert_eq!(forgiven.len(), 1);
            assert_eq!(forgiven[0].offender, PlayerId(0));
            assert_eq!(forgiven[0].points, 200.0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(h.recorder.told("Mike"), vec!["Mike has forgiven Joe [200]"]);
    assert_eq!(h.recorder.told("Joe"), vec!["Mike has forgiven Joe [200]"]);

    let status = h.warden.offender_status(h.joe.id).await;
    assert_eq!(status.state, EscalationState::Clean);
    assert!(!status.timer_pending);
    assert_eq!(h.warden.info(h.joe.id).await.points, 0.0);
}

#[tokio::test]
async fn test_forgive_broadcasts_when_not_private() {
    let mut config = WardenConfig::default();
    config.settings.private_messages = false;
    let h = Harness::with_config(config);
    h.kill(&h.joe, &h.mike).await;

    h.say(&h.mike, "!f joe").await.unwrap();
    assert_eq!(h.recorder.said(), vec!["Mike has forgiven Joe [200]"]);
}

#[tokio::test]
async fn test_forgive_without_target_lists_many() {
    let h = Harness::new();
    h.damage(&h.mike, &h.joe, 14.0).await;
    h.damage(&h.bill, &h.joe, 84.0).await;

    let outcome = h.say(&h.joe, "!forgive").await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Listed(ref entries) if entries.len() == 2));
    assert_eq!(
        h.recorder.told("Joe"),
        vec!["Forgive who? [1] Mike [14], [2] Bill [84]"]
    );
    assert_eq!(h.warden.forgive_list(h.joe.id).await.len(), 2);
}

#[tokio::test]
async fn test_forgivelist() {
    let h = Harness::new();
    assert_eq!(
        h.say(&h.joe, "!forgivelist").await,
        Err(TkError::NothingToForgive)
    );
    assert_eq!(h.recorder.told("Joe"), vec!["no one to forgive"]);
    h.recorder.clear();

    h.damage(&h.mike, &h.joe, 14.0).await;
    h.damage(&h.bill, &h.joe, 84.0).await;
    h.say(&h.joe, "!fl").await.unwrap();
    assert_eq!(
        h.recorder.told("Joe"),
        vec!["Forgive who? [1] Mike [14], [2] Bill [84]"]
    );
}

#[tokio::test]
async fn test_forgiveprev_removes_latest() {
    let h = Harness::new();
    h.damage(&h.mike, &h.joe, 14.0).await;
    h.damage(&h.bill, &h.joe, 84.0).await;

    let outcome = h.say(&h.joe, "!forgiveprev").await.unwrap();
    match outcome {
        CommandOutcome::Forgiven(forgiven) => assert_eq!(forgiven[0].offender_name, "Bill"),
        other => panic!("unexpected outcome {:?}", other),
    }

    let remaining = h.warden.forgive_list(h.joe.id).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Mike");
}

#[tokio::test]
async fn test_forgiveprev_follows_repeat_hit() {
    let h = Harness::new();
    h.damage(&h.mike, &h.joe, 14.0).await;
    h.damage(&h.bill, &h.joe, 84.0).await;
    h.damage(&h.mike, &h.joe, 1.0).await;

    match h.say(&h.joe, "!fp").await.unwrap() {
        CommandOutcome::Forgiven(forgiven) => {
            assert_eq!(forgiven[0].offender_name, "Mike");
            assert_eq!(forgiven[0].points, 15.0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let remaining = h.warden.forgive_list(h.joe.id).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Bill");
}

#[tokio::test]
async fn test_forgiveall_removes_everything() {
    let h = Harness::new();
    h.damage(&h.mike, &h.joe, 14.0).await;
    h.damage(&h.bill, &h.joe, 84.0).await;

    h.say(&h.joe, "!forgiveall").await.unwrap();
    assert!(h.warden.forgive_list(h.joe.id).await.is_empty());
    assert!(h.recorder.told("Joe").contains(&"Joe has forgiven Mike, Bill".to_string()));

    assert_eq!(h.say(&h.joe, "!fa").await, Err(TkError::NothingToForgive));
}

#[tokio::test]
async fn test_forgiveinfo_breakdown() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;
    h.damage(&h.joe, &h.bill, 6.0).await;
    h.damage(&h.mike, &h.joe, 27.0).await;
    h.recorder.clear();

    h.say(&h.admin, "!forgiveinfo joe").await.unwrap();
    assert_eq!(
        h.recorder.told("superadmin"),
        vec!["Joe has 206 TK points, Attacked: Mike (200), Bill (6), Attacked By: Mike [27]"]
    );
}

#[tokio::test]
async fn test_forgiveinfo_nothing_outstanding() {
    let h = Harness::new();
    h.say(&h.admin, "!fi joe").await.unwrap();
    assert_eq!(h.recorder.told("superadmin"), vec!["Joe has 0 TK points"]);
}

#[tokio::test]
async fn test_forgiveclear_requires_admin() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;

    let denied = h.say(&h.bill, "!forgiveclear joe").await;
    assert!(matches!(denied, Err(TkError::Unauthorized { required: 60, .. })));
    assert_eq!(h.warden.info(h.joe.id).await.points, 200.0);

    let outcome = h.say(&h.admin, "!forgiveclear joe").await.unwrap();
    assert_eq!(
        outcome,
        CommandOutcome::Cleared {
            player: PlayerId(0),
            points: 200.0
        }
    );
    assert_eq!(h.recorder.said(), vec!["Joe cleared of 200 TK points"]);

    let status = h.warden.offender_status(h.joe.id).await;
    assert_eq!(status.state, EscalationState::Clean);
    assert_eq!(status.suspensions, 0);

    assert_eq!(
        h.say(&h.admin, "!fc joe").await,
        Err(TkError::NothingToForgive)
    );
    assert!(h.recorder.told("superadmin").contains(&"no one to punish".to_string()));
}

#[tokio::test]
async fn test_grudge_blocks_forgiveness() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;

    let outcome = h.say(&h.mike, "!grudge").await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Grudged(ref g) if g.offender == PlayerId(0)));
    h.recorder.clear();

    let blocked = h.say(&h.mike, "!forgive").await;
    assert!(matches!(blocked, Err(TkError::GrudgeBlocked { .. })));
    assert_eq!(
        h.recorder.told("Mike"),
        vec!["Mike has a grudge against Joe [200]"]
    );
    assert_eq!(h.warden.info(h.joe.id).await.points, 200.0);

    h.say(&h.admin, "!forgiveclear joe").await.unwrap();
    assert_eq!(h.warden.info(h.joe.id).await.points, 0.0);
}

#[tokio::test]
async fn test_unknown_target_reports_no_forgive() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;
    h.recorder.clear();

    let result = h.say(&h.mike, "!forgive nobody").await;
    assert!(matches!(result, Err(TkError::InvalidTarget { .. })));
    assert_eq!(h.recorder.told("Mike"), vec!["no one to forgive"]);
}

#[tokio::test]
async fn test_non_command_chat_is_ignored() {
    let h = Harness::new();
    assert!(h.warden.dispatch(&h.joe, "gg all").await.is_none());
    assert!(h.warden.dispatch(&h.joe, "!help").await.is_none());
}

#[tokio::test]
async fn test_departed_offender_stays_forgivable() {
    let mut config = WardenConfig::default();
    config.settings.purge_on_disconnect = false;
    let h = Harness::with_config(config);
    h.damage(&h.mike, &h.joe, 27.0).await;
    h.damage(&h.bill, &h.joe, 14.0).await;

    assert_eq!(h.warden.on_disconnect(h.mike.id).await, 0);
    h.players.disconnect(h.mike.id);
    assert_eq!(h.warden.forgive_list(h.joe.id).await.len(), 2);

    h.say(&h.admin, "!forgiveinfo mike").await.unwrap();
    assert_eq!(
        h.recorder.told("superadmin"),
        vec!["Mike has 27 TK points, Attacked: Joe (27)"]
    );

    h.say(&h.joe, "!forgivelist").await.unwrap();
    match h.say(&h.joe, "!forgive mike").await.unwrap() {
        CommandOutcome::Forgiven(forgiven) => assert_eq!(forgiven[0].offender, h.mike.id),
        other => panic!("unexpected outcome {:?}", other),
    }

    let remaining = h.warden.forgive_list(h.joe.id).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Bill");
}

#[tokio::test]
async fn test_departed_offender_by_slot() {
    let mut config = WardenConfig::default();
    config.settings.purge_on_disconnect = false;
    let h = Harness::with_config(config);
    h.damage(&h.mike, &h.joe, 27.0).await;
    h.warden.on_disconnect(h.mike.id).await;
    h.players.disconnect(h.mike.id);

    h.say(&h.joe, "!forgive @1").await.unwrap();
    assert!(h.warden.forgive_list(h.joe.id).await.is_empty());
    assert_eq!(
        h.say(&h.joe, "!forgive mike").await,
        Err(TkError::InvalidTarget {
            query: "mike".to_string(),
            candidates: Vec::new(),
        })
    );
}

// ============================================================================
// Deferred Timers (paused clock)
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_timer_suspends_unforgiven_offender() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;
    h.kill(&h.joe, &h.mike).await;
    assert!(h.recorder.suspensions().is_empty());

    tokio::time::sleep(Duration::from_secs(3601)).await;

    assert_eq!(h.recorder.suspensions(), vec![("Joe".to_string(), 2)]);
    let status = h.warden.offender_status(h.joe.id).await;
    assert_eq!(status.state, EscalationState::Clean);
    assert_eq!(status.suspensions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_expires_single_warning() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;

    tokio::time::sleep(Duration::from_secs(3601)).await;

    assert!(h.recorder.suspensions().is_empty());
    let status = h.warden.offender_status(h.joe.id).await;
    assert_eq!(status.state, EscalationState::Clean);
    assert!(!status.timer_pending);
}

#[tokio::test(start_paused = true)]
async fn test_forgiveness_cancels_timer() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;
    h.kill(&h.joe, &h.mike).await;

    h.say(&h.mike, "!forgive").await.unwrap();
    tokio::time::sleep(Duration::from_secs(7200)).await;

    assert!(h.recorder.suspensions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_timer_and_purges() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;
    h.kill(&h.joe, &h.mike).await;
    h.damage(&h.bill, &h.joe, 20.0).await;

    let purged = h.warden.on_disconnect(h.joe.id).await;
    h.players.disconnect(h.joe.id);
    assert_eq!(purged, 2);

    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert!(h.recorder.suspensions().is_empty());
    assert!(h.warden.forgive_list(h.mike.id).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_offenders_are_dropped() {
    let h = Harness::new();
    h.kill(&h.joe, &h.mike).await;
    assert_eq!(h.warden.tracked_offenders().await, 1);
    h.say(&h.mike, "!forgive").await.unwrap();
    assert_eq!(h.warden.tracked_offenders().await, 0);

    h.kill(&h.bill, &h.mike).await;
    assert_eq!(h.warden.tracked_offenders().await, 1);
    tokio::time::sleep(Duration::from_secs(3601)).await;
    assert_eq!(h.warden.tracked_offenders().await, 0);

    for _ in 0..3 {
        h.kill(&h.joe, &h.mike).await;
    }
    assert_eq!(h.recorder.suspensions(), vec![("Joe".to_string(), 2)]);
    assert_eq!(h.warden.tracked_offenders().await, 1);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_reload_applies_new_warn_level() {
    let h = Harness::new();

    let mut config = WardenConfig::default();
    config.settings.warn_level = 1;
    h.warden.reload(config).await.unwrap();

    let outcome = h.kill(&h.joe, &h.mike).await;
    assert!(matches!(outcome, EventOutcome::Warned { count: 1, alert: true, .. }));
    assert_eq!(h.recorder.broadcasts().len(), 1);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_config() {
    let h = Harness::new();

    let mut bad = WardenConfig::default();
    bad.settings.max_points = -1.0;
    assert!(h.warden.reload(bad).await.is_err());
    assert_eq!(h.warden.config().await.settings.max_points, 400.0);
}

#[tokio::test]
async fn test_config_from_toml_drives_engine() {
    let config = WardenConfig::from_toml_str(
        r#"
[settings]
levels = [0]
warn_level = 1

[messages]
tk_warning_reason = "stop hitting $vname"

[level.0]
kill_multiplier = 1
damage_multiplier = 1
ban_length = 5
"#,
    )
    .unwrap();

    let mut h = Harness::with_config(config.clone());
    h.recorder = Arc::new(Recorder {
        templates: config.messages.clone(),
        actions: Mutex::new(Vec::new()),
    });
    h.warden = Warden::new(config, h.players.clone(), h.recorder.clone(), h.recorder.clone())
        .unwrap();

    h.kill(&h.joe, &h.mike).await;
    assert_eq!(h.recorder.warnings_for("Joe"), vec!["stop hitting Mike"]);
    assert_eq!(
        h.kill(&h.joe, &h.mike).await,
        EventOutcome::Suspended { minutes: 5 }
    );
}
