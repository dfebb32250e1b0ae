use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use tk_warden::{
    LoggingConfig, MemoryDirectory, Player, PlayerDirectory, PlayerId, Team, TracingSink, Warden,
    WardenConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - a bad table is fatal here
    let config = WardenConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check TK_WARDEN_CONFIG and TK_WARDEN_* overrides.");
        e
    })?;

    init_logging(&config.logging)?;

    info!("Starting team-kill warden console driver");

    let players = Arc::new(MemoryDirectory::new());
    let sink = Arc::new(TracingSink::new(config.messages.clone()));
    let warden = Warden::new(config, players.clone(), sink.clone(), sink.clone())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(e) = handle_line(&warden, &players, &sink, line).await {
            warn!(line = %line, "Rejected input: {:#}", e);
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}

/// Initialize logging from the configured level
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let log_level = match config.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_span_events(if config.log_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

/// One line of the driver protocol:
///
/// ```text
/// connect <cid> <name> <team> [level]
/// team <cid> <team>
/// damage <attacker> <victim> <amount>
/// kill <attacker> <victim>
/// round
/// disconnect <cid>
/// say <cid> <text>
/// reload <path>
/// info <cid>
/// status <cid>
/// ```
async fn handle_line(
    warden: &Warden,
    players: &MemoryDirectory,
    sink: &TracingSink,
    line: &str,
) -> Result<()> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = words.collect();

    match (verb.as_str(), args.as_slice()) {
        ("connect", [cid, name, team, rest @ ..]) => {
            let level = match rest.first() {
                Some(level) => level.parse().context("Invalid level")?,
                None => 0,
            };
            let player = Player::new(cid.parse().context("Invalid cid")?, name, team.parse()?, level);
            info!(player = %player.id, name = %player.name, team = ?player.team, "Connected");
            players.connect(player);
        }
        ("team", [cid, team]) => {
            let id = parse_id(cid)?;
            let team: Team = team.parse()?;
            if !players.set_team(id, team) {
                bail!("Player {} is not connected", id);
            }
        }
        ("damage", [attacker, victim, amount]) => {
            let amount: f64 = amount.parse().context("Invalid damage amount")?;
            let (attacker, victim) = (lookup(players, attacker)?, lookup(players, victim)?);
            let outcome = warden.on_damage(&attacker, &victim, amount, Utc::now()).await;
            info!(outcome = ?outcome, "Damage processed");
        }
        ("kill", [attacker, victim]) => {
            let (attacker, victim) = (lookup(players, attacker)?, lookup(players, victim)?);
            let outcome = warden.on_kill(&attacker, &victim, Utc::now()).await;
            info!(outcome = ?outcome, "Kill processed");
        }
        ("round", []) => warden.on_round_start(Utc::now()),
        ("disconnect", [cid]) => {
            let id = parse_id(cid)?;
            warden.on_disconnect(id).await;
            players.disconnect(id);
        }
        ("say", [cid, ..]) => {
            let issuer = lookup(players, cid)?;
            let text = args[1..].join(" ");
            match warden.dispatch(&issuer, &text).await {
                Some(Ok(outcome)) => info!(outcome = ?outcome, "Command handled"),
                Some(Err(e)) => info!(error = %e, "Command refused"),
                None => info!(name = %issuer.name, text = %text, "Chat"),
            }
        }
        ("reload", [path]) => match WardenConfig::from_file(path) {
            Ok(config) => {
                let templates = config.messages.clone();
                warden.reload(config).await?;
                // The sink renders warn and suspend reasons itself
                sink.set_templates(templates);
            }
            Err(e) => error!("Reload failed, keeping current configuration: {:#}", e),
        },
        ("info", [cid]) => {
            let info = warden.info(parse_id(cid)?).await;
            println!("{}", serde_json::to_string(&info)?);
        }
        ("status", [cid]) => {
            let status = warden.offender_status(parse_id(cid)?).await;
            println!("{}", serde_json::to_string(&status)?);
        }
        _ => bail!("Unrecognized command"),
    }

    Ok(())
}

fn parse_id(text: &str) -> Result<PlayerId> {
    Ok(PlayerId(text.parse().context("Invalid cid")?))
}

fn lookup(players: &MemoryDirectory, cid: &str) -> Result<Player> {
    let id = parse_id(cid)?;
    players
        .get(id)
        .ok_or_else(|| anyhow!("Player {} is not connected", id))
}
