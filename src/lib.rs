//! TK Warden
//!
//! Team-kill detection and graduated punishment for team-based multiplayer
//! game servers. Friendly-fire damage and kills are scored, accumulated per
//! (offender, victim) pair, and escalated from warnings to temporary
//! suspension unless the victim forgives.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Console driver
//! ├── config.rs       - Configuration (TOML, file, env)
//! ├── error.rs        - Player-facing error taxonomy
//! ├── players.rs      - Player identity, teams, target resolution
//! ├── messages.rs     - Message keys and template rendering
//! ├── round.rs        - Round clock and grace window
//! ├── enforcement.rs  - Outbound enforcement/messaging capabilities
//! ├── scoring/        - Scoring Policy
//! │   └── policy.rs   - Level tables, multipliers, suspension length
//! ├── ledger/         - Violation Ledger
//! │   ├── record.rs   - Per-pair record, decay
//! │   └── ledger.rs   - Insertion-ordered store
//! ├── escalation/     - Escalation State Machine
//! │   ├── state.rs    - Per-offender warnings and transitions
//! │   └── timer.rs    - Deferred, cancellable timers
//! ├── forgiveness/    - Forgiveness Workflow
//! │   ├── command.rs  - Commands, aliases, authorization
//! │   └── workflow.rs - Command execution and replies
//! └── warden/         - Orchestrator owning all state
//! ```

pub mod config;
pub mod enforcement;
pub mod error;
pub mod escalation;
pub mod forgiveness;
pub mod ledger;
pub mod messages;
pub mod players;
pub mod round;
pub mod scoring;
pub mod warden;

// Re-export main types for convenience
pub use config::{CommandLevels, LoggingConfig, ScoreConfig, WardenConfig};
pub use enforcement::{Directive, Enforcement, Messenger, TracingSink};
pub use error::TkError;
pub use escalation::{EscalationState, OffenderState, PendingTimer, TimerToken};
pub use forgiveness::{CommandAuthorizer, CommandOutcome, ForgiveCommand, LevelAuthorizer};
pub use ledger::{Forgiven, Ledger, PlayerInfo, PointsEntry, ViolationRecord};
pub use messages::{MessageKey, MessageTemplates, TemplateVars};
pub use players::{MemoryDirectory, Player, PlayerDirectory, PlayerId, Team, resolve_target};
pub use round::RoundClock;
pub use scoring::{EventKind, LevelPolicy, ScoringPolicy};
pub use warden::{EventOutcome, IgnoreReason, OffenderStatus, Warden};
