//! Forgiveness Workflow
//!
//! Victim-facing commands (`!forgive`, `!forgiveall`, `!forgiveprev`,
//! `!forgivelist`, `!grudge`) and the admin ones (`!forgiveinfo`,
//! `!forgiveclear`). Each is authorized, resolved against the ledger,
//! and answered with a rendered message.

mod command;
mod workflow;

pub use command::{CommandAuthorizer, ForgiveCommand, LevelAuthorizer};
pub use workflow::{CommandOutcome, render_info};
