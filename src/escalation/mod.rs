//! Escalation State Machine
//!
//! Drives each offender from warning to temporary suspension.
//!
//! ```text
//!            reportable violation            reportable violation
//!   Clean ─────────────────────────► Warned(n) ──────────────────► Suspended
//!     ▲     (warn, hint, arm timer)     │  n < warn_level: warn again   │
//!     │                                 │  n == warn_level: alert       │
//!     │◄──── forgiven / timer expiry ───┘                               │
//!     └──────────────────────── enforced, ledger cleared ◄──────────────┘
//! ```
//!
//! At most one deferred timer is pending per offender. When it fires it
//! suspends an offender still sitting at `warn_level` warnings with points
//! outstanding; otherwise the warnings lapse.

mod state;
mod timer;

pub use state::{EscalationState, OffenderState, TimerVerdict, Transition};
pub use timer::{PendingTimer, TimerToken};
