//! Per-offender escalation state
//!
//! `Clean -> Warned(1..=warn_level) -> Suspended`, where `Suspended` is
//! transient: the offender is reset to `Clean` as soon as it is enforced.

use serde::{Deserialize, Serialize};

use crate::escalation::timer::{PendingTimer, TimerToken};
use crate::players::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscalationState {
    Clean,
    Warned(u32),
    Suspended,
}

/// What a qualifying violation does to the offender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Warn {
        /// Warning count after this violation
        count: u32,
        /// Last allowed warning: broadcast the auto-kick alert
        alert: bool,
        /// No timer is pending yet for this cycle
        arm_timer: bool,
    },
    Suspend {
        /// Suspensions already served this session
        prior_cycles: u32,
    },
}

/// Outcome of a deferred timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerVerdict {
    /// Cancelled or superseded before it could act
    Stale,
    /// Warnings lapse and the offender returns to clean
    Expire,
    Suspend { prior_cycles: u32 },
}

#[derive(Debug, Default)]
pub struct OffenderState {
    /// Victim behind each live warning; length is the warning count
    warnings: Vec<PlayerId>,
    pending: Option<PendingTimer>,
    suspensions: u32,
}

impl OffenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings.len() as u32
    }

    pub fn suspensions(&self) -> u32 {
        self.suspensions
    }

    pub fn has_pending_timer(&self) -> bool {
        self.pending.is_some()
    }

    pub fn state(&self) -> EscalationState {
        match self.warning_count() {
            0 => EscalationState::Clean,
            n => EscalationState::Warned(n),
        }
    }

    /// Advance on a reportable violation against `victim`
    pub fn on_violation(&mut self, victim: PlayerId, warn_level: u32) -> Transition {
        if self.warning_count() >= warn_level {
            return Transition::Suspend {
                prior_cycles: self.suspensions,
            };
        }

        self.warnings.push(victim);
        let count = self.warning_count();
        Transition::Warn {
            count,
            alert: count == warn_level,
            arm_timer: self.pending.is_none(),
        }
    }

    pub fn arm(&mut self, timer: PendingTimer) {
        if let Some(previous) = self.pending.replace(timer) {
            previous.cancel();
        }
    }

    /// Take the pending timer for cancellation
    pub fn disarm(&mut self) -> Option<PendingTimer> {
        self.pending.take()
    }

    /// Drop warnings caused by `victim`. Returns the timer to cancel once the
    /// offender is clean or owes nothing.
    pub fn on_forgiven(&mut self, victim: PlayerId, still_owes: bool) -> Option<PendingTimer> {
        self.warnings.retain(|v| *v != victim);

        if self.warnings.is_empty() || !still_owes {
            self.warnings.clear();
            return self.pending.take();
        }
        None
    }

    /// Back to clean after a suspension (or an admin clear when `counted` is false)
    pub fn reset(&mut self, counted: bool) -> Option<PendingTimer> {
        self.warnings.clear();
        if counted {
            self.suspensions = self.suspensions.saturating_add(1);
        }
        self.pending.take()
    }

    /// Decide what a firing timer does. Only the current token acts.
    pub fn on_timer_fired(
        &mut self,
        token: TimerToken,
        warn_level: u32,
        still_owes: bool,
    ) -> TimerVerdict {
        match &self.pending {
            Some(pending) if pending.token() == token => {}
            _ => return TimerVerdict::Stale,
        }

        // The firing task owns this handle; dropping it detaches.
        self.pending = None;

        if still_owes && self.warning_count() >= warn_level {
            TimerVerdict::Suspend {
                prior_cycles: self.suspensions,
            }
        } else {
            self.warnings.clear();
            TimerVerdict::Expire
        }
    }

    /// Nothing worth keeping: no warnings, no timer, no served suspension
    pub fn is_idle(&self) -> bool {
        self.warnings.is_empty() && self.pending.is_none() && self.suspensions == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MIKE: PlayerId = PlayerId(1);
    const BILL: PlayerId = PlayerId(2);

    fn idle_timer(token: u64) -> PendingTimer {
        PendingTimer::spawn(TimerToken(token), Duration::from_secs(3600), async {})
    }

    #[test]
    fn test_three_kill_sequence() {
        let mut state = OffenderState::new();
        assert_eq!(state.state(), EscalationState::Clean);

        assert_eq!(
            state.on_violation(MIKE, 2),
            Transition::Warn { count: 1, alert: false, arm_timer: true }
        );
        assert_eq!(
            state.on_violation(MIKE, 2),
            Transition::Warn { count: 2, alert: true, arm_timer: true }
        );
        assert_eq!(state.state(), EscalationState::Warned(2));
        assert_eq!(
            state.on_violation(MIKE, 2),
            Transition::Suspend { prior_cycles: 0 }
        );
        assert_eq!(state.warning_count(), 2);
    }

    #[test]
    fn test_zero_warn_level_suspends_immediately() {
        let mut state = OffenderState::new();
        assert_eq!(state.on_violation(MIKE, 0), Transition::Suspend { prior_cycles: 0 });
    }

    #[tokio::test]
    async fn test_idle_only_without_history() {
        let mut state = OffenderState::new();
        assert!(state.is_idle());

        state.on_violation(MIKE, 2);
        state.arm(idle_timer(1));
        assert!(!state.is_idle());

        if let Some(timer) = state.on_forgiven(MIKE, false) {
            timer.cancel();
        }
        assert!(state.is_idle());

        state.reset(true);
        assert!(!state.is_idle());
    }

    #[test]
    fn test_reset_counts_cycles() {
        let mut state = OffenderState::new();
        state.on_violation(MIKE, 1);
        assert!(state.reset(true).is_none());
        assert_eq!(state.suspensions(), 1);
        assert_eq!(state.state(), EscalationState::Clean);
        state.reset(false);
        assert_eq!(state.suspensions(), 1);
    }

    #[tokio::test]
    async fn test_forgiveness_cancels_when_clean() {
        let mut state = OffenderState::new();
        state.on_violation(MIKE, 2);
        state.on_violation(BILL, 2);
        state.arm(idle_timer(1));

        assert!(state.on_forgiven(MIKE, true).is_none());
        assert_eq!(state.warning_count(), 1);
        assert!(state.has_pending_timer());

        let timer = state.on_forgiven(BILL, false);
        assert!(timer.is_some());
        assert_eq!(state.state(), EscalationState::Clean);
        assert!(!state.has_pending_timer());
    }

    #[tokio::test]
    async fn test_stale_token_is_ignored() {
        let mut state = OffenderState::new();
        state.on_violation(MIKE, 2);
        state.arm(idle_timer(7));

        assert_eq!(state.on_timer_fired(TimerToken(6), 2, true), TimerVerdict::Stale);
        assert!(state.has_pending_timer());

        if let Some(timer) = state.disarm() {
            timer.cancel();
        }
        assert_eq!(state.on_timer_fired(TimerToken(7), 2, true), TimerVerdict::Stale);
    }

    #[tokio::test]
    async fn test_timer_suspends_or_expires() {
        let mut state = OffenderState::new();
        state.on_violation(MIKE, 2);
        state.on_violation(MIKE, 2);
        state.arm(idle_timer(1));
        assert_eq!(
            state.on_timer_fired(TimerToken(1), 2, true),
            TimerVerdict::Suspend { prior_cycles: 0 }
        );

        let mut state = OffenderState::new();
        state.on_violation(MIKE, 2);
        state.arm(idle_timer(2));
        assert_eq!(state.on_timer_fired(TimerToken(2), 2, true), TimerVerdict::Expire);
        assert_eq!(state.state(), EscalationState::Clean);
    }
}
