use crate::{error::SyncError, types::SubscriptionPhase};

#[derive(Debug, Clone)]
pub struct SubscriptionStateMachine {
    phase: SubscriptionPhase,
}

impl Default for SubscriptionStateMachine {
    fn default() -> Self {
        Self {
            phase: SubscriptionPhase::Idle,
        }
    }
}

impl SubscriptionStateMachine {
    pub fn phase(&self) -> SubscriptionPhase {
        self.phase
    }

    pub fn can_send(&self) -> bool {
        self.phase == SubscriptionPhase::Connected
    }

    pub fn subscribe(&mut self) -> Result<SubscriptionPhase, SyncError> {
        self.transition_from(
            &[SubscriptionPhase::Idle],
            SubscriptionPhase::Connecting,
            "subscribe",
        )
    }

    pub fn on_remote_open(&mut self) -> Result<SubscriptionPhase, SyncError> {
        self.transition_from(
            &[SubscriptionPhase::Connecting],
            SubscriptionPhase::Connected,
            "remote_open",
        )
    }

    /// A connection attempt that never opens surfaces as a close, so this
    /// transition is legal from `Connecting` as well as `Connected`.
    pub fn on_remote_close(&mut self) -> Result<SubscriptionPhase, SyncError> {
        self.transition_from(
            &[
                SubscriptionPhase::Connecting,
                SubscriptionPhase::Connected,
            ],
            SubscriptionPhase::ReconnectWait,
            "remote_close",
        )
    }

    pub fn on_timer_elapsed(&mut self) -> Result<SubscriptionPhase, SyncError> {
        self.transition_from(
            &[SubscriptionPhase::ReconnectWait],
            SubscriptionPhase::Connecting,
            "timer_elapsed",
        )
    }

    /// Entered only by explicit unsubscribe; wins from every phase.
    pub fn terminate(&mut self) -> SubscriptionPhase {
        self.phase = SubscriptionPhase::Terminated;
        self.phase
    }

    fn transition_from(
        &mut self,
        expected: &[SubscriptionPhase],
        next: SubscriptionPhase,
        action: &str,
    ) -> Result<SubscriptionPhase, SyncError> {
        if !expected.contains(&self.phase) {
            return Err(SyncError::invalid_phase(self.phase, action));
        }
        self.phase = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_happy_path_lifecycle() {
        let mut sm = SubscriptionStateMachine::default();
        assert_eq!(sm.phase(), SubscriptionPhase::Idle);

        sm.subscribe().expect("subscribe must work");
        assert_eq!(sm.phase(), SubscriptionPhase::Connecting);

        sm.on_remote_open().expect("open must work");
        assert_eq!(sm.phase(), SubscriptionPhase::Connected);

        sm.on_remote_close().expect("close must work");
        assert_eq!(sm.phase(), SubscriptionPhase::ReconnectWait);

        sm.on_timer_elapsed().expect("timer must work");
        assert_eq!(sm.phase(), SubscriptionPhase::Connecting);
    }

    #[test]
    fn treats_failed_connect_as_close() {
        let mut sm = SubscriptionStateMachine::default();
        sm.subscribe().expect("subscribe must work");

        sm.on_remote_close()
            .expect("close from connecting must be legal");
        assert_eq!(sm.phase(), SubscriptionPhase::ReconnectWait);
    }

    #[test]
    fn rejects_open_without_subscribe() {
        let mut sm = SubscriptionStateMachine::default();
        let err = sm
            .on_remote_open()
            .expect_err("open from idle must fail");
        assert_eq!(err.code, "invalid_phase_transition");
        assert_eq!(sm.phase(), SubscriptionPhase::Idle);
    }

    #[test]
    fn terminate_wins_from_every_phase() {
        for setup in [0_u8, 1, 2, 3] {
            let mut sm = SubscriptionStateMachine::default();
            if setup >= 1 {
                sm.subscribe().expect("subscribe");
            }
            if setup >= 2 {
                sm.on_remote_open().expect("open");
            }
            if setup >= 3 {
                sm.on_remote_close().expect("close");
            }
            assert_eq!(sm.terminate(), SubscriptionPhase::Terminated);
        }
    }

    #[test]
    fn rejects_transitions_after_terminate() {
        let mut sm = SubscriptionStateMachine::default();
        sm.subscribe().expect("subscribe must work");
        sm.terminate();

        assert!(sm.on_remote_open().is_err());
        assert!(sm.on_remote_close().is_err());
        assert!(sm.on_timer_elapsed().is_err());
        assert!(sm.subscribe().is_err());
        assert_eq!(sm.phase(), SubscriptionPhase::Terminated);
    }

    #[test]
    fn can_send_only_when_connected() {
        let mut sm = SubscriptionStateMachine::default();
        assert!(!sm.can_send());
        sm.subscribe().expect("subscribe");
        assert!(!sm.can_send());
        sm.on_remote_open().expect("open");
        assert!(sm.can_send());
        sm.on_remote_close().expect("close");
        assert!(!sm.can_send());
    }
}
