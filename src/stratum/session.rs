/// Connection-scoped Stratum protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    SentSubscribe,
    SentAuthorize,
    Authorized,
}

/// Session bookkeeping: current state, request-id generation, the id of
/// the most recent outstanding request, accepted-share count, and a
/// reconnect-attempt counter. `attempt` drives only the immediate-vs-1s
/// reconnect delay and log text; it is reset to 0 once a session reaches
/// `Authorized`, so backoff never carries over into a freshly re-established
/// connection's next disconnect.
#[derive(Debug, Clone)]
pub struct StratumSession {
    pub state: SessionState,
    next_id: u64,
    pub expected_id: Option<u64>,
    pub accepted_shares: u64,
    pub attempt: u32,
}

impl Default for StratumSession {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            next_id: 1,
            expected_id: None,
            accepted_shares: 0,
            attempt: 0,
        }
    }
}

impl StratumSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next monotonic request id and records it as the one
    /// currently outstanding.
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.expected_id = Some(id);
        id
    }

    pub fn reset_for_reconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.expected_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_start_at_one_and_increment() {
        let mut session = StratumSession::new();
        assert_eq!(session.next_request_id(), 1);
        assert_eq!(session.next_request_id(), 2);
        assert_eq!(session.expected_id, Some(2));
    }

    #[test]
    fn default_state_is_disconnected() {
        let session = StratumSession::new();
        assert_eq!(session.state, SessionState::Disconnected);
    }
}
