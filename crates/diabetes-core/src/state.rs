use serde::{Deserialize, Serialize};

use crate::messaging::AgentMessage;

/// Conversation state for one session: the full message sequence plus a
/// count of completed turns. Messages are only appended, except that a failed
/// turn is rolled back as a whole.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    messages: Vec<AgentMessage>,
    turn_count: u64,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from prior history (e.g. a UI replaying its transcript).
    pub fn with_history(messages: Vec<AgentMessage>) -> Self {
        Self {
            messages,
            turn_count: 0,
        }
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: AgentMessage) {
        self.messages.push(message);
    }

    pub fn extend<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = AgentMessage>,
    {
        self.messages.extend(messages);
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn record_turn(&mut self) {
        self.turn_count += 1;
    }

    /// Drop everything appended after `len`. Used to discard a failed turn.
    pub fn rollback_to(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Messages appended since `start`, used to report one turn's trace.
    pub fn since(&self, start: usize) -> &[AgentMessage] {
        &self.messages[start.min(self.messages.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_clamps_out_of_range_start() {
        let mut state = AgentState::new();
        state.push(AgentMessage::user("one"));
        state.push(AgentMessage::assistant("two"));
        assert_eq!(state.since(1).len(), 1);
        assert!(state.since(10).is_empty());
    }

    #[test]
    fn rollback_keeps_earlier_turns() {
        let mut state = AgentState::new();
        state.push(AgentMessage::user("one"));
        state.push(AgentMessage::assistant("two"));
        let start = state.len();
        state.push(AgentMessage::user("three"));
        state.rollback_to(start);
        assert_eq!(state.len(), 2);
        assert_eq!(state.messages()[1].content_text(), "two");
    }
}
