//! Execution tokens and the execution queue
//!
//! A token wraps one submitted command program: an immutable ordered command
//! sequence, a cursor over the next unsent command, a confirmed count and a
//! lifecycle state. The queue is a strict FIFO of tokens with a single
//! orthogonal pause flag; at most one token is RUNNING at a time, and a token
//! becomes current only after every earlier token reached a terminal state.

use motionkit_core::{TokenId, TokenState};
use std::collections::VecDeque;

/// One submitted command program and its in-progress execution state
#[derive(Debug, Clone)]
pub struct ExecutionToken {
    id: TokenId,
    commands: Vec<String>,
    /// Index of the next command to send
    cursor: usize,
    /// Number of commands the device confirmed
    confirmed: usize,
    state: TokenState,
}

impl ExecutionToken {
    /// Wrap a command sequence into a PENDING token
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            id: TokenId::new(),
            commands,
            cursor: 0,
            confirmed: 0,
            state: TokenState::Pending,
        }
    }

    /// The token identifier
    pub fn id(&self) -> TokenId {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TokenState {
        self.state
    }

    /// Total number of commands in the program
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Number of confirmed commands
    pub fn confirmed_count(&self) -> usize {
        self.confirmed
    }

    /// Commands sent but not yet confirmed
    pub fn unconfirmed_sent(&self) -> usize {
        self.cursor - self.confirmed
    }

    /// The next unsent command, if any
    pub fn next_unsent(&self) -> Option<&str> {
        self.commands.get(self.cursor).map(String::as_str)
    }

    /// Zero-based index of the next command to send
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Mark the token RUNNING when it becomes current
    pub fn run(&mut self) {
        debug_assert_eq!(self.state, TokenState::Pending);
        self.state = TokenState::Running;
    }

    /// Advance the cursor past a command that was just written
    pub fn mark_sent(&mut self) {
        debug_assert!(self.cursor < self.commands.len());
        self.cursor += 1;
    }

    /// Confirm the oldest unconfirmed command
    ///
    /// Returns the zero-based index of the confirmed command, or `None` when
    /// nothing sent remains unconfirmed. Completes the token once every
    /// command is confirmed.
    pub fn confirm_next(&mut self) -> Option<usize> {
        if self.confirmed >= self.cursor {
            return None;
        }
        let index = self.confirmed;
        self.confirmed += 1;
        if self.confirmed == self.commands.len() {
            self.state = TokenState::Completed;
        }
        Some(index)
    }

    /// Cancel the token; idempotent on terminal tokens
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = TokenState::Cancelled;
        }
    }
}

/// FIFO of execution tokens plus a single pause flag
#[derive(Debug, Default)]
pub struct ExecutionQueue {
    tokens: VecDeque<ExecutionToken>,
    paused: bool,
}

impl ExecutionQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a PENDING token
    pub fn add(&mut self, token: ExecutionToken) {
        debug_assert_eq!(token.state(), TokenState::Pending);
        self.tokens.push_back(token);
    }

    /// The token that is (or will become) current
    ///
    /// Terminal tokens at the front are dropped first; their state
    /// transitions were already published when they finished.
    pub fn current_mut(&mut self) -> Option<&mut ExecutionToken> {
        while matches!(self.tokens.front(), Some(token) if token.state().is_terminal()) {
            self.tokens.pop_front();
        }
        self.tokens.front_mut()
    }

    /// The id of the RUNNING token, or `None`
    pub fn current_token_id(&self) -> Option<TokenId> {
        self.tokens
            .front()
            .filter(|token| token.state() == TokenState::Running)
            .map(ExecutionToken::id)
    }

    /// Halt or resume the sender without discarding progress
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Whether sending is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Cancel the current token and drop every pending one
    ///
    /// Returns the ids of the tokens that were cancelled, in queue order, so
    /// the caller can publish their transitions.
    pub fn clear(&mut self) -> Vec<TokenId> {
        let mut cancelled = Vec::new();
        for token in self.tokens.iter_mut() {
            if !token.state().is_terminal() {
                token.cancel();
                cancelled.push(token.id());
            }
        }
        self.tokens.clear();
        cancelled
    }

    /// Number of queued tokens, terminal front included until swept
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the queue holds no tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(commands: &[&str]) -> ExecutionToken {
        ExecutionToken::new(commands.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_token_lifecycle() {
        let mut token = token(&["G0 X1", "G0 X2"]);
        assert_eq!(token.state(), TokenState::Pending);

        token.run();
        assert_eq!(token.state(), TokenState::Running);
        assert_eq!(token.next_unsent(), Some("G0 X1"));

        token.mark_sent();
        assert_eq!(token.next_unsent(), Some("G0 X2"));
        assert_eq!(token.unconfirmed_sent(), 1);

        assert_eq!(token.confirm_next(), Some(0));
        assert_eq!(token.state(), TokenState::Running);

        token.mark_sent();
        assert_eq!(token.next_unsent(), None);
        assert_eq!(token.confirm_next(), Some(1));
        assert_eq!(token.state(), TokenState::Completed);
    }

    #[test]
    fn test_confirm_without_sent_command_is_none() {
        let mut token = token(&["G0 X1"]);
        token.run();
        assert_eq!(token.confirm_next(), None);
    }

    #[test]
    fn test_cancel_is_idempotent_and_final() {
        let mut token = token(&["G0 X1"]);
        token.run();
        token.mark_sent();
        token.confirm_next();
        assert_eq!(token.state(), TokenState::Completed);

        // Cancelling a finished token must not resurrect it
        token.cancel();
        assert_eq!(token.state(), TokenState::Completed);
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = ExecutionQueue::new();
        let first = token(&["A1"]);
        let second = token(&["B1"]);
        let first_id = first.id();
        let second_id = second.id();

        queue.add(first);
        queue.add(second);

        let current = queue.current_mut().unwrap();
        assert_eq!(current.id(), first_id);
        current.run();
        current.mark_sent();
        current.confirm_next();
        assert_eq!(current.state(), TokenState::Completed);

        // The second token becomes current only after the first finished
        assert_eq!(queue.current_mut().unwrap().id(), second_id);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_cancels_everything() {
        let mut queue = ExecutionQueue::new();
        queue.add(token(&["A1", "A2"]));
        queue.add(token(&["B1"]));
        queue.current_mut().unwrap().run();

        let cancelled = queue.clear();
        assert_eq!(cancelled.len(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.current_token_id(), None);
    }

    #[test]
    fn test_pause_flag_is_orthogonal() {
        let mut queue = ExecutionQueue::new();
        queue.add(token(&["A1"]));
        queue.set_paused(true);
        assert!(queue.is_paused());
        // Pausing discards nothing
        assert_eq!(queue.len(), 1);
        queue.set_paused(false);
        assert!(!queue.is_paused());
    }
}
