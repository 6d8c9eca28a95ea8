use std::collections::VecDeque;

use rand::{Rng, seq::index};

use crate::state::{Action, State};

/// One environment step. Fields are read-only once the transition is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    state: State,
    action: Action,
    reward: f32,
    next_state: State,
    terminal: bool,
}

impl Transition {
    pub fn new(state: State, action: Action, reward: f32, next_state: State, terminal: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn reward(&self) -> f32 {
        self.reward
    }

    pub fn next_state(&self) -> &State {
        &self.next_state
    }

    pub fn terminal(&self) -> bool {
        self.terminal
    }
}

/// Bounded FIFO of transitions in arrival order.
pub struct ReplayBuffer {
    transitions: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be positive");
        Self {
            transitions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a transition, dropping the oldest one when full.
    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() >= self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Draws `batch_size` distinct transitions uniformly at random.
    ///
    /// Returns fewer when the buffer holds less than `batch_size` entries.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<&Transition> {
        let amount = batch_size.min(self.transitions.len());
        index::sample(rng, self.transitions.len(), amount)
            .into_iter()
            .map(|i| &self.transitions[i])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }
}
