use std::collections::VecDeque;

use rand::seq::index;

use crate::environment::{Action, Observation};
use crate::recurrent::LstmState;

/// One environment step together with the LSTM state on both sides of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub lstm_state: LstmState,
    pub action: Action,
    pub reward: f32,
    pub next_observation: Observation,
    pub next_lstm_state: LstmState,
    pub done: bool,
}

/// FIFO experience memory with uniform sampling.
#[derive(Debug)]
pub struct ReplayBuffer {
    transitions: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            transitions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Stores a transition, dropping the oldest one when full.
    /// A zero-capacity buffer stores nothing.
    pub fn push(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.transitions.len() >= self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Draws `batch_size` distinct transitions, or `None` while fewer are stored.
    pub fn sample(&self, batch_size: usize) -> Option<Vec<&Transition>> {
        if batch_size == 0 || self.transitions.len() < batch_size {
            return None;
        }
        let mut rng = rand::rng();
        let indices = index::sample(&mut rng, self.transitions.len(), batch_size);
        Some(
            indices
                .into_iter()
                .map(|index| &self.transitions[index])
                .collect(),
        )
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f32) -> Transition {
        Transition {
            observation: Observation::new(vec![reward]),
            lstm_state: LstmState::zeros(2),
            action: Action::new(0, 1).unwrap(),
            reward,
            next_observation: Observation::new(vec![reward + 1.0]),
            next_lstm_state: LstmState::zeros(2),
            done: false,
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = ReplayBuffer::new(3);
        for r in 0..5 {
            buffer.push(transition(r as f32));
        }
        assert_eq!(buffer.len(), 3);
        let mut rewards: Vec<f32> = buffer.sample(3).unwrap().iter().map(|t| t.reward).collect();
        rewards.sort_by(f32::total_cmp);
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn no_sample_until_enough_transitions() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(transition(0.0));
        assert!(buffer.sample(2).is_none());
        buffer.push(transition(1.0));
        assert_eq!(buffer.sample(2).unwrap().len(), 2);
    }

    #[test]
    fn sample_has_no_duplicates() {
        let mut buffer = ReplayBuffer::new(50);
        for r in 0..50 {
            buffer.push(transition(r as f32));
        }
        let mut rewards: Vec<f32> = buffer.sample(20).unwrap().iter().map(|t| t.reward).collect();
        rewards.sort_by(f32::total_cmp);
        rewards.dedup();
        assert_eq!(rewards.len(), 20);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buffer = ReplayBuffer::new(0);
        for r in 0..4 {
            buffer.push(transition(r as f32));
        }
        assert!(buffer.is_empty());
        assert!(buffer.sample(1).is_none());
    }
}
