//! This module defines the interface between the agent and the sword game:
//! the observation vector, the discrete action set and the [`Environment`] trait.

use crate::error::{DrqnError, Result};

/// Eight movement directions plus one skill cast.
pub const NUM_ACTIONS: usize = 9;
/// Number of movement actions. Indices at or above this cast a skill.
pub const NUM_DIRECTIONS: usize = 8;
/// One-hot last action (9), opponent offset (2), opponent health (1).
pub const OBSERVATION_LEN: usize = 12;

/// Feature vector the environment hands to the agent at every timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation(Vec<f32>);

impl Observation {
    pub fn new(features: Vec<f32>) -> Self {
        Self(features)
    }

    pub fn features(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn check_len(&self, expected: usize) -> Result<()> {
        if self.0.len() != expected {
            return Err(DrqnError::ObservationLength {
                expected,
                found: self.0.len(),
            });
        }
        Ok(())
    }
}

impl From<Vec<f32>> for Observation {
    fn from(value: Vec<f32>) -> Self {
        Self(value)
    }
}

/// Discrete action index, checked against the size of the action space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action(usize);

impl Action {
    pub fn new(index: usize, num_actions: usize) -> Result<Self> {
        if index >= num_actions {
            return Err(DrqnError::InvalidAction { index, num_actions });
        }
        Ok(Self(index))
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl From<Action> for i64 {
    fn from(value: Action) -> Self {
        value.0 as i64
    }
}

/// Compass direction of a move command, clockwise from up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl Direction {
    pub const ALL: [Direction; NUM_DIRECTIONS] = [
        Direction::Up,
        Direction::UpRight,
        Direction::Right,
        Direction::DownRight,
        Direction::Down,
        Direction::DownLeft,
        Direction::Left,
        Direction::UpLeft,
    ];

    /// Unit vector, y axis pointing up.
    pub fn unit(self) -> (f32, f32) {
        let d = std::f32::consts::FRAC_1_SQRT_2;
        match self {
            Direction::Up => (0.0, 1.0),
            Direction::UpRight => (d, d),
            Direction::Right => (1.0, 0.0),
            Direction::DownRight => (d, -d),
            Direction::Down => (0.0, -1.0),
            Direction::DownLeft => (-d, -d),
            Direction::Left => (-1.0, 0.0),
            Direction::UpLeft => (-d, d),
        }
    }
}

/// What the player character does for a given [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwordCommand {
    Move(Direction),
    /// Cast the player's skill with this index at the opponent.
    CastSkill(usize),
}

impl From<Action> for SwordCommand {
    fn from(action: Action) -> Self {
        match action.index() {
            i if i < NUM_DIRECTIONS => SwordCommand::Move(Direction::ALL[i]),
            i => SwordCommand::CastSkill(i - NUM_DIRECTIONS),
        }
    }
}

/// Result of advancing the environment by one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub observation: Observation,
    pub reward: f32,
    pub done: bool,
}

/// Gym-style episodic environment with a fixed observation and action interface.
pub trait Environment {
    fn observation_len(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<Observation>;

    fn step(&mut self, action: Action) -> Result<Step>;

    /// Remaining health of the opponent, as a fraction of its maximum.
    fn opponent_health(&self) -> Option<f32> {
        None
    }

    fn render(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases resources held by the environment.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
