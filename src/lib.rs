//! This crate provides a Deep Q-Network agent with LSTM memory for the
//! top-down sword skirmish. It includes the recurrent Q-network, the agent
//! with its online and target networks, replay memory, the training loop, a
//! native skirmish environment and, behind the `python` feature, a bridge to
//! the Python game environment.

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
#[cfg(feature = "python")]
pub mod gym_wrapper;
pub mod qnetwork;
pub mod recurrent;
pub mod replay;
pub mod setup;
pub mod skirmish;
pub mod trainer;

pub use agent::{DrqnAgent, Exploration};
pub use config::{AgentConfig, RunConfig, TrainerConfig};
pub use environment::{Action, Environment, Observation, Step};
pub use error::DrqnError;
pub use recurrent::LstmState;
pub use trainer::{EpisodeStats, Trainer};
