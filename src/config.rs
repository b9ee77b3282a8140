//! Hyperparameters for the agent and the training loop.
//!
//! Every struct is `#[serde(default)]`, so a JSON file only needs to name the
//! fields it changes.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::environment::{NUM_ACTIONS, OBSERVATION_LEN};
use crate::error::{DrqnError, Result};

/// Network shape and learning parameters of [`DrqnAgent`](crate::agent::DrqnAgent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub observation_len: usize,
    pub num_actions: usize,
    pub lstm_size: usize,
    /// Hidden layer widths of the head between the LSTM and the Q-values.
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_decay: f32,
    pub epsilon_min: f32,
    pub replay_buffer_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            observation_len: OBSERVATION_LEN,
            num_actions: NUM_ACTIONS,
            lstm_size: 256,
            hidden_layers: vec![4, 4],
            learning_rate: 1e-4,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_decay: 0.999,
            epsilon_min: 0.01,
            replay_buffer_capacity: 50000,
        }
    }
}

/// Episode loop parameters of [`Trainer`](crate::trainer::Trainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub episodes: usize,
    pub max_steps_per_episode: usize,
    pub batch_size: usize,
    /// Number of stored transitions required before the first update.
    pub learning_starts: usize,
    pub train_frequency: usize,
    /// Global step interval between target network syncs.
    pub target_update_frequency: usize,
    pub log_every: usize,
    pub save_path: Option<PathBuf>,
    pub tensorboard_dir: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            episodes: 100,
            max_steps_per_episode: 300,
            batch_size: 32,
            learning_starts: 1000,
            train_frequency: 1,
            target_update_frequency: 1000,
            log_every: 25,
            save_path: None,
            tensorboard_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub agent: AgentConfig,
    pub trainer: TrainerConfig,
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.trainer.validate()?;
        if self.trainer.batch_size > self.agent.replay_buffer_capacity {
            return Err(DrqnError::Config(format!(
                "batch_size {} exceeds replay_buffer_capacity {}",
                self.trainer.batch_size, self.agent.replay_buffer_capacity
            )));
        }
        Ok(())
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.observation_len == 0 || self.num_actions == 0 || self.lstm_size == 0 {
            return Err(DrqnError::Config(
                "observation_len, num_actions and lstm_size must be positive".into(),
            ));
        }
        if self.hidden_layers.contains(&0) {
            return Err(DrqnError::Config("hidden layer of width 0".into()));
        }
        if self.replay_buffer_capacity == 0 {
            return Err(DrqnError::Config("replay_buffer_capacity must be positive".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(DrqnError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DrqnError::Config(format!("gamma {} not in [0, 1]", self.gamma)));
        }
        if !(0.0 <= self.epsilon_min
            && self.epsilon_min <= self.epsilon_start
            && self.epsilon_start <= 1.0)
        {
            return Err(DrqnError::Config(format!(
                "expected 0 <= epsilon_min ({}) <= epsilon_start ({}) <= 1",
                self.epsilon_min, self.epsilon_start
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(DrqnError::Config(format!(
                "epsilon_decay {} not in (0, 1]",
                self.epsilon_decay
            )));
        }
        Ok(())
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0
            || self.train_frequency == 0
            || self.target_update_frequency == 0
            || self.max_steps_per_episode == 0
        {
            return Err(DrqnError::Config(
                "batch_size, train_frequency, target_update_frequency and \
                 max_steps_per_episode must be positive"
                    .into(),
            ));
        }
        Ok(())
    }
}
