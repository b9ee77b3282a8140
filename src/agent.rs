//! The recurrent DQN agent: an online network that acts and learns, and a
//! target network that supplies bootstrap values and is refreshed by copying
//! the online parameters.

use std::path::Path;

use log::debug;
use rand::random_range;
use tch::{
    Device, Kind, Tensor,
    nn::{self, OptimizerConfig, VarStore},
};

use crate::config::AgentConfig;
use crate::environment::{Action, Observation};
use crate::error::{DrqnError, Result};
use crate::qnetwork::RecurrentQNetwork;
use crate::recurrent::LstmState;
use crate::replay::Transition;

/// How [`DrqnAgent::act`] picks an action from the Q-values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exploration {
    /// Always the action with the highest Q-value.
    Greedy,
    /// Uniformly random action with the given probability, greedy otherwise.
    EpsilonGreedy(f32),
}

pub struct DrqnAgent {
    q_network: RecurrentQNetwork,
    target_network: RecurrentQNetwork,
    vs_main: VarStore,
    vs_target: VarStore,
    optimizer: nn::Optimizer,
    config: AgentConfig,
    epsilon: f32,
    train_steps: u64,
}

impl DrqnAgent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::with_device(config, Device::cuda_if_available())
    }

    pub fn with_device(config: AgentConfig, device: Device) -> Result<Self> {
        config.validate()?;

        let vs_main = VarStore::new(device);
        let q_network = RecurrentQNetwork::new(&vs_main.root(), &config);

        let mut vs_target = VarStore::new(device);
        let target_network = RecurrentQNetwork::new(&vs_target.root(), &config);
        vs_target
            .copy(&vs_main)
            .map_err(DrqnError::torch("initial target network sync"))?;

        let optimizer = nn::Adam::default()
            .build(&vs_main, config.learning_rate)
            .map_err(DrqnError::torch("building optimizer"))?;

        Ok(Self {
            q_network,
            target_network,
            vs_main,
            vs_target,
            optimizer,
            epsilon: config.epsilon_start,
            config,
            train_steps: 0,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.vs_main.device()
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Multiplicative decay, floored at `epsilon_min`.
    pub fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    /// Number of gradient steps taken so far.
    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    pub fn initial_lstm_state(&self) -> LstmState {
        LstmState::zeros(self.config.lstm_size)
    }

    fn observation_batch<'a>(
        &self,
        observations: impl Iterator<Item = &'a Observation>,
        rows: usize,
    ) -> Result<Tensor> {
        let len = self.config.observation_len;
        let mut flat = Vec::with_capacity(rows * len);
        for observation in observations {
            observation.check_len(len)?;
            flat.extend_from_slice(observation.features());
        }
        Ok(Tensor::from_slice(&flat)
            .view([rows as i64, len as i64])
            .to(self.device()))
    }

    fn forward_one(
        &self,
        network: &RecurrentQNetwork,
        observation: &Observation,
        lstm_state: &LstmState,
    ) -> Result<(Tensor, LstmState)> {
        let observations = self.observation_batch(std::iter::once(observation), 1)?;
        let state = LstmState::stack(&[lstm_state], self.config.lstm_size, self.device())?;
        let (qs, next_state) = tch::no_grad(|| network.forward(&observations, &state));
        Ok((qs, LstmState::unstack(&next_state, 0)?))
    }

    fn to_vec(qs: &Tensor) -> Result<Vec<f32>> {
        Vec::<f32>::try_from(&qs.flatten(0, -1).to(Device::Cpu))
            .map_err(DrqnError::torch("reading Q-values"))
    }

    /// Q-values of the online network and its next LSTM state.
    pub fn q_values(
        &self,
        observation: &Observation,
        lstm_state: &LstmState,
    ) -> Result<(Vec<f32>, LstmState)> {
        let (qs, next_state) = self.forward_one(&self.q_network, observation, lstm_state)?;
        Ok((Self::to_vec(&qs)?, next_state))
    }

    /// Q-values of the target network.
    pub fn target_q_values(
        &self,
        observation: &Observation,
        lstm_state: &LstmState,
    ) -> Result<Vec<f32>> {
        let (qs, _) = self.forward_one(&self.target_network, observation, lstm_state)?;
        Self::to_vec(&qs)
    }

    /// Chooses an action for one timestep.
    ///
    /// The returned state is the online network's next LSTM state for this
    /// observation, whether or not the action was explored.
    pub fn act(
        &self,
        observation: &Observation,
        lstm_state: &LstmState,
        exploration: Exploration,
    ) -> Result<(Action, LstmState)> {
        let (qs, next_state) = self.forward_one(&self.q_network, observation, lstm_state)?;
        let index = match exploration {
            Exploration::EpsilonGreedy(epsilon) if random_range(0.0f32..1.0) < epsilon => {
                random_range(0..self.config.num_actions)
            }
            _ => qs.argmax(1, false).int64_value(&[0]) as usize,
        };
        Ok((Action::new(index, self.config.num_actions)?, next_state))
    }

    /// Epsilon-greedy step with the agent's current epsilon.
    pub fn act_with_epsilon(
        &self,
        observation: &Observation,
        lstm_state: &LstmState,
    ) -> Result<(Action, LstmState)> {
        self.act(observation, lstm_state, Exploration::EpsilonGreedy(self.epsilon))
    }

    /// One gradient step on the summed squared TD error of the batch.
    ///
    /// Targets are `r + gamma * max_a Q_target(s', a)`, with the bootstrap term
    /// dropped for terminal transitions. Returns the loss before the step.
    pub fn train(&mut self, batch: &[&Transition]) -> Result<f64> {
        if batch.is_empty() {
            return Err(DrqnError::EmptyBatch);
        }
        let rows = batch.len();
        let device = self.device();
        let lstm_size = self.config.lstm_size;

        let observations = self.observation_batch(batch.iter().map(|t| &t.observation), rows)?;
        let next_observations =
            self.observation_batch(batch.iter().map(|t| &t.next_observation), rows)?;

        let states: Vec<&LstmState> = batch.iter().map(|t| &t.lstm_state).collect();
        let next_states: Vec<&LstmState> = batch.iter().map(|t| &t.next_lstm_state).collect();
        let lstm_in = LstmState::stack(&states, lstm_size, device)?;
        let next_lstm_in = LstmState::stack(&next_states, lstm_size, device)?;

        let mut actions = Vec::with_capacity(rows);
        for transition in batch {
            let action = Action::new(transition.action.index(), self.config.num_actions)?;
            actions.push(i64::from(action));
        }
        let actions = Tensor::from_slice(&actions).to(device).view([-1, 1]);

        let rewards: Vec<f32> = batch.iter().map(|t| t.reward).collect();
        let rewards = Tensor::from_slice(&rewards).to(device);
        let not_done: Vec<f32> = batch
            .iter()
            .map(|t| if t.done { 0.0 } else { 1.0 })
            .collect();
        let not_done = Tensor::from_slice(&not_done).to(device);

        let q_target = tch::no_grad(|| {
            let (next_qs, _) = self.target_network.forward(&next_observations, &next_lstm_in);
            let max_next_qs = next_qs.max_dim(1, false).0;
            &rewards + max_next_qs * &not_done * f64::from(self.config.gamma)
        });

        let (qs, _) = self.q_network.forward(&observations, &lstm_in);
        let q = qs.gather(1, &actions, false).squeeze_dim(1);

        let td_error = q - q_target;
        let loss = td_error.square().sum(Kind::Float);

        self.optimizer.backward_step(&loss);
        self.train_steps += 1;

        Ok(loss.double_value(&[]))
    }

    /// Copies every online parameter into the target network.
    pub fn update_target(&mut self) -> Result<()> {
        self.vs_target
            .copy(&self.vs_main)
            .map_err(DrqnError::torch("syncing target network"))?;
        debug!("Target network synced after {} train steps", self.train_steps);
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.vs_main
            .save(path.as_ref())
            .map_err(DrqnError::torch("saving online network"))?;
        debug!("Saved online network to {}", path.as_ref().display());
        Ok(())
    }

    /// Loads online parameters and syncs the target network to them.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.vs_main
            .load(path.as_ref())
            .map_err(DrqnError::torch("loading online network"))?;
        debug!("Loaded online network from {}", path.as_ref().display());
        self.update_target()
    }
}
