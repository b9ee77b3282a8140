//! Episode loop: interaction with the environment, replay, periodic updates of
//! the online network and target syncs, plus TensorBoard logging.

use log::{debug, info};
use serde::Serialize;
use tensorboard_rs::summary_writer::SummaryWriter;

use crate::agent::{DrqnAgent, Exploration};
use crate::config::TrainerConfig;
use crate::environment::Environment;
use crate::error::{DrqnError, Result};
use crate::replay::{ReplayBuffer, Transition};

/// Summary of a single played episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeStats {
    pub episode: usize,
    pub total_reward: f32,
    pub steps: usize,
    /// Mean loss of the updates made during the episode, if any.
    pub mean_loss: Option<f64>,
    pub epsilon: f32,
    pub opponent_health: Option<f32>,
}

pub struct Trainer<E: Environment> {
    env: E,
    agent: DrqnAgent,
    replay: ReplayBuffer,
    config: TrainerConfig,
    writer: Option<SummaryWriter>,
    global_step: u64,
}

impl<E: Environment> Trainer<E> {
    pub fn new(env: E, agent: DrqnAgent, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        let agent_config = agent.config();
        if env.observation_len() != agent_config.observation_len {
            return Err(DrqnError::Config(format!(
                "environment observes {} features, agent expects {}",
                env.observation_len(),
                agent_config.observation_len
            )));
        }
        if env.num_actions() != agent_config.num_actions {
            return Err(DrqnError::Config(format!(
                "environment has {} actions, agent expects {}",
                env.num_actions(),
                agent_config.num_actions
            )));
        }
        if config.batch_size > agent_config.replay_buffer_capacity {
            return Err(DrqnError::Config(format!(
                "batch_size {} exceeds replay_buffer_capacity {}",
                config.batch_size, agent_config.replay_buffer_capacity
            )));
        }

        let replay = ReplayBuffer::new(agent_config.replay_buffer_capacity);
        let writer = match &config.tensorboard_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(SummaryWriter::new(dir))
            }
            None => None,
        };

        Ok(Self {
            env,
            agent,
            replay,
            config,
            writer,
            global_step: 0,
        })
    }

    pub fn agent(&self) -> &DrqnAgent {
        &self.agent
    }

    pub fn into_agent(self) -> DrqnAgent {
        self.agent
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    /// Environment steps taken across all training episodes.
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn train(&mut self) -> Result<Vec<EpisodeStats>> {
        let mut history = Vec::with_capacity(self.config.episodes);
        for episode in 0..self.config.episodes {
            let stats = self.run_episode(episode)?;
            self.record(&stats);
            history.push(stats);
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.flush();
        }
        if let Some(path) = &self.config.save_path {
            self.agent.save(path)?;
            info!("Saved trained agent to {}", path.display());
            let history_path = path.with_extension("history.json");
            let file = std::fs::File::create(&history_path)?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), &history)?;
            debug!("Wrote episode history to {}", history_path.display());
        }
        Ok(history)
    }

    /// Releases the environment. The trainer should not be used afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.env.close()
    }

    fn run_episode(&mut self, episode: usize) -> Result<EpisodeStats> {
        let mut observation = self.env.reset()?;
        let mut lstm_state = self.agent.initial_lstm_state();
        let mut total_reward = 0.0;
        let mut losses = Vec::new();
        let mut steps = 0;

        for _ in 0..self.config.max_steps_per_episode {
            let (action, next_lstm_state) = self.agent.act_with_epsilon(&observation, &lstm_state)?;
            let step = self.env.step(action)?;

            self.replay.push(Transition {
                observation,
                lstm_state,
                action,
                reward: step.reward,
                next_observation: step.observation.clone(),
                next_lstm_state: next_lstm_state.clone(),
                done: step.done,
            });
            observation = step.observation;
            lstm_state = next_lstm_state;
            total_reward += step.reward;
            steps += 1;
            self.global_step += 1;
            self.agent.decay_epsilon();

            if let Some(loss) = self.learn()? {
                losses.push(loss);
            }
            if self.global_step % self.config.target_update_frequency as u64 == 0 {
                self.agent.update_target()?;
            }
            if step.done {
                break;
            }
        }

        let mean_loss = if losses.is_empty() {
            None
        } else {
            Some(losses.iter().sum::<f64>() / losses.len() as f64)
        };

        Ok(EpisodeStats {
            episode,
            total_reward,
            steps,
            mean_loss,
            epsilon: self.agent.epsilon(),
            opponent_health: self.env.opponent_health(),
        })
    }

    fn learn(&mut self) -> Result<Option<f64>> {
        let warm = self.replay.len() >= self.config.learning_starts.max(self.config.batch_size);
        if !warm || self.global_step % self.config.train_frequency as u64 != 0 {
            return Ok(None);
        }
        match self.replay.sample(self.config.batch_size) {
            Some(batch) => self.agent.train(&batch).map(Some),
            None => Ok(None),
        }
    }

    fn record(&mut self, stats: &EpisodeStats) {
        if self.config.log_every > 0 && stats.episode % self.config.log_every == 0 {
            info!(
                "Episode: {}, Total Reward: {:.2}, Steps: {}, Epsilon: {:.3}",
                stats.episode, stats.total_reward, stats.steps, stats.epsilon
            );
        } else {
            debug!(
                "Episode: {}, Total Reward: {:.2}, Steps: {}",
                stats.episode, stats.total_reward, stats.steps
            );
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.add_scalar("rewards/total_reward", stats.total_reward, stats.episode);
            writer.add_scalar("train/epsilon", stats.epsilon, stats.episode);
            writer.add_scalar("episode/steps", stats.steps as f32, stats.episode);
            if let Some(loss) = stats.mean_loss {
                writer.add_scalar("train/loss", loss as f32, stats.episode);
            }
            if let Some(health) = stats.opponent_health {
                writer.add_scalar("episode/opponent_health", health, stats.episode);
            }
        }
    }

    /// Plays `games` greedy episodes without storing or learning anything.
    pub fn evaluate(&mut self, games: usize, render: bool) -> Result<Vec<EpisodeStats>> {
        let mut results = Vec::with_capacity(games);
        for game in 0..games {
            let mut observation = self.env.reset()?;
            let mut lstm_state = self.agent.initial_lstm_state();
            let mut total_reward = 0.0;
            let mut steps = 0;

            for _ in 0..self.config.max_steps_per_episode {
                if render {
                    self.env.render()?;
                }
                let (action, next_lstm_state) =
                    self.agent.act(&observation, &lstm_state, Exploration::Greedy)?;
                let step = self.env.step(action)?;
                observation = step.observation;
                lstm_state = next_lstm_state;
                total_reward += step.reward;
                steps += 1;
                if step.done {
                    break;
                }
            }

            info!("Reward {:.2} for game {} after {} steps", total_reward, game, steps);
            results.push(EpisodeStats {
                episode: game,
                total_reward,
                steps,
                mean_loss: None,
                epsilon: 0.0,
                opponent_health: self.env.opponent_health(),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::environment::{Action, Observation, Step};
    use tch::Device;

    /// Counts down a fixed number of steps; rewards action 0.
    struct Countdown {
        remaining: usize,
        length: usize,
        resets: usize,
        closed: bool,
    }

    impl Countdown {
        fn new(length: usize) -> Self {
            Self { remaining: length, length, resets: 0, closed: false }
        }

        fn observation(&self) -> Observation {
            Observation::new(vec![self.remaining as f32 / self.length as f32, 1.0])
        }
    }

    impl Environment for Countdown {
        fn observation_len(&self) -> usize {
            2
        }

        fn num_actions(&self) -> usize {
            3
        }

        fn reset(&mut self) -> Result<Observation> {
            self.remaining = self.length;
            self.resets += 1;
            Ok(self.observation())
        }

        fn step(&mut self, action: Action) -> Result<Step> {
            self.remaining -= 1;
            Ok(Step {
                observation: self.observation(),
                reward: if action.index() == 0 { 1.0 } else { 0.0 },
                done: self.remaining == 0,
            })
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn agent_config() -> AgentConfig {
        AgentConfig {
            observation_len: 2,
            num_actions: 3,
            lstm_size: 4,
            hidden_layers: vec![4],
            replay_buffer_capacity: 64,
            ..AgentConfig::default()
        }
    }

    fn trainer_config() -> TrainerConfig {
        TrainerConfig {
            episodes: 3,
            max_steps_per_episode: 10,
            batch_size: 4,
            learning_starts: 4,
            train_frequency: 1,
            target_update_frequency: 5,
            log_every: 1,
            ..TrainerConfig::default()
        }
    }

    fn trainer(length: usize) -> Trainer<Countdown> {
        let agent = DrqnAgent::with_device(agent_config(), Device::Cpu).unwrap();
        Trainer::new(Countdown::new(length), agent, trainer_config()).unwrap()
    }

    #[test]
    fn episodes_end_on_done() {
        let mut trainer = trainer(6);
        let history = trainer.train().unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|s| s.steps == 6));
        assert_eq!(trainer.global_step(), 18);
        assert_eq!(trainer.replay().len(), 18);
        assert_eq!(trainer.env().resets, 3);
    }

    #[test]
    fn episodes_are_truncated_at_max_steps() {
        let mut trainer = trainer(50);
        let history = trainer.train().unwrap();
        assert!(history.iter().all(|s| s.steps == 10));
    }

    #[test]
    fn learning_waits_for_warm_up() {
        let mut trainer = trainer(6);
        let history = trainer.train().unwrap();
        // first update happens once 4 transitions are stored
        assert_eq!(trainer.agent().train_steps(), 18 - 3);
        assert!(history[0].mean_loss.is_some());
        assert!(history.iter().all(|s| s.total_reward >= 0.0));
    }

    #[test]
    fn epsilon_decays_every_step() {
        let mut trainer = trainer(6);
        trainer.train().unwrap();
        let expected = 0.999f32.powi(18);
        assert!((trainer.agent().epsilon() - expected).abs() < 1e-4);
    }

    #[test]
    fn evaluation_does_not_learn() {
        let mut trainer = trainer(6);
        let results = trainer.evaluate(2, false).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(trainer.agent().train_steps(), 0);
        assert!(trainer.replay().is_empty());
    }

    #[test]
    fn rejects_mismatched_environment() {
        let agent = DrqnAgent::with_device(
            AgentConfig {
                num_actions: 5,
                ..agent_config()
            },
            Device::Cpu,
        )
        .unwrap();
        assert!(matches!(
            Trainer::new(Countdown::new(3), agent, trainer_config()),
            Err(DrqnError::Config(_))
        ));
    }

    #[test]
    fn saves_checkpoint_after_training() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.ot");
        let agent = DrqnAgent::with_device(agent_config(), Device::Cpu).unwrap();
        let config = TrainerConfig {
            save_path: Some(path.clone()),
            tensorboard_dir: Some(dir.path().join("logdir")),
            ..trainer_config()
        };
        let mut trainer = Trainer::new(Countdown::new(4), agent, config).unwrap();
        let history = trainer.train().unwrap();
        assert!(path.exists());

        let written = std::fs::read_to_string(dir.path().join("agent.history.json")).unwrap();
        let written: serde_json::Value = serde_json::from_str(&written).unwrap();
        let episodes = written.as_array().unwrap();
        assert_eq!(episodes.len(), history.len());
        assert_eq!(episodes[2]["steps"], 4);
    }

    fn fixed_observation() -> Observation {
        Observation::new(vec![0.5, 1.0])
    }

    fn online_and_target(trainer: &Trainer<Countdown>) -> (Vec<f32>, Vec<f32>) {
        let agent = trainer.agent();
        let state = agent.initial_lstm_state();
        let (online, _) = agent.q_values(&fixed_observation(), &state).unwrap();
        let target = agent.target_q_values(&fixed_observation(), &state).unwrap();
        (online, target)
    }

    #[test]
    fn target_is_synced_on_cadence() {
        // 10 steps: updates from step 4 on, syncs after the updates at steps 5 and 10
        let agent = DrqnAgent::with_device(agent_config(), Device::Cpu).unwrap();
        let config = TrainerConfig {
            episodes: 2,
            ..trainer_config()
        };
        let mut trainer = Trainer::new(Countdown::new(5), agent, config).unwrap();
        trainer.train().unwrap();
        assert_eq!(trainer.global_step(), 10);
        assert_eq!(trainer.agent().train_steps(), 7);

        let (online, target) = online_and_target(&trainer);
        assert_eq!(online, target);
    }

    #[test]
    fn target_lags_between_syncs() {
        // the update at step 6 follows the sync at step 5
        let agent = DrqnAgent::with_device(agent_config(), Device::Cpu).unwrap();
        let config = TrainerConfig {
            episodes: 1,
            ..trainer_config()
        };
        let mut trainer = Trainer::new(Countdown::new(6), agent, config).unwrap();
        trainer.train().unwrap();
        assert_eq!(trainer.global_step(), 6);
        assert_eq!(trainer.agent().train_steps(), 3);

        let (online, target) = online_and_target(&trainer);
        assert_ne!(online, target);
    }

    #[test]
    fn close_releases_environment() {
        let mut trainer = trainer(3);
        trainer.evaluate(1, false).unwrap();
        assert!(!trainer.env().closed);
        trainer.close().unwrap();
        assert!(trainer.env().closed);
    }
}
