//! A native stand-in for the sword game: one player against one melee NPC on
//! an open square map. It produces the same 12-feature observation and reward
//! as the Python environment, so the agent can be trained without Python.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::environment::{
    Action, Environment, NUM_ACTIONS, OBSERVATION_LEN, Observation, Step, SwordCommand,
};
use crate::error::{DrqnError, Result};

const MAP_SIZE: f32 = 30.0;
const FPS: f32 = 24.0;
const MAX_STEPS: usize = 300;

const RADIUS: f32 = 0.5;
const PLAYER_SPEED: f32 = 0.3 * FPS;
const PLAYER_MAX_HP: f32 = 100.0;
const NPC_SPEED: f32 = 0.1 * FPS;
const NPC_MAX_HP: f32 = 400.0;
// NPC spawns this far from the player, in a random direction.
const NPC_SPAWN_DISTANCE: f32 = 0.1 * MAP_SIZE;

const MELEE_DAMAGE: f32 = 200.0;
// Edge to edge.
const MELEE_REACH: f32 = 1.0;
const SHOT_DAMAGE: f32 = 5.0;
const SHOT_RANGE: f32 = MAP_SIZE * 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Fighter {
    x: f32,
    y: f32,
    hp: f32,
    max_hp: f32,
    speed: f32,
}

impl Fighter {
    fn alive(&self) -> bool {
        self.hp > 0.0
    }

    fn health(&self) -> f32 {
        self.hp.max(0.0) / self.max_hp
    }

    fn distance_to(&self, other: &Fighter) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    fn advance(&mut self, dx: f32, dy: f32) {
        let dt = 1.0 / FPS;
        self.x = (self.x + dx * self.speed * dt).clamp(0.0, MAP_SIZE);
        self.y = (self.y + dy * self.speed * dt).clamp(0.0, MAP_SIZE);
    }

    fn take_damage(&mut self, damage: f32) {
        self.hp = (self.hp - damage).max(0.0);
    }
}

/// Player versus a single chasing NPC.
#[derive(Debug)]
pub struct Skirmish {
    player: Fighter,
    npc: Fighter,
    last_action: Option<Action>,
    steps: usize,
    rng: StdRng,
}

impl Default for Skirmish {
    fn default() -> Self {
        Self::new()
    }
}

impl Skirmish {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic spawn positions.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        let mut skirmish = Self {
            player: Self::spawn_player(),
            npc: Self::spawn_player(),
            last_action: None,
            steps: 0,
            rng,
        };
        skirmish.respawn();
        skirmish
    }

    fn spawn_player() -> Fighter {
        Fighter {
            x: MAP_SIZE / 2.0,
            y: MAP_SIZE / 2.0,
            hp: PLAYER_MAX_HP,
            max_hp: PLAYER_MAX_HP,
            speed: PLAYER_SPEED,
        }
    }

    fn respawn(&mut self) {
        self.player = Self::spawn_player();
        let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
        self.npc = Fighter {
            x: self.player.x + NPC_SPAWN_DISTANCE * angle.cos(),
            y: self.player.y + NPC_SPAWN_DISTANCE * angle.sin(),
            hp: NPC_MAX_HP,
            max_hp: NPC_MAX_HP,
            speed: NPC_SPEED,
        };
        self.last_action = None;
        self.steps = 0;
    }

    fn observation(&self) -> Observation {
        let mut features = vec![0.0; OBSERVATION_LEN];
        if let Some(action) = self.last_action {
            features[action.index()] = 1.0;
        }
        if self.npc.alive() {
            features[NUM_ACTIONS] = (self.npc.x - self.player.x) / MAP_SIZE;
            features[NUM_ACTIONS + 1] = (self.npc.y - self.player.y) / MAP_SIZE;
            features[NUM_ACTIONS + 2] = self.npc.health();
        }
        Observation::new(features)
    }

    fn player_acts(&mut self, command: SwordCommand) -> Result<()> {
        match command {
            SwordCommand::Move(direction) => {
                let (dx, dy) = direction.unit();
                self.player.advance(dx, dy);
            }
            SwordCommand::CastSkill(0) => {
                if self.player.distance_to(&self.npc) <= SHOT_RANGE {
                    self.npc.take_damage(SHOT_DAMAGE);
                }
            }
            SwordCommand::CastSkill(skill) => {
                return Err(DrqnError::Environment(format!("player has no skill {skill}")));
            }
        }
        Ok(())
    }

    fn npc_acts(&mut self) {
        if !self.npc.alive() {
            return;
        }
        let distance = self.npc.distance_to(&self.player);
        if distance - 2.0 * RADIUS <= MELEE_REACH {
            self.player.take_damage(MELEE_DAMAGE);
        } else {
            let dx = (self.player.x - self.npc.x) / distance;
            let dy = (self.player.y - self.npc.y) / distance;
            self.npc.advance(dx, dy);
        }
    }
}

impl Environment for Skirmish {
    fn observation_len(&self) -> usize {
        OBSERVATION_LEN
    }

    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    fn reset(&mut self) -> Result<Observation> {
        self.respawn();
        Ok(self.observation())
    }

    fn step(&mut self, action: Action) -> Result<Step> {
        let action = Action::new(action.index(), NUM_ACTIONS)?;
        let last_hps = (self.player.health(), self.npc.health());

        self.player_acts(SwordCommand::from(action))?;
        self.npc_acts();
        self.last_action = Some(action);
        self.steps += 1;

        let reward = 2.0 * (self.player.health() - last_hps.0) - (self.npc.health() - last_hps.1);
        let done = !self.player.alive() || !self.npc.alive() || self.steps >= MAX_STEPS;

        Ok(Step {
            observation: self.observation(),
            reward,
            done,
        })
    }

    fn opponent_health(&self) -> Option<f32> {
        Some(self.npc.health())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(index: usize) -> Action {
        Action::new(index, NUM_ACTIONS).unwrap()
    }

    #[test]
    fn first_observation_has_no_last_action() {
        let mut env = Skirmish::with_seed(7);
        let observation = env.reset().unwrap();
        assert_eq!(observation.len(), OBSERVATION_LEN);
        assert!(observation.features()[..NUM_ACTIONS].iter().all(|v| *v == 0.0));
        assert_eq!(observation.features()[NUM_ACTIONS + 2], 1.0);
        let dx = observation.features()[NUM_ACTIONS] * MAP_SIZE;
        let dy = observation.features()[NUM_ACTIONS + 1] * MAP_SIZE;
        assert!(((dx * dx + dy * dy).sqrt() - NPC_SPAWN_DISTANCE).abs() < 1e-4);
    }

    #[test]
    fn last_action_is_one_hot() {
        let mut env = Skirmish::with_seed(7);
        env.reset().unwrap();
        let step = env.step(action(3)).unwrap();
        let one_hot = &step.observation.features()[..NUM_ACTIONS];
        assert_eq!(one_hot.iter().sum::<f32>(), 1.0);
        assert_eq!(one_hot[3], 1.0);
    }

    #[test]
    fn shooting_is_rewarded_by_opponent_damage() {
        let mut env = Skirmish::with_seed(1);
        env.reset().unwrap();
        let step = env.step(action(8)).unwrap();
        let expected = SHOT_DAMAGE / NPC_MAX_HP;
        assert!((step.reward - expected).abs() < 1e-6);
        assert!((env.opponent_health().unwrap() - (1.0 - expected)).abs() < 1e-6);
    }

    #[test]
    fn standing_still_gets_player_killed() {
        let mut env = Skirmish::with_seed(3);
        env.reset().unwrap();
        let mut last = None;
        for _ in 0..MAX_STEPS {
            let step = env.step(action(8)).unwrap();
            let done = step.done;
            last = Some(step);
            if done {
                break;
            }
        }
        let last = last.unwrap();
        assert!(last.done);
        // Melee hit costs the full player health bar, doubled.
        assert!(last.reward < -1.0);
        assert!(env.steps < MAX_STEPS);
    }

    #[test]
    fn episode_is_truncated_at_horizon() {
        let mut env = Skirmish::with_seed(5);
        env.reset().unwrap();
        env.steps = MAX_STEPS - 1;
        let step = env.step(action(8)).unwrap();
        assert!(step.done);
        assert!(env.player.alive());
        assert!(env.npc.alive());
    }

    #[test]
    fn reset_restores_health() {
        let mut env = Skirmish::with_seed(11);
        env.reset().unwrap();
        env.step(action(8)).unwrap();
        env.reset().unwrap();
        assert_eq!(env.opponent_health(), Some(1.0));
        assert_eq!(env.steps, 0);
    }

    #[test]
    fn same_seed_same_spawn() {
        let a = Skirmish::with_seed(42).reset().unwrap();
        let b = Skirmish::with_seed(42).reset().unwrap();
        assert_eq!(a, b);
    }
}
