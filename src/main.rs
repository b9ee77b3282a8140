//! Command line entry point: trains or evaluates the recurrent DQN agent
//! against the native skirmish or the Python sword environment.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::{LevelFilter, info};

use sword_drqn::config::RunConfig;
use sword_drqn::environment::Environment;
use sword_drqn::setup::setup_logger;
use sword_drqn::skirmish::Skirmish;
use sword_drqn::{DrqnAgent, Trainer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EnvKind {
    Native,
    Gym,
}

#[derive(Subcommand)]
enum Command {
    /// Train the agent, optionally continuing from a loaded checkpoint.
    Train {
        #[arg(short = 'e', long = "episodes")]
        episodes: Option<usize>,
        #[arg(short = 's', long = "save")]
        save_file: Option<PathBuf>,
        #[arg(short = 't', long = "tensorboard")]
        tensorboard_dir: Option<PathBuf>,
    },
    /// Play greedy games with a trained agent.
    Eval {
        #[arg(short = 'g', long = "games", default_value = "5")]
        games: usize,
        #[arg(long = "render")]
        render: bool,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Options {
    #[arg(short = 'v', long = "log_level", default_value = "info")]
    log_level: LevelFilter,

    #[arg(short = 'o', long = "logfile")]
    log_file: Option<PathBuf>,

    /// JSON file with `agent` and `trainer` sections.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[arg(long = "env", value_enum, default_value = "native")]
    env: EnvKind,

    /// Python module exposing `make_env()`.
    #[arg(long = "gym_module", default_value = "envs")]
    gym_module: String,

    #[arg(short = 'l', long = "load")]
    load_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn run<E: Environment>(env: E, options: Options, mut config: RunConfig) -> anyhow::Result<()> {
    if let Command::Train {
        episodes,
        save_file,
        tensorboard_dir,
    } = &options.command
    {
        if let Some(episodes) = episodes {
            config.trainer.episodes = *episodes;
        }
        if save_file.is_some() {
            config.trainer.save_path = save_file.clone();
        }
        if tensorboard_dir.is_some() {
            config.trainer.tensorboard_dir = tensorboard_dir.clone();
        }
    }
    config.validate()?;

    let mut agent = DrqnAgent::new(config.agent.clone())?;
    if let Some(path) = &options.load_file {
        if path.exists() {
            info!("Loading saved agent from {}...", path.display());
            agent.load(path)?;
        } else {
            anyhow::bail!("checkpoint {} does not exist", path.display());
        }
    }

    let mut trainer = Trainer::new(env, agent, config.trainer)?;
    match options.command {
        Command::Train { .. } => {
            let history = trainer.train()?;
            if let Some(last) = history.last() {
                info!(
                    "Training finished after {} episodes, last reward {:.2}",
                    history.len(),
                    last.total_reward
                );
            }
        }
        Command::Eval { games, render } => {
            let results = trainer.evaluate(games, render)?;
            let total: f32 = results.iter().map(|r| r.total_reward).sum();
            info!("Evaluation finished with a total reward of: {total:.2}");
        }
    }
    trainer.close()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    setup_logger(options.log_level, &options.log_file)?;

    let config = match &options.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };

    match options.env {
        EnvKind::Native => run(Skirmish::new(), options, config),
        #[cfg(feature = "python")]
        EnvKind::Gym => {
            let env = sword_drqn::gym_wrapper::GymEnvironment::new(&options.gym_module)?;
            run(env, options, config)
        }
        #[cfg(not(feature = "python"))]
        EnvKind::Gym => anyhow::bail!(
            "cannot load Python module {}: built without the `python` feature",
            options.gym_module
        ),
    }
}
