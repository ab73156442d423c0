use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glucose_env::config::Config;
use glucose_env::rollout::Rollout;
use glucose_env::subprocess::SubprocessEngine;
use glucose_env::{Environment, GlucoseEnv};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Check,

    Rollout {
        #[arg(long)]
        n_episodes: Option<usize>,
    },
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let cfg = Config::from_file(&args.config).context("failed to construct cfg")?;
    log::info!("{cfg:#?}");

    let engine = SubprocessEngine::spawn(&cfg.engine.program, &cfg.engine.args)
        .context("failed to start engine")?;
    let env = GlucoseEnv::new(engine, cfg.episode.clone()).context("failed to construct env")?;

    match args.command {
        Command::Check => {
            log::info!("action space: {:?}", env.action_space());
            log::info!("observation space: {:?}", env.observation_space());
            log::info!("initial glucose: {}", env.observation());
            env.close().context("failed to close env")?;
        }
        Command::Rollout { n_episodes } => {
            let n_episodes = n_episodes.unwrap_or(cfg.rollout.n_episodes);
            let mut rollout =
                Rollout::new(env, cfg.rollout).context("failed to construct rollout")?;
            let report = rollout.run(n_episodes)?;
            log::info!("total reward over episodes: {report:#?}");
            rollout.finish()?;
        }
    }

    Ok(())
}
