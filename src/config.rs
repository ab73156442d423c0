use crate::env::{ACTION_BOUND, ACTION_DIM, EnvSettings};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Configuration of the environment and the rollout driver.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Simulator engine process.
    pub engine: EngineConfig,

    /// Episode settings.
    #[serde(default)]
    pub episode: EnvSettings,

    /// Rollout driver settings.
    #[serde(default)]
    pub rollout: RolloutConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Program serving the simulator on stdin/stdout.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Number of episodes to run.
    pub n_episodes: usize,
    /// Fixed action applied at every step; sampled from the action space if absent.
    pub action: Option<Vec<f64>>,
    /// Seed of the action sampler; OS entropy if absent.
    pub seed: Option<u64>,
    /// Render every step to stdout.
    pub render: bool,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            n_episodes: 1,
            action: None,
            seed: None,
            render: false,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.program.trim().is_empty() {
            bail!("engine program must not be empty");
        }

        check_num(self.episode.horizon, 1..=100_000).context("invalid episode horizon")?;

        check_num(self.rollout.n_episodes, 1..=100_000).context("invalid number of episodes")?;
        if let Some(action) = &self.rollout.action {
            check_action(action).context("invalid rollout action")?;
        }

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_action(action: &[f64]) -> Result<()> {
    let len = action.len();
    if len != ACTION_DIM {
        bail!("action length must be {ACTION_DIM}, but is {len}");
    }
    for (i_cmp, &val) in action.iter().enumerate() {
        check_num(val, -ACTION_BOUND..=ACTION_BOUND)
            .with_context(|| format!("invalid component {i_cmp}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::InitMode;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = Config::from_toml("[engine]\nprogram = \"octave-cli\"\n").unwrap();
        assert_eq!(cfg.engine.args, Vec::<String>::new());
        assert_eq!(cfg.episode, EnvSettings::default());
        assert_eq!(cfg.episode.horizon, 10);
        assert_eq!(cfg.rollout, RolloutConfig::default());
    }

    #[test]
    fn full_config() {
        let cfg = Config::from_toml(
            r#"
[engine]
program = "octave-cli"
args = ["--eval", "serve_simulator"]

[episode]
horizon = 24
init_mode = "random"

[rollout]
n_episodes = 5
action = [-5.0, 0.5]
seed = 42
render = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.engine.args, vec!["--eval", "serve_simulator"]);
        assert_eq!(cfg.episode.horizon, 24);
        assert_eq!(cfg.episode.init_mode, InitMode::Random);
        assert_eq!(cfg.rollout.n_episodes, 5);
        assert_eq!(cfg.rollout.action, Some(vec![-5.0, 0.5]));
        assert_eq!(cfg.rollout.seed, Some(42));
        assert!(cfg.rollout.render);
    }

    #[test]
    fn rejects_invalid_values() {
        let base = "[engine]\nprogram = \"sim\"\n";
        for extra in [
            "[episode]\nhorizon = 0\n",
            "[episode]\ninit_mode = \"sometimes\"\n",
            "[rollout]\nn_episodes = 0\n",
            "[rollout]\naction = [0.0]\n",
            "[rollout]\naction = [30.0, 0.0]\n",
        ] {
            let contents = format!("{base}{extra}");
            assert!(Config::from_toml(&contents).is_err(), "{contents}");
        }
        assert!(Config::from_toml("[engine]\nprogram = \" \"\n").is_err());
        assert!(Config::from_toml("[episode]\nhorizon = 10\n").is_err());
    }
}
