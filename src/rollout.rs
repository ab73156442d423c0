use crate::config::RolloutConfig;
use crate::env::{Environment, GlucoseEnv, RenderMode};
use crate::simulator::Simulator;
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

/// Outcome of one finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub n_steps: usize,
    pub total_reward: f64,
    pub initial_glucose: f64,
    pub final_glucose: f64,
}

/// Episode driver exercising an environment with fixed or sampled actions.
///
/// Plays episodes until the environment reports `done`; it does not learn.
pub struct Rollout<S: Simulator> {
    env: GlucoseEnv<S>,
    cfg: RolloutConfig,
    rng: ChaCha12Rng,
}

impl<S: Simulator> Rollout<S> {
    pub fn new(env: GlucoseEnv<S>, cfg: RolloutConfig) -> Result<Self> {
        let rng = match cfg.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };
        Ok(Self { env, cfg, rng })
    }

    /// Play `n_episodes` episodes and summarize their total rewards.
    pub fn run(&mut self, n_episodes: usize) -> Result<AccumulatorReport> {
        let mut acc = Accumulator::new();

        for i_episode in 0..n_episodes {
            let summary = self
                .play_episode()
                .with_context(|| format!("failed to play episode {i_episode}"))?;
            log::info!(
                "episode {i_episode}: {} steps, reward {:.4}, glucose {:.2} -> {:.2}",
                summary.n_steps,
                summary.total_reward,
                summary.initial_glucose,
                summary.final_glucose
            );
            acc.add(summary.total_reward);
        }

        Ok(acc.report())
    }

    /// Play a single episode from reset to done.
    pub fn play_episode(&mut self) -> Result<EpisodeSummary> {
        let initial_glucose = self.env.reset().context("failed to reset environment")?;

        let mut summary = EpisodeSummary {
            n_steps: 0,
            total_reward: 0.0,
            initial_glucose,
            final_glucose: initial_glucose,
        };

        loop {
            let action = self.next_action().context("failed to choose action")?;
            let step = self
                .env
                .step(&action)
                .with_context(|| format!("failed to apply action {action:?}"))?;
            log::debug!(
                "action {action:?} -> glucose {:.2}, reward {:.4}",
                step.observation,
                step.reward
            );

            summary.n_steps += 1;
            summary.total_reward += step.reward;
            summary.final_glucose = step.observation;

            if self.cfg.render {
                self.env.render(RenderMode::Human);
            }
            if step.done {
                break;
            }
        }

        Ok(summary)
    }

    /// Release the environment and its engine.
    pub fn finish(self) -> Result<()> {
        self.env.close().context("failed to close environment")
    }

    fn next_action(&mut self) -> Result<Vec<f64>> {
        match &self.cfg.action {
            Some(action) => Ok(action.clone()),
            None => self.env.action_space().sample(&mut self.rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvSettings;
    use crate::error::EnvError;
    use crate::simulator::{InitMode, InitOutput, PatientParams, PatientState, StepOutput};

    /// Engine double rewarding the received dose.
    struct DoseReward;

    impl Simulator for DoseReward {
        fn initialize(&mut self, _mode: InitMode) -> Result<InitOutput, EnvError> {
            Ok(InitOutput {
                params: PatientParams::new(vec![1.0]),
                state: PatientState::new(vec![0.0; 6]),
                observation: 150.0,
            })
        }

        fn advance(
            &mut self,
            dose: f64,
            state: &PatientState,
            _params: &PatientParams,
        ) -> Result<StepOutput, EnvError> {
            Ok(StepOutput {
                state: state.clone(),
                observation: 150.0 - dose,
                reward: dose,
            })
        }
    }

    fn rollout(action: Option<Vec<f64>>, horizon: usize) -> Rollout<DoseReward> {
        let settings = EnvSettings {
            horizon,
            ..EnvSettings::default()
        };
        let env = GlucoseEnv::new(DoseReward, settings).unwrap();
        let cfg = RolloutConfig {
            action,
            seed: Some(3),
            ..RolloutConfig::default()
        };
        Rollout::new(env, cfg).unwrap()
    }

    #[test]
    fn fixed_action_episode() {
        let mut rollout = rollout(Some(vec![5.0, 0.0]), 10);
        let summary = rollout.play_episode().unwrap();
        assert_eq!(summary.n_steps, 10);
        assert_eq!(summary.total_reward, 300.0);
        assert_eq!(summary.initial_glucose, 150.0);
        assert_eq!(summary.final_glucose, 120.0);
    }

    #[test]
    fn sampled_actions_stay_in_engine_range() {
        let mut rollout = rollout(None, 4);
        let report = rollout.run(20).unwrap();
        assert_eq!(report.n_vals, 20);
        // Each step rewards the shifted dose, which lies in [0, 50].
        assert!(report.mean >= 0.0 && report.mean <= 200.0);
        rollout.finish().unwrap();
    }
}
