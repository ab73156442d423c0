//! Reinforcement-learning environment over a glucose-insulin simulator.

use crate::error::EnvError;
use crate::simulator::{InitMode, PatientParams, PatientState, Simulator, check_response};
use crate::spaces::BoxSpace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bound of each action component; actions live in `[-ACTION_BOUND, ACTION_BOUND]`.
pub const ACTION_BOUND: f64 = 25.0;
/// Number of action components: primary insulin dose and auxiliary signal.
pub const ACTION_DIM: usize = 2;
/// Lower bound of the blood-glucose observation.
pub const OBSERVATION_LOW: f64 = 0.0;
/// Upper bound of the blood-glucose observation.
pub const OBSERVATION_HIGH: f64 = 500.0;
/// Default number of steps per episode.
pub const DEFAULT_HORIZON: usize = 10;

/// Diagnostic payload returned with each step.
pub type Info = BTreeMap<String, f64>;

/// Outcome of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<O> {
    pub observation: O,
    pub reward: f64,
    pub done: bool,
    pub info: Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Human,
    None,
}

/// Standard agent/environment interface.
pub trait Environment {
    type Observation;

    fn action_space(&self) -> &BoxSpace;

    fn observation_space(&self) -> &BoxSpace;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Self::Observation, EnvError>;

    /// Apply `action` and advance the episode by one step.
    fn step(&mut self, action: &[f64]) -> Result<Step<Self::Observation>, EnvError>;

    fn render(&self, mode: RenderMode);
}

/// Episode settings of a [`GlucoseEnv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvSettings {
    /// Number of steps after which an episode is done.
    pub horizon: usize,
    /// Initial patient selection used by `reset`.
    pub init_mode: InitMode,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            init_mode: InitMode::Fixed,
        }
    }
}

/// Single-patient environment driving a [`Simulator`].
///
/// The agent acts with a two-component vector: component 0 is the insulin
/// dose request, declared symmetric in `[-25, 25]` and shifted to `[0, 50]`
/// before it reaches the engine; component 1 is added to the auxiliary
/// slot of the patient state before each advance. The observation is the
/// current blood-glucose reading. Episodes end after a fixed number of
/// steps and there is no other termination condition.
///
/// The engine is acquired by [`GlucoseEnv::new`] and released by
/// [`GlucoseEnv::close`] or when the environment is dropped.
pub struct GlucoseEnv<S: Simulator> {
    sim: Option<S>,
    settings: EnvSettings,

    action_space: BoxSpace,
    observation_space: BoxSpace,

    params: PatientParams,
    state: PatientState,
    observation: f64,
    n_steps: usize,
}

impl<S: Simulator> GlucoseEnv<S> {
    /// Take ownership of `sim` and initialize the first patient.
    pub fn new(mut sim: S, settings: EnvSettings) -> Result<Self, EnvError> {
        let action_space = BoxSpace::from_bounds(
            vec![-ACTION_BOUND; ACTION_DIM],
            vec![ACTION_BOUND; ACTION_DIM],
        );
        let observation_space =
            BoxSpace::from_bounds(vec![OBSERVATION_LOW], vec![OBSERVATION_HIGH]);

        let init = sim.initialize(settings.init_mode)?;
        check_response(&init.state, init.observation)?;
        log::debug!(
            "initialized patient with {} parameters and {} state entries",
            init.params.as_slice().len(),
            init.state.len()
        );

        let env = Self {
            sim: Some(sim),
            settings,
            action_space,
            observation_space,
            params: init.params,
            state: init.state,
            observation: init.observation,
            n_steps: 0,
        };
        env.check_observation();
        Ok(env)
    }

    /// Start a new episode with an explicit initial patient mode.
    pub fn reset_with_mode(&mut self, mode: InitMode) -> Result<f64, EnvError> {
        self.n_steps = 0;

        let sim = self
            .sim
            .as_mut()
            .ok_or_else(|| EnvError::EngineUnavailable("engine already released".into()))?;
        let init = sim.initialize(mode)?;
        check_response(&init.state, init.observation)?;

        self.params = init.params;
        self.state = init.state;
        self.observation = init.observation;
        log::debug!("reset episode with {mode:?} patient, glucose {}", self.observation);

        self.check_observation();
        Ok(self.observation)
    }

    /// Release the engine, reporting any shutdown failure.
    pub fn close(mut self) -> Result<(), EnvError> {
        match self.sim.take() {
            Some(mut sim) => sim.shutdown(),
            None => Ok(()),
        }
    }

    pub fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    /// Steps taken in the current episode.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn observation(&self) -> f64 {
        self.observation
    }

    pub fn state(&self) -> &PatientState {
        &self.state
    }

    pub fn params(&self) -> &PatientParams {
        &self.params
    }

    fn validate_action(&self, action: &[f64]) -> Result<(), EnvError> {
        if action.len() != ACTION_DIM {
            return Err(EnvError::InvalidAction(format!(
                "action must have {ACTION_DIM} components, but has {}",
                action.len()
            )));
        }
        if let Some(val) = action.iter().find(|val| !val.is_finite()) {
            return Err(EnvError::InvalidAction(format!(
                "action components must be finite, but got {val}"
            )));
        }
        if !self.action_space.contains(action) {
            log::warn!("action {action:?} lies outside [{}, {ACTION_BOUND}]", -ACTION_BOUND);
        }
        Ok(())
    }

    fn check_observation(&self) {
        if !self.observation_space.contains(&[self.observation]) {
            log::warn!(
                "glucose {} lies outside [{OBSERVATION_LOW}, {OBSERVATION_HIGH}]",
                self.observation
            );
        }
    }
}

impl<S: Simulator> Environment for GlucoseEnv<S> {
    type Observation = f64;

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn reset(&mut self) -> Result<f64, EnvError> {
        self.reset_with_mode(self.settings.init_mode)
    }

    fn step(&mut self, action: &[f64]) -> Result<Step<f64>, EnvError> {
        self.validate_action(action)?;

        // Auxiliary signal goes into the state before the dose is applied.
        let state = self.state.with_aux_added(action[1])?;
        let dose = action[0] + ACTION_BOUND;

        let sim = self
            .sim
            .as_mut()
            .ok_or_else(|| EnvError::EngineUnavailable("engine already released".into()))?;
        let out = sim.advance(dose, &state, &self.params)?;
        check_response(&out.state, out.observation)?;
        if !out.reward.is_finite() {
            return Err(EnvError::MalformedResponse(format!(
                "reward must be finite, but is {}",
                out.reward
            )));
        }

        // The episode only moves forward once the engine call succeeded.
        self.n_steps += 1;
        if self.n_steps > self.settings.horizon {
            log::warn!(
                "step {} exceeds the episode horizon of {}",
                self.n_steps,
                self.settings.horizon
            );
        }

        self.state = out.state;
        self.observation = out.observation;
        self.check_observation();

        let done = self.n_steps == self.settings.horizon;
        log::trace!(
            "step {}: dose {dose}, glucose {}, reward {}, done {done}",
            self.n_steps,
            self.observation,
            out.reward
        );

        Ok(Step {
            observation: self.observation,
            reward: out.reward,
            done,
            info: Info::new(),
        })
    }

    fn render(&self, mode: RenderMode) {
        if mode == RenderMode::Human {
            println!(
                "step {:>3}/{}: glucose {:.2}",
                self.n_steps, self.settings.horizon, self.observation
            );
        }
    }
}

impl<S: Simulator> Drop for GlucoseEnv<S> {
    fn drop(&mut self) {
        if let Some(mut sim) = self.sim.take() {
            if let Err(err) = sim.shutdown() {
                log::warn!("failed to shut down engine: {err}");
            }
        }
    }
}
