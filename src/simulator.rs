//! Simulator engine capability and the data it exchanges.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// Index of the state entry that receives the auxiliary action component.
pub const AUX_STATE_INDEX: usize = 5;

/// How the engine picks the initial patient of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitMode {
    /// Randomly sampled initial state and parameters.
    Random,
    /// Hardcoded patient state and parameter vector.
    #[default]
    Fixed,
}

impl InitMode {
    /// Numeric code understood by the engine.
    pub fn code(self) -> u8 {
        match self {
            InitMode::Random => 0,
            InitMode::Fixed => 1,
        }
    }
}

/// Static physiological parameters of the patient for one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientParams(Vec<f64>);

impl PatientParams {
    pub fn new(vals: Vec<f64>) -> Self {
        Self(vals)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Full internal physiological state of the patient.
///
/// Each value is a snapshot: advancing the episode produces a new state
/// instead of editing the stored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientState(Vec<f64>);

impl PatientState {
    pub fn new(vals: Vec<f64>) -> Self {
        Self(vals)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of the auxiliary control slot, if the state is long enough.
    pub fn aux(&self) -> Option<f64> {
        self.0.get(AUX_STATE_INDEX).copied()
    }

    /// Return a copy of this state with `delta` added to the auxiliary slot.
    pub fn with_aux_added(&self, delta: f64) -> Result<Self, EnvError> {
        let mut vals = self.0.clone();
        let len = vals.len();
        let slot = vals.get_mut(AUX_STATE_INDEX).ok_or_else(|| {
            EnvError::MalformedResponse(format!(
                "state must have more than {AUX_STATE_INDEX} entries, but has {len}"
            ))
        })?;
        *slot += delta;
        Ok(Self(vals))
    }
}

/// Result of initializing a patient.
#[derive(Debug, Clone, PartialEq)]
pub struct InitOutput {
    pub params: PatientParams,
    pub state: PatientState,
    pub observation: f64,
}

/// Result of advancing the patient by one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub state: PatientState,
    pub observation: f64,
    pub reward: f64,
}

/// An engine that simulates the glucose-insulin dynamics of one patient.
///
/// Implementations own whatever runtime backs them (a child process, a
/// native model, a test double). Calls are blocking.
pub trait Simulator {
    /// Pick an initial patient and return its parameters, state and glucose reading.
    fn initialize(&mut self, mode: InitMode) -> Result<InitOutput, EnvError>;

    /// Advance the patient by one step with the given insulin dose.
    fn advance(
        &mut self,
        dose: f64,
        state: &PatientState,
        params: &PatientParams,
    ) -> Result<StepOutput, EnvError>;

    /// Release the resources held by the engine.
    fn shutdown(&mut self) -> Result<(), EnvError> {
        Ok(())
    }
}

impl<S: Simulator + ?Sized> Simulator for Box<S> {
    fn initialize(&mut self, mode: InitMode) -> Result<InitOutput, EnvError> {
        (**self).initialize(mode)
    }

    fn advance(
        &mut self,
        dose: f64,
        state: &PatientState,
        params: &PatientParams,
    ) -> Result<StepOutput, EnvError> {
        (**self).advance(dose, state, params)
    }

    fn shutdown(&mut self) -> Result<(), EnvError> {
        (**self).shutdown()
    }
}

/// Check the invariants every engine response must satisfy.
pub(crate) fn check_response(state: &PatientState, observation: f64) -> Result<(), EnvError> {
    if state.aux().is_none() {
        return Err(EnvError::MalformedResponse(format!(
            "state must have more than {AUX_STATE_INDEX} entries, but has {}",
            state.len()
        )));
    }
    if let Some((i_ent, val)) = state
        .as_slice()
        .iter()
        .enumerate()
        .find(|(_, val)| !val.is_finite())
    {
        return Err(EnvError::MalformedResponse(format!(
            "state entry {i_ent} must be finite, but is {val}"
        )));
    }
    if !observation.is_finite() {
        return Err(EnvError::MalformedResponse(format!(
            "observation must be finite, but is {observation}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aux_addition_returns_new_snapshot() {
        let state = PatientState::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let next = state.with_aux_added(3.0).unwrap();
        assert_eq!(next.aux(), Some(8.0));
        assert_eq!(state.aux(), Some(5.0));
        assert_eq!(next.as_slice()[6], 6.0);
    }

    #[test]
    fn short_state_is_malformed() {
        let state = PatientState::new(vec![1.0; AUX_STATE_INDEX]);
        assert!(matches!(
            state.with_aux_added(1.0),
            Err(EnvError::MalformedResponse(_))
        ));
        assert!(check_response(&state, 100.0).is_err());
    }

    #[test]
    fn non_finite_observation_is_malformed() {
        let state = PatientState::new(vec![0.0; 8]);
        assert!(check_response(&state, f64::NAN).is_err());
        assert!(check_response(&state, 110.0).is_ok());
    }

    #[test]
    fn non_finite_state_entry_is_malformed() {
        let mut vals = vec![0.0; 8];
        vals[2] = f64::INFINITY;
        let err = check_response(&PatientState::new(vals), 120.0).unwrap_err();
        assert!(matches!(err, EnvError::MalformedResponse(msg) if msg.contains("entry 2")));

        let mut vals = vec![0.0; 8];
        vals[7] = f64::NAN;
        assert!(check_response(&PatientState::new(vals), 120.0).is_err());
    }

    #[test]
    fn init_mode_codes() {
        assert_eq!(InitMode::Random.code(), 0);
        assert_eq!(InitMode::Fixed.code(), 1);
        assert_eq!(InitMode::default(), InitMode::Fixed);
    }
}
