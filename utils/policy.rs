use crate::Result;

/// A decision rule mapping observations to actions.
pub trait Policy {
    type Observation;
    type Action;

    /// With `deterministic` set the same observation always yields the same
    /// action; otherwise the action may be sampled.
    fn predict(&self, observation: &Self::Observation, deterministic: bool)
        -> Result<Self::Action>;
}

