use serde_json::{Map, Value};

use crate::Result;

mod gym;

/// Auxiliary diagnostics reported alongside observations.
pub type Info = Map<String, Value>;

#[must_use]
#[derive(Debug, Clone)]
pub struct Step<Observation> {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

impl<Observation> Step<Observation> {
    #[must_use]
    pub fn episode_ended(&self) -> bool {
        self.terminated || self.truncated
    }
}

pub trait Env {
    type Observation;
    type Action;

    fn reset(&mut self) -> Result<(Self::Observation, Info)>;
    fn step(&mut self, action: Self::Action) -> Result<Step<Self::Observation>>;
    fn close(&mut self) -> Result<()>;
}

pub use gym::{register_envs, Registration, Wrapper as GymWrapper};

#[cfg(test)]
mod tests {
    use super::*;

    fn step(terminated: bool, truncated: bool) -> Step<()> {
        Step {
            observation: (),
            reward: 0.0,
            terminated,
            truncated,
            info: Info::new(),
        }
    }

    #[test]
    fn either_signal_ends_the_episode() {
        assert!(!step(false, false).episode_ended());
        assert!(step(true, false).episode_ended());
        assert!(step(false, true).episode_ended());
        assert!(step(true, true).episode_ended());
    }
}
