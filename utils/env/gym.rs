use pyo3::{
    prelude::*,
    types::{PyBool, PyDict, PyTuple},
};
use serde_json::Value;
use tch::{Kind, Tensor};
use tracing::debug;

use super::{Env, Info, Step};
use crate::Result;

/// Outcome of making the Atari ids known to the gymnasium registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyRegistered,
    Failed(String),
}

/// Registers the `ale_py` environments so that ids such as `ALE/Pong-v5`
/// resolve in `gymnasium.make`.
#[must_use]
pub fn register_envs(env_id: &str) -> Registration {
    let outcome = Python::with_gil(|py| -> PyResult<Registration> {
        let gym = py.import("gymnasium")?;
        let registry = gym.getattr("envs")?.getattr("registry")?;
        if registry.contains(env_id)? {
            return Ok(Registration::AlreadyRegistered);
        }
        let ale_py = py.import("ale_py")?;
        gym.call_method1("register_envs", (ale_py,))?;
        Ok(Registration::Registered)
    });

    outcome.unwrap_or_else(|err| Registration::Failed(err.to_string()))
}

fn parse_py_observation(obs: &Bound<'_, PyAny>, observation_space: &[usize]) -> Result<Tensor> {
    let observation_space = observation_space
        .iter()
        .map(|&x| x as i64)
        .collect::<Vec<_>>();

    let values = obs.call_method0("flatten")?.extract::<Vec<f32>>()?;

    let observation = Tensor::f_from_slice(&values)?.f_view(observation_space.as_slice())?;
    let observation = if observation_space.len() == 3 {
        observation.f_permute([2, 0, 1])?
    } else {
        observation
    };

    Ok(observation.f_to_kind(Kind::Double)?)
}

fn parse_py_info(info: &Bound<'_, PyAny>) -> Result<Info> {
    let mut parsed = Info::new();
    let Ok(info) = info.downcast::<PyDict>() else {
        return Ok(parsed);
    };

    // Only scalar entries are kept, arrays and nested objects are dropped.
    for (key, value) in info.iter() {
        let value = if value.is_instance_of::<PyBool>() {
            value.extract::<bool>().ok().map(Value::from)
        } else if let Ok(value) = value.extract::<i64>() {
            Some(Value::from(value))
        } else if let Ok(value) = value.extract::<f64>() {
            Some(Value::from(value))
        } else {
            value.extract::<String>().ok().map(Value::from)
        };

        if let Some(value) = value {
            parsed.insert(key.str()?.to_string(), value);
        }
    }

    Ok(parsed)
}

/// A gymnasium environment driven through the embedded Python interpreter.
#[derive(Debug)]
pub struct Wrapper {
    name: String,
    env: PyObject,
    action_space: usize,
    observation_space: Vec<usize>,
}

impl Wrapper {
    pub fn new(name: &str, render_mode: Option<&str>) -> Result<Self> {
        let wrapper = Python::with_gil(|py| -> PyResult<Self> {
            let gym = py.import("gymnasium")?;
            let kwargs = PyDict::new(py);
            if let Some(render_mode) = render_mode {
                kwargs.set_item("render_mode", render_mode)?;
            }
            let env = gym.getattr("make")?.call((name,), Some(&kwargs))?;

            let action_space = env.getattr("action_space")?.getattr("n")?.extract()?;
            let observation_space: Vec<usize> =
                env.getattr("observation_space")?.getattr("shape")?.extract()?;

            Ok(Self {
                name: name.to_owned(),
                env: env.unbind(),
                action_space,
                observation_space,
            })
        })?;

        debug!(
            env = %wrapper.name,
            action_space = wrapper.action_space,
            observation_space = ?wrapper.observation_space,
            "environment created"
        );

        Ok(wrapper)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn action_space(&self) -> usize {
        self.action_space
    }

    /// Shape of the observations handed to the policy, channels first.
    #[must_use]
    pub fn observation_space(&self) -> Vec<usize> {
        let mut observation_space = self.observation_space.clone();

        if observation_space.len() == 3 {
            observation_space.rotate_right(1);
        }

        observation_space
    }
}

impl Env for Wrapper {
    type Observation = Tensor;
    type Action = u32;

    fn reset(&mut self) -> Result<(Tensor, Info)> {
        Python::with_gil(|py| {
            let reset = self.env.bind(py).call_method0("reset")?;
            let observation = parse_py_observation(&reset.get_item(0)?, &self.observation_space)?;
            let info = parse_py_info(&reset.get_item(1)?)?;
            Ok((observation, info))
        })
    }

    fn step(&mut self, action: u32) -> Result<Step<Tensor>> {
        Python::with_gil(|py| {
            let step = self.env.bind(py).call_method1("step", (action,))?;
            let step = step.downcast::<PyTuple>().map_err(PyErr::from)?;

            Ok(Step {
                observation: parse_py_observation(&step.get_item(0)?, &self.observation_space)?,
                reward: step.get_item(1)?.extract()?,
                terminated: step.get_item(2)?.extract()?,
                truncated: step.get_item(3)?.extract()?,
                info: parse_py_info(&step.get_item(4)?)?,
            })
        })
    }

    fn close(&mut self) -> Result<()> {
        Python::with_gil(|py| {
            self.env.bind(py).call_method0("close")?;
            debug!(env = %self.name, "environment closed");
            Ok(())
        })
    }
}
