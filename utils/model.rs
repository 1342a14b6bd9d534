use std::path::Path;

use rand::Rng;
use tch::{
    nn::{self, ConvConfig, LinearConfig, Module, VarStore},
    Device, Kind, Tensor,
};
use tracing::info;

use crate::{policy::Policy, seed, Error, Result};

fn build_seq(vs_path: &nn::Path, out_dim: usize) -> nn::Sequential {
    let out_dim = out_dim as i64;

    let stride = |stride| ConvConfig {
        stride,
        ..ConvConfig::default()
    };

    // Sized for 210x160 RGB frames, which every ALE v5 game produces.
    nn::seq()
        .add(nn::conv2d(vs_path / "c1", 3, 32, 8, stride(4)))
        .add_fn(Tensor::relu)
        .add(nn::conv2d(vs_path / "c2", 32, 64, 4, stride(2)))
        .add_fn(Tensor::relu)
        .add(nn::conv2d(vs_path / "c3", 64, 64, 3, stride(1)))
        .add_fn(|xs| xs.relu().flat_view())
        .add(nn::linear(
            vs_path / "l1",
            22528,
            512,
            LinearConfig::default(),
        ))
        .add_fn(Tensor::relu)
        .add(nn::linear(
            vs_path / "out",
            512,
            out_dim,
            LinearConfig::default(),
        ))
}

/// Draws an index from a discrete distribution using [`seed::with_rng`].
fn sample_index(probs: &[f64]) -> usize {
    let threshold = seed::with_rng(|rng| rng.random::<f64>());
    let mut cumulative = 0.0;
    probs
        .iter()
        .position(|prob| {
            cumulative += prob;
            threshold < cumulative
        })
        .unwrap_or(probs.len().saturating_sub(1))
}

/// Fails with [`Error::ModelNotFound`] when `path` does not exist.
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::ModelNotFound(path.to_path_buf()))
    }
}

#[must_use]
#[derive(Debug)]
pub struct Actor {
    seq: nn::Sequential,
}

impl Module for Actor {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.seq)
    }
}

impl Actor {
    pub fn new(vs_path: &nn::Path, action_space: usize) -> Self {
        Self {
            seq: build_seq(vs_path, action_space),
        }
    }

    /// Restores an actor saved by a training run (`*-actor.ot`).
    pub fn load(path: &Path, action_space: usize) -> Result<Self> {
        ensure_exists(path)?;

        let mut vs = VarStore::new(Device::Cpu);
        let actor = Self::new(&vs.root(), action_space);
        vs.load(path)?;
        // The layers share storage with the store, so the conversion reaches them.
        vs.double();

        info!(model = %path.display(), action_space, "actor loaded");

        Ok(actor)
    }
}

impl Policy for Actor {
    type Observation = Tensor;
    type Action = u32;

    fn predict(&self, observation: &Tensor, deterministic: bool) -> Result<u32> {
        let batch = observation.f_unsqueeze(0)?;
        let logits = tch::no_grad(|| self.forward(&batch)).f_squeeze_dim(0)?;

        let action = if deterministic {
            logits.f_argmax(-1, false)?.f_int64_value(&[])?
        } else {
            let probs = Vec::<f64>::try_from(logits.f_softmax(-1, Kind::Double)?)?;
            sample_index(&probs) as i64
        };

        u32::try_from(action)
            .map_err(|_| Error::Policy(format!("action index {action} out of range")))
    }
}
