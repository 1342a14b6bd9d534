//! Evaluation harness for policies trained on Atari games.
//!
//! The crate wraps gymnasium environments (through Python) behind the [`env::Env`]
//! trait, loads actor checkpoints saved by training runs, and rolls them out with
//! [`evaluator::Evaluation`]. The [`run`] and [`seed`] modules hold the bookkeeping
//! shared by every driver program.
pub mod env;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod model;
pub mod panic_hook;
pub mod policy;
pub mod run;
pub mod seed;

pub use error::{Error, Result};

/// libtorch has one process-wide generator; tests that draw from it and
/// expect a fixed sequence hold this lock.
#[cfg(test)]
pub(crate) static TORCH_RNG: std::sync::Mutex<()> = std::sync::Mutex::new(());
