use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::{Error, Result};

/// Hyperparameters, paths and flags of one run, kept in insertion order.
pub type RunConfig = Map<String, Value>;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Turns an environment id such as `ALE/Pong-v5` into a single path component.
#[must_use]
pub fn sanitize_env_id(env_id: &str) -> String {
    env_id.replace(['/', '\\'], "_")
}

/// Creates `base_dir/{env}_{algo}_{timestamp}` and returns it.
///
/// The timestamp has second granularity, so two runs of the same env and
/// algorithm started within the same second share a directory.
pub fn make_run_dir(base_dir: &Path, env_id: &str, algo: &str) -> Result<PathBuf> {
    let timestamp = Local::now().format(TIMESTAMP_FORMAT);
    let run_dir = base_dir.join(format!("{}_{algo}_{timestamp}", sanitize_env_id(env_id)));

    fs::create_dir_all(&run_dir).map_err(|source| Error::CreateDir {
        path: run_dir.clone(),
        source,
    })?;

    info!(run_dir = %run_dir.display(), "run directory ready");

    Ok(run_dir)
}

/// Writes `config` as indented JSON, replacing whatever is at `out_path`.
pub fn save_config<T>(config: &T, out_path: &Path) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let serialized = serde_json::to_string_pretty(config)?;

    fs::write(out_path, serialized).map_err(|source| Error::Write {
        path: out_path.to_path_buf(),
        source,
    })
}

pub fn write_config<W>(config: &RunConfig, out: &mut W) -> io::Result<()>
where
    W: Write,
{
    writeln!(out, "=== Experiment config ===")?;
    for (key, value) in config {
        match value {
            Value::String(value) => writeln!(out, "{key}: {value}")?,
            value => writeln!(out, "{key}: {value}")?,
        }
    }
    writeln!(out, "=========================")
}

pub fn pretty_print_config(config: &RunConfig) {
    let stdout = io::stdout();
    // Nothing sensible to do when stdout is gone.
    _ = write_config(config, &mut stdout.lock());
}
