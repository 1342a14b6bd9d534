use std::{
    io::{self, Write},
    time::{Duration, Instant},
};

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{env::Env as EnvTrait, policy::Policy, Error, Result};

fn serialize_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

fn serialize_opt_secs<S>(
    duration: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) => serialize_secs(duration, serializer),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeResult {
    pub reward: f64,

    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

/// Per-episode results in episode order plus their means. The means are
/// `None` when no episode was run.
#[must_use]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub episodes: Vec<EpisodeResult>,
    pub mean_reward: Option<f64>,

    #[serde(rename = "mean_duration_secs", serialize_with = "serialize_opt_secs")]
    pub mean_duration: Option<Duration>,
}

impl Summary {
    pub fn new(episodes: Vec<EpisodeResult>) -> Self {
        let count = episodes.len();
        let (mean_reward, mean_duration) = if count == 0 {
            (None, None)
        } else {
            let total_reward: f64 = episodes.iter().map(|episode| episode.reward).sum();
            let total_duration: Duration = episodes.iter().map(|episode| episode.duration).sum();
            (
                Some(total_reward / count as f64),
                Some(total_duration.div_f64(count as f64)),
            )
        };

        Self {
            episodes,
            mean_reward,
            mean_duration,
        }
    }
}

fn format_mean(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_owned(), |value| format!("{value:.2}"))
}

/// Owns the environment for the length of an evaluation and closes it
/// exactly once, on drop if the evaluation bailed out early.
struct CloseGuard<Env>
where
    Env: EnvTrait,
{
    env: Env,
    closed: bool,
}

impl<Env> CloseGuard<Env>
where
    Env: EnvTrait,
{
    fn new(env: Env) -> Self {
        Self { env, closed: false }
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.env.close()
    }
}

impl<Env> Drop for CloseGuard<Env>
where
    Env: EnvTrait,
{
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.env.close() {
                warn!(error = %err, "failed to close environment after an aborted evaluation");
            }
        }
    }
}

/// Rolls a policy out for a fixed number of episodes, always acting
/// deterministically.
#[must_use]
#[derive(TypedBuilder, Debug, Clone)]
pub struct Evaluation {
    episodes: usize,

    /// Rendering happens inside the environment, chosen when it was built;
    /// the flag is only recorded here.
    #[builder(default)]
    render: bool,
}

impl Evaluation {
    /// Runs the evaluation, reporting progress on standard output.
    pub fn run<Env, P>(&self, policy: &P, env: Env) -> Result<Summary>
    where
        Env: EnvTrait,
        P: Policy<Observation = Env::Observation, Action = Env::Action>,
    {
        let stdout = io::stdout();
        self.run_with_output(policy, env, &mut stdout.lock())
    }

    pub fn run_with_output<Env, P, W>(&self, policy: &P, env: Env, out: &mut W) -> Result<Summary>
    where
        Env: EnvTrait,
        P: Policy<Observation = Env::Observation, Action = Env::Action>,
        W: Write,
    {
        info!(
            episodes = self.episodes,
            render = self.render,
            "starting evaluation"
        );

        let mut guard = CloseGuard::new(env);
        let mut results = Vec::with_capacity(self.episodes);

        for episode in 1..=self.episodes {
            let result = run_episode(policy, &mut guard.env)?;
            writeln!(
                out,
                "[Eval] Episode {episode}/{} reward={:.2} time={:.2}s",
                self.episodes,
                result.reward,
                result.duration.as_secs_f64()
            )
            .map_err(Error::Report)?;
            results.push(result);
        }

        guard.close()?;

        let summary = Summary::new(results);
        writeln!(
            out,
            "[Eval] Mean reward over {} episodes: {}",
            self.episodes,
            format_mean(summary.mean_reward)
        )
        .map_err(Error::Report)?;
        writeln!(
            out,
            "[Eval] Mean episode duration: {}",
            summary
                .mean_duration
                .map_or_else(|| "undefined".to_owned(), |d| format!("{:.2}s", d.as_secs_f64()))
        )
        .map_err(Error::Report)?;

        Ok(summary)
    }
}

fn run_episode<Env, P>(policy: &P, env: &mut Env) -> Result<EpisodeResult>
where
    Env: EnvTrait,
    P: Policy<Observation = Env::Observation, Action = Env::Action>,
{
    let (mut observation, _info) = env.reset()?;
    let mut reward = 0.0;
    let mut num_steps = 0_u64;
    let start = Instant::now();

    loop {
        let action = policy.predict(&observation, true)?;
        let step = env.step(action)?;
        reward += step.reward;
        num_steps += 1;

        if step.episode_ended() {
            debug!(
                num_steps,
                terminated = step.terminated,
                truncated = step.truncated,
                "episode ended"
            );
            break;
        }

        observation = step.observation;
    }

    Ok(EpisodeResult {
        reward,
        duration: start.elapsed(),
    })
}
