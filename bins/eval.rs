/// Evaluates a trained actor on an Atari game and reports per-episode and
/// mean rewards.
///
/// To run this program make sure that you:
///    - run a following command: pip install 'gymnasium[atari]' ale-py
///    - install [Rust](https://www.rust-lang.org/tools/install)
///
/// Usage:
///    eval runs/ppo-5000-actor.ot --env ALE/Pong-v5 --episodes 10 --render
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use utils::{
    env::{self, Registration},
    evaluator::Evaluation,
    logging, model, panic_hook, run, seed,
};

/// Label used for run directories; the checkpoints come from PPO training.
const ALGO: &str = "PPO";

#[derive(Parser, Debug)]
#[command(name = "eval", version, about = "Evaluate a trained actor on an Atari environment")]
struct Args {
    /// Path to a saved actor checkpoint (e.g. ppo-5000-actor.ot)
    model: PathBuf,

    /// Environment id
    #[arg(long, default_value = "ALE/Pong-v5")]
    env: String,

    /// Number of episodes to run
    #[arg(long, default_value_t = 10)]
    episodes: usize,

    /// Render environment to screen
    #[arg(long)]
    render: bool,

    /// Seed every random number generator before the environment is built
    #[arg(long)]
    seed: Option<u64>,

    /// Base directory for a run directory holding config.json and summary.json
    #[arg(long, env = "EVAL_RUN_DIR")]
    run_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn run_config(&self) -> run::RunConfig {
        let mut config = run::RunConfig::new();
        config.insert("model".into(), self.model.display().to_string().into());
        config.insert("env_id".into(), self.env.clone().into());
        config.insert("algo".into(), ALGO.into());
        config.insert("episodes".into(), self.episodes.into());
        config.insert("render".into(), self.render.into());
        config.insert("seed".into(), self.seed.into());
        config
    }

    fn render_mode(&self) -> Option<&'static str> {
        self.render.then_some("human")
    }
}

fn prepare_run_dir(args: &Args, base_dir: &Path) -> Result<PathBuf> {
    let run_dir = run::make_run_dir(base_dir, &args.env, ALGO)?;
    let config = args.run_config();
    run::save_config(&config, &run_dir.join("config.json"))?;
    run::pretty_print_config(&config);
    Ok(run_dir)
}

fn evaluate(args: &Args) -> Result<()> {
    // Checked before anything else so a typo never opens a window or
    // leaves an empty run directory behind.
    model::ensure_exists(&args.model)?;

    if let Some(seed) = args.seed {
        seed::seed_all(&mut seed::default_sources(), seed);
    }

    let run_dir = args
        .run_dir
        .as_deref()
        .map(|base_dir| prepare_run_dir(args, base_dir))
        .transpose()?;

    match env::register_envs(&args.env) {
        Registration::Failed(reason) => warn!(%reason, "could not register ALE environments"),
        registration => debug!(?registration, "ALE environments available"),
    }

    let env = env::GymWrapper::new(&args.env, args.render_mode())
        .with_context(|| format!("failed to create environment {}", args.env))?;
    let policy = model::Actor::load(&args.model, env.action_space())
        .with_context(|| format!("failed to load model {}", args.model.display()))?;

    let summary = Evaluation::builder()
        .episodes(args.episodes)
        .render(args.render)
        .build()
        .run(&policy, env)?;

    if let Some(run_dir) = run_dir {
        run::save_config(&summary, &run_dir.join("summary.json"))?;
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(args.verbose, args.json);
    panic_hook::init();

    evaluate(&args)
}
