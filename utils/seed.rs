//! Reproducible starting points for every random number generator a run can
//! touch.
//!
//! Each generator is a [`SeedSource`]. Optional parts (numpy, CUDA devices)
//! are probed up front and skipped when absent instead of failing.
use std::{cell::RefCell, env};

use pyo3::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, warn};

use crate::Result;

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

/// Runs `f` with the general purpose generator shared by the crate. Sampled
/// actions draw from it, so `--seed` makes them reproducible.
pub fn with_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    RNG.with(|rng| f(&mut rng.borrow_mut()))
}

pub trait SeedSource {
    fn name(&self) -> &'static str;
    fn set_seed(&mut self, seed: u64) -> Result<()>;
}

/// Hash randomization of the embedded Python interpreter. Only honoured if
/// set before the interpreter starts, so it has to be seeded first.
#[derive(Debug, Default)]
pub struct HashSeed;

impl SeedSource for HashSeed {
    fn name(&self) -> &'static str {
        "PYTHONHASHSEED"
    }

    fn set_seed(&mut self, seed: u64) -> Result<()> {
        env::set_var("PYTHONHASHSEED", seed.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct GlobalRng;

impl SeedSource for GlobalRng {
    fn name(&self) -> &'static str {
        "rand"
    }

    fn set_seed(&mut self, seed: u64) -> Result<()> {
        with_rng(|rng| *rng = StdRng::seed_from_u64(seed));
        Ok(())
    }
}

/// Python's `random` module and, when installed, `numpy.random`.
#[derive(Debug, Default)]
pub struct PythonRandom;

fn numpy_available(py: Python<'_>) -> PyResult<bool> {
    let spec = py
        .import("importlib.util")?
        .call_method1("find_spec", ("numpy",))?;
    Ok(!spec.is_none())
}

impl SeedSource for PythonRandom {
    fn name(&self) -> &'static str {
        "python"
    }

    fn set_seed(&mut self, seed: u64) -> Result<()> {
        Python::with_gil(|py| {
            py.import("random")?.call_method1("seed", (seed,))?;

            if numpy_available(py)? {
                let numpy_seed = numpy_seed(seed);
                py.import("numpy.random")?
                    .call_method1("seed", (numpy_seed,))?;
            } else {
                debug!("numpy not installed, skipping numpy.random");
            }

            Ok(())
        })
    }
}

/// numpy only accepts 32-bit seeds; larger ones are reduced modulo 2^32.
fn numpy_seed(seed: u64) -> u32 {
    u32::try_from(seed).unwrap_or_else(|_| {
        let reduced = (seed % (1 << 32)) as u32;
        debug!(seed, reduced, "seed exceeds 32 bits, reduced for numpy");
        reduced
    })
}

/// The libtorch CPU generator plus every CUDA generator when a GPU is present.
#[derive(Debug)]
pub struct TorchRng {
    cuda_devices: Option<i64>,
}

impl TorchRng {
    #[must_use]
    pub fn probe() -> Self {
        let cuda_devices = tch::Cuda::is_available().then(tch::Cuda::device_count);
        Self { cuda_devices }
    }
}

impl SeedSource for TorchRng {
    fn name(&self) -> &'static str {
        "torch"
    }

    fn set_seed(&mut self, seed: u64) -> Result<()> {
        tch::manual_seed(seed as i64);
        if let Some(devices) = self.cuda_devices {
            tch::Cuda::manual_seed_all(seed);
            debug!(devices, "seeded cuda generators");
        }
        Ok(())
    }
}

/// Every source reachable from this process, [`HashSeed`] first.
#[must_use]
pub fn default_sources() -> Vec<Box<dyn SeedSource>> {
    vec![
        Box::new(HashSeed),
        Box::new(GlobalRng),
        Box::new(PythonRandom),
        Box::new(TorchRng::probe()),
    ]
}

/// Seeds each source in order. A source that fails is reported and skipped.
pub fn seed_all(sources: &mut [Box<dyn SeedSource>], seed: u64) {
    for source in sources.iter_mut() {
        match source.set_seed(seed) {
            Ok(()) => debug!(source = source.name(), seed, "seeded"),
            Err(err) => warn!(source = source.name(), error = %err, "failed to seed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use rand::Rng;

    use super::*;
    use crate::Error;

    struct Recording {
        seeds: Rc<RefCell<Vec<u64>>>,
    }

    impl SeedSource for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn set_seed(&mut self, seed: u64) -> Result<()> {
            self.seeds.borrow_mut().push(seed);
            Ok(())
        }
    }

    struct Broken {
        attempts: Rc<Cell<usize>>,
    }

    impl SeedSource for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn set_seed(&mut self, _: u64) -> Result<()> {
            self.attempts.set(self.attempts.get() + 1);
            Err(Error::Env("generator unavailable".to_owned()))
        }
    }

    fn draw() -> u64 {
        with_rng(|rng| rng.random())
    }

    #[test]
    fn reseeding_repeats_the_sequence() {
        let mut sources: Vec<Box<dyn SeedSource>> = vec![Box::new(GlobalRng)];

        seed_all(&mut sources, 42);
        let first = draw();
        seed_all(&mut sources, 42);
        let second = draw();

        assert_eq!(first, second);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut sources: Vec<Box<dyn SeedSource>> = vec![Box::new(GlobalRng)];

        seed_all(&mut sources, 1);
        let first = draw();
        seed_all(&mut sources, 2);
        let second = draw();

        assert_ne!(first, second);
    }

    #[test]
    fn a_failing_source_does_not_stop_the_rest() {
        let seeds = Rc::new(RefCell::new(Vec::new()));
        let attempts = Rc::new(Cell::new(0));
        let mut sources: Vec<Box<dyn SeedSource>> = vec![
            Box::new(Broken {
                attempts: Rc::clone(&attempts),
            }),
            Box::new(Recording {
                seeds: Rc::clone(&seeds),
            }),
        ];

        seed_all(&mut sources, 7);

        assert_eq!(attempts.get(), 1);
        assert_eq!(*seeds.borrow(), vec![7]);
    }

    #[test]
    fn empty_registry_is_fine() {
        seed_all(&mut [], 42);
    }

    #[test]
    fn hash_seed_is_exported() {
        HashSeed.set_seed(1234).unwrap();
        assert_eq!(env::var("PYTHONHASHSEED").unwrap(), "1234");
    }

    #[test]
    fn hash_seed_leads_the_default_sources() {
        let names = default_sources()
            .iter()
            .map(|source| source.name())
            .collect::<Vec<_>>();

        assert_eq!(names, ["PYTHONHASHSEED", "rand", "python", "torch"]);
    }

    #[test]
    fn torch_draws_repeat_after_reseeding() {
        let _torch = crate::TORCH_RNG.lock().unwrap_or_else(|err| err.into_inner());
        let mut sources: Vec<Box<dyn SeedSource>> = vec![Box::new(TorchRng::probe())];
        let draw = || tch::Tensor::rand([4], (tch::Kind::Float, tch::Device::Cpu));

        seed_all(&mut sources, 42);
        let first = draw();
        seed_all(&mut sources, 42);
        let second = draw();

        assert!(first.equal(&second));
    }

    #[test]
    fn numpy_seeds_wrap_at_32_bits() {
        assert_eq!(numpy_seed(42), 42);
        assert_eq!(numpy_seed(u64::from(u32::MAX)), u32::MAX);
        assert_eq!(numpy_seed(1 << 32), 0);
        assert_eq!(numpy_seed((1 << 32) + 7), 7);
    }
}
