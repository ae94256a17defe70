//! Shard / skip / limit / sample / shuffle pipeline (§4.E), composed as
//! wrappers around anything that yields `Instance`s.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::instance::Instance;

/// The minimal contract a pipeline stage both consumes and provides:
/// pull the next instance, or reset to the beginning. `Send` so a boxed
/// pipeline can move into the parallel engine's producer thread (§4.F).
pub trait InstanceSource: Send {
    fn read(&mut self) -> Result<Option<Instance>>;
    fn reset(&mut self);
}

impl InstanceSource for crate::instance::InstanceReader {
    fn read(&mut self) -> Result<Option<Instance>> {
        crate::instance::InstanceReader::read(self)
    }
    fn reset(&mut self) {
        crate::instance::InstanceReader::reset(self)
    }
}

impl<S: InstanceSource + ?Sized> InstanceSource for Box<S> {
    fn read(&mut self) -> Result<Option<Instance>> {
        (**self).read()
    }
    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Discards the first `k` instances after each reset.
pub struct Skip<S> {
    inner: S,
    k: usize,
    remaining: usize,
}

impl<S: InstanceSource> Skip<S> {
    pub fn new(inner: S, k: usize) -> Skip<S> {
        Skip {
            inner,
            k,
            remaining: k,
        }
    }
}

impl<S: InstanceSource> InstanceSource for Skip<S> {
    fn read(&mut self) -> Result<Option<Instance>> {
        while self.remaining > 0 {
            self.remaining -= 1;
            if self.inner.read()?.is_none() {
                return Ok(None);
            }
        }
        self.inner.read()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.remaining = self.k;
    }
}

/// Emits at most `m` instances, then reports EOF.
pub struct Limit<S> {
    inner: S,
    m: usize,
    emitted: usize,
}

impl<S: InstanceSource> Limit<S> {
    pub fn new(inner: S, m: usize) -> Limit<S> {
        Limit {
            inner,
            m,
            emitted: 0,
        }
    }
}

impl<S: InstanceSource> InstanceSource for Limit<S> {
    fn read(&mut self) -> Result<Option<Instance>> {
        if self.emitted >= self.m {
            return Ok(None);
        }
        let next = self.inner.read()?;
        if next.is_some() {
            self.emitted += 1;
        }
        Ok(next)
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.emitted = 0;
    }
}

/// Passes through only instances whose global index satisfies
/// `index mod n == i`.
pub struct Shard<S> {
    inner: S,
    i: usize,
    n: usize,
    index: usize,
}

impl<S: InstanceSource> Shard<S> {
    pub fn new(inner: S, i: usize, n: usize) -> Shard<S> {
        assert!(n > 0, "Shard requires n > 0");
        Shard {
            inner,
            i,
            n,
            index: 0,
        }
    }
}

impl<S: InstanceSource> InstanceSource for Shard<S> {
    fn read(&mut self) -> Result<Option<Instance>> {
        loop {
            let Some(instance) = self.inner.read()? else {
                return Ok(None);
            };
            let keep = self.index % self.n == self.i;
            self.index += 1;
            if keep {
                return Ok(Some(instance));
            }
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.index = 0;
    }
}

/// Bernoulli-samples each instance independently with probability `r`.
pub struct Sample<S> {
    inner: S,
    r: f64,
    seed: u64,
    rng: StdRng,
}

impl<S: InstanceSource> Sample<S> {
    pub fn new(inner: S, r: f64, seed: u64) -> Sample<S> {
        assert!(r > 0.0 && r <= 1.0, "Sample ratio must be in (0, 1]");
        Sample {
            inner,
            r,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<S: InstanceSource> InstanceSource for Sample<S> {
    fn read(&mut self) -> Result<Option<Instance>> {
        loop {
            let Some(instance) = self.inner.read()? else {
                return Ok(None);
            };
            if self.rng.gen_bool(self.r) {
                return Ok(Some(instance));
            }
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

/// A reservoir (windowed) or perfect (whole-epoch) shuffle (§4.E).
pub enum Shuffle<S> {
    Windowed {
        inner: S,
        window: usize,
        reservoir: Vec<Instance>,
        source_drained: bool,
        seed: u64,
        reshuffle_each_epoch: bool,
        rng: StdRng,
    },
    Perfect {
        inner: S,
        epoch: Vec<Instance>,
        cursor: usize,
        materialized: bool,
        seed: u64,
        reshuffle_each_epoch: bool,
        rng: StdRng,
    },
}

impl<S: InstanceSource> Shuffle<S> {
    /// `window == 0` selects the perfect-shuffle strategy.
    pub fn new(inner: S, window: usize, seed: u64, reshuffle_each_epoch: bool) -> Shuffle<S> {
        let rng = StdRng::seed_from_u64(seed);
        if window == 0 {
            Shuffle::Perfect {
                inner,
                epoch: Vec::new(),
                cursor: 0,
                materialized: false,
                seed,
                reshuffle_each_epoch,
                rng,
            }
        } else {
            Shuffle::Windowed {
                inner,
                window,
                reservoir: Vec::with_capacity(window),
                source_drained: false,
                seed,
                reshuffle_each_epoch,
                rng,
            }
        }
    }
}

impl<S: InstanceSource> InstanceSource for Shuffle<S> {
    fn read(&mut self) -> Result<Option<Instance>> {
        match self {
            Shuffle::Windowed {
                inner,
                window,
                reservoir,
                source_drained,
                rng,
                ..
            } => {
                if !*source_drained && reservoir.len() < *window {
                    while reservoir.len() < *window {
                        match inner.read()? {
                            Some(i) => reservoir.push(i),
                            None => {
                                *source_drained = true;
                                break;
                            }
                        }
                    }
                }

                if reservoir.is_empty() {
                    return Ok(None);
                }

                let j = rng.gen_range(0..reservoir.len());
                let chosen = if *source_drained {
                    reservoir.remove(j)
                } else {
                    let replacement = inner.read()?;
                    match replacement {
                        Some(fresh) => std::mem::replace(&mut reservoir[j], fresh),
                        None => {
                            *source_drained = true;
                            reservoir.remove(j)
                        }
                    }
                };
                Ok(Some(chosen))
            }
            Shuffle::Perfect {
                inner,
                epoch,
                cursor,
                materialized,
                rng,
                ..
            } => {
                if !*materialized {
                    while let Some(i) = inner.read()? {
                        epoch.push(i);
                    }
                    // Fisher-Yates.
                    for idx in (1..epoch.len()).rev() {
                        let j = rng.gen_range(0..=idx);
                        epoch.swap(idx, j);
                    }
                    *materialized = true;
                    *cursor = 0;
                }
                if *cursor >= epoch.len() {
                    return Ok(None);
                }
                let instance = epoch[*cursor].clone();
                *cursor += 1;
                Ok(Some(instance))
            }
        }
    }

    fn reset(&mut self) {
        match self {
            Shuffle::Windowed {
                inner,
                reservoir,
                source_drained,
                seed,
                reshuffle_each_epoch,
                rng,
                ..
            } => {
                inner.reset();
                reservoir.clear();
                *source_drained = false;
                if *reshuffle_each_epoch {
                    *seed = rand::thread_rng().gen();
                }
                *rng = StdRng::seed_from_u64(*seed);
            }
            Shuffle::Perfect {
                inner,
                epoch,
                cursor,
                materialized,
                seed,
                reshuffle_each_epoch,
                rng,
                ..
            } => {
                inner.reset();
                epoch.clear();
                *cursor = 0;
                *materialized = false;
                if *reshuffle_each_epoch {
                    *seed = rand::thread_rng().gen();
                }
                *rng = StdRng::seed_from_u64(*seed);
            }
        }
    }
}
