//! The allocation loop.
//!
//! Each iteration flips a coin, allocates one block, and files it as retained
//! (heads) or reclaimable (tails). Every `report_interval` allocations it
//! reports and pauses. The loop ends when the manager reports exhaustion
//! (final report, normal return) or when a stop is requested during a pause
//! (no final report; the token stays signalled).

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use heapwatch_core::config::HarnessConfig;
use heapwatch_core::error::Exhausted;
use heapwatch_core::manager::MemoryManager;

use crate::population::{PopulationCounts, PopulationOf};
use crate::reporter::{Reporter, Snapshot};
use crate::stop::StopToken;

/// Source of the retained/reclaimable decision. `true` = retain.
pub trait Coin {
    fn flip(&mut self) -> bool;
}

/// Unbiased coin over a seeded (or entropy-seeded) `StdRng`.
pub struct SeededCoin {
    rng: StdRng,
}

impl SeededCoin {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl Coin for SeededCoin {
    fn flip(&mut self) -> bool {
        self.rng.gen::<bool>()
    }
}

/// Replays a fixed sequence of draws, cycling when it runs out.
#[derive(Debug, Clone)]
pub struct ScriptedCoin {
    draws: Vec<bool>,
    next: usize,
}

impl ScriptedCoin {
    pub fn new(draws: Vec<bool>) -> Self {
        assert!(!draws.is_empty(), "scripted coin needs at least one draw");
        Self { draws, next: 0 }
    }
}

impl Coin for ScriptedCoin {
    fn flip(&mut self) -> bool {
        let draw = self.draws[self.next % self.draws.len()];
        self.next += 1;
        draw
    }
}

/// How the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exhausted {
        allocations: u64,
        counts: PopulationCounts,
        cause: Exhausted,
    },
    Interrupted {
        allocations: u64,
    },
}

impl RunOutcome {
    pub fn allocations(&self) -> u64 {
        match self {
            RunOutcome::Exhausted { allocations, .. } | RunOutcome::Interrupted { allocations } => {
                *allocations
            }
        }
    }
}

pub struct PressureSimulator<M: MemoryManager> {
    manager: Arc<M>,
    population: Arc<PopulationOf<M>>,
    reporter: Arc<dyn Reporter>,
    block_size: usize,
    report_interval: u64,
    pause: Duration,
}

impl<M: MemoryManager> PressureSimulator<M> {
    pub fn new(
        manager: Arc<M>,
        population: Arc<PopulationOf<M>>,
        reporter: Arc<dyn Reporter>,
        cfg: &HarnessConfig,
    ) -> Self {
        Self {
            manager,
            population,
            reporter,
            block_size: cfg.block_size,
            report_interval: cfg.report_interval.max(1),
            pause: cfg.pause(),
        }
    }

    /// Allocate until exhaustion or interruption.
    pub fn run(&self, coin: &mut impl Coin, stop: &StopToken) -> RunOutcome {
        tracing::info!(
            block_size = self.block_size,
            report_interval = self.report_interval,
            pause_ms = self.pause.as_millis() as u64,
            "starting allocation loop"
        );
        let mut allocations: u64 = 0;

        loop {
            let retain = coin.flip();
            let block = match self.manager.allocate(self.block_size) {
                Ok(block) => block,
                Err(cause) => {
                    tracing::info!(allocations, error = %cause, "allocation refused; run complete");
                    let counts = self.population.counts();
                    self.reporter
                        .report(&Snapshot::final_report(allocations, counts, self.block_size));
                    return RunOutcome::Exhausted {
                        allocations,
                        counts,
                        cause,
                    };
                }
            };

            if retain {
                self.population.add_retained(block);
            } else {
                self.population
                    .add_reclaimable(self.manager.soften(block));
            }
            allocations += 1;

            if allocations % self.report_interval == 0 {
                self.reporter.report(&Snapshot::periodic(
                    allocations,
                    self.population.counts(),
                    self.block_size,
                ));
                if stop.sleep(self.pause).is_err() {
                    tracing::info!(allocations, "stop requested; leaving allocation loop");
                    return RunOutcome::Interrupted { allocations };
                }
            }
        }
    }
}
