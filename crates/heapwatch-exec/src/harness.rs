//! Harness: wires registry, watcher, population, and simulator together.
//!
//! Process-level state machine:
//! `Configuring -> Running -> Exhausted | Interrupted`. Terminal states are
//! final; a harness runs at most once, so thresholds are installed once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use heapwatch_core::config::HarnessConfig;
use heapwatch_core::error::Error as CoreError;
use heapwatch_core::manager::MemoryManager;

use crate::population::{PopulationOf, ReferencePopulation};
use crate::registry::{PoolRegistry, Registration};
use crate::reporter::Reporter;
use crate::simulator::{Coin, PressureSimulator, RunOutcome, SeededCoin};
use crate::stop::StopToken;
use crate::watcher::ThresholdWatcher;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(#[source] CoreError),
    #[error("threshold setup failed: {0}")]
    Setup(#[source] CoreError),
    #[error("invalid state transition: {from:?} -> {to:?}")]
    State { from: HarnessState, to: HarnessState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessState {
    Configuring,
    Running,
    Exhausted,
    Interrupted,
}

impl HarnessState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HarnessState::Exhausted | HarnessState::Interrupted)
    }

    /// Validate `self -> next`.
    pub fn transition(self, next: HarnessState) -> Result<HarnessState, HarnessError> {
        use HarnessState::*;
        match (self, next) {
            (Configuring, Running) | (Running, Exhausted) | (Running, Interrupted) => Ok(next),
            (from, to) => Err(HarnessError::State { from, to }),
        }
    }
}

#[derive(Debug)]
pub struct HarnessReport {
    pub state: HarnessState,
    pub registration: Registration,
    pub outcome: RunOutcome,
    /// Threshold notifications that produced a report, counted after the
    /// manager's pending notifications were delivered.
    pub threshold_reports: u64,
}

pub struct Harness<M: MemoryManager> {
    cfg: HarnessConfig,
    manager: Arc<M>,
    reporter: Arc<dyn Reporter>,
    population: Arc<PopulationOf<M>>,
    state: HarnessState,
}

impl<M: MemoryManager> Harness<M> {
    pub fn new(cfg: HarnessConfig, manager: Arc<M>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            cfg,
            manager,
            reporter,
            population: Arc::new(ReferencePopulation::new()),
            state: HarnessState::Configuring,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Run with the coin described by `cfg.seed`.
    pub fn run(&mut self, stop: &StopToken) -> Result<HarnessReport, HarnessError> {
        let mut coin = SeededCoin::new(self.cfg.seed);
        self.run_with(&mut coin, stop)
    }

    pub fn run_with(
        &mut self,
        coin: &mut impl Coin,
        stop: &StopToken,
    ) -> Result<HarnessReport, HarnessError> {
        if self.state != HarnessState::Configuring {
            return Err(HarnessError::State {
                from: self.state,
                to: HarnessState::Running,
            });
        }
        self.cfg.validate().map_err(HarnessError::Config)?;

        let registration = PoolRegistry::from_config(&self.cfg)
            .register(self.manager.as_ref())
            .map_err(HarnessError::Setup)?;
        let watcher = ThresholdWatcher::install(
            &self.manager,
            Arc::clone(&self.population),
            Arc::clone(&self.reporter),
            self.cfg.block_size,
        );
        self.state = self.state.transition(HarnessState::Running)?;

        let simulator = PressureSimulator::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.population),
            Arc::clone(&self.reporter),
            &self.cfg,
        );
        let outcome = simulator.run(coin, stop);
        // The final collection may still have notifications in flight.
        self.manager.flush_notifications();

        let terminal = match outcome {
            RunOutcome::Exhausted { .. } => HarnessState::Exhausted,
            RunOutcome::Interrupted { .. } => HarnessState::Interrupted,
        };
        self.state = self.state.transition(terminal)?;
        tracing::info!(state = ?self.state, allocations = outcome.allocations(), "harness finished");

        Ok(HarnessReport {
            state: self.state,
            registration,
            outcome,
            threshold_reports: watcher.handled(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HarnessState::*;

    #[test]
    fn only_forward_transitions_are_allowed() {
        assert_eq!(Configuring.transition(Running).unwrap(), Running);
        assert_eq!(Running.transition(Exhausted).unwrap(), Exhausted);
        assert_eq!(Running.transition(Interrupted).unwrap(), Interrupted);

        assert!(Configuring.transition(Exhausted).is_err());
        assert!(Exhausted.transition(Running).is_err());
        assert!(Interrupted.transition(Running).is_err());
        assert!(Exhausted.transition(Interrupted).is_err());
        assert!(Exhausted.is_terminal() && Interrupted.is_terminal());
        assert!(!Running.is_terminal());
    }
}
