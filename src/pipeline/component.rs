//! Component abstraction for the pipeline.
//!
//! Every node in a chain exposes the same capability interface:
//! - **`push`**: accept one input message for the current iteration.
//! - **`pull`**: hand back one previously produced output, `Ok(None)` once
//!   nothing more is available this pass.
//! - **`destroy`**: release every buffered message, session and resource.
//!
//! Initialization takes a kind-specific configuration, so it lives in the
//! separate [`Initialize`] trait. Pure sources only pull, pure sinks only push;
//! a sink's `pull` always reports exhausted.
//!
//! The helpers below ([`IterationTracker`], [`Diagnostics`], [`Lifecycle`])
//! carry the bookkeeping that every component needs.

use crate::error::{MediaFlowError, Result};
use crate::pipeline::id::Iteration;
use crate::pipeline::message::MediaMessage;

/// Capability interface shared by all component kinds.
///
/// Calls on one instance are never interleaved; the driving context may be
/// any thread, hence `Send`.
pub trait Component: Send {
    /// Human-readable name of this component.
    fn name(&self) -> &str;

    /// Whether `init` has succeeded and `destroy` has not run since.
    fn is_initialized(&self) -> bool;

    /// Deliver one input. On error nothing observable changes.
    fn push(&mut self, iteration: Iteration, message: MediaMessage) -> Result<()>;

    /// Retrieve the next undelivered output. `Ok(None)` means exhausted.
    fn pull(&mut self, iteration: Iteration) -> Result<Option<MediaMessage>>;

    /// Tear down. Nothing buffered or tracked survives a successful call.
    fn destroy(&mut self) -> Result<()>;

    /// Display string of the most recent failure.
    fn last_error(&self) -> Option<&str>;
}

/// Kind-specific initialization.
pub trait Initialize {
    type Config;

    /// Fails without side effects when already initialized.
    fn init(&mut self, config: Self::Config) -> Result<()>;
}

/// Initialized / not initialized, with the error strings components share.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Initialized,
}

impl Lifecycle {
    pub fn is_initialized(self) -> bool {
        self == Lifecycle::Initialized
    }

    /// Error unless not yet initialized.
    pub fn ensure_uninitialized(self, component: &str) -> Result<()> {
        match self {
            Lifecycle::Uninitialized => Ok(()),
            Lifecycle::Initialized => Err(MediaFlowError::config(format!(
                "{} is already initialized",
                component
            ))),
        }
    }

    /// Error unless initialized.
    pub fn ensure_initialized(self, component: &str) -> Result<()> {
        match self {
            Lifecycle::Initialized => Ok(()),
            Lifecycle::Uninitialized => Err(MediaFlowError::config(format!(
                "{} is not initialized",
                component
            ))),
        }
    }
}

/// How an observed iteration relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStep {
    First,
    Same,
    Next,
    /// `gap` iterations were never observed.
    Skipped { gap: u64 },
}

/// Tracks the highest iteration a component has seen.
///
/// [`check`](Self::check) is side-effect free so a push can validate first
/// and [`commit`](Self::commit) only once it succeeds.
#[derive(Debug, Default, Clone)]
pub struct IterationTracker {
    last: Option<Iteration>,
}

impl IterationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Iteration> {
        self.last
    }

    pub fn check(&self, iteration: Iteration) -> Result<IterationStep> {
        let Some(previous) = self.last else {
            return Ok(IterationStep::First);
        };
        if iteration < previous {
            return Err(MediaFlowError::IterationRegression {
                previous,
                received: iteration,
            });
        }
        Ok(match iteration.distance_from(previous) {
            0 => IterationStep::Same,
            1 => IterationStep::Next,
            n => IterationStep::Skipped { gap: n - 1 },
        })
    }

    pub fn commit(&mut self, iteration: Iteration) {
        match self.last {
            Some(last) if iteration <= last => {}
            _ => self.last = Some(iteration),
        }
    }

    /// Check and commit in one step.
    pub fn observe(&mut self, iteration: Iteration) -> Result<IterationStep> {
        let step = self.check(iteration)?;
        self.commit(iteration);
        Ok(step)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Keeps the display string of a component's most recent failure.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    last_error: Option<String>,
}

impl Diagnostics {
    /// Pass `result` through, remembering the error if there is one.
    pub fn record<T>(&mut self, component: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::warn!("{}: {}", component, e);
            self.last_error = Some(e.to_string());
        }
        result
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
