//! Outcome sinks
//!
//! The dispatcher streams every finished work item to a [`Sink`]. Sinks must
//! tolerate concurrent `record` calls; a sink failure is logged by the caller
//! and never affects other work.

mod jsonl;
mod postgres;

pub use jsonl::{JsonLinesSink, StdoutSink};
pub use postgres::PostgresSink;

use crate::resource::RunOutcome;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

/// Destination for run outcomes
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist one outcome of run `run_id`
    async fn record(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<()>;
}

/// Collects outcomes in memory
#[derive(Clone, Default)]
pub struct MemorySink {
    outcomes: Arc<Mutex<Vec<(Uuid, RunOutcome)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes recorded so far
    pub fn outcomes(&self) -> Vec<RunOutcome> {
        self.lock().iter().map(|(_, o)| o.clone()).collect()
    }

    pub fn run_ids(&self) -> Vec<Uuid> {
        self.lock().iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Uuid, RunOutcome)>> {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn record(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<()> {
        self.lock().push((run_id, outcome.clone()));
        Ok(())
    }
}

/// Records into several sinks
///
/// Every sink is attempted; failures are logged and the first one is
/// returned.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl Sink for FanoutSink {
    async fn record(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(run_id, outcome).await {
                warn!("Sink failed for {}: {:#}", outcome.label(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
