use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backup::queue::{BackupInvocation, InvocationReceiver};
use crate::backup::service::{BackupService, ResumeOutcome};

/// Counts of invocations handled by a [`BackupWorker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub continued: usize,
    pub completed: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl WorkerSummary {
    pub fn processed(&self) -> usize {
        self.continued + self.completed + self.not_found + self.failed
    }
}

/// Drains backup invocations and runs them one at a time.
///
/// A failed invocation leaves its progress record untouched; it is logged and not
/// retried by the worker.
#[derive(Debug)]
pub struct BackupWorker {
    service: Arc<BackupService>,
    receiver: InvocationReceiver,
}

impl BackupWorker {
    pub fn new(service: Arc<BackupService>, receiver: InvocationReceiver) -> Self {
        Self { service, receiver }
    }

    /// Processes invocations until the queue is empty, including continuations queued
    /// while processing.
    pub async fn run_until_idle(&mut self) -> WorkerSummary {
        let mut summary = WorkerSummary::default();
        while let Some(invocation) = self.receiver.try_recv() {
            self.process(invocation, &mut summary).await;
        }

        summary
    }

    /// Processes invocations until `shutdown` resolves or every queue handle is dropped.
    pub async fn run<F>(mut self, shutdown: F) -> WorkerSummary
    where
        F: Future<Output = ()>,
    {
        let mut summary = WorkerSummary::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(pending = self.receiver.len(), "shutting down backup worker");
                    break;
                }
                invocation = self.receiver.recv() => {
                    let Some(invocation) = invocation else {
                        info!("invocation queue closed, stopping backup worker");
                        break;
                    };
                    self.process(invocation, &mut summary).await;
                }
            }
        }

        summary
    }

    async fn process(&self, invocation: BackupInvocation, summary: &mut WorkerSummary) {
        let operation_id = invocation.operation_id;
        match self.service.resume(operation_id).await {
            Ok(ResumeOutcome::Continued(_)) => {
                debug!(%operation_id, "backup invocation yielded, continuation queued");
                summary.continued += 1;
            }
            Ok(ResumeOutcome::Complete) => {
                info!(%operation_id, "table backup complete");
                summary.completed += 1;
            }
            Ok(ResumeOutcome::NotFound) => {
                warn!(%operation_id, "dropping invocation for unknown operation");
                summary.not_found += 1;
            }
            Err(err) => {
                error!(%operation_id, error = %err, "backup invocation failed");
                summary.failed += 1;
            }
        }
    }
}
