use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, TableResult};

/// Request to run one more bounded copy invocation of a table backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackupInvocation {
    pub operation_id: Uuid,
}

/// Destination of continuation requests.
#[async_trait]
pub trait InvocationQueue: Debug + Send + Sync {
    async fn enqueue(&self, invocation: BackupInvocation) -> TableResult<()>;
}

/// In-process queue backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelInvocationQueue {
    tx: mpsc::UnboundedSender<BackupInvocation>,
}

/// Receiving half of a [`ChannelInvocationQueue`].
#[derive(Debug)]
pub struct InvocationReceiver {
    rx: mpsc::UnboundedReceiver<BackupInvocation>,
}

impl ChannelInvocationQueue {
    pub fn channel() -> (Self, InvocationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();

        (Self { tx }, InvocationReceiver { rx })
    }
}

#[async_trait]
impl InvocationQueue for ChannelInvocationQueue {
    async fn enqueue(&self, invocation: BackupInvocation) -> TableResult<()> {
        if self.tx.send(invocation).is_err() {
            bail!(
                ErrorKind::InvalidState,
                "Invocation queue is closed",
                invocation.operation_id
            );
        }

        Ok(())
    }
}

impl InvocationReceiver {
    /// Waits for the next invocation; `None` once every queue handle is dropped.
    pub async fn recv(&mut self) -> Option<BackupInvocation> {
        self.rx.recv().await
    }

    /// Returns an already queued invocation without waiting.
    pub fn try_recv(&mut self) -> Option<BackupInvocation> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_fails_once_receiver_is_gone() {
        let (queue, mut receiver) = ChannelInvocationQueue::channel();
        let invocation = BackupInvocation {
            operation_id: Uuid::new_v4(),
        };

        queue.enqueue(invocation).await.unwrap();
        assert_eq!(receiver.try_recv(), Some(invocation));
        assert!(receiver.is_empty());

        drop(receiver);
        let error = queue.enqueue(invocation).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidState);
    }
}
