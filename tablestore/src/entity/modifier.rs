use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::entity::{Entity, EntityDescriptor, MemberInfo};
use crate::error::{ErrorKind, TableError, TableResult};
use crate::store::TableClient;
use crate::table_error;
use crate::types::PropertyBag;

/// The store write a modifier runs in front of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOperation {
    Create,
    InsertOrReplace,
    Update,
    Delete,
}

impl fmt::Display for SaveOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveOperation::Create => "create",
            SaveOperation::InsertOrReplace => "insert_or_replace",
            SaveOperation::Update => "update",
            SaveOperation::Delete => "delete",
        };

        f.write_str(name)
    }
}

/// Progress of a save that involves modifiers.
///
/// `Pending -> ExecutingModifiers -> StoreWrite -> Committed` on success, or
/// `ExecutingModifiers -> RollingBack -> Failed` when a modifier or the store write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Pending,
    ExecutingModifiers,
    StoreWrite,
    Committed,
    RollingBack,
    Failed,
}

impl fmt::Display for SavePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SavePhase::Pending => "pending",
            SavePhase::ExecutingModifiers => "executing_modifiers",
            SavePhase::StoreWrite => "store_write",
            SavePhase::Committed => "committed",
            SavePhase::RollingBack => "rolling_back",
            SavePhase::Failed => "failed",
        };

        f.write_str(name)
    }
}

/// What a modifier sees of the save it runs in front of.
pub struct ModifierContext<'a, T: Entity> {
    pub operation: SaveOperation,
    pub partition_key: &'a str,
    pub row_key: &'a str,
    /// The stored entity and its properties, for updates and deletes.
    pub old: Option<(&'a T, &'a PropertyBag)>,
    /// The entity being written and its properties, for creates, replaces and updates.
    pub new: Option<(&'a T, &'a PropertyBag)>,
    pub table: &'a Arc<dyn TableClient>,
}

/// Side effect attached to a member that runs before the entity is written.
///
/// Each hook returns the [`Rollback`] that undoes its effect. Hooks that are not
/// implemented do nothing.
#[async_trait]
pub trait SaveModifier<T: Entity>: Send + Sync {
    async fn on_create(
        &self,
        _member: &MemberInfo,
        _context: &ModifierContext<'_, T>,
    ) -> TableResult<Rollback> {
        Ok(Rollback::none())
    }

    async fn on_insert_or_replace(
        &self,
        _member: &MemberInfo,
        _context: &ModifierContext<'_, T>,
    ) -> TableResult<Rollback> {
        Ok(Rollback::none())
    }

    async fn on_update(
        &self,
        _member: &MemberInfo,
        _context: &ModifierContext<'_, T>,
    ) -> TableResult<Rollback> {
        Ok(Rollback::none())
    }

    async fn on_delete(
        &self,
        _member: &MemberInfo,
        _context: &ModifierContext<'_, T>,
    ) -> TableResult<Rollback> {
        Ok(Rollback::none())
    }
}

type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, TableResult<()>> + Send>;

/// Compensating actions that undo modifier side effects, run in reverse registration order.
#[derive(Default)]
pub struct Rollback {
    steps: Vec<(String, Compensation)>,
}

impl Rollback {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<F, Fut>(label: impl Into<String>, compensation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TableResult<()>> + Send + 'static,
    {
        let compensation: Compensation = Box::new(move || Box::pin(compensation()));

        Self {
            steps: vec![(label.into(), compensation)],
        }
    }

    /// Appends `other`, whose steps will run before the steps already held.
    pub fn append(&mut self, other: Rollback) {
        self.steps.extend(other.steps);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step, newest first. Failing steps are logged and do not stop the others.
    pub async fn run(self) -> TableResult<()> {
        let mut errors = Vec::new();

        for (label, compensation) in self.steps.into_iter().rev() {
            match compensation().await {
                Ok(()) => debug!(step = %label, "rollback step completed"),
                Err(err) => {
                    warn!(step = %label, error = %err, "rollback step failed");
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            return Ok(());
        }

        Err(table_error!(
            ErrorKind::RollbackFailed,
            "Rollback did not complete",
            format!("{} step(s) failed", errors.len()),
            source: TableError::from(errors)
        ))
    }
}

impl fmt::Debug for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|(label, _)| label))
            .finish()
    }
}

/// A modifier failure, after the modifiers that had already run were rolled back.
#[derive(Debug, Clone)]
pub struct ModifierFailure {
    /// Name of the member whose modifier failed.
    pub member: String,
    pub error: TableError,
    /// Set when undoing the earlier modifiers failed too.
    pub rollback_error: Option<TableError>,
}

impl fmt::Display for ModifierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "modifier of member `{}` failed: {}", self.member, self.error)
    }
}

/// Runs the modifiers of every member, in member order, for `context.operation`.
///
/// The first failure stops execution and rolls back the modifiers that already succeeded.
/// On success the combined [`Rollback`] is returned for use if the store write fails.
pub async fn execute_modifiers<T: Entity>(
    descriptor: &EntityDescriptor<T>,
    context: &ModifierContext<'_, T>,
) -> Result<Rollback, ModifierFailure> {
    let mut rollback = Rollback::none();

    for member in descriptor.members() {
        for modifier in &member.modifiers {
            let info = member.info();
            let result = match context.operation {
                SaveOperation::Create => modifier.on_create(info, context).await,
                SaveOperation::InsertOrReplace => {
                    modifier.on_insert_or_replace(info, context).await
                }
                SaveOperation::Update => modifier.on_update(info, context).await,
                SaveOperation::Delete => modifier.on_delete(info, context).await,
            };

            match result {
                Ok(step) => rollback.append(step),
                Err(error) => {
                    warn!(
                        entity_type = descriptor.type_name(),
                        member = %info.name,
                        operation = %context.operation,
                        phase = %SavePhase::RollingBack,
                        error = %error,
                        "save modifier failed, rolling back"
                    );

                    let rollback_error = rollback.run().await.err();
                    return Err(ModifierFailure {
                        member: info.name.clone(),
                        error,
                        rollback_error,
                    });
                }
            }
        }
    }

    Ok(rollback)
}
