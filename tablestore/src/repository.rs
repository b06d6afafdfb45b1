//! Typed storage of entities through their descriptor.
//!
//! [`EntityRepository`] turns descriptor-mapped entities into rows and back and runs save
//! modifiers around every write. Expected conditions such as a missing entity or a lost
//! create race are reported as outcomes; only store and configuration failures are errors.

use std::sync::Arc;

use config::shared::RepositoryConfig;
use tracing::{debug, error, warn};

use crate::entity::{
    Entity, EntityDescriptor, ModifierContext, ModifierFailure, Rollback, SaveOperation,
    SavePhase, TableEntity, execute_modifiers,
};
use crate::error::{ErrorKind, TableError, TableResult};
use crate::query::{Condition, translate};
use crate::store::{TableClient, TableQuery};
use crate::types::{ANY_ETAG, ContinuationToken, TableRow, Value};
use crate::{bail, table_error};

#[derive(Debug)]
pub enum CreateOutcome<T> {
    Created(T),
    AlreadyExists,
    ModifierFailed(ModifierFailure),
}

#[derive(Debug)]
pub enum InsertOrReplaceOutcome<T> {
    Saved(T),
    ModifierFailed(ModifierFailure),
}

#[derive(Debug)]
pub enum UpdateOutcome<T> {
    Updated(T),
    NotFound,
    ModifierFailed(ModifierFailure),
}

#[derive(Debug)]
pub enum DeleteOutcome<T> {
    Deleted(T),
    NotFound,
    ModifierFailed(ModifierFailure),
}

/// Stores entities of type `T` in one table.
#[derive(Debug, Clone)]
pub struct EntityRepository<T: Entity> {
    descriptor: Arc<EntityDescriptor<T>>,
    table: Arc<dyn TableClient>,
    config: RepositoryConfig,
}

impl<T> EntityRepository<T>
where
    T: Entity + Default + Clone,
{
    pub fn new(
        descriptor: Arc<EntityDescriptor<T>>,
        table: Arc<dyn TableClient>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            descriptor,
            table,
            config,
        }
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor<T>> {
        &self.descriptor
    }

    pub fn table(&self) -> &Arc<dyn TableClient> {
        &self.table
    }

    /// Creates the backing table if needed.
    pub async fn ensure_table(&self) -> TableResult<()> {
        if self.table.create_if_not_exists().await? {
            debug!(table_name = self.table.name(), "created table");
        }

        Ok(())
    }

    /// Inserts a new entity, leaving an existing one with the same keys untouched.
    pub async fn create(&self, entity: T) -> TableResult<CreateOutcome<T>> {
        let mut wrapper = TableEntity::new(self.descriptor.clone(), entity);
        let row = wrapper.write_entity()?;

        let context = ModifierContext {
            operation: SaveOperation::Create,
            partition_key: &row.partition_key,
            row_key: &row.row_key,
            old: None,
            new: Some((wrapper.entity(), &row.properties)),
            table: &self.table,
        };
        let rollback = match self.run_modifiers(&context).await {
            Ok(rollback) => rollback,
            Err(failure) => return Ok(CreateOutcome::ModifierFailed(failure)),
        };

        self.log_phase(SaveOperation::Create, SavePhase::StoreWrite, &row);
        match self.table.create(row.clone()).await {
            Ok(written) => {
                self.log_phase(SaveOperation::Create, SavePhase::Committed, &written);
                wrapper.apply_written(&written)?;
                Ok(CreateOutcome::Created(wrapper.into_inner()))
            }
            Err(err) if err.kind() == ErrorKind::EntityAlreadyExists => {
                self.abandon(SaveOperation::Create, rollback, &row).await;
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(err) => {
                self.abandon(SaveOperation::Create, rollback, &row).await;
                Err(err)
            }
        }
    }

    /// Writes the entity whether or not it exists.
    pub async fn insert_or_replace(&self, entity: T) -> TableResult<InsertOrReplaceOutcome<T>> {
        let mut wrapper = TableEntity::new(self.descriptor.clone(), entity);
        let row = wrapper.write_entity()?;
        let existing = self.table.retrieve(&row.partition_key, &row.row_key).await?;
        let old = existing
            .as_ref()
            .map(|stored| Ok::<_, TableError>((self.descriptor.read_row(stored)?, stored)))
            .transpose()?;

        let context = ModifierContext {
            operation: SaveOperation::InsertOrReplace,
            partition_key: &row.partition_key,
            row_key: &row.row_key,
            old: old.as_ref().map(|(entity, stored)| (entity, &stored.properties)),
            new: Some((wrapper.entity(), &row.properties)),
            table: &self.table,
        };
        let rollback = match self.run_modifiers(&context).await {
            Ok(rollback) => rollback,
            Err(failure) => return Ok(InsertOrReplaceOutcome::ModifierFailed(failure)),
        };

        match self.table.insert_or_replace(row.clone()).await {
            Ok(written) => {
                self.log_phase(SaveOperation::InsertOrReplace, SavePhase::Committed, &written);
                wrapper.apply_written(&written)?;
                Ok(InsertOrReplaceOutcome::Saved(wrapper.into_inner()))
            }
            Err(err) => {
                self.abandon(SaveOperation::InsertOrReplace, rollback, &row).await;
                Err(err)
            }
        }
    }

    /// Reads the entity stored under the given keys.
    pub async fn get(&self, partition_key: &str, row_key: &str) -> TableResult<Option<T>> {
        let Some(row) = self.table.retrieve(partition_key, row_key).await? else {
            return Ok(None);
        };

        self.hydrate(&row).map(Some)
    }

    /// Reads the entity identified by `id`, computing its keys without loading anything.
    pub async fn get_by_id(&self, id: impl Into<Value>) -> TableResult<Option<T>> {
        let (partition_key, row_key) = self.descriptor.compute_keys(&id.into())?;

        self.get(&partition_key, &row_key).await
    }

    /// Applies `mutate` to the stored entity and replaces it, retrying when a concurrent
    /// write wins the etag race.
    ///
    /// `mutate` runs again on a fresh copy for every attempt and must not change the keys.
    pub async fn update<F>(&self, id: impl Into<Value>, mut mutate: F) -> TableResult<UpdateOutcome<T>>
    where
        F: FnMut(&mut T),
    {
        let (partition_key, row_key) = self.descriptor.compute_keys(&id.into())?;
        let attempts = self.config.max_update_attempts.max(1);

        for attempt in 1..=attempts {
            let Some(stored) = self.table.retrieve(&partition_key, &row_key).await? else {
                return Ok(UpdateOutcome::NotFound);
            };
            let old = TableEntity::read_entity(self.descriptor.clone(), &stored)?;

            let mut updated = old.clone();
            mutate(updated.entity_mut());
            let row = updated.write_entity()?;
            if row.key() != stored.key() {
                bail!(
                    ErrorKind::InvalidArgument,
                    "Updates must not change the entity keys",
                    format!(
                        "({}, {}) became ({}, {})",
                        stored.partition_key, stored.row_key, row.partition_key, row.row_key
                    )
                );
            }

            let context = ModifierContext {
                operation: SaveOperation::Update,
                partition_key: &row.partition_key,
                row_key: &row.row_key,
                old: Some((old.entity(), &stored.properties)),
                new: Some((updated.entity(), &row.properties)),
                table: &self.table,
            };
            let rollback = match self.run_modifiers(&context).await {
                Ok(rollback) => rollback,
                Err(failure) => return Ok(UpdateOutcome::ModifierFailed(failure)),
            };

            let etag = stored.etag.as_deref().unwrap_or(ANY_ETAG);
            match self.table.replace(row.clone(), etag).await {
                Ok(written) => {
                    self.log_phase(SaveOperation::Update, SavePhase::Committed, &written);
                    updated.apply_written(&written)?;
                    return Ok(UpdateOutcome::Updated(updated.into_inner()));
                }
                Err(err) if err.kind() == ErrorKind::EtagMismatch => {
                    self.abandon(SaveOperation::Update, rollback, &row).await;
                    debug!(
                        table_name = self.table.name(),
                        attempt,
                        attempts,
                        "update lost an etag race, retrying"
                    );
                }
                Err(err) if err.kind() == ErrorKind::EntityNotFound => {
                    self.abandon(SaveOperation::Update, rollback, &row).await;
                    return Ok(UpdateOutcome::NotFound);
                }
                Err(err) => {
                    self.abandon(SaveOperation::Update, rollback, &row).await;
                    return Err(err);
                }
            }
        }

        Err(table_error!(
            ErrorKind::EtagMismatch,
            "Update kept losing to concurrent writes",
            format!(
                "row ({partition_key}, {row_key}) in table {} after {attempts} attempt(s)",
                self.table.name()
            )
        ))
    }

    /// Deletes the entity identified by `id`.
    pub async fn delete(&self, id: impl Into<Value>) -> TableResult<DeleteOutcome<T>> {
        let (partition_key, row_key) = self.descriptor.compute_keys(&id.into())?;
        let attempts = self.config.max_update_attempts.max(1);

        for attempt in 1..=attempts {
            let Some(stored) = self.table.retrieve(&partition_key, &row_key).await? else {
                return Ok(DeleteOutcome::NotFound);
            };
            let old = self.hydrate(&stored)?;

            let context = ModifierContext {
                operation: SaveOperation::Delete,
                partition_key: &stored.partition_key,
                row_key: &stored.row_key,
                old: Some((&old, &stored.properties)),
                new: None,
                table: &self.table,
            };
            let rollback = match self.run_modifiers(&context).await {
                Ok(rollback) => rollback,
                Err(failure) => return Ok(DeleteOutcome::ModifierFailed(failure)),
            };

            let etag = stored.etag.as_deref().unwrap_or(ANY_ETAG);
            match self.table.delete(&partition_key, &row_key, etag).await {
                Ok(()) => {
                    self.log_phase(SaveOperation::Delete, SavePhase::Committed, &stored);
                    return Ok(DeleteOutcome::Deleted(old));
                }
                Err(err) if err.kind() == ErrorKind::EtagMismatch => {
                    self.abandon(SaveOperation::Delete, rollback, &stored).await;
                    debug!(
                        table_name = self.table.name(),
                        attempt,
                        attempts,
                        "delete lost an etag race, retrying"
                    );
                }
                Err(err) if err.kind() == ErrorKind::EntityNotFound => {
                    self.abandon(SaveOperation::Delete, rollback, &stored).await;
                    return Ok(DeleteOutcome::NotFound);
                }
                Err(err) => {
                    self.abandon(SaveOperation::Delete, rollback, &stored).await;
                    return Err(err);
                }
            }
        }

        Err(table_error!(
            ErrorKind::EtagMismatch,
            "Delete kept losing to concurrent writes",
            format!(
                "row ({partition_key}, {row_key}) in table {} after {attempts} attempt(s)",
                self.table.name()
            )
        ))
    }

    /// Reads every entity of the table.
    pub async fn get_all(&self) -> TableResult<Vec<T>> {
        self.scan(&TableQuery::all(), |_| true).await
    }

    /// Reads the entities matching every condition.
    ///
    /// Conditions the store can evaluate are sent with the query; the rest are checked on
    /// the hydrated entities.
    pub async fn get_by(&self, conditions: &[Condition]) -> TableResult<Vec<T>> {
        let translated = translate(&self.descriptor, conditions)?;
        let query = TableQuery::filtered(translated.filter.clone());

        self.scan(&query, |entity| translated.matches(&self.descriptor, entity))
            .await
    }

    async fn scan(&self, query: &TableQuery, keep: impl Fn(&T) -> bool) -> TableResult<Vec<T>> {
        let mut entities = Vec::new();
        let mut continuation: Option<ContinuationToken> = None;

        loop {
            let segment = self.table.query_segment(query, continuation.as_ref()).await?;
            for row in &segment.rows {
                let entity = self.hydrate(row)?;
                if keep(&entity) {
                    entities.push(entity);
                }
            }

            continuation = segment.continuation;
            if continuation.is_none() {
                break;
            }
        }

        Ok(entities)
    }

    fn hydrate(&self, row: &TableRow) -> TableResult<T> {
        Ok(TableEntity::read_entity(self.descriptor.clone(), row)?.into_inner())
    }

    async fn run_modifiers(
        &self,
        context: &ModifierContext<'_, T>,
    ) -> Result<Rollback, ModifierFailure> {
        debug!(
            entity_type = self.descriptor.type_name(),
            operation = %context.operation,
            phase = %SavePhase::ExecutingModifiers,
            "running save modifiers"
        );

        execute_modifiers(&self.descriptor, context).await
    }

    /// Undoes the modifiers of a save whose store write did not happen.
    async fn abandon(&self, operation: SaveOperation, rollback: Rollback, row: &TableRow) {
        if rollback.is_empty() {
            return;
        }

        warn!(
            table_name = self.table.name(),
            partition_key = %row.partition_key,
            row_key = %row.row_key,
            operation = %operation,
            phase = %SavePhase::RollingBack,
            steps = rollback.len(),
            "store write failed, rolling back modifiers"
        );

        if let Err(err) = rollback.run().await {
            error!(
                table_name = self.table.name(),
                operation = %operation,
                phase = %SavePhase::Failed,
                error = %err,
                "rollback after failed store write did not complete"
            );
        }
    }

    fn log_phase(&self, operation: SaveOperation, phase: SavePhase, row: &TableRow) {
        debug!(
            table_name = self.table.name(),
            partition_key = %row.partition_key,
            row_key = %row.row_key,
            operation = %operation,
            phase = %phase,
            "save progressed"
        );
    }
}
