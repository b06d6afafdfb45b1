//! Entity descriptors, the generic table entity wrapper and save modifiers.
//!
//! An [`EntityDescriptor`] is the per-type registry of members: how to read and write each
//! one and which roles it plays (row key, partition key, scope contribution, timestamp,
//! etag, stored property, save modifiers). It is built and validated once, then shared.

mod descriptor;
mod member;
mod modifier;
mod wrapper;

pub use descriptor::{EntityDescriptor, EntityDescriptorBuilder, KeySource};
pub use member::{Member, MemberInfo};
pub use modifier::{
    ModifierContext, ModifierFailure, Rollback, SaveModifier, SaveOperation, SavePhase,
    execute_modifiers,
};
pub use wrapper::TableEntity;

/// Types that can be stored through an [`EntityDescriptor`].
pub trait Entity: Send + Sync + 'static {}

impl<T> Entity for T where T: Send + Sync + 'static {}
