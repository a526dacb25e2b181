//! Relations between entities.
//!
//! - **Metadata**: entity and relation descriptors behind the `MetadataProvider` seam
//! - **Cardinality**: `(kind, owner)` resolved once into an exhaustive variant
//! - **Resolver**: which relations a filter reaches into
//! - **Linker**: the condition selecting related rows for one source entity
//! - **Batch**: per-entity selections dispatched on coroutines and joined

pub mod batch;
pub mod cardinality;
pub mod linker;
pub mod metadata;
pub mod record;
pub mod resolver;

#[doc(inline)]
pub use batch::{BatchLoader, Row, SelectionExecutor};
#[doc(inline)]
pub use cardinality::Cardinality;
#[doc(inline)]
pub use linker::RelationLinker;
#[doc(inline)]
pub use metadata::{EntityMeta, MetadataProvider, MetadataRegistry, RelationKind, RelationMeta};
#[doc(inline)]
pub use record::{key_string, EntityRecord};
#[doc(inline)]
pub use resolver::{predicate_relations, referenced_relations, RelationTree};
