//! # Querygraph
//!
//! Declarative filter, sort, paging and aggregate compiler for relational
//! entity graphs.
//!
//! A JSON [`Filter`] tree is compiled into a [`Predicate`], which lowers into a
//! SeaQuery condition. Relation filters are resolved against entity metadata
//! supplied through [`MetadataProvider`], related rows are linked per source
//! entity by the [`RelationLinker`], and aggregate requests round-trip through
//! the alias codec in [`aggregate`].
//!
//! ```
//! use querygraph::{compile, ColumnRef, CompareOp, Filter, Predicate};
//!
//! let filter: Filter = serde_json::from_str(r#"{"numberType": {"gt": 10, "lt": 20}}"#).unwrap();
//! assert_eq!(
//!     compile(&filter).unwrap(),
//!     Predicate::All(vec![
//!         Predicate::compare(ColumnRef::field("numberType"), CompareOp::Gt, 10),
//!         Predicate::compare(ColumnRef::field("numberType"), CompareOp::Lt, 20),
//!     ])
//! );
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod predicate;
pub mod query;
pub mod relation;

pub use aggregate::{AggregateFunction, AggregateQuery, AggregateResponse};
pub use config::{QueryConfig, SqlBackend};
pub use error::{QueryError, QueryResult};
pub use filter::{compile, Filter};
pub use predicate::{ColumnRef, CompareOp, Predicate};
pub use query::{Query, QueryAssembler, SelectionDescriptor, SortField};
pub use relation::{
    BatchLoader, MetadataProvider, MetadataRegistry, RelationLinker, SelectionExecutor,
};
