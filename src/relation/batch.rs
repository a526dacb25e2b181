//! Per-entity batch dispatch.
//!
//! When a relation (or an aggregate over a relation) is resolved for a whole
//! collection of source entities, every entity gets its own selection: the
//! assembled query with that entity's link condition AND'ed on. Selections are
//! built up front, executed on one `may` coroutine each, and joined before the
//! per-entity result map is assembled. Execution order between entities is
//! unspecified; the final map is not.

use super::linker::RelationLinker;
use super::metadata::MetadataProvider;
use super::record::{key_string, EntityRecord};
use crate::aggregate::{self, AggregateQuery, AggregateResponse};
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::predicate::Predicate;
use crate::query::{AggregateSelection, Query, QueryAssembler, SelectionDescriptor};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Result row keyed by column name or alias
pub type Row = Map<String, Value>;

/// The execution layer: runs compiled selections against the store
///
/// Implementations are shared across coroutines and must be thread-safe.
pub trait SelectionExecutor: Send + Sync + 'static {
    fn select(&self, selection: &SelectionDescriptor) -> QueryResult<Vec<Row>>;

    /// Rows keyed by the aliases in `selection.columns`
    fn aggregate(&self, selection: &AggregateSelection) -> QueryResult<Vec<Row>>;
}

/// Loads relations for many source entities concurrently
pub struct BatchLoader<E> {
    executor: Arc<E>,
}

impl<E> Clone for BatchLoader<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<E: SelectionExecutor> BatchLoader<E> {
    pub fn new(executor: E) -> Self {
        Self::from_arc(Arc::new(executor))
    }

    pub fn from_arc(executor: Arc<E>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Related rows for each source, keyed by the source's primary key string
    ///
    /// `query` filters, sorts and pages the related rows of every source
    /// independently.
    ///
    /// # Errors
    ///
    /// Any linking or compile error fails the batch before anything runs.
    /// Executor errors and coroutine panics surface after every coroutine has
    /// been joined.
    pub fn load_relation<R: EntityRecord>(
        &self,
        provider: &dyn MetadataProvider,
        entity_type: &str,
        sources: &[R],
        relation: &str,
        query: &Query,
    ) -> QueryResult<HashMap<String, Vec<Row>>> {
        let meta = provider.relation_meta(entity_type, relation)?;
        let base = QueryAssembler::new(provider, meta.target_type.clone()).selection(query)?;
        let jobs = per_source(provider, entity_type, sources, relation, |condition| {
            base.clone().and_predicate(provider, condition)
        })?;
        self.dispatch(relation, jobs, |executor, selection| executor.select(selection))
    }

    /// Decoded aggregates over each source's related rows
    pub fn aggregate_relation<R: EntityRecord>(
        &self,
        provider: &dyn MetadataProvider,
        entity_type: &str,
        sources: &[R],
        relation: &str,
        filter: &Filter,
        aggregate: &AggregateQuery,
    ) -> QueryResult<HashMap<String, Vec<AggregateResponse>>> {
        let meta = provider.relation_meta(entity_type, relation)?;
        let base =
            QueryAssembler::new(provider, meta.target_type.clone()).aggregate(filter, aggregate)?;
        let jobs = per_source(provider, entity_type, sources, relation, |condition| {
            base.clone().and_predicate(provider, condition)
        })?;
        let rows = self.dispatch(relation, jobs, |executor, selection| {
            executor.aggregate(selection)
        })?;
        rows.into_iter()
            .map(|(key, rows)| aggregate::decode(&rows).map(|decoded| (key, decoded)))
            .collect()
    }

    fn dispatch<J>(
        &self,
        relation: &str,
        jobs: Vec<(String, J)>,
        run: fn(&E, &J) -> QueryResult<Vec<Row>>,
    ) -> QueryResult<HashMap<String, Vec<Row>>>
    where
        J: Send + 'static,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::batch_dispatch_span(relation, jobs.len()).entered();

        log::debug!("dispatching {} selections for relation {}", jobs.len(), relation);

        let mut handles = Vec::with_capacity(jobs.len());
        for (key, job) in jobs {
            let executor = Arc::clone(&self.executor);
            let handle = may::go!(move || run(&*executor, &job));
            handles.push((key, handle));
        }

        let start = Instant::now();
        let mut results = HashMap::with_capacity(handles.len());
        let mut first_error: Option<QueryError> = None;
        for (key, handle) in handles {
            match handle.join() {
                Ok(Ok(rows)) => {
                    results.insert(key, rows);
                }
                Ok(Err(err)) => {
                    log::debug!("selection for {} via {} failed: {}", key, relation, err);
                    first_error.get_or_insert(err);
                }
                Err(panic) => {
                    let err = QueryError::Execution(format!(
                        "coroutine for {} via {} panicked: {}",
                        key,
                        relation,
                        panic_message(panic.as_ref())
                    ));
                    log::warn!("{}", err);
                    first_error.get_or_insert(err);
                }
            }
        }

        #[cfg(feature = "metrics")]
        METRICS.observe_batch_wait(start.elapsed());
        log::trace!("batch for {} joined after {:?}", relation, start.elapsed());

        match first_error {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}

/// One job per source: its primary key string and the selection built from its link condition
fn per_source<R, J>(
    provider: &dyn MetadataProvider,
    entity_type: &str,
    sources: &[R],
    relation: &str,
    build: impl Fn(Predicate) -> J,
) -> QueryResult<Vec<(String, J)>>
where
    R: EntityRecord,
{
    let meta = provider.relation_meta(entity_type, relation)?;
    let keys = provider.primary_keys(entity_type)?;
    let linker = RelationLinker::new(provider);
    sources
        .iter()
        .map(|source| {
            let key = key_string(&source.primary_key_values(entity_type, keys)?);
            let condition = linker.link_condition(entity_type, source, meta)?;
            Ok((key, build(condition)))
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
