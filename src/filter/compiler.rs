//! Filter compiler.
//!
//! Compiles a [`Filter`] tree into a [`Predicate`]. At each node the three groups
//! combine under an implicit AND, in this order:
//!
//! ```text
//! AND( AND(and-children), OR(or-children), field-entry, field-entry, ... )
//! ```
//!
//! Empty groups disappear and single-child groups collapse, so `{}` compiles to
//! [`Predicate::True`] and `{and: [f]}` compiles exactly like `f`. Relation
//! entries recurse with the relation name appended to the column path.

use super::operator;
use super::{Comparison, FieldFilter, Filter};
use crate::error::QueryResult;
use crate::predicate::{ColumnRef, Predicate};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Compile a filter into a predicate
///
/// # Errors
///
/// Fails with `UnknownOperator` or `InvalidOperand` from the operator mapper for
/// the first offending comparison in traversal order.
pub fn compile(filter: &Filter) -> QueryResult<Predicate> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::compile_filter_span(filter.fields.len()).entered();

    let result = compile_scoped(filter, &[]);

    #[cfg(feature = "metrics")]
    METRICS.record_compile(result.is_ok());

    match &result {
        Ok(predicate) => log::debug!("compiled filter into {:?}", predicate),
        Err(err) => log::debug!("filter compilation failed: {}", err),
    }
    result
}

/// Compile a filter whose columns live on the relation at `relation_path`
pub fn compile_scoped(filter: &Filter, relation_path: &[String]) -> QueryResult<Predicate> {
    let mut groups = Vec::with_capacity(filter.fields.len() + 2);

    if !filter.and.is_empty() {
        let children = filter
            .and
            .iter()
            .map(|child| compile_scoped(child, relation_path))
            .collect::<QueryResult<Vec<_>>>()?;
        groups.push(Predicate::all(children));
    }

    if !filter.or.is_empty() {
        let children = filter
            .or
            .iter()
            .map(|child| compile_scoped(child, relation_path))
            .collect::<QueryResult<Vec<_>>>()?;
        groups.push(Predicate::any(children));
    }

    for (field, value) in &filter.fields {
        let predicate = match value {
            FieldFilter::Comparisons(comparisons) => {
                let column = ColumnRef::with_path(relation_path.to_vec(), field.clone());
                compile_field(&column, comparisons)?
            }
            FieldFilter::Relation(sub) => {
                let mut path = relation_path.to_vec();
                path.push(field.clone());
                log::trace!("compiling relation filter at {}", path.join("."));
                compile_scoped(sub, &path)?
            }
        };
        groups.push(predicate);
    }

    Ok(Predicate::all(groups))
}

fn compile_field(column: &ColumnRef, comparisons: &[Comparison]) -> QueryResult<Predicate> {
    let parts = comparisons
        .iter()
        .map(|c| operator::map(&c.operator, &c.operand).map(|fragment| fragment.bind(column)))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(Predicate::all(parts))
}
