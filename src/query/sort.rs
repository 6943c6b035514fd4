//! Pairs sort fields with directions and drops what a backend cannot sort on.

use crate::query::spec::{SearchSpecification, SortOrder};

/// Field every backend sorts by when no valid sort field remains.
pub const DEFAULT_SORT_FIELD: &str = "pk";

/// Direction of the default sort.
pub const DEFAULT_SORT_ORDER: SortOrder = SortOrder::Desc;

/// A sort field resolved by a backend, with its direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortField<T> {
    pub field: T,
    pub order: SortOrder,
}

/// Resolves `sort_by`/`sort_order` of the specification.
///
/// The field at position `i` takes the direction at position `i`. A blank
/// direction there means ascending; past the end of the directions the last
/// non-blank one applies, else ascending. Fields the resolver rejects are
/// dropped (logged at `debug`). An empty result means the caller applies
/// [`DEFAULT_SORT_FIELD`] / [`DEFAULT_SORT_ORDER`].
pub fn plan_sort<T, F>(spec: &SearchSpecification, mut resolve: F) -> Vec<SortField<T>>
where
    F: FnMut(&str) -> Option<T>,
{
    let Some(sort_by) = spec.sort_by.as_deref() else {
        return Vec::new();
    };

    let orders: Vec<Option<SortOrder>> = spec
        .sort_order
        .as_deref()
        .map(|orders| {
            orders
                .split(',')
                .map(str::trim)
                .map(|token| (!token.is_empty()).then(|| SortOrder::parse_lenient(token)))
                .collect()
        })
        .unwrap_or_default();
    let last_order = orders.iter().rev().find_map(|order| *order);

    let mut result = Vec::new();
    for (position, name) in sort_by.split(',').map(str::trim).enumerate() {
        if name.is_empty() {
            continue;
        }

        let order = match orders.get(position) {
            Some(order) => order.unwrap_or_default(),
            None => last_order.unwrap_or_default(),
        };

        match resolve(name) {
            Some(field) => result.push(SortField { field, order }),
            None => tracing::debug!("Dropping unknown sort field '{}'", name),
        }
    }

    result
}
