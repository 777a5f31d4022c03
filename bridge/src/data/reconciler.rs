//! Merges submitted and current data into one authoritative variable set
//!
//! Editable fields take the submitted value, disabled fields keep the current
//! value. Containers and arrays recurse; empty results are pruned.

use std::borrow::Cow;

use serde_json::{Map, Value};
use tracing::debug;

use super::grid::wrapping_child;
use super::variables::{Variable, VariableSet};
use crate::schema::{Component, Schema};

/// Reconcile `submitted` against `current` for every bindable component of `schema`
pub fn reconcile(schema: &Schema, submitted: &Map<String, Value>, current: &Map<String, Value>) -> VariableSet {
    reconcile_scope(&schema.bindable_components(), submitted, current)
}

fn reconcile_scope(
    scope: &[&Component],
    submitted: &Map<String, Value>,
    current: &Map<String, Value>,
) -> VariableSet {
    let mut result = VariableSet::new();
    for component in scope {
        let key = component.key.as_str();
        if component.is_container() {
            let nested = reconcile_scope(
                &component.bindable_children(),
                object_at(submitted, key),
                object_at(current, key),
            );
            if !nested.is_empty() {
                result.insert(key, Variable::Container(nested));
            }
        } else if component.is_array() {
            let rows = reconcile_rows(component, submitted.get(key), current.get(key));
            if !rows.is_empty() {
                result.insert(key, Variable::Array(rows));
            }
        } else {
            let authoritative = if component.is_disabled() { current } else { submitted };
            if let Some(value) = authoritative.get(key) {
                result.insert(key, Variable::Leaf(value.clone()));
            }
        }
    }
    result
}

fn reconcile_rows(grid: &Component, editable: Option<&Value>, read_only: Option<&Value>) -> Vec<Variable> {
    let editable = rows_of(grid, editable);
    let read_only = rows_of(grid, read_only);
    let children = grid.bindable_children();
    let empty = Map::new();

    editable
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let submitted = row_object(grid, row);
            let current = read_only
                .get(index)
                .map_or_else(|| Cow::Borrowed(&empty), |row| row_object(grid, row));
            Variable::Container(reconcile_scope(&children, &submitted, &current))
        })
        .collect()
}

fn rows_of<'a>(grid: &Component, value: Option<&'a Value>) -> &'a [Value] {
    match value {
        Some(Value::Array(rows)) => rows,
        Some(Value::Null) | None => &[],
        Some(other) => {
            debug!(key = %grid.key, value = %other, "Array component value is not a list, treating as empty");
            &[]
        }
    }
}

/// View a row as an object
///
/// In a single-child `noRowWrapping` grid a row that does not already hold
/// the child's key is that child's value, whatever its shape. Elsewhere a
/// non-object row is treated as empty.
fn row_object<'a>(grid: &Component, row: &'a Value) -> Cow<'a, Map<String, Value>> {
    match (row, wrapping_child(grid)) {
        (Value::Object(map), Some(child)) if map.contains_key(&child.key) => Cow::Borrowed(map),
        (bare, Some(child)) => {
            let mut wrapped = Map::new();
            wrapped.insert(child.key.clone(), bare.clone());
            Cow::Owned(wrapped)
        }
        (Value::Object(map), None) => Cow::Borrowed(map),
        (other, None) => {
            debug!(key = %grid.key, row = %other, "Array row is not an object, treating as empty");
            Cow::Owned(Map::new())
        }
    }
}

fn object_at<'a>(data: &'a Map<String, Value>, key: &str) -> &'a Map<String, Value> {
    static EMPTY: std::sync::LazyLock<Map<String, Value>> = std::sync::LazyLock::new(Map::new);
    match data.get(key) {
        Some(Value::Object(nested)) => nested,
        Some(Value::Null) | None => &EMPTY,
        Some(other) => {
            debug!(key, value = %other, "Container value is not an object, treating as empty");
            &EMPTY
        }
    }
}
