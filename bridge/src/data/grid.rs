//! Conversion between the storage shape and the row-wrapped wire shape
//!
//! An array component with `noRowWrapping` and exactly one bindable child
//! stores each row as the child's bare value; on the wire every row is an
//! object `{ <childKey>: value }`. With more than one child the property has
//! no effect.

use serde_json::{Map, Value};

use super::variables::{Variable, VariableSet, WireDocument};
use crate::schema::{Component, Schema, find_by_key};

/// Convert storage-shaped `data` into the wire shape expected by clients
///
/// Keys the schema does not bind are carried over unchanged.
pub fn wrap(data: &VariableSet, schema: &Schema) -> WireDocument {
    WireDocument(wrap_scope(data, &schema.bindable_components()))
}

/// Convert a wire document back into the storage shape
///
/// Only keys bound by the schema are kept.
pub fn unwrap(data: &WireDocument, schema: &Schema) -> VariableSet {
    unwrap_scope(data.as_map(), &schema.bindable_components())
}

/// The single child a row-wrapped grid wraps its rows in, if any
pub fn wrapping_child<'a>(grid: &'a Component) -> Option<&'a Component> {
    if !grid.has_no_row_wrapping() {
        return None;
    }
    match grid.bindable_children().as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

fn wrap_scope(data: &VariableSet, scope: &[&Component]) -> Map<String, Value> {
    data.iter()
        .map(|(key, variable)| {
            let value = find_by_key(scope, key).map_or_else(
                || variable.to_value(),
                |component| wrap_variable(variable, component),
            );
            (key.to_string(), value)
        })
        .collect()
}

fn wrap_variable(variable: &Variable, component: &Component) -> Value {
    match variable {
        Variable::Container(set) if component.is_container() => {
            Value::Object(wrap_scope(set, &component.bindable_children()))
        }
        Variable::Array(rows) if component.is_array() => {
            Value::Array(rows.iter().map(|row| wrap_row(row, component)).collect())
        }
        other => other.to_value(),
    }
}

fn wrap_row(row: &Variable, grid: &Component) -> Value {
    let children = grid.bindable_children();
    if let Some(child) = wrapping_child(grid) {
        return match row {
            // rows reconciled from wire data are already wrapped
            Variable::Container(set) if set.get(&child.key).is_some() => {
                Value::Object(wrap_scope(set, &children))
            }
            bare => {
                let mut wrapped = Map::new();
                wrapped.insert(child.key.clone(), wrap_variable(bare, child));
                Value::Object(wrapped)
            }
        };
    }
    match row {
        Variable::Container(set) => Value::Object(wrap_scope(set, &children)),
        other => other.to_value(),
    }
}

fn unwrap_scope(data: &Map<String, Value>, scope: &[&Component]) -> VariableSet {
    scope
        .iter()
        .filter_map(|component| {
            data.get(&component.key)
                .map(|value| (component.key.clone(), unwrap_value(value, component)))
        })
        .collect()
}

fn unwrap_value(value: &Value, component: &Component) -> Variable {
    match value {
        Value::Object(map) if component.is_container() => {
            Variable::Container(unwrap_scope(map, &component.bindable_children()))
        }
        Value::Array(rows) if component.is_array() => {
            Variable::Array(rows.iter().map(|row| unwrap_row(row, component)).collect())
        }
        other => Variable::Leaf(other.clone()),
    }
}

fn unwrap_row(row: &Value, grid: &Component) -> Variable {
    static NULL: Value = Value::Null;
    if let Some(child) = wrapping_child(grid) {
        let inner = match row {
            Value::Object(map) => match map.get(&child.key) {
                Some(value) => value,
                // a container child's row may arrive unwrapped
                None if child.is_container() => row,
                None => map.values().next().unwrap_or(&NULL),
            },
            bare => bare,
        };
        return unwrap_value(inner, child);
    }
    match row {
        Value::Object(map) => Variable::Container(unwrap_scope(map, &grid.bindable_children())),
        other => Variable::Leaf(other.clone()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "fixtures must parse")]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> Schema {
        Schema::from_value(json!({ "components": [
            { "type": "editgrid", "key": "items", "input": true,
              "properties": { "noRowWrapping": true },
              "components": [{ "type": "number", "key": "value", "input": true }] },
            { "type": "datagrid", "key": "pairs", "input": true,
              "properties": { "noRowWrapping": "true" },
              "components": [
                  { "type": "textfield", "key": "left", "input": true },
                  { "type": "textfield", "key": "right", "input": true }
              ] },
            { "type": "container", "key": "box", "input": true, "components": [
                { "type": "datagrid", "key": "tags", "input": true,
                  "properties": { "noRowWrapping": true },
                  "components": [
                      { "type": "panel", "key": "p", "input": false, "components": [
                          { "type": "textfield", "key": "tag", "input": true }
                      ]}
                  ] }
            ]},
            { "type": "datagrid", "key": "plain", "input": true, "components": [
                { "type": "textfield", "key": "name", "input": true }
            ]}
        ]}))
        .expect("grid fixture parses")
    }

    fn storage(value: Value) -> VariableSet {
        let schema = schema();
        match value {
            Value::Object(map) => unwrap(&WireDocument(map), &schema),
            _ => VariableSet::new(),
        }
    }

    fn leaf(value: Value) -> Variable { Variable::Leaf(value) }

    fn storage_sample() -> VariableSet {
        let mut pair = VariableSet::new();
        pair.insert("left", leaf(json!("l")));
        pair.insert("right", leaf(json!("r")));
        let mut row = VariableSet::new();
        row.insert("name", leaf(json!("n")));
        let mut box_set = VariableSet::new();
        box_set.insert("tags", Variable::Array(vec![leaf(json!("a")), leaf(json!("b"))]));

        let mut data = VariableSet::new();
        data.insert("items", Variable::Array(vec![leaf(json!(1)), leaf(json!(2))]));
        data.insert("pairs", Variable::Array(vec![Variable::Container(pair)]));
        data.insert("box", Variable::Container(box_set));
        data.insert("plain", Variable::Array(vec![Variable::Container(row)]));
        data
    }

    #[test]
    fn test_wrap_wraps_bare_rows() {
        let wire = wrap(&storage_sample(), &schema()).into_value();
        assert_eq!(
            wire,
            json!({
                "items": [{ "value": 1 }, { "value": 2 }],
                "pairs": [{ "left": "l", "right": "r" }],
                "box": { "tags": [{ "tag": "a" }, { "tag": "b" }] },
                "plain": [{ "name": "n" }]
            })
        );
    }

    #[test]
    fn test_unwrap_inverts_wrap() {
        let schema = schema();
        let data = storage_sample();
        assert_eq!(unwrap(&wrap(&data, &schema), &schema), data);
    }

    #[test]
    fn test_already_wrapped_rows_unchanged() {
        let mut first = VariableSet::new();
        first.insert("value", leaf(json!(1)));
        let mut second = VariableSet::new();
        second.insert("value", leaf(json!(2)));
        let mut data = VariableSet::new();
        data.insert(
            "items",
            Variable::Array(vec![Variable::Container(first), Variable::Container(second)]),
        );

        let wire = wrap(&data, &schema()).into_value();
        assert_eq!(wire, json!({ "items": [{ "value": 1 }, { "value": 2 }] }));
    }

    #[test]
    fn test_multi_child_grid_is_not_unwrapped() {
        let data = storage(json!({ "pairs": [{ "left": "l", "right": "r" }] }));
        let rows = data.get("pairs").and_then(Variable::as_array).map(<[Variable]>::to_vec);
        assert!(matches!(rows.as_deref(), Some([Variable::Container(_)])));
    }

    #[test]
    fn test_unknown_keys() {
        let schema = schema();
        let mut data = VariableSet::new();
        data.insert("extra", leaf(json!("kept")));
        let wire = wrap(&data, &schema);
        assert_eq!(wire.get("extra"), Some(&json!("kept")));
        assert!(unwrap(&wire, &schema).is_empty());
    }

    #[test]
    fn test_unwrap_reads_first_value_when_child_key_differs() {
        let data = storage(json!({ "items": [{ "renamed": 5 }] }));
        assert_eq!(
            data.get("items"),
            Some(&Variable::Array(vec![leaf(json!(5))]))
        );
    }

    #[test]
    fn test_empty_row_object_unwraps_to_null() {
        let data = storage(json!({ "items": [{}] }));
        assert_eq!(data.get("items"), Some(&Variable::Array(vec![leaf(Value::Null)])));
    }

    #[test]
    fn test_container_child_rows() {
        let schema = Schema::from_value(json!({ "components": [
            { "type": "datagrid", "key": "addrs", "input": true,
              "properties": { "noRowWrapping": true },
              "components": [
                  { "type": "container", "key": "addr", "input": true, "components": [
                      { "type": "textfield", "key": "street", "input": true }
                  ]}
              ] }
        ]}))
        .expect("container grid parses");
        let wire = WireDocument(
            serde_json::from_value(json!({ "addrs": [{ "addr": { "street": "Main" } }, {}] }))
                .expect("wire object"),
        );

        let data = unwrap(&wire, &schema);
        let mut street = VariableSet::new();
        street.insert("street", leaf(json!("Main")));
        assert_eq!(
            data.get("addrs"),
            Some(&Variable::Array(vec![
                Variable::Container(street),
                Variable::Container(VariableSet::new())
            ]))
        );
        assert_eq!(
            wrap(&data, &schema).into_value(),
            json!({ "addrs": [{ "addr": { "street": "Main" } }, { "addr": {} }] })
        );
    }
}
