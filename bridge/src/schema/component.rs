//! Strongly typed form schema tree
//!
//! Only the attributes the core reasons about are lifted into fields; every
//! other attribute survives untouched in `attributes` so a schema serializes
//! back to the document the runtime expects.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::constants::NO_ROW_WRAPPING_PROPERTY;

/// Component `type` values the core distinguishes
///
/// Anything else is carried verbatim in [`ComponentType::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Reference to another schema, replaced by a container on expansion
    Form,
    /// Nested object scope
    Container,
    /// Nested object scope keyed by question
    Survey,
    /// Array of rows edited inline
    Datagrid,
    /// Array of rows edited one at a time
    Editgrid,
    /// Layout wrapper with direct components
    Well,
    /// Layout wrapper with `rows[][].components`
    Table,
    /// Layout wrapper with `columns[].components`
    Columns,
    /// Layout wrapper with direct components
    Fieldset,
    /// Layout wrapper with direct components
    Panel,
    /// Layout wrapper whose `components` are tab panes
    Tabs,
    /// File upload field
    File,
    /// Any other type, including the empty type of tab panes
    #[default]
    Untyped,
    /// Unrecognized type name
    Other(String),
}

impl ComponentType {
    /// Wire name of the type
    pub fn as_str(&self) -> &str {
        match self {
            Self::Form => "form",
            Self::Container => "container",
            Self::Survey => "survey",
            Self::Datagrid => "datagrid",
            Self::Editgrid => "editgrid",
            Self::Well => "well",
            Self::Table => "table",
            Self::Columns => "columns",
            Self::Fieldset => "fieldset",
            Self::Panel => "panel",
            Self::Tabs => "tabs",
            Self::File => "file",
            Self::Untyped => "",
            Self::Other(name) => name,
        }
    }

    /// Binding category used by every traversal
    pub const fn category(&self) -> ComponentCategory {
        match self {
            Self::Form | Self::Container | Self::Survey => ComponentCategory::Container,
            Self::Datagrid | Self::Editgrid => ComponentCategory::Array,
            Self::Well | Self::Table | Self::Columns | Self::Fieldset | Self::Panel | Self::Tabs => {
                ComponentCategory::Layout
            }
            Self::File | Self::Untyped | Self::Other(_) => ComponentCategory::Simple,
        }
    }
}

impl From<&str> for ComponentType {
    fn from(name: &str) -> Self {
        match name {
            "form" => Self::Form,
            "container" => Self::Container,
            "survey" => Self::Survey,
            "datagrid" => Self::Datagrid,
            "editgrid" => Self::Editgrid,
            "well" => Self::Well,
            "table" => Self::Table,
            "columns" => Self::Columns,
            "fieldset" => Self::Fieldset,
            "panel" => Self::Panel,
            "tabs" => Self::Tabs,
            "file" => Self::File,
            "" => Self::Untyped,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl Serialize for ComponentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComponentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// How a component participates in data binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ComponentCategory {
    /// Value is a nested object
    Container,
    /// Value is an ordered sequence of rows
    Array,
    /// Holds no data, children bind in the parent's scope
    Layout,
    /// Value is a plain leaf
    Simple,
}

/// Schema attribute names the core reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum ComponentField {
    /// Save-state action name
    Action,
    /// Column cells of a `columns` layout
    Columns,
    /// Child components
    Components,
    /// Non-editable flag
    Disabled,
    /// Participates in data binding
    Input,
    /// Data binding key
    Key,
    /// Free-form custom properties
    Properties,
    /// Row cells of a `table` layout
    Rows,
    /// Submission state emitted by a save-state button
    State,
    /// Marks a container produced from an expanded sub-schema
    Tree,
    /// Component type
    Type,
}

/// Attributes that only make sense on an unexpanded `form` reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ReferenceAttribute {
    /// Source URL of the referenced schema
    Src,
    /// Whether the reference is stored by reference
    Reference,
    /// Identifier of the referenced schema
    Form,
    /// Uniqueness flag of the reference
    Unique,
    /// Project of the referenced schema
    Project,
    /// Path of the referenced schema
    Path,
}

/// One cell of a `columns` or `table` layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutCell {
    /// Components placed in the cell
    #[serde(default)]
    pub components: Vec<Component>,
    /// Remaining cell attributes (width, offset, ...)
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// One node of a form schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Component {
    /// Component type
    pub component_type: ComponentType,
    /// Data binding key, empty for pure layout nodes
    pub key:            String,
    /// Explicit `input` flag, absent when the schema omits it
    pub input:          Option<bool>,
    /// Explicit `disabled` flag, absent when the schema omits it
    pub disabled:       Option<bool>,
    /// Custom `properties` object
    pub properties:     Map<String, Value>,
    /// Child components
    pub components:     Option<Vec<Component>>,
    /// Cells of a `columns` layout
    pub columns:        Option<Vec<LayoutCell>>,
    /// Cells of a `table` layout
    pub rows:           Option<Vec<Vec<LayoutCell>>>,
    /// Every other attribute, preserved verbatim
    pub attributes:     Map<String, Value>,
}

impl Component {
    /// Create a component of the given type bound to `key`
    pub fn new(component_type: ComponentType, key: impl Into<String>) -> Self {
        Self {
            component_type,
            key: key.into(),
            input: Some(true),
            ..Self::default()
        }
    }

    /// Whether the component participates in data binding
    pub fn is_input(&self) -> bool { self.input.unwrap_or(false) }

    /// Whether the component is read-only from the server's point of view
    pub fn is_disabled(&self) -> bool { self.disabled.unwrap_or(false) }

    /// Whether the component binds data under a non-blank key
    pub fn is_bindable(&self) -> bool { self.is_input() && !self.key.trim().is_empty() }

    /// Whether the component's value is a nested object
    pub fn is_container(&self) -> bool {
        self.component_type.category() == ComponentCategory::Container
    }

    /// Whether the component's value is a sequence of rows
    pub fn is_array(&self) -> bool { self.component_type.category() == ComponentCategory::Array }

    /// Whether the component only arranges its children
    pub fn is_layout(&self) -> bool { self.component_type.category() == ComponentCategory::Layout }

    /// Whether the component is a file upload field
    pub fn is_file(&self) -> bool { self.component_type == ComponentType::File }

    /// Custom property lookup
    pub fn property(&self, name: &str) -> Option<&Value> { self.properties.get(name) }

    /// Raw attribute lookup for attributes not lifted into fields
    pub fn attribute(&self, name: &str) -> Option<&Value> { self.attributes.get(name) }

    /// Raw attribute lookup returning a string
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(Value::as_str)
    }

    /// Whether array rows are stored as bare values of the single child
    pub fn has_no_row_wrapping(&self) -> bool {
        self.is_array()
            && self
                .property(NO_ROW_WRAPPING_PROPERTY)
                .is_some_and(|value| matches!(value, Value::Bool(true)) || value.as_str() == Some("true"))
    }

    fn from_map(mut map: Map<String, Value>) -> Result<Self, String> {
        let component_type = match map.remove(ComponentField::Type.as_ref()) {
            Some(Value::String(name)) => ComponentType::from(name.as_str()),
            Some(other) => return Err(format!("component type must be a string, got {other}")),
            None => ComponentType::Untyped,
        };

        let key = match map.remove(ComponentField::Key.as_ref()) {
            Some(Value::String(key)) => key,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let input = take_flag(&mut map, ComponentField::Input);
        let disabled = take_flag(&mut map, ComponentField::Disabled);

        let properties = match map.remove(ComponentField::Properties.as_ref()) {
            Some(Value::Object(properties)) => properties,
            Some(other) => {
                // keep odd shapes (e.g. `[]`) so the schema round-trips
                map.insert(ComponentField::Properties.to_string(), other);
                Map::new()
            }
            None => Map::new(),
        };

        let components = match map.remove(ComponentField::Components.as_ref()) {
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<Self>, _>>()
                    .map_err(|e| e.to_string())?,
            ),
            Some(other) => {
                map.insert(ComponentField::Components.to_string(), other);
                None
            }
            None => None,
        };

        // `columns` and `rows` are layout cells only on their layout types;
        // elsewhere (e.g. textarea rows) they stay plain attributes
        let columns = if component_type == ComponentType::Columns {
            take_typed(&mut map, ComponentField::Columns)?
        } else {
            None
        };
        let rows = if component_type == ComponentType::Table {
            take_typed(&mut map, ComponentField::Rows)?
        } else {
            None
        };

        Ok(Self {
            component_type,
            key,
            input,
            disabled,
            properties,
            components,
            columns,
            rows,
            attributes: map,
        })
    }

    fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut map = Map::new();
        map.insert(
            ComponentField::Type.to_string(),
            Value::String(self.component_type.as_str().to_string()),
        );
        map.insert(ComponentField::Key.to_string(), Value::String(self.key.clone()));
        if let Some(input) = self.input {
            map.insert(ComponentField::Input.to_string(), Value::Bool(input));
        }
        if let Some(disabled) = self.disabled {
            map.insert(ComponentField::Disabled.to_string(), Value::Bool(disabled));
        }
        if !self.properties.is_empty() {
            map.insert(
                ComponentField::Properties.to_string(),
                Value::Object(self.properties.clone()),
            );
        }
        for (name, value) in &self.attributes {
            map.insert(name.clone(), value.clone());
        }
        if let Some(components) = &self.components {
            map.insert(
                ComponentField::Components.to_string(),
                serde_json::to_value(components)?,
            );
        }
        if let Some(columns) = &self.columns {
            map.insert(ComponentField::Columns.to_string(), serde_json::to_value(columns)?);
        }
        if let Some(rows) = &self.rows {
            map.insert(ComponentField::Rows.to_string(), serde_json::to_value(rows)?);
        }
        Ok(map)
    }
}

fn take_flag(map: &mut Map<String, Value>, field: ComponentField) -> Option<bool> {
    match map.remove(field.as_ref()) {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(text)) => Some(text == "true"),
        Some(Value::Number(number)) => Some(number.as_f64().is_some_and(|n| n != 0.0)),
        Some(Value::Null) | None => None,
        Some(other) => {
            map.insert(field.to_string(), other);
            None
        }
    }
}

fn take_typed<T: serde::de::DeserializeOwned>(
    map: &mut Map<String, Value>,
    field: ComponentField,
) -> Result<Option<T>, String> {
    match map.remove(field.as_ref()) {
        Some(value @ Value::Array(_)) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| format!("invalid '{field}' cells: {e}")),
        Some(other) => {
            map.insert(field.to_string(), other);
            Ok(None)
        }
        None => Ok(None),
    }
}

impl Serialize for Component {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map = self.to_map().map_err(serde::ser::Error::custom)?;
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Component {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_map(map).map_err(D::Error::custom)
    }
}

/// Root of a form schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Top level components
    #[serde(default)]
    pub components: Vec<Component>,
    /// Remaining form attributes (title, display, ...)
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Schema {
    /// Create a schema from its top level components
    pub fn new(components: Vec<Component>) -> Self {
        Self {
            components,
            attributes: Map::new(),
        }
    }

    /// Parse a schema document
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> { serde_json::from_slice(bytes) }

    /// Parse a schema from an in-memory JSON value
    pub fn from_value(value: Value) -> serde_json::Result<Self> { serde_json::from_value(value) }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "fixtures must parse")]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_component_round_trips_unknown_attributes() {
        let source = json!({
            "type": "textfield",
            "key": "firstName",
            "input": true,
            "label": "First name",
            "validate": { "required": true }
        });
        let component: Component = serde_json::from_value(source.clone()).expect("component parses");
        assert_eq!(component.component_type, ComponentType::Other("textfield".to_string()));
        assert!(component.is_bindable());
        assert!(!component.is_disabled());
        assert_eq!(serde_json::to_value(&component).expect("component serializes"), source);
    }

    #[test]
    fn test_textarea_rows_stay_an_attribute() {
        let component: Component =
            serde_json::from_value(json!({ "type": "textarea", "key": "notes", "rows": 3 }))
                .expect("textarea parses");
        assert!(component.rows.is_none());
        assert_eq!(component.attribute("rows"), Some(&json!(3)));
    }

    #[test]
    fn test_layout_cells_are_parsed() {
        let component: Component = serde_json::from_value(json!({
            "type": "columns",
            "key": "columns1",
            "columns": [
                { "width": 6, "components": [{ "type": "textfield", "key": "a", "input": true }] },
                { "width": 6, "components": [] }
            ]
        }))
        .expect("columns parse");
        let columns = component.columns.expect("columns layout has cells");
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].components[0].key, "a");
        assert_eq!(columns[0].attributes.get("width"), Some(&json!(6)));
    }

    #[test]
    fn test_categories() {
        assert_eq!(ComponentType::from("form").category(), ComponentCategory::Container);
        assert_eq!(ComponentType::from("survey").category(), ComponentCategory::Container);
        assert_eq!(ComponentType::from("editgrid").category(), ComponentCategory::Array);
        assert_eq!(ComponentType::from("tabs").category(), ComponentCategory::Layout);
        assert_eq!(ComponentType::from("number").category(), ComponentCategory::Simple);
    }

    #[test]
    fn test_no_row_wrapping_requires_array() {
        let mut grid = Component::new(ComponentType::Datagrid, "items");
        grid.properties.insert(NO_ROW_WRAPPING_PROPERTY.to_string(), json!(true));
        assert!(grid.has_no_row_wrapping());

        let mut container = Component::new(ComponentType::Container, "box");
        container
            .properties
            .insert(NO_ROW_WRAPPING_PROPERTY.to_string(), json!(true));
        assert!(!container.has_no_row_wrapping());
    }
}
