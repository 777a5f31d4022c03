//! Classification and traversal helpers shared by every component pass
//!
//! Layout components never hold data; their children are lifted into the
//! binding scope of the nearest container, array, or schema root.

use super::component::{Component, ComponentType, Schema};

impl Component {
    /// Direct children of a component with layout cells flattened
    ///
    /// `columns` yields every column's components, `table` every cell's
    /// components row by row, `tabs` every pane's components; all other
    /// components yield their own `components`.
    pub fn children(&self) -> Vec<&Self> {
        match self.component_type {
            ComponentType::Columns => self
                .columns
                .iter()
                .flatten()
                .flat_map(|cell| cell.components.iter())
                .collect(),
            ComponentType::Table => self
                .rows
                .iter()
                .flatten()
                .flatten()
                .flat_map(|cell| cell.components.iter())
                .collect(),
            ComponentType::Tabs => self
                .components
                .iter()
                .flatten()
                .flat_map(|pane| pane.components.iter().flatten())
                .collect(),
            _ => self.components.iter().flatten().collect(),
        }
    }

    /// Bindable components of this component's own scope, in document order
    pub fn bindable_children(&self) -> Vec<&Self> {
        let mut bindable = Vec::new();
        collect_bindable(self.children(), &mut bindable);
        bindable
    }

    /// Mutable access to every child list, layout cells included
    pub(crate) fn child_lists_mut(&mut self) -> Vec<&mut Vec<Self>> {
        let mut lists: Vec<&mut Vec<Self>> = Vec::new();
        if let Some(components) = self.components.as_mut() {
            lists.push(components);
        }
        if let Some(columns) = self.columns.as_mut() {
            lists.extend(columns.iter_mut().map(|cell| &mut cell.components));
        }
        if let Some(rows) = self.rows.as_mut() {
            lists.extend(
                rows.iter_mut()
                    .flat_map(|row| row.iter_mut())
                    .map(|cell| &mut cell.components),
            );
        }
        lists
    }

    fn raw_children(&self) -> Vec<&Self> {
        let mut children: Vec<&Self> = self.components.iter().flatten().collect();
        children.extend(
            self.columns
                .iter()
                .flatten()
                .flat_map(|cell| cell.components.iter()),
        );
        children.extend(
            self.rows
                .iter()
                .flatten()
                .flatten()
                .flat_map(|cell| cell.components.iter()),
        );
        children
    }
}

impl Schema {
    /// Bindable components of the root scope, in document order
    pub fn bindable_components(&self) -> Vec<&Component> {
        let mut bindable = Vec::new();
        collect_bindable(self.components.iter().collect(), &mut bindable);
        bindable
    }

    /// Every component in the schema, depth first
    pub fn all_components(&self) -> Vec<&Component> {
        let mut found = Vec::new();
        collect_all(&self.components.iter().collect::<Vec<_>>(), &mut found);
        found
    }

    /// Dotted data paths of every bindable leaf
    ///
    /// Containers and arrays contribute their key as a segment; array row
    /// indices are not part of the path.
    pub fn field_paths(&self) -> Vec<(String, &Component)> {
        let mut paths = Vec::new();
        collect_paths(self.bindable_components(), "", &mut paths);
        paths
    }
}

/// Find the bindable component for `key` in an already listed scope
pub fn find_by_key<'a>(scope: &[&'a Component], key: &str) -> Option<&'a Component> {
    scope.iter().copied().find(|component| component.key == key)
}

/// Join a parent path and a key with a dot
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn collect_bindable<'a>(scope: Vec<&'a Component>, out: &mut Vec<&'a Component>) {
    for component in scope {
        if component.is_layout() {
            collect_bindable(component.children(), out);
        } else if component.is_bindable() {
            out.push(component);
        }
    }
}

fn collect_all<'a>(scope: &[&'a Component], out: &mut Vec<&'a Component>) {
    for component in scope {
        out.push(component);
        collect_all(&component.raw_children(), out);
    }
}

fn collect_paths<'a>(scope: Vec<&'a Component>, parent: &str, out: &mut Vec<(String, &'a Component)>) {
    for component in scope {
        let path = join_path(parent, &component.key);
        if component.is_container() || component.is_array() {
            collect_paths(component.bindable_children(), &path, out);
        } else {
            out.push((path, component));
        }
    }
}
