//! Inlines referenced sub-schemas into container nodes

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde_json::Value;
use strum::IntoEnumIterator;
use tracing::{debug, trace};

use super::component::{Component, ComponentField, ComponentType, ReferenceAttribute, Schema};
use crate::constants::SUBFORM_RESOURCE_SUFFIX;
use crate::error::{Error, Result};
use crate::resources::ResourceProvider;

/// One expansion pass over a schema and everything it references
///
/// Raw sub-schemas are fetched at most once per key for the lifetime of the
/// expander, however often they are referenced.
pub struct SchemaExpander<'a> {
    provider:  &'a dyn ResourceProvider,
    max_depth: usize,
    fetched:   HashMap<String, Arc<Schema>>,
}

impl<'a> SchemaExpander<'a> {
    /// Create an expander reading from `provider`
    ///
    /// Nesting deeper than `max_depth` sub-schemas fails with
    /// [`Error::SchemaResolution`].
    pub fn new(provider: &'a dyn ResourceProvider, max_depth: usize) -> Self {
        Self {
            provider,
            max_depth,
            fetched: HashMap::new(),
        }
    }

    /// Fetch the schema stored under `key` and expand it
    pub async fn load(&mut self, key: &str) -> Result<Schema> {
        let raw = self.fetch(key).await?;
        let mut schema = Schema::clone(&raw);
        self.expand_components(&mut schema.components, 0).await?;
        Ok(schema)
    }

    /// Expand every `form` reference in `schema`
    pub async fn expand(&mut self, mut schema: Schema) -> Result<Schema> {
        self.expand_components(&mut schema.components, 0).await?;
        Ok(schema)
    }

    /// Keys fetched so far
    pub fn fetched_keys(&self) -> impl Iterator<Item = &str> { self.fetched.keys().map(String::as_str) }

    fn expand_components<'b>(
        &'b mut self,
        components: &'b mut Vec<Component>,
        depth: usize,
    ) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            for component in components.iter_mut() {
                if component.component_type == ComponentType::Form {
                    self.inline_subform(component, depth).await?;
                } else {
                    for children in component.child_lists_mut() {
                        self.expand_components(children, depth).await?;
                    }
                }
            }
            Ok(())
        })
    }

    async fn inline_subform(&mut self, component: &mut Component, depth: usize) -> Result<()> {
        let key = format!("{}{SUBFORM_RESOURCE_SUFFIX}", component.key);
        if depth >= self.max_depth {
            return Err(Report::new(Error::SchemaResolution(format!(
                "sub-schema '{key}' nested deeper than {} levels, reference cycle?",
                self.max_depth
            ))));
        }

        let referenced = self.fetch(&key).await?;
        let mut components = referenced.components.clone();
        self.expand_components(&mut components, depth + 1)
            .await
            .attach(format!("Expanding sub-schema: {key}"))?;

        for attribute in ReferenceAttribute::iter() {
            component.attributes.remove(attribute.as_ref());
        }
        component
            .attributes
            .insert(ComponentField::Tree.to_string(), Value::Bool(true));
        component.component_type = ComponentType::Container;
        component.components = Some(components);

        trace!(key = %component.key, depth, "Inlined sub-schema");
        Ok(())
    }

    async fn fetch(&mut self, key: &str) -> Result<Arc<Schema>> {
        if let Some(schema) = self.fetched.get(key) {
            return Ok(Arc::clone(schema));
        }

        let bytes = self
            .provider
            .get(key)
            .await
            .change_context(Error::schema_not_found(key))?
            .ok_or_else(|| Report::new(Error::schema_not_found(key)))?;
        let schema = Schema::from_slice(&bytes)
            .change_context(Error::SchemaResolution(format!("schema '{key}' is not valid")))?;

        debug!(key, components = schema.components.len(), "Fetched schema");
        let schema = Arc::new(schema);
        self.fetched.insert(key.to_string(), Arc::clone(&schema));
        Ok(schema)
    }
}

/// Expand `schema` in a single pass against `provider`
pub async fn expand(
    schema: Schema,
    provider: &dyn ResourceProvider,
    max_depth: usize,
) -> Result<Schema> {
    SchemaExpander::new(provider, max_depth).expand(schema).await
}
