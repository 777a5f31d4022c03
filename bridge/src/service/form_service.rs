//! Orchestrates schema loading, reconciliation, file conversion, and the
//! script runtime into the public form operations
//!
//! This is the only place errors are translated: script-backed flows surface
//! every collaborator failure as [`Error::ValidationFailure`], except schema
//! resolution and pool exhaustion which keep their own kind.

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::Report;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::config::FormServiceConfig;
use crate::constants::{SAVE_STATE_ACTION, SUBMISSION_PROCESSED_PROPERTY};
use crate::data::{VariableSet, WireDocument, reconcile, unwrap, wrap};
use crate::error::{Error, Result};
use crate::files::{BlobStore, FileAttributeBridge};
use crate::logging;
use crate::resources::ResourceProvider;
use crate::runtime::{
    Operation, ProcessRuntimeFactory, RuntimeFactory, ScriptCommand, ScriptResult, ScriptRuntimePool,
    ping_frame,
};
use crate::schema::{ComponentField, DerivedCache, Schema, SchemaCache, SchemaExpander};

/// Key of the data object embedded into a rendered form
const RENDERED_DATA_FIELD: &str = "data";

/// Form processing entry point owning every cache and the runtime pool
pub struct FormProcessingService {
    config:    FormServiceConfig,
    resources: Arc<dyn ResourceProvider>,
    schemas:   SchemaCache,
    files:     FileAttributeBridge,
    decisions: DerivedCache<HashMap<String, bool>>,
    pool:      ScriptRuntimePool,
    evictor:   Option<JoinHandle<()>>,
}

impl FormProcessingService {
    /// Create a service from explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `config` fails validation.
    pub fn new(
        config: FormServiceConfig,
        resources: Arc<dyn ResourceProvider>,
        blob_store: Arc<dyn BlobStore>,
        runtime_factory: Arc<dyn RuntimeFactory>,
    ) -> Result<Self> {
        config.validate()?;
        logging::configure(&config.logging);
        info!(
            max_total = config.pool.max_total,
            program = %config.runtime.program,
            "Creating form processing service"
        );
        let pool = ScriptRuntimePool::new(config.pool.clone(), runtime_factory);
        // idle eviction needs a tokio runtime; without one hosts call `evict_idle` themselves
        let evictor = tokio::runtime::Handle::try_current()
            .is_ok()
            .then(|| pool.spawn_evictor());
        Ok(Self {
            schemas: SchemaCache::new(config.cache.clone()),
            files: FileAttributeBridge::new(blob_store),
            decisions: DerivedCache::new(),
            pool,
            evictor,
            resources,
            config,
        })
    }

    /// Create a service whose runtimes are child processes of `config.runtime`
    ///
    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn with_process_runtime(
        config: FormServiceConfig,
        resources: Arc<dyn ResourceProvider>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let factory = Arc::new(ProcessRuntimeFactory::new(config.runtime.clone()));
        Self::new(config, resources, blob_store, factory)
    }

    /// Service configuration
    pub const fn config(&self) -> &FormServiceConfig { &self.config }

    /// Script runtime pool, for status and eviction
    pub const fn pool(&self) -> &ScriptRuntimePool { &self.pool }

    /// Load the fully expanded schema stored under `schema_id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] when the schema or one of its
    /// sub-forms is missing, unparsable, or nested too deep.
    pub async fn schema(&self, schema_id: &str) -> Result<Arc<Schema>> {
        let resources = Arc::clone(&self.resources);
        let max_depth = self.config.max_expansion_depth;
        self.schemas
            .get_or_load(schema_id, || async move {
                let mut expander = SchemaExpander::new(resources.as_ref(), max_depth);
                expander.load(schema_id).await
            })
            .await
            .map_err(into_schema_resolution)
    }

    /// Render the schema with `current` data embedded under `data`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] for an unloadable schema and
    /// [`Error::MalformedData`] when `current` cannot be projected.
    #[instrument(skip(self, current))]
    pub async fn render_with_data(&self, schema_id: &str, current: &Map<String, Value>) -> Result<Value> {
        let schema = self.schema(schema_id).await?;
        let wire = self
            .wire_projection(schema_id, &schema, current)
            .await
            .map_err(into_malformed_data)?;

        let mut rendered = serde_json::to_value(schema.as_ref())
            .map_err(|e| Report::new(Error::serialization("rendered form", e)))
            .map_err(into_malformed_data)?;
        if let Value::Object(form) = &mut rendered {
            form.insert(RENDERED_DATA_FIELD.to_string(), wire.into_value());
        }
        Ok(rendered)
    }

    /// Reconcile a submission against known data, validate it, and return the
    /// cleaned result in storage shape
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] for an unloadable schema,
    /// [`Error::PoolExhausted`] when no runtime frees up in time, and
    /// [`Error::ValidationFailure`] for everything else.
    #[instrument(skip(self, submitted, current))]
    pub async fn dry_validate_and_cleanup(
        &self,
        schema_id: &str,
        submitted: &Map<String, Value>,
        current: &Map<String, Value>,
    ) -> Result<VariableSet> {
        let schema = self.schema(schema_id).await?;
        let result: Result<VariableSet> = async {
            let known = self.wire_projection(schema_id, &schema, current).await?;
            let merged = reconcile(&schema, submitted, known.as_map());
            let document = wrap(&merged, &schema);
            let cleaned = self.run(Operation::Validate, &schema, &document).await?;
            self.files
                .variables_to_storage(schema_id, &schema, &unwrap(&cleaned, &schema))
                .await
        }
        .await;
        result.map_err(into_validation_failure)
    }

    /// Drop everything the schema does not bind from stored `variables`
    ///
    /// # Errors
    ///
    /// Same as [`Self::dry_validate_and_cleanup`].
    #[instrument(skip(self, variables))]
    pub async fn cleanup(&self, schema_id: &str, variables: &Map<String, Value>) -> Result<VariableSet> {
        let schema = self.schema(schema_id).await?;
        let result: Result<VariableSet> = async {
            let document = self.wire_projection(schema_id, &schema, variables).await?;
            let cleaned = self.run(Operation::Cleanup, &schema, &document).await?;
            self.files
                .variables_to_storage(schema_id, &schema, &unwrap(&cleaned, &schema))
                .await
        }
        .await;
        result.map_err(into_validation_failure)
    }

    /// Whether a submission made with `submission_state` should be processed
    ///
    /// A save-state button for that state may opt out through its
    /// `isSubmissionProcessed` property; everything else is processed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] for an unloadable schema.
    pub async fn should_process_submission(&self, schema_id: &str, submission_state: &str) -> Result<bool> {
        let schema = self.schema(schema_id).await?;
        let decisions = self
            .decisions
            .get_or_compute(schema_id, &schema, submission_decisions);
        let decision = decisions.get(submission_state).copied().unwrap_or(true);
        debug!(schema_id, submission_state, decision, "Decided submission processing");
        Ok(decision)
    }

    /// Keys of the bindable top level fields
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] for an unloadable schema.
    pub async fn list_field_names(&self, schema_id: &str) -> Result<Vec<String>> {
        let schema = self.schema(schema_id).await?;
        Ok(schema
            .bindable_components()
            .into_iter()
            .map(|component| component.key.clone())
            .collect())
    }

    /// Dotted paths of every bindable leaf field
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaResolution`] for an unloadable schema.
    pub async fn list_field_paths(&self, schema_id: &str) -> Result<Vec<String>> {
        let schema = self.schema(schema_id).await?;
        Ok(schema.field_paths().into_iter().map(|(path, _)| path).collect())
    }

    /// Round-trip a health check through a pooled runtime
    ///
    /// # Errors
    ///
    /// Returns the pool's error unchanged: [`Error::PoolExhausted`] when no
    /// runtime frees up in time, [`Error::RuntimeProtocol`] when the runtime
    /// fails to answer.
    pub async fn ping(&self) -> Result<()> {
        let response = self.pool.execute(&ping_frame()?).await?;
        debug!(response = %String::from_utf8_lossy(&response), "Script runtime answered ping");
        Ok(())
    }

    /// Forget everything cached for `schema_id`
    pub fn invalidate_schema(&self, schema_id: &str) {
        self.schemas.invalidate(schema_id);
        self.files.index().invalidate(schema_id);
        self.decisions.invalidate(schema_id);
    }

    /// Forget every cached schema and derived lookup
    pub fn clear_caches(&self) {
        self.schemas.clear();
        self.files.index().clear();
        self.decisions.clear();
    }

    /// Terminate idle runtimes and refuse further script calls
    pub async fn shutdown(&self) {
        if let Some(evictor) = &self.evictor {
            evictor.abort();
        }
        self.pool.close().await;
    }

    /// Reconcile `data` with itself and convert it to the wire shape
    async fn wire_projection(
        &self,
        schema_id: &str,
        schema: &Arc<Schema>,
        data: &Map<String, Value>,
    ) -> Result<WireDocument> {
        let projected = reconcile(schema, data, data);
        let projected = self
            .files
            .variables_to_wire(schema_id, schema, &projected)
            .await?;
        Ok(wrap(&projected, schema))
    }

    async fn run(&self, operation: Operation, schema: &Schema, document: &WireDocument) -> Result<WireDocument> {
        let frame = ScriptCommand::new(operation, schema, document, &self.config.resource_path).to_frame()?;
        let response = self.pool.execute(&frame).await?;
        let result = ScriptResult::from_frame(&response)?;
        debug!(%operation, fields = result.data.len(), "Script runtime returned");
        Ok(result.into_document())
    }
}

impl Drop for FormProcessingService {
    fn drop(&mut self) {
        if let Some(evictor) = self.evictor.take() {
            evictor.abort();
        }
    }
}

/// Processing decision per save-state, from the first button naming that state
fn submission_decisions(schema: &Schema) -> HashMap<String, bool> {
    let mut decisions = HashMap::new();
    for button in schema.all_components() {
        if button.attribute_str(ComponentField::Action.as_ref()) != Some(SAVE_STATE_ACTION) {
            continue;
        }
        let Some(state) = button.attribute_str(ComponentField::State.as_ref()) else {
            continue;
        };
        let processed = button
            .property(SUBMISSION_PROCESSED_PROPERTY)
            .is_none_or(|value| match value {
                Value::Bool(flag) => *flag,
                Value::String(text) => !text.trim().eq_ignore_ascii_case("false"),
                Value::Number(number) => number.as_f64().is_none_or(|n| n != 0.0),
                _ => true,
            });
        decisions.entry(state.to_string()).or_insert(processed);
    }
    decisions
}

fn into_schema_resolution(report: Report<Error>) -> Report<Error> {
    match report.current_context() {
        Error::SchemaResolution(_) => report,
        other => {
            let message = other.to_string();
            report.change_context(Error::SchemaResolution(message))
        }
    }
}

fn into_validation_failure(report: Report<Error>) -> Report<Error> {
    match report.current_context() {
        Error::SchemaResolution(_) | Error::PoolExhausted(_) | Error::ValidationFailure(_) => report,
        other => {
            let message = other.to_string();
            report.change_context(Error::ValidationFailure(message))
        }
    }
}

fn into_malformed_data(report: Report<Error>) -> Report<Error> {
    match report.current_context() {
        Error::SchemaResolution(_) | Error::MalformedData(_) => report,
        other => {
            let message = other.to_string();
            report.change_context(Error::MalformedData(message))
        }
    }
}
