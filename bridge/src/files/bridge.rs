//! Schema-driven conversion of file fields between storage and wire shapes

use std::str::FromStr;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use super::data_url::{self, DataUrl};
use super::index::FileFieldIndex;
use super::storage::BlobStore;
use super::types::{StorageFile, StorageKind, WireFile};
use crate::data::{Variable, VariableSet, wrapping_child};
use crate::error::{Error, Result};
use crate::schema::{Component, Schema, find_by_key, join_path};

/// Direction of a file conversion pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToWire,
    ToStorage,
}

/// Converts file references and extracts inline payloads into the blob store
pub struct FileAttributeBridge {
    blob_store: Arc<dyn BlobStore>,
    index:      FileFieldIndex,
}

impl FileAttributeBridge {
    /// Create a bridge persisting payloads into `blob_store`
    pub fn new(blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            blob_store,
            index: FileFieldIndex::new(),
        }
    }

    /// Cached file field positions
    pub const fn index(&self) -> &FileFieldIndex { &self.index }

    /// Convert a wire file reference into the storage shape
    ///
    /// An inline payload is handed to the blob store and replaced by the URL
    /// the store returns. Any other URL is kept along with its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedData`] for an undecodable data URL and
    /// [`Error::FileStorage`] when the blob store rejects the payload.
    pub async fn to_storage_file(&self, file: &WireFile) -> Result<StorageFile> {
        let name = if file.original_name.is_empty() {
            file.name.clone()
        } else {
            file.original_name.clone()
        };

        if !data_url::is_data_url(&file.url) {
            return Ok(StorageFile {
                name,
                mime_type: file.mime_type.clone(),
                url: file.url.clone(),
                size: file.size,
                storage_kind: StorageKind::from_str(&file.storage).unwrap_or_default(),
                id: file.id.clone(),
            });
        }

        let payload = DataUrl::parse(&file.url).attach(format!("File: {name}"))?;
        let mime_type = if file.mime_type.is_empty() {
            payload.mime_type.clone()
        } else {
            file.mime_type.clone()
        };
        let size = if file.size == 0 {
            u64::try_from(payload.bytes.len()).unwrap_or(u64::MAX)
        } else {
            file.size
        };
        let id = Uuid::new_v4().to_string();
        let url = self
            .blob_store
            .store(&id, &mime_type, payload.bytes)
            .await
            .attach(format!("File: {name}"))?;
        debug!(file = %name, blob_id = %id, "Stored inline file payload");

        let (storage_kind, id) = if data_url::is_data_url(&url) {
            (StorageKind::Base64, None)
        } else {
            (StorageKind::Store, Some(id))
        };
        Ok(StorageFile {
            name,
            mime_type,
            url,
            size,
            storage_kind,
            id,
        })
    }

    /// Convert every file field of `data` into the wire shape
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedData`] when a file field does not hold file
    /// references.
    pub async fn variables_to_wire(
        &self,
        schema_id: &str,
        schema: &Arc<Schema>,
        data: &VariableSet,
    ) -> Result<VariableSet> {
        let pass = Pass {
            bridge: self,
            schema_id,
            schema,
            direction: Direction::ToWire,
        };
        pass.convert_scope(data, &schema.bindable_components(), String::new())
            .await
    }

    /// Convert every file field of `data` into the storage shape
    ///
    /// # Errors
    ///
    /// Same as [`Self::to_storage_file`], plus [`Error::MalformedData`] when a
    /// file field does not hold file references.
    pub async fn variables_to_storage(
        &self,
        schema_id: &str,
        schema: &Arc<Schema>,
        data: &VariableSet,
    ) -> Result<VariableSet> {
        let pass = Pass {
            bridge: self,
            schema_id,
            schema,
            direction: Direction::ToStorage,
        };
        pass.convert_scope(data, &schema.bindable_components(), String::new())
            .await
    }
}

/// One traversal of a variable set in parallel with its schema
#[derive(Clone, Copy)]
struct Pass<'a> {
    bridge:    &'a FileAttributeBridge,
    schema_id: &'a str,
    schema:    &'a Arc<Schema>,
    direction: Direction,
}

impl<'a> Pass<'a> {
    fn convert_scope<'b>(
        self,
        data: &'b VariableSet,
        scope: &'b [&'b Component],
        path: String,
    ) -> BoxFuture<'b, Result<VariableSet>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            let mut converted = VariableSet::new();
            for (key, variable) in data.iter() {
                let value = match find_by_key(scope, key) {
                    Some(component) => {
                        self.convert_variable(variable, component, join_path(&path, key))
                            .await?
                    }
                    None => variable.clone(),
                };
                converted.insert(key, value);
            }
            Ok(converted)
        })
    }

    async fn convert_variable(
        self,
        variable: &Variable,
        component: &Component,
        path: String,
    ) -> Result<Variable> {
        if self.is_file_field(component, &path) {
            return self.convert_file_value(variable, &path).await;
        }
        match variable {
            Variable::Container(set) if component.is_container() => {
                let children = component.bindable_children();
                Ok(Variable::Container(self.convert_scope(set, &children, path).await?))
            }
            Variable::Array(rows) if component.is_array() => {
                let children = component.bindable_children();
                let mut converted = Vec::with_capacity(rows.len());
                for row in rows {
                    converted.push(self.convert_row(row, component, &children, &path).await?);
                }
                Ok(Variable::Array(converted))
            }
            other => Ok(other.clone()),
        }
    }

    async fn convert_row(
        self,
        row: &Variable,
        grid: &Component,
        children: &[&Component],
        path: &str,
    ) -> Result<Variable> {
        match row {
            Variable::Container(set) => Ok(Variable::Container(
                self.convert_scope(set, children, path.to_string()).await?,
            )),
            bare => match wrapping_child(grid) {
                // bare rows of an unwrapped grid are the single child's value
                Some(child) => {
                    let child_path = join_path(path, &child.key);
                    if self.is_file_field(child, &child_path) {
                        self.convert_file_value(bare, &child_path).await
                    } else {
                        Ok(bare.clone())
                    }
                }
                None => Ok(bare.clone()),
            },
        }
    }

    fn is_file_field(self, component: &Component, path: &str) -> bool {
        component.is_file()
            && self
                .bridge
                .index
                .is_file_at(self.schema_id, self.schema, path)
    }

    async fn convert_file_value(self, variable: &Variable, path: &str) -> Result<Variable> {
        trace!(path, direction = ?self.direction, "Converting file field");
        let converted = match variable.to_value() {
            Value::Array(files) => {
                let mut converted = Vec::with_capacity(files.len());
                for file in files {
                    converted.push(self.convert_file(file, path).await?);
                }
                Value::Array(converted)
            }
            file @ Value::Object(_) => self.convert_file(file, path).await?,
            other => other,
        };
        Ok(Variable::Leaf(converted))
    }

    async fn convert_file(self, file: Value, path: &str) -> Result<Value> {
        if !file.is_object() {
            return Ok(file);
        }
        let converted = match self.direction {
            Direction::ToWire => {
                let stored: StorageFile = serde_json::from_value(file)
                    .map_err(|e| Report::new(Error::unexpected("stored file reference", e)))
                    .attach(format!("Field: {path}"))?;
                serde_json::to_value(WireFile::from(&stored))
            }
            Direction::ToStorage => {
                let wire: WireFile = serde_json::from_value(file)
                    .map_err(|e| Report::new(Error::unexpected("wire file reference", e)))
                    .attach(format!("Field: {path}"))?;
                serde_json::to_value(self.bridge.to_storage_file(&wire).await?)
            }
        };
        converted.map_err(|e| Report::new(Error::serialization("file reference", e)))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "fixtures must convert")]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::files::{DataUrlBlobStore, MemoryBlobStore};

    fn schema() -> Arc<Schema> {
        Arc::new(schema_document())
    }

    fn schema_document() -> Schema {
        Schema::from_value(json!({ "components": [
            { "type": "file", "key": "attachment", "input": true },
            { "type": "textfield", "key": "note", "input": true },
            { "type": "datagrid", "key": "docs", "input": true,
              "properties": { "noRowWrapping": true },
              "components": [{ "type": "file", "key": "doc", "input": true }] },
            { "type": "container", "key": "box", "input": true, "components": [
                { "type": "textfield", "key": "attachment", "input": true }
            ]}
        ]}))
        .expect("bridge fixture parses")
    }

    fn variables(value: Value) -> VariableSet {
        match value {
            Value::Object(map) => crate::data::reconcile(&schema_document(), &map, &Map::new()),
            _ => VariableSet::new(),
        }
    }

    fn wire_file(url: &str) -> Value {
        json!({
            "name": "a-1234.json",
            "originalName": "a.json",
            "type": "application/json",
            "url": url,
            "size": 2,
            "storage": "base64"
        })
    }

    #[tokio::test]
    async fn test_inline_payload_moves_to_blob_store_and_back() {
        let store = Arc::new(MemoryBlobStore::new());
        let bridge = FileAttributeBridge::new(Arc::clone(&store) as Arc<dyn BlobStore>);
        let schema = schema();
        let data = variables(json!({
            "attachment": [wire_file("data:application/json;base64,eyJ9")],
            "note": "data:application/json;base64,eyJ9",
            "box": { "attachment": "data:text/plain;base64,AA==" }
        }));

        let stored = bridge
            .variables_to_storage("form", &schema, &data)
            .await
            .expect("inline payloads store");
        let value = stored.to_value();
        let file = &value["attachment"][0];
        assert_eq!(file["name"], json!("a.json"));
        assert_eq!(file["storageKind"], json!("store"));
        let url = file["url"].as_str().expect("stored url").to_string();
        assert!(url.starts_with("memory://"));
        assert_eq!(store.len(), 1);
        assert_eq!(value["note"], json!("data:application/json;base64,eyJ9"));
        assert_eq!(value["box"]["attachment"], json!("data:text/plain;base64,AA=="));

        let wire = bridge
            .variables_to_wire("form", &schema, &stored)
            .await
            .expect("stored files convert back");
        let file = &wire.to_value()["attachment"][0];
        assert_eq!(file["url"], json!(url));
        assert_eq!(file["storage"], json!("store"));
        assert_eq!(file["originalName"], json!("a.json"));
        assert_eq!(file["id"], value["attachment"][0]["id"]);
        assert_eq!(store.retrieve(&url).await.expect("payload retrievable"), b"{\"}".to_vec());
    }

    #[tokio::test]
    async fn test_stored_reference_survives_resubmission() {
        let store = Arc::new(MemoryBlobStore::new());
        let bridge = FileAttributeBridge::new(Arc::clone(&store) as Arc<dyn BlobStore>);
        let schema = schema();
        let mut stored = bridge
            .variables_to_storage(
                "form",
                &schema,
                &variables(json!({ "attachment": [wire_file("data:application/json;base64,eyJ9")] })),
            )
            .await
            .expect("first upload");
        let first = stored.to_value();

        for _ in 0..3 {
            let wire = bridge
                .variables_to_wire("form", &schema, &stored)
                .await
                .expect("to wire");
            stored = bridge
                .variables_to_storage("form", &schema, &wire)
                .await
                .expect("back to storage");
        }
        assert_eq!(stored.to_value(), first);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_bare_rows_of_unwrapped_grid_are_converted() {
        let bridge = FileAttributeBridge::new(Arc::new(DataUrlBlobStore));
        let schema = schema();
        let mut data = VariableSet::new();
        data.insert(
            "docs",
            Variable::Array(vec![Variable::Leaf(json!([{
                "filename": "b.txt",
                "mimeType": "text/plain",
                "url": "https://files.example.com/b.txt",
                "size": 10
            }]))]),
        );

        let wire = bridge
            .variables_to_wire("form", &schema, &data)
            .await
            .expect("bare rows convert");
        assert_eq!(
            wire.to_value(),
            json!({ "docs": [[{
                "name": "b.txt",
                "originalName": "b.txt",
                "type": "text/plain",
                "url": "https://files.example.com/b.txt",
                "size": 10,
                "storage": "url"
            }]] })
        );
    }

    #[tokio::test]
    async fn test_data_url_store_keeps_payload_inline() {
        let bridge = FileAttributeBridge::new(Arc::new(DataUrlBlobStore));
        let wire: WireFile = serde_json::from_value(wire_file("data:application/json;base64,eyJ9"))
            .expect("wire file fixture");
        let stored = bridge.to_storage_file(&wire).await.expect("inline store");
        assert_eq!(stored.storage_kind, StorageKind::Base64);
        assert!(stored.id.is_none());
        assert_eq!(stored.url, "data:application/json;base64,eyJ9");
    }

    #[tokio::test]
    async fn test_malformed_file_reference_fails() {
        let bridge = FileAttributeBridge::new(Arc::new(DataUrlBlobStore));
        let schema = schema();
        let data = variables(json!({ "attachment": [{ "size": "large" }] }));
        let result = bridge.variables_to_storage("form", &schema, &data).await;
        assert!(matches!(
            result.map_err(|e| e.current_context().clone()),
            Err(Error::MalformedData(_))
        ));
    }
}
