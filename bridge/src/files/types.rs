use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Where the bytes of a stored file live
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// External link, passed through untouched
    #[default]
    Url,
    /// Inline data URL kept inline
    Base64,
    /// Persisted in the blob store under `id`
    Store,
}

/// File reference in the storage shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageFile {
    /// File name shown to users
    #[serde(alias = "filename")]
    pub name:         String,
    /// Mime type of the content
    pub mime_type:    String,
    /// Link to the content, or the content itself as a data URL
    pub url:          String,
    /// Size in bytes
    pub size:         u64,
    /// Where the content lives
    pub storage_kind: StorageKind,
    /// Blob identifier when `storage_kind` is [`StorageKind::Store`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id:           Option<String>,
}

/// File reference in the wire shape used by form clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireFile {
    /// Name of the uploaded file
    pub name:          String,
    /// Name the file had on the client
    pub original_name: String,
    /// Mime type of the content
    #[serde(rename = "type")]
    pub mime_type:     String,
    /// Link to the content, usually a data URL
    pub url:           String,
    /// Size in bytes
    pub size:          u64,
    /// Client storage provider name (`base64`, `url`, `store`)
    pub storage:       String,
    /// Blob identifier of a file already held in the blob store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id:            Option<String>,
}

/// The stored URL and blob id pass through; clients resolve them
impl From<&StorageFile> for WireFile {
    fn from(file: &StorageFile) -> Self {
        Self {
            name:          file.name.clone(),
            original_name: file.name.clone(),
            mime_type:     file.mime_type.clone(),
            url:           file.url.clone(),
            size:          file.size,
            storage:       file.storage_kind.to_string(),
            id:            file.id.clone(),
        }
    }
}
