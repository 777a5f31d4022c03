use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use regex::Regex;
use tracing::debug;

use super::ResourceProvider;
use crate::constants::EMBEDDED_KEY_PREFIX;
use crate::error::{Error, Result};

/// Matches an optional `embedded:<scope>:` deployment prefix
static EMBEDDED_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!("^{}\\w*:", regex::escape(EMBEDDED_KEY_PREFIX))).ok()
});

/// Serves resources from a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryResourceProvider {
    root: PathBuf,
}

impl DirectoryResourceProvider {
    /// Root the provider at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    /// Directory the provider serves from
    pub fn root(&self) -> &Path { &self.root }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(strip_embedded_prefix(key));
        let escapes = relative
            .components()
            .any(|part| !matches!(part, PathComponent::Normal(_) | PathComponent::CurDir));
        if escapes {
            return Err(Report::new(Error::invalid(
                "resource key",
                format!("'{key}' leaves the resource root"),
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Remove a leading `embedded:<scope>:` prefix from a resource key
pub fn strip_embedded_prefix(key: &str) -> &str {
    EMBEDDED_PREFIX
        .as_ref()
        .and_then(|regex| regex.find(key))
        .map_or(key, |found| &key[found.end()..])
}

#[async_trait]
impl ResourceProvider for DirectoryResourceProvider {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(key, path = %path.display(), size = bytes.len(), "Loaded resource");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Report::new(Error::ResourceNotFound(key.to_string()))
                .attach(format!("Path: {}", path.display()))
                .attach(e.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = strip_embedded_prefix(prefix);
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(directory) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Report::new(Error::ResourceNotFound(prefix.to_string()))
                        .attach(format!("Directory: {}", directory.display()))
                        .attach(e.to_string()));
                }
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .change_context(Error::ResourceNotFound(prefix.to_string()))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .change_context(Error::ResourceNotFound(prefix.to_string()))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
