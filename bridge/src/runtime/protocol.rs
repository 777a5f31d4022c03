//! Request and response frames exchanged with a script runtime

use error_stack::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::data::WireDocument;
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Command a runtime executes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Clean up and validate a submission
    Validate,
    /// Drop data not bound by the form
    Cleanup,
    /// Health probe, answered with any non-error frame
    Ping,
}

/// One request to a script runtime
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCommand<'a> {
    /// Expanded schema
    pub form:          &'a Schema,
    /// Wire-shaped submission data
    pub data:          &'a WireDocument,
    /// What the runtime should do
    pub operation:     Operation,
    /// Directory with runtime resources, backslashes doubled
    pub resource_path: String,
}

impl<'a> ScriptCommand<'a> {
    /// Build a command for `operation` over `data`
    pub fn new(operation: Operation, form: &'a Schema, data: &'a WireDocument, resource_path: &str) -> Self {
        Self {
            form,
            data,
            operation,
            resource_path: resource_path.replace('\\', "\\\\"),
        }
    }

    /// Encode as a single line terminated frame
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(self)
            .map_err(|e| Report::new(Error::serialization("script command", e)))?;
        frame.push(b'\n');
        Ok(frame)
    }
}

/// Frame for a `ping` probe
pub fn ping_frame() -> Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(&serde_json::json!({ "operation": Operation::Ping }))
        .map_err(|e| Report::new(Error::serialization("ping command", e)))?;
    frame.push(b'\n');
    Ok(frame)
}

/// Successful response of a script runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScriptResult {
    /// Cleaned or validated wire document
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ScriptResult {
    /// Decode a response frame; an empty frame carries no data
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        if frame.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(frame).map_err(|e| {
            Report::new(Error::RuntimeProtocol(format!("response is not a JSON object: {e}")))
                .attach(String::from_utf8_lossy(frame).into_owned())
        })
    }

    /// Take the data as a wire document
    pub fn into_document(self) -> WireDocument { WireDocument(self.data) }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "frames in these tests are well formed")]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_command_frame() {
        let schema = Schema::default();
        let data = WireDocument::new();
        let command = ScriptCommand::new(Operation::Validate, &schema, &data, r"C:\forms\scripts");
        let frame = command.to_frame().expect("command encodes");
        assert_eq!(frame.last(), Some(&b'\n'));

        let decoded: Value = serde_json::from_slice(&frame).expect("frame is JSON");
        assert_eq!(decoded["operation"], json!("validate"));
        assert_eq!(decoded["resourcePath"], json!(r"C:\\forms\\scripts"));
        assert_eq!(decoded["form"], json!({ "components": [] }));
        assert_eq!(decoded["data"], json!({}));
    }

    #[test]
    fn test_result_frames() {
        let result = ScriptResult::from_frame(br#"{"data":{"a":1},"errors":[]}"#);
        assert_eq!(result.map(ScriptResult::into_document).ok().and_then(|d| d.get("a").cloned()), Some(json!(1)));
        assert_eq!(ScriptResult::from_frame(b"{}").ok(), Some(ScriptResult::default()));
        assert_eq!(ScriptResult::from_frame(b"  \n").ok(), Some(ScriptResult::default()));
        assert!(matches!(
            ScriptResult::from_frame(b"[object Object]").map_err(|e| e.current_context().clone()),
            Err(Error::RuntimeProtocol(_))
        ));
    }
}
