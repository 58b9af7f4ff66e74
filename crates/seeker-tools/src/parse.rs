use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{Result, Tool, ToolError, fetch::extract_html_text, require_str};

/// Result of one `parse_file` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub text: String,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: String,
    pub size_bytes: u64,
    pub extension: String,
}

/// `parse_file` tool: extract text from locally available files.
#[derive(Debug, Default)]
pub struct ParseFileTool;

impl ParseFileTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ParseFileTool {
    fn name(&self) -> &str {
        "parse_file"
    }

    fn description(&self) -> &str {
        "Parse a local file to text with metadata."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to a local file"}
            },
            "required": ["path"]
        })
    }

    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> Result<Value> {
        let path_str = require_str(&args, "path")?;
        let path = Path::new(path_str);

        if cancel.is_cancelled() {
            return Err(ToolError::cancelled());
        }

        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(ToolError::invalid_args(format!("not a file: {path_str}")));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = tokio::fs::read(path).await?;
        let text = match extension.as_str() {
            "html" | "htm" => extract_html_text(&String::from_utf8_lossy(&bytes)),
            "txt" | "md" | "csv" | "json" | "toml" | "yaml" | "yml" | "rs" | "py" | "js" => {
                String::from_utf8_lossy(&bytes).into_owned()
            }
            // Binary formats yield empty text; metadata still identifies them.
            _ => String::new(),
        };

        let content = FileContent {
            text,
            metadata: FileMetadata {
                path: path_str.to_string(),
                size_bytes: meta.len(),
                extension,
            },
        };
        serde_json::to_value(&content).map_err(|e| ToolError::parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nBody text.").unwrap();

        let tool = ParseFileTool::new();
        let out = tool
            .invoke(
                json!({"path": path.to_str().unwrap()}),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let content: FileContent = serde_json::from_value(out).unwrap();

        assert!(content.text.contains("Body text."));
        assert_eq!(content.metadata.extension, "md");
        assert!(content.metadata.size_bytes > 0);
    }

    #[tokio::test]
    async fn parses_html_file_to_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html><body><p>inner</p><script>x</script></body></html>").unwrap();

        let tool = ParseFileTool::new();
        let out = tool
            .invoke(
                json!({"path": path.to_str().unwrap()}),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let content: FileContent = serde_json::from_value(out).unwrap();

        assert_eq!(content.text, "inner");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let tool = ParseFileTool::new();
        let err = tool
            .invoke(json!({"path": "/nonexistent/q.txt"}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::ToolErrorKind::Io);
    }

    #[tokio::test]
    async fn unknown_extension_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0u8, 1, 2, 3]).unwrap();

        let tool = ParseFileTool::new();
        let out = tool
            .invoke(
                json!({"path": path.to_str().unwrap()}),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let content: FileContent = serde_json::from_value(out).unwrap();
        assert!(content.text.is_empty());
        assert_eq!(content.metadata.extension, "bin");
    }
}
