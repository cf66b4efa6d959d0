//! File tool - confined file reads

use crate::error::{Error, Result};
use crate::tool::{Tool, ToolResult};
use std::path::{Path, PathBuf};
use std::time::Instant;
use talos_llm::ToolDefinition;
use tracing::warn;

/// Maximum file size returned by default (1 MiB)
const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

/// Check whether a file name looks like credential material
fn is_sensitive_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();

    name == ".env"
        || name.starts_with(".env.")
        || name.contains("id_rsa")
        || name.contains("id_ed25519")
        || name.ends_with(".pem")
        || name.ends_with(".key")
        || name == "credentials"
        || name == ".netrc"
}

/// Read a file under a confined root directory
pub struct FileReadTool {
    definition: ToolDefinition,
    root: Option<PathBuf>,
    max_bytes: usize,
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FileReadTool {
    /// Create a new file-read tool; `root` confines all paths when set
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            definition: ToolDefinition::new(
                "file_read",
                "Read a UTF-8 text file and return its contents",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path to read"}
                    },
                    "required": ["path"]
                }),
            ),
            root,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Set the maximum number of bytes returned
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Validate and resolve the requested path against the confinement root
    fn resolve(&self, raw: &str) -> Result<PathBuf> {
        if raw.split(['/', '\\']).any(|part| part == "..") {
            warn!(path = %raw, "Blocked path traversal attempt");
            return Err(Error::PermissionDenied(
                "path traversal ('..') is not allowed".to_string(),
            ));
        }

        let requested = PathBuf::from(raw);
        let resolved = match &self.root {
            Some(root) => {
                let joined = if requested.is_absolute() {
                    requested
                } else {
                    root.join(requested)
                };
                if !joined.starts_with(root) {
                    return Err(Error::PermissionDenied(format!(
                        "path escapes the allowed root: {raw}"
                    )));
                }
                joined
            }
            None => requested,
        };

        if is_sensitive_file(&resolved) {
            warn!(path = %resolved.display(), "Blocked read of sensitive file");
            return Err(Error::PermissionDenied(format!(
                "reading '{raw}' is blocked"
            )));
        }

        Ok(resolved)
    }
}

#[async_trait::async_trait]
impl Tool for FileReadTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let started = Instant::now();
        let raw = input
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("missing 'path' argument".to_string()))?;

        let path = self.resolve(raw)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Execution(format!("read '{raw}': {e}")))?;

        let truncated = bytes.len() > self.max_bytes;
        let slice = if truncated {
            &bytes[..self.max_bytes]
        } else {
            &bytes[..]
        };
        let content = String::from_utf8_lossy(slice).into_owned();

        Ok(ToolResult::success(
            serde_json::json!({
                "path": path.display().to_string(),
                "content": content,
                "truncated": truncated,
            }),
            started.elapsed().as_millis() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "hello").unwrap();

        let tool = FileReadTool::new(Some(dir.path().to_path_buf()));
        let result = tool
            .execute(serde_json::json!({"path": "note.txt"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["content"], "hello");
    }

    #[tokio::test]
    async fn test_blocks_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(Some(dir.path().to_path_buf()));

        let err = tool
            .execute(serde_json::json!({"path": "../outside.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_blocks_sensitive_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "SECRET=1").unwrap();

        let tool = FileReadTool::new(Some(dir.path().to_path_buf()));
        let err = tool
            .execute(serde_json::json!({"path": ".env"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_truncates_large_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(64)).unwrap();

        let tool = FileReadTool::new(Some(dir.path().to_path_buf())).with_max_bytes(16);
        let result = tool
            .execute(serde_json::json!({"path": "big.txt"}))
            .await
            .unwrap();
        assert_eq!(result.output["truncated"], true);
        assert_eq!(result.output["content"].as_str().unwrap().len(), 16);
    }
}
