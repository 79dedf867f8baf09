/// File Operation Tools
///
/// list_directory, read_file, write_file, create_directory and delete_file.
/// Every path argument is resolved through the sandbox before the filesystem
/// is touched; paths in results are echoed exactly as the client sent them.

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::core::error::ToolError;
use crate::core::registry::{Arguments, RegistryError, ToolDescriptor, ToolHandler, ToolRegistry};
use crate::core::sandbox::Sandbox;
use crate::tools::{required_str, str_arg};

/// Register the five file tools, in catalog order.
pub fn register(
    registry: &mut ToolRegistry,
    sandbox: &Sandbox,
    max_file_bytes: u64,
) -> Result<(), RegistryError> {
    registry.register(
        ToolDescriptor::new(
            "list_directory",
            "List files and folders in a directory. Path is relative to the server's base folder.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to base folder. Use '.' for root."
                    }
                },
                "required": []
            }),
        ),
        Arc::new(ListDirectory {
            sandbox: sandbox.clone(),
        }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "read_file",
            "Read the contents of a text file. Path is relative to server's base folder.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "File path relative to base folder"
                    }
                },
                "required": ["path"]
            }),
        ),
        Arc::new(ReadFile {
            sandbox: sandbox.clone(),
            max_bytes: max_file_bytes,
        }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "write_file",
            "Write content to a file. Creates the file if it doesn't exist, overwrites if it does.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "File path relative to base folder"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["path", "content"]
            }),
        ),
        Arc::new(WriteFile {
            sandbox: sandbox.clone(),
        }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "create_directory",
            "Create a new directory. Path is relative to server's base folder.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Directory path to create"
                    }
                },
                "required": ["path"]
            }),
        ),
        Arc::new(CreateDirectory {
            sandbox: sandbox.clone(),
        }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "delete_file",
            "Delete a file. Path is relative to server's base folder.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "File path to delete"
                    }
                },
                "required": ["path"]
            }),
        ),
        Arc::new(DeleteFile {
            sandbox: sandbox.clone(),
        }),
    )
}

#[derive(Debug, Serialize, PartialEq)]
struct DirEntry {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    size: Option<u64>,
}

/// Metadata for `path`, or None when nothing exists there.
/// Read at most `max_bytes` from `path`. `None` when the file holds more,
/// which happens if it grew after its size was checked.
async fn read_capped(path: &std::path::Path, max_bytes: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    fs::File::open(path)
        .await?
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buf)
        .await?;
    if buf.len() as u64 > max_bytes {
        Ok(None)
    } else {
        Ok(Some(buf))
    }
}

async fn metadata_if_exists(path: &std::path::Path) -> Result<Option<std::fs::Metadata>, ToolError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct ListDirectory {
    sandbox: Sandbox,
}

#[async_trait]
impl ToolHandler for ListDirectory {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let path = str_arg(&args, "path").unwrap_or(".");
        let dir = self.sandbox.resolve(path)?;

        match metadata_if_exists(&dir).await? {
            None => return Err(ToolError::failed(format!("Path does not exist: {path}"))),
            Some(meta) if !meta.is_dir() => {
                return Err(ToolError::failed(format!("Path is not a directory: {path}")));
            }
            Some(_) => {}
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            // Follow symlinks like a plain stat would; dangling links count as files.
            let meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(_) => entry.metadata().await?,
            };
            let is_dir = meta.is_dir();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if is_dir { "directory" } else { "file" },
                size: meta.is_file().then(|| meta.len()),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(json!({ "path": path, "entries": entries }))
    }
}

struct ReadFile {
    sandbox: Sandbox,
    max_bytes: u64,
}

#[async_trait]
impl ToolHandler for ReadFile {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let path = required_str(&args, "path")?;
        let file = self.sandbox.resolve(path)?;

        let Some(meta) = metadata_if_exists(&file).await? else {
            return Err(ToolError::failed(format!("File not found: {path}")));
        };
        if !meta.is_file() {
            return Err(ToolError::failed(format!("Not a file: {path}")));
        }
        let size = meta.len();
        if size > self.max_bytes {
            return Err(ToolError::failed(format!(
                "File too large ({size} bytes). Max: {} bytes",
                self.max_bytes
            )));
        }

        let Some(buf) = read_capped(&file, self.max_bytes).await? else {
            return Err(ToolError::failed(format!(
                "File grew past the limit while reading. Max: {} bytes",
                self.max_bytes
            )));
        };
        let size = buf.len();
        let content = String::from_utf8(buf).map_err(|_| {
            ToolError::failed(format!("File is not readable as UTF-8 text: {path}"))
        })?;

        Ok(json!({ "path": path, "content": content, "size": size }))
    }
}

struct WriteFile {
    sandbox: Sandbox,
}

#[async_trait]
impl ToolHandler for WriteFile {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let file = self.sandbox.resolve(path)?;

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&file, content).await?;
        tracing::debug!(path, bytes = content.len(), "file written");

        Ok(json!({ "success": true, "path": path, "size": content.len() }))
    }
}

struct CreateDirectory {
    sandbox: Sandbox,
}

#[async_trait]
impl ToolHandler for CreateDirectory {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let path = required_str(&args, "path")?;
        let dir = self.sandbox.resolve(path)?;
        fs::create_dir_all(&dir).await?;
        Ok(json!({ "success": true, "path": path }))
    }
}

struct DeleteFile {
    sandbox: Sandbox,
}

#[async_trait]
impl ToolHandler for DeleteFile {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let path = required_str(&args, "path")?;
        let file = self.sandbox.resolve(path)?;

        let Some(meta) = metadata_if_exists(&file).await? else {
            return Err(ToolError::failed(format!("File not found: {path}")));
        };
        if !meta.is_file() {
            return Err(ToolError::failed(format!("Not a file: {path}")));
        }
        fs::remove_file(&file).await?;
        Ok(json!({ "success": true, "path": path }))
    }
}
