//! Text I/O with path-carrying errors

use std::fs;

use crate::{Error, NormalizedPath, Result};

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Write text content to a file, creating parent directories as needed.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_bytes(path, content.as_bytes())
}

/// Write raw bytes to a file, creating parent directories as needed.
pub fn write_bytes(path: &NormalizedPath, content: &[u8]) -> Result<()> {
    let native_path = path.to_native();
    if let Some(parent) = native_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(&native_path, content).map_err(|e| Error::io(&native_path, e))
}
