//! JSON files written with write-temp-then-rename so readers never observe a
//! half-written state.

use analysis_core::SignalError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads `path`, returning `None` when the file does not exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SignalError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SignalError::persistence(path, e)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| SignalError::persistence(path, e))
}

pub fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SignalError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SignalError::persistence(parent, e))?;
    }

    let json = serde_json::to_string_pretty(value).map_err(|e| SignalError::persistence(path, e))?;
    let tmp = temp_path(path);

    let written = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(json.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(SignalError::persistence(&tmp, e));
    }

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        SignalError::persistence(path, e)
    })?;

    tracing::debug!(path = %path.display(), bytes = json.len(), "State written");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
