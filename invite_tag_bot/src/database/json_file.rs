use std::{
    io::Write,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use super::Error;

/// Read a JSON file, falling back to the default value if it's missing
/// or doesn't parse. The latter is logged, since it means data was lost.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("{} doesn't exist yet, starting empty.", path.display());
            return T::default();
        }
        Err(e) => {
            log::error!("Failed to read {}, starting empty: {e}", path.display());
            return T::default();
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            log::error!("Failed to parse {}, starting empty: {e}", path.display());
            T::default()
        }
    }
}

/// Write the whole value into the file.
///
/// Serializes right away, then leaves the disk work to the blocking thread
/// pool. Goes through a temporary file in the same directory that then
/// replaces the target, so a failed write leaves the old file intact.
pub async fn save<T: Serialize + ?Sized>(path: PathBuf, value: &T) -> Result<(), Error> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::task::spawn_blocking(move || write_atomically(&path, &bytes)).await?
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;

    Ok(())
}
