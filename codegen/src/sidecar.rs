//! Sidecar records for drift-aware regeneration.
//!
//! Every file written by a [`FileWriter`] gets a JSON record in the cache
//! directory holding the SHA-256 of the content that was written. Before
//! overwriting, the current file is hashed again: a mismatch means the file
//! was edited by hand since the last generation, and the write is skipped
//! unless forced.
//!
//! # Examples
//!
//! ```no_run
//! use entity_schema_codegen::{FileWriter, WriteOutcome};
//!
//! let mut fw = FileWriter::new("DTOs");
//! fw.add_class("AuthorDto").add_property("name", "String");
//!
//! match fw.write_file("src/dto.rs", ".entity_schema", false).unwrap() {
//!     WriteOutcome::Written => println!("generated"),
//!     WriteOutcome::Skipped => println!("kept hand edits"),
//! }
//! ```

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::writer::{FileMap, FileWriter};

/// Current sidecar format version.
pub const SIDECAR_VERSION: u32 = 1;

/// Default directory holding sidecar records.
pub const DEFAULT_CACHE_DIR: &str = ".entity_schema";

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The destination was edited by hand and left untouched.
    Skipped,
}

/// Sidecar describing one generated file, keyed by its output path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFileRecord {
    pub version: u32,
    /// Output path as given to the writer.
    pub path: String,
    /// SHA-256 hex digest of the written content.
    pub sha256: String,
    pub meta: FileMap,
}

impl GeneratedFileRecord {
    pub fn new(path: impl Into<String>, content: &str, meta: FileMap) -> Self {
        Self {
            version: SIDECAR_VERSION,
            path: path.into(),
            sha256: content_hash(content),
            meta,
        }
    }

    /// Loads a record from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::CodegenError::Io) if the file cannot be read, or
    /// [`Json`](crate::CodegenError::Json) if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        let record = serde_json::from_reader(reader)?;
        Ok(record)
    }

    /// Saves the record as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// SHA-256 hex digest of file content.
///
/// # Examples
///
/// ```
/// use entity_schema_codegen::content_hash;
///
/// assert_eq!(
///     content_hash("hello"),
///     "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
/// );
/// ```
pub fn content_hash(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    format!("{:x}", hash)
}

/// Location of the sidecar for `output` inside `cache_dir`.
///
/// Path separators and drive colons are replaced with `_`, so
/// `src/gen/dto.rs` maps to `src_gen_dto.rs.meta.json`.
pub fn sidecar_path(cache_dir: impl AsRef<Path>, output: impl AsRef<Path>) -> PathBuf {
    let safe: String = output
        .as_ref()
        .to_string_lossy()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    cache_dir.as_ref().join(format!("{safe}.meta.json"))
}

/// Returns `true` if `output` no longer matches the hash in its sidecar.
///
/// A missing output or a missing, unreadable or malformed sidecar counts
/// as unmodified; the latter logs a warning.
pub fn has_user_modifications(output: &Path, sidecar: &Path) -> Result<bool> {
    if !sidecar.exists() {
        return Ok(false);
    }
    let record = match GeneratedFileRecord::load(sidecar) {
        Ok(record) => record,
        Err(err) => {
            warn!(sidecar = %sidecar.display(), error = %err, "ignoring unreadable sidecar");
            return Ok(false);
        }
    };
    if record.sha256.is_empty() {
        return Ok(false);
    }

    let current = match fs::read_to_string(output) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };
    Ok(content_hash(&current) != record.sha256)
}

impl FileWriter {
    /// Renders the file and writes it to `output` unless it was hand-edited.
    ///
    /// With `force`, hand edits are overwritten. After a write the sidecar
    /// in `cache_dir` is replaced with the new hash and line map.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::CodegenError::Io) or
    /// [`Json`](crate::CodegenError::Json) if the file or its sidecar cannot
    /// be written.
    pub fn write_file(
        &self,
        output: impl AsRef<Path>,
        cache_dir: impl AsRef<Path>,
        force: bool,
    ) -> Result<WriteOutcome> {
        let output = output.as_ref();
        let sidecar = sidecar_path(cache_dir, output);

        if output.exists() && !force && has_user_modifications(output, &sidecar)? {
            warn!(
                file = self.name(),
                path = %output.display(),
                "destination modified by hand; skipping regeneration (use force to overwrite)"
            );
            return Ok(WriteOutcome::Skipped);
        }

        let content = self.render();
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output, &content)?;

        let record = GeneratedFileRecord::new(
            output.to_string_lossy(),
            &content,
            self.file_map(),
        );
        record.save(&sidecar)?;
        debug!(sidecar = %sidecar.display(), "saved sidecar");

        info!(file = self.name(), path = %output.display(), "generated");
        Ok(WriteOutcome::Written)
    }
}
