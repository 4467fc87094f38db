// Persistent state file - line-oriented namespace/key/value records behind an
// integrity header
//
// Layout:
//   header:  magic SEP version SEP base64(sha256(body)) SEP item-count
//   body:    one record per line, namespace SEP key SEP base64(value)
//
// SEP is U+001F. Line terminators are accepted as any combination of CR/LF on
// read and emitted as LF. The checksum covers the body only: every byte from
// the first line terminator after the header through EOF, exactly as stored.
// Writes are atomic: temp file in the target directory, previous file kept as
// `<path>.old` across the swap.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAGIC: &str = "FortunaPoolState";
const VERSION: u32 = 1;
const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Error, Debug)]
pub enum StateFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a state file (bad magic)")]
    BadMagic,

    #[error("unsupported state file version {0}")]
    UnsupportedVersion(u32),

    #[error("malformed header line")]
    MalformedHeader,

    #[error("state file is not valid UTF-8")]
    InvalidEncoding,

    #[error("malformed record {0}")]
    MalformedRecord(usize),

    #[error("invalid base64 in record {0}")]
    Base64(usize),

    #[error("header announces {expected} items, body contains {actual}")]
    ItemCountMismatch { expected: usize, actual: usize },

    #[error("body checksum mismatch")]
    ChecksumMismatch,

    #[error("field contains a separator or line terminator: {0:?}")]
    InvalidField(String),
}

/// One persisted `(namespace, key, value)` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentItem {
    namespace: String,
    key: String,
    value: Vec<u8>,
}

impl PersistentItem {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Atomically replace `path` with a state file holding `items`.
///
/// The content is written to a temp file in the same directory and renamed
/// into place; any previous file survives the swap as `<path>.old`.
pub fn write_state_file(path: &Path, items: &[PersistentItem]) -> Result<(), StateFileError> {
    for item in items {
        validate_field(item.namespace())?;
        validate_field(item.key())?;
    }

    let mut body = String::new();
    for item in items {
        body.push('\n');
        body.push_str(item.namespace());
        body.push(FIELD_SEPARATOR);
        body.push_str(item.key());
        body.push(FIELD_SEPARATOR);
        body.push_str(&BASE64.encode(item.value()));
    }
    body.push('\n');

    let checksum = BASE64.encode(Sha256::digest(body.as_bytes()));
    let header = format!(
        "{MAGIC}{sep}{VERSION}{sep}{checksum}{sep}{count}",
        sep = FIELD_SEPARATOR,
        count = items.len(),
    );

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(header.as_bytes())?;
    temp.write_all(body.as_bytes())?;
    temp.flush()?;
    temp.as_file().sync_all()?;

    if path.exists() {
        let old = old_path(path);
        let _ = fs::remove_file(&old);
        fs::rename(path, &old)?;
    }
    temp.persist(path).map_err(|err| StateFileError::Io(err.error))?;
    Ok(())
}

/// Read and verify a state file, returning its records in file order.
pub fn read_state_file(path: &Path) -> Result<Vec<PersistentItem>, StateFileError> {
    let data = fs::read(path)?;
    parse_state_file(&data)
}

fn parse_state_file(data: &[u8]) -> Result<Vec<PersistentItem>, StateFileError> {
    let header_end = data
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .ok_or(StateFileError::MalformedHeader)?;
    let header = std::str::from_utf8(&data[..header_end])
        .map_err(|_| StateFileError::InvalidEncoding)?;
    let body_raw = &data[header_end..];

    let fields: Vec<&str> = header.split(FIELD_SEPARATOR).collect();
    if fields[0] != MAGIC {
        return Err(StateFileError::BadMagic);
    }
    if fields.len() != 4 {
        return Err(StateFileError::MalformedHeader);
    }
    let version: u32 = fields[1].parse().map_err(|_| StateFileError::MalformedHeader)?;
    if version != VERSION {
        return Err(StateFileError::UnsupportedVersion(version));
    }
    let expected: usize = fields[3].parse().map_err(|_| StateFileError::MalformedHeader)?;

    let stored_checksum = BASE64
        .decode(fields[2])
        .map_err(|_| StateFileError::MalformedHeader)?;
    if stored_checksum != Sha256::digest(body_raw).as_slice() {
        return Err(StateFileError::ChecksumMismatch);
    }

    let body = std::str::from_utf8(body_raw).map_err(|_| StateFileError::InvalidEncoding)?;
    let mut items = Vec::new();
    for line in body.split(['\r', '\n']) {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != 3 {
            return Err(StateFileError::MalformedRecord(items.len() + 1));
        }
        let value = BASE64
            .decode(fields[2])
            .map_err(|_| StateFileError::Base64(items.len() + 1))?;
        items.push(PersistentItem::new(fields[0], fields[1], value));
    }

    if items.len() != expected {
        return Err(StateFileError::ItemCountMismatch {
            expected,
            actual: items.len(),
        });
    }
    Ok(items)
}

fn validate_field(field: &str) -> Result<(), StateFileError> {
    if field.contains([FIELD_SEPARATOR, '\n', '\r']) {
        return Err(StateFileError::InvalidField(field.to_string()));
    }
    Ok(())
}

fn old_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".old");
    PathBuf::from(os)
}
