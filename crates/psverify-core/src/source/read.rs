use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::{fs, path::Path};

use crate::report::model::{ScriptHash, ScriptInfo};

/// Raw script as read from disk.
///
/// Holds the exact bytes verified and a fingerprint identifying them.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub path: String,

    /// Exact bytes read from disk.
    pub bytes: Vec<u8>,

    pub size_bytes: u64,

    /// Hash algorithm used for fingerprinting.
    pub hash_alg: String,

    /// Hex-encoded hash of the script bytes.
    pub hash_hex: String,
}

impl ScriptSource {
    /// Script text, or `None` when the bytes are not readable text.
    pub fn text(&self) -> Option<String> {
        decode_text(&self.bytes)
    }

    /// Report-facing metadata. Drops the raw bytes.
    pub fn into_script_info(self) -> ScriptInfo {
        ScriptInfo {
            path: self.path,
            size_bytes: self.size_bytes,
            hash: Some(ScriptHash {
                algorithm: self.hash_alg,
                value: self.hash_hex,
            }),
        }
    }
}

/// Read a script and compute a stable sha256 identity.
///
/// The identity depends only on the file bytes. Timestamps and
/// permissions are ignored, so the same script always reports the same hash.
pub fn read_script(path: &Path) -> Result<ScriptSource> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read script: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();

    Ok(ScriptSource {
        path: path.display().to_string(),
        size_bytes: bytes.len() as u64,
        bytes,
        hash_alg: "sha256".to_string(),
        hash_hex: hex::encode(digest),
    })
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Decode script bytes as text.
///
/// UTF-8 (with or without BOM) and BOM-prefixed UTF-16 are accepted.
/// Anything else, or text containing NUL, is treated as binary.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    let text = if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        decode_utf16(rest, u16::from_le_bytes)?
    } else if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        decode_utf16(rest, u16::from_be_bytes)?
    } else {
        let rest = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        String::from_utf8(rest.to_vec()).ok()?
    };

    if text.contains('\0') {
        return None;
    }
    Some(text)
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}
