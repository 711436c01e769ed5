use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::Result;

/// Files up to this size are always hashed in full.
const FULL_HASH_LIMIT: u64 = 100 * 1024 * 1024;
/// Head and tail window fed into the fingerprint of larger files.
const FINGERPRINT_WINDOW: u64 = 10 * 1024 * 1024;

const READ_BUFFER: usize = 65536;

/// Verify a downloaded artifact against its expected content hash.
///
/// Small files get a full streaming SHA-256. Large files are first checked
/// with a cheap fingerprint over their head, tail and size; packages whose
/// expected hash predates the fingerprint scheme fall back to the full hash.
pub fn verify(path: &Path, expected_hash: &str) -> Result<bool> {
    verify_with_limits(path, expected_hash, FULL_HASH_LIMIT, FINGERPRINT_WINDOW)
}

pub(crate) fn verify_with_limits(
    path: &Path,
    expected_hash: &str,
    full_hash_limit: u64,
    window: u64,
) -> Result<bool> {
    let size = std::fs::metadata(path)?.len();
    let expected = expected_hash.trim().to_ascii_lowercase();

    if size <= full_hash_limit {
        return Ok(full_hash(path)? == expected);
    }

    if fingerprint_hash(path, size, window)? == expected {
        return Ok(true);
    }

    tracing::debug!(
        "fingerprint mismatch for {}, falling back to full hash",
        path.display()
    );
    Ok(full_hash(path)? == expected)
}

pub(crate) fn full_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; READ_BUFFER];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 over {first `window` bytes} + {last `window` bytes} + {size as
/// 8-byte little-endian}. Resistant to truncation without a full read.
pub(crate) fn fingerprint_hash(path: &Path, size: u64, window: u64) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();

    let head_len = window.min(size);
    hash_range(&mut file, &mut hasher, head_len)?;

    let tail_len = window.min(size);
    file.seek(SeekFrom::End(-(tail_len as i64)))?;
    hash_range(&mut file, &mut hasher, tail_len)?;

    hasher.update(size.to_le_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn hash_range(file: &mut File, hasher: &mut Sha256, mut remaining: u64) -> Result<()> {
    let mut buffer = [0u8; READ_BUFFER];
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let bytes_read = file.read(&mut buffer[..want])?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        remaining -= bytes_read as u64;
    }
    Ok(())
}
