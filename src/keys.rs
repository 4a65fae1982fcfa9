//! Key derivation and environment key loading.
//!
//! A password derives both the single-byte cipher key (hash reduced mod 256)
//! and the 32-bit verification tag stored in sidecar lock files. Two
//! derivations exist: FNV-1a (the default) and DJB2 (kept for files locked
//! by older releases, requested with the `legacy::` password prefix).

use std::fs;
use std::path::Path;

use crate::error::{Result, ShroudError};

/// Prefix on the task key field that selects the legacy derivation.
pub const LEGACY_PREFIX: &str = "legacy::";

/// File holding the numeric fallback key, read from the working directory.
pub const ENV_KEY_FILE: &str = ".env";

/// Which 32-bit hash derives the cipher key and verification tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// FNV-1a, the default for newly locked files.
    Fnv1a,
    /// DJB2, selected with the `legacy::` password prefix.
    Legacy,
}

impl Derivation {
    /// The full 32-bit hash, stored in sidecar lock files for verification.
    pub fn tag(self, password: &str) -> u32 {
        match self {
            Self::Fnv1a => fnv1a32(password),
            Self::Legacy => djb2_32(password),
        }
    }

    /// The single-byte additive cipher key.
    pub fn cipher_key(self, password: &str) -> u8 {
        (self.tag(password) % 256) as u8
    }
}

/// FNV-1a 32-bit hash.
pub fn fnv1a32(s: &str) -> u32 {
    const FNV_OFFSET: u32 = 2_166_136_261;
    const FNV_PRIME: u32 = 16_777_619;
    s.bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}

/// DJB2 32-bit hash.
pub fn djb2_32(s: &str) -> u32 {
    s.bytes()
        .fold(5381u32, |h, b| h.wrapping_mul(33).wrapping_add(u32::from(b)))
}

/// Split a task key field into password and derivation.
///
/// Returns `None` for an empty field (no password supplied, fall back to the
/// environment key). A `legacy::` prefix is stripped and selects [`Derivation::Legacy`].
pub fn split_credential(key_field: &str) -> Option<(&str, Derivation)> {
    if key_field.is_empty() {
        None
    } else if let Some(rest) = key_field.strip_prefix(LEGACY_PREFIX) {
        Some((rest, Derivation::Legacy))
    } else {
        Some((key_field, Derivation::Fnv1a))
    }
}

/// Read the numeric fallback key from [`ENV_KEY_FILE`] in the working directory.
pub fn load_env_key() -> Result<u8> {
    read_env_key(Path::new(ENV_KEY_FILE))
}

/// Read a numeric key from `path`: whole file, trimmed, parsed as an integer
/// and reduced mod 256.
pub fn read_env_key(path: &Path) -> Result<u8> {
    let contents = fs::read_to_string(path).map_err(|e| ShroudError::EnvKey {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let trimmed = contents.trim();
    let value: i64 = trimmed.parse().map_err(|_| ShroudError::EnvKey {
        path: path.to_path_buf(),
        reason: format!("not an integer: {trimmed:?}"),
    })?;
    Ok(value.rem_euclid(256) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a32_known_values() {
        // Reference values for the standard FNV-1a 32-bit parameters.
        assert_eq!(fnv1a32(""), 2_166_136_261);
        assert_eq!(fnv1a32("a"), 0xE40C_292C);
    }

    #[test]
    fn test_djb2_known_values() {
        assert_eq!(djb2_32(""), 5381);
        assert_eq!(djb2_32("a"), 5381 * 33 + u32::from(b'a'));
    }

    #[test]
    fn test_derivations_disagree() {
        // The dual tag check on decrypt relies on the two hashes differing.
        assert_ne!(
            Derivation::Fnv1a.tag("password"),
            Derivation::Legacy.tag("password")
        );
    }

    #[test]
    fn test_cipher_key_is_tag_mod_256() {
        let tag = Derivation::Fnv1a.tag("pw1");
        assert_eq!(u32::from(Derivation::Fnv1a.cipher_key("pw1")), tag % 256);
    }

    #[test]
    fn test_split_credential_empty() {
        assert_eq!(split_credential(""), None);
    }

    #[test]
    fn test_split_credential_default() {
        assert_eq!(split_credential("hunter2"), Some(("hunter2", Derivation::Fnv1a)));
    }

    #[test]
    fn test_split_credential_legacy_prefix() {
        assert_eq!(
            split_credential("legacy::hunter2"),
            Some(("hunter2", Derivation::Legacy))
        );
    }

    #[test]
    fn test_read_env_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "42\n").unwrap();
        assert_eq!(read_env_key(&path).unwrap(), 42);
    }

    #[test]
    fn test_read_env_key_reduces_mod_256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "300").unwrap();
        assert_eq!(read_env_key(&path).unwrap(), 44);

        std::fs::write(&path, "-1").unwrap();
        assert_eq!(read_env_key(&path).unwrap(), 255);
    }

    #[test]
    fn test_read_env_key_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "not-a-number").unwrap();
        let err = read_env_key(&path).unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn test_read_env_key_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_env_key(&dir.path().join("absent")).unwrap_err();
        assert!(err.to_string().contains("environment key file"));
    }
}
