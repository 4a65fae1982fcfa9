//! The task executor: in-place additive file transforms.
//!
//! Workers hand over the raw dequeued task string; this module decodes it,
//! picks the cipher key (password derivation or the environment key), checks
//! the sidecar lock tag on decrypt, rewrites the file bytes in place, and
//! applies the rename/sidecar policy afterwards.
//!
//! The sidecar convention: `<file>.lock` holds the decimal verification tag
//! of the password that encrypted the file. Encrypting with a password also
//! renames the file to `<file>.encrypted`; decrypting with a password strips
//! that suffix again and removes the sidecars.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, ShroudError};
use crate::keys::{self, Derivation};
use crate::pool::{Action, Task};

/// Suffix appended to files encrypted with a password.
const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Suffix of the sidecar lock file holding the verification tag.
const LOCK_SUFFIX: &str = ".lock";

/// Execute one dequeued task string. A stop sentinel is a no-op success;
/// a malformed string is a format error and the caller decides what to log.
pub fn process_task(raw: &str) -> Result<()> {
    let Task::Work { action, path, key } = Task::decode(raw)? else {
        return Ok(());
    };

    let credential = keys::split_credential(&key);
    let cipher_key = select_key(action, &path, credential)?;

    transform_file(&path, action, cipher_key)?;

    match action {
        Action::Encrypt => finish_encrypt(&path, credential),
        Action::Decrypt => finish_decrypt(&path, credential.is_some()),
    }

    info!(action = %action, path = %path.display(), "transform complete");
    Ok(())
}

/// Decide the cipher key byte for this task.
///
/// Encrypt: password derivation if a password was supplied, else the
/// environment key. Decrypt additionally verifies the password against an
/// existing sidecar tag, accepting whichever derivation matches, and
/// requires a password when a sidecar is present.
fn select_key(
    action: Action,
    path: &Path,
    credential: Option<(&str, Derivation)>,
) -> Result<u8> {
    let lock = lock_path(path);
    match (action, credential) {
        (Action::Encrypt, Some((password, derivation))) => Ok(derivation.cipher_key(password)),
        (Action::Encrypt, None) => keys::load_env_key(),
        (Action::Decrypt, Some((password, requested))) => {
            let derivation = if lock.exists() {
                let stored = read_tag(&lock)?;
                if stored == Derivation::Fnv1a.tag(password) {
                    Derivation::Fnv1a
                } else if stored == Derivation::Legacy.tag(password) {
                    Derivation::Legacy
                } else {
                    return Err(ShroudError::KeyMismatch(path.to_path_buf()));
                }
            } else {
                requested
            };
            Ok(derivation.cipher_key(password))
        }
        (Action::Decrypt, None) => {
            if lock.exists() {
                return Err(ShroudError::KeyRequired(path.to_path_buf()));
            }
            keys::load_env_key()
        }
    }
}

/// Rewrite the file bytes in place with the additive cipher.
fn transform_file(path: &Path, action: Action, key: u8) -> Result<()> {
    let mut data = fs::read(path)?;
    for byte in &mut data {
        *byte = match action {
            Action::Encrypt => byte.wrapping_add(key),
            Action::Decrypt => byte.wrapping_sub(key),
        };
    }
    fs::write(path, data)?;
    Ok(())
}

/// Post-encrypt rename and sidecar policy. Failures here are warnings: the
/// file content is already transformed.
fn finish_encrypt(path: &Path, credential: Option<(&str, Derivation)>) {
    let Some((password, derivation)) = credential else {
        // Environment-key mode must not leave a stale lock behind.
        let _ = fs::remove_file(lock_path(path));
        return;
    };

    let encrypted = path_with_suffix(path, ENCRYPTED_SUFFIX);
    let sidecar = match fs::rename(path, &encrypted) {
        Ok(()) => lock_path(&encrypted),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not rename to .encrypted");
            lock_path(path)
        }
    };
    if let Err(e) = fs::write(&sidecar, derivation.tag(password).to_string()) {
        warn!(path = %sidecar.display(), error = %e, "could not write lock file");
    }
}

/// Post-decrypt rename and sidecar cleanup.
fn finish_decrypt(path: &Path, had_password: bool) {
    if !had_password {
        let _ = fs::remove_file(lock_path(path));
        return;
    }

    let Some(stem) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(ENCRYPTED_SUFFIX))
    else {
        let _ = fs::remove_file(lock_path(path));
        return;
    };

    let target = path.with_file_name(stem);
    match fs::rename(path, &target) {
        Ok(()) => {
            let _ = fs::remove_file(lock_path(path));
            let _ = fs::remove_file(lock_path(&target));
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not restore original file name");
        }
    }
}

/// The sidecar path: the full file name plus `.lock`.
fn lock_path(path: &Path) -> PathBuf {
    path_with_suffix(path, LOCK_SUFFIX)
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Read the decimal verification tag from a sidecar lock file.
fn read_tag(lock: &Path) -> Result<u32> {
    let contents = fs::read_to_string(lock)?;
    contents
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| ShroudError::InvalidLock(lock.to_path_buf()))
}
