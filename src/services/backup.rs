//! Encrypted local backup of the database and image attachments.
//!
//! Archive layout: tar (DB snapshot + attachments/) → zstd → AES-256-GCM
//! with a PBKDF2-HMAC-SHA256 key derived from the user's password. The file
//! body is `salt[16] || nonce[12] || ciphertext_with_tag`.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::Connection;
use sha2::Sha256;
use thiserror::Error;

use crate::database::{ATTACHMENTS_DIR, DB_FILE};

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("encryption failed: {0}")]
    Crypto(String),
    #[error("wrong password or corrupted archive")]
    WrongPassword,
    #[error("invalid backup archive")]
    InvalidArchive,
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_SIZE] {
    let mut derived_key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut derived_key);
    derived_key
}

fn encrypt_bytes(plaintext: &[u8], password: &str) -> Result<Vec<u8>, BackupError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let derived_key = derive_key(password, &salt);

    let key = Key::<Aes256Gcm>::from_slice(&derived_key);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| BackupError::Crypto(e.to_string()))?;

    // Combine: salt || nonce || ciphertext (includes GCM tag)
    let mut combined = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

fn decrypt_bytes(data: &[u8], password: &str) -> Result<Vec<u8>, BackupError> {
    if data.len() < SALT_SIZE + NONCE_SIZE + 1 {
        return Err(BackupError::InvalidArchive);
    }

    let salt = &data[..SALT_SIZE];
    let nonce_bytes = &data[SALT_SIZE..SALT_SIZE + NONCE_SIZE];
    let ciphertext = &data[SALT_SIZE + NONCE_SIZE..];

    let derived_key = derive_key(password, salt);
    let key = Key::<Aes256Gcm>::from_slice(&derived_key);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| BackupError::WrongPassword)
}

/// Package the database and attachments into an encrypted archive under
/// `backups/` and return its path.
pub fn create_backup(data_dir: &Path, password: &str) -> Result<PathBuf, BackupError> {
    let backups_dir = data_dir.join("backups");
    fs::create_dir_all(&backups_dir)?;

    // Consistent snapshot of the live DB, safe under WAL.
    let snapshot_path = backups_dir.join(".snapshot.db");
    if snapshot_path.exists() {
        fs::remove_file(&snapshot_path)?;
    }
    {
        let conn = Connection::open(data_dir.join(DB_FILE))?;
        conn.execute("VACUUM INTO ?1", [snapshot_path.to_string_lossy().to_string()])?;
    }

    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        builder.append_path_with_name(&snapshot_path, DB_FILE)?;
        let attachments = data_dir.join(ATTACHMENTS_DIR);
        if attachments.is_dir() {
            builder.append_dir_all(ATTACHMENTS_DIR, &attachments)?;
        }
        builder.finish()?;
    }
    fs::remove_file(&snapshot_path)?;

    let compressed = zstd::encode_all(&tar_bytes[..], ZSTD_LEVEL)?;
    let encrypted = encrypt_bytes(&compressed, password)?;

    let out_path = backups_dir.join(format!(
        "smartdiary_backup_{}.sdbak",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    fs::write(&out_path, encrypted)?;
    Ok(out_path)
}

/// Decrypt and unpack an archive into the data dir, replacing the current
/// database and attachments. A wrong password fails before anything is
/// touched.
pub fn restore_backup(data_dir: &Path, archive_path: &Path, password: &str) -> Result<(), BackupError> {
    let data = fs::read(archive_path)?;
    let compressed = decrypt_bytes(&data, password)?;
    let tar_bytes = zstd::decode_all(&compressed[..]).map_err(|_| BackupError::InvalidArchive)?;

    fs::create_dir_all(data_dir)?;

    // Stale WAL sidecars would shadow the restored database file.
    for suffix in ["-wal", "-shm"] {
        let sidecar = data_dir.join(format!("{}{}", DB_FILE, suffix));
        if sidecar.exists() {
            fs::remove_file(sidecar)?;
        }
    }

    let mut archive = tar::Archive::new(&tar_bytes[..]);
    archive.set_overwrite(true);
    archive.unpack(data_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::CreateDiaryEntryRequest;

    fn seed_data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let conn = database::init_database(&dir.path().join(DB_FILE)).unwrap();
        database::queries::insert_diary_entry(
            &conn,
            &CreateDiaryEntryRequest {
                title: "今天".to_string(),
                content: "备份测试".to_string(),
                mood: None,
                tags: None,
            },
        )
        .unwrap();

        let attachments = dir.path().join(ATTACHMENTS_DIR);
        fs::create_dir_all(&attachments).unwrap();
        fs::write(attachments.join("photo.png"), b"not-really-a-png").unwrap();
        dir
    }

    #[test]
    fn backup_restore_roundtrip() {
        let source = seed_data_dir();
        let archive = create_backup(source.path(), "correct horse").unwrap();
        assert!(archive.exists());

        let target = tempfile::tempdir().unwrap();
        restore_backup(target.path(), &archive, "correct horse").unwrap();

        let conn = Connection::open(target.path().join(DB_FILE)).unwrap();
        let entries = database::queries::get_diary_entries(&conn, None, None, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "备份测试");

        let restored = fs::read(target.path().join(ATTACHMENTS_DIR).join("photo.png")).unwrap();
        assert_eq!(restored, b"not-really-a-png");
    }

    #[test]
    fn wrong_password_is_rejected_and_nothing_is_written() {
        let source = seed_data_dir();
        let archive = create_backup(source.path(), "right").unwrap();

        let target = tempfile::tempdir().unwrap();
        let err = restore_backup(target.path(), &archive, "wrong").unwrap_err();
        assert!(matches!(err, BackupError::WrongPassword));
        assert!(!target.path().join(DB_FILE).exists());
    }

    #[test]
    fn truncated_archive_is_invalid() {
        let target = tempfile::tempdir().unwrap();
        let bogus = target.path().join("short.sdbak");
        fs::write(&bogus, b"AAAA").unwrap();
        let err = restore_backup(target.path(), &bogus, "pw").unwrap_err();
        assert!(matches!(err, BackupError::InvalidArchive));
    }

    #[test]
    fn distinct_salts_produce_distinct_archives() {
        let enc1 = encrypt_bytes(b"same-bytes", "pw").unwrap();
        let enc2 = encrypt_bytes(b"same-bytes", "pw").unwrap();
        assert_ne!(enc1, enc2);
        assert_eq!(decrypt_bytes(&enc1, "pw").unwrap(), b"same-bytes");
    }
}
