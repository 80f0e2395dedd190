//! `SQLite`/`SQLCipher` connection handling: mutex guarding, poison recovery,
//! and the pragma set that satisfies the encrypted-store requirements.

use crate::{Error, Result};
use rusqlite::Connection;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Mutex, MutexGuard};

/// Iteration count for `SQLCipher`'s PBKDF2 key derivation.
const KDF_ITER: u32 = 256_000;
/// Page size, in bytes, for the encrypted store.
const CIPHER_PAGE_SIZE: u32 = 4096;

/// Acquires the connection mutex, recovering from poison rather than
/// propagating a panic from one failed operation into every later one.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("sqlite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        }
    }
}

/// Opens (creating if absent) the encrypted database file at `path`, keyed
/// by `passphrase`, and applies every pragma the store requires.
///
/// # Errors
///
/// Returns [`Error::Fatal`] if the file cannot be opened, the passphrase is
/// wrong (detected by the post-open integrity probe), or any pragma fails to
/// apply.
pub fn open_encrypted(path: &std::path::Path, passphrase: &SecretString) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Fatal(format!("creating data directory: {e}")))?;
        }
    }

    let conn = Connection::open(path)
        .map_err(|e| Error::Fatal(format!("opening database file: {e}")))?;

    configure_encryption(&conn, passphrase)?;
    configure_connection(&conn)?;
    verify_key(&conn)?;

    Ok(conn)
}

/// Sets the `SQLCipher` key and cipher parameters. Must run before any other
/// statement touches the database file.
fn configure_encryption(conn: &Connection, passphrase: &SecretString) -> Result<()> {
    let key = passphrase.expose_secret().replace('\'', "''");
    conn.execute_batch(&format!("PRAGMA key = '{key}';"))
        .map_err(|e| Error::Fatal(format!("setting cipher key: {e}")))?;
    conn.pragma_update(None, "kdf_iter", KDF_ITER)
        .map_err(|e| Error::Fatal(format!("setting kdf_iter: {e}")))?;
    conn.pragma_update(None, "cipher_page_size", CIPHER_PAGE_SIZE)
        .map_err(|e| Error::Fatal(format!("setting cipher_page_size: {e}")))?;
    Ok(())
}

/// `SQLCipher` reports a wrong key lazily, on first real read. Force that
/// check immediately after opening so failures surface at startup rather
/// than on the first request.
fn verify_key(conn: &Connection) -> Result<()> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|_| ())
    .map_err(|e| Error::Fatal(format!("wrong passphrase or corrupted database file: {e}")))
}

/// Applies the non-cipher pragmas every connection needs: foreign-key
/// cascade enforcement, write-ahead logging, and secure deletion.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::Fatal(format!("enabling foreign keys: {e}")))?;
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    conn.pragma_update(None, "secure_delete", "ON")
        .map_err(|e| Error::Fatal(format!("enabling secure_delete: {e}")))?;
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_lock_recovers_from_poison() {
        let mutex = Arc::new(Mutex::new(0));
        let poisoner = Arc::clone(&mutex);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("intentional poison for test");
        })
        .join();

        let guard = acquire_lock(&mutex);
        assert_eq!(*guard, 0);
    }

    #[test]
    fn open_encrypted_round_trips_with_correct_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let pass = SecretString::from("correct horse battery staple".to_string());

        {
            let conn = open_encrypted(&path, &pass).unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);")
                .unwrap();
        }

        let conn = open_encrypted(&path, &pass).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_encrypted_fails_with_wrong_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let right = SecretString::from("right-pass".to_string());
        let wrong = SecretString::from("wrong-pass".to_string());

        {
            let conn = open_encrypted(&path, &right).unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);")
                .unwrap();
        }

        assert!(open_encrypted(&path, &wrong).is_err());
    }
}
