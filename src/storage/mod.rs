//! The encrypted store (C1): a single `SQLCipher`-backed `SQLite` file
//! holding every table the engine needs, reached through one guarded
//! connection.

pub mod connection;
pub mod migrations;
pub mod sql;

use crate::Result;
use rusqlite::Connection;
use secrecy::SecretString;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// The encrypted store: one `SQLCipher` connection behind a mutex.
///
/// A single `Store` is meant to be opened once per process and shared by
/// every repository and service (see [`crate::Engine`]), matching the
/// process-wide-singleton design described for the store handle. `Store`
/// itself stays instance-based rather than behind a global rather than a
/// `static OnceLock<Store>`, so a process embedding the engine (or a test)
/// can open more than one store if it needs to.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the encrypted database file at `path`, applies
    /// every required pragma, and runs any outstanding schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Fatal`] if the file cannot be opened, the
    /// passphrase is wrong, or a migration fails.
    pub fn open(path: &Path, passphrase: &SecretString) -> Result<Self> {
        let conn = connection::open_encrypted(path, passphrase)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an unencrypted, in-memory store. Used by tests only; the
    /// encrypted-at-rest requirement applies to file-backed stores.
    #[cfg(test)]
    pub fn open_in_memory_for_tests() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        connection::configure_connection(&conn)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Locks the connection for the duration of the returned guard,
    /// recovering automatically if a prior holder panicked while holding it.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        connection::acquire_lock(&self.conn)
    }
}
