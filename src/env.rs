//! Ticket tracker environments.
//!
//! An environment is a directory holding the tracker's configuration and its
//! SQLite database:
//!
//! ```text
//! <env>/conf/config.toml
//! <env>/db/tickets.db
//! ```

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Error;

const CONFIG_FILE: &str = "conf/config.toml";
const DATABASE_FILE: &str = "db/tickets.db";

/// An opened environment: configuration plus a database connection.
pub struct Environment {
    path: Option<PathBuf>,
    config: Config,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Open the environment rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "{} is not an environment directory",
                path.display()
            )));
        }

        let config = Config::load(&path.join(CONFIG_FILE))?.apply_env_overrides()?;

        let db_path = path.join(DATABASE_FILE);
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        tracing::debug!(path = %path.display(), "Opened environment");

        Ok(Self {
            path: Some(path.to_path_buf()),
            config,
            conn: Mutex::new(conn),
        })
    }

    /// Create an environment backed by an in-memory database.
    pub fn in_memory(config: Config) -> Result<Self, Error> {
        Ok(Self {
            path: None,
            config,
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Directory of the environment, if it lives on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`. Any error (or a panic unwinding through
    /// `f`) rolls the transaction back.
    pub fn db_transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, Error>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read-only query against the database.
    pub fn db_query<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }
}
