//! Request-scoped application state.
//!
//! Everything a handler needs — database handle, session store, mailer,
//! configuration — travels through `AppState` instead of ambient globals.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;

use crate::auth::session::SessionStore;
use crate::config::ServerConfig;
use crate::mailer::Mailer;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Lock poisoned")]
    LockPoisoned,
}

pub struct AppState {
    pub config: ServerConfig,
    /// Requests execute their SQL sequentially against one connection;
    /// the database transaction is the only atomicity construct.
    db: Mutex<Connection>,
    sessions: Mutex<SessionStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: ServerConfig, conn: Connection, mailer: Arc<dyn Mailer>) -> Self {
        let ttl = Duration::from_secs(config.session_ttl_secs);
        Self {
            config,
            db: Mutex::new(conn),
            sessions: Mutex::new(SessionStore::new(ttl)),
            mailer,
        }
    }

    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, StateError> {
        self.db.lock().map_err(|_| StateError::LockPoisoned)
    }

    pub fn sessions(&self) -> Result<MutexGuard<'_, SessionStore>, StateError> {
        self.sessions.lock().map_err(|_| StateError::LockPoisoned)
    }
}
