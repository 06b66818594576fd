use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "rxportal";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default session lifetime: 24 hours (matches the portal's login token expiry).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Fixed page size for all list endpoints.
pub const PAGE_SIZE: u32 = 10;

/// Runtime configuration, read from environment variables with sensible
/// defaults. Explicitly constructed and passed down — handlers never read
/// ambient globals.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub session_ttl_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("RXPORTAL_BIND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));

        let data_dir = std::env::var("RXPORTAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let session_ttl_secs = std::env::var("RXPORTAL_SESSION_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        Self {
            bind_addr,
            data_dir,
            session_ttl_secs,
        }
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("rxportal.db")
    }

    /// Directory where uploaded prescription files are stored.
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads").join("prescriptions")
    }
}

/// Get the application data directory (~/rxportal/ on all platforms).
pub fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join("rxportal")
}
