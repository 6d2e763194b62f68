use std::path::{Path, PathBuf};
use std::time::Duration;

// Relative to the working directory.
pub const DEFAULT_SOCKET_PATH: &str = "arith_socket";

pub const SOCKET_PATH_ENV: &str = "ARITHSOCK_PATH";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    /// Close a connection after this long without a complete request.
    pub idle_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        ServerConfig {
            socket_path: socket_path.as_ref().to_path_buf(),
            idle_timeout: None,
        }
    }

    // A zero duration disables the timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::new(DEFAULT_SOCKET_PATH)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
}

impl ClientConfig {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        ClientConfig {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::new(DEFAULT_SOCKET_PATH)
    }
}
