use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::handler::handle_connection;

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Listens on the rendezvous path and hands every accepted connection to its
/// own handler thread. The socket file is removed when the server is dropped.
pub struct Server {
    listener: UnixListener,
    config: ServerConfig,
    stop: Arc<AtomicBool>,
}

impl Server {
    // Binds the configured path, clearing a stale socket file left behind
    // by a previous run. Fails if another server still answers on it.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        clear_stale_socket(&config.socket_path)?;
        let listener = UnixListener::bind(&config.socket_path)?;
        info!("server listening on {}", config.socket_path.display());

        Ok(Server {
            listener,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            path: self.config.socket_path.clone(),
        }
    }

    // Accepts connections until shut down.
    pub fn run(self) {
        let idle_timeout = self.config.idle_timeout;
        accept_loop(
            self.listener.incoming(),
            &self.stop,
            |stream, id| spawn_handler(stream, id, idle_timeout),
            thread::sleep,
        );
    }
}

fn spawn_handler(stream: UnixStream, id: u64, idle_timeout: Option<Duration>) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("conn-{id}"))
        .spawn(move || handle_connection(stream, id, idle_timeout))
        .map(|_| ())
}

// Hands each accepted stream to `dispatch` until the stop flag is set or the
// source runs dry. Accept and dispatch failures are logged and never end the
// loop; accept failures pause with a delay that doubles up to a cap and
// resets after the next success.
fn accept_loop<S, I, D, P>(incoming: I, stop: &AtomicBool, mut dispatch: D, mut pause: P)
where
    I: IntoIterator<Item = io::Result<S>>,
    D: FnMut(S, u64) -> io::Result<()>,
    P: FnMut(Duration),
{
    let mut backoff = MIN_ACCEPT_BACKOFF;
    let mut next_id: u64 = 0;

    for stream in incoming {
        if stop.load(Ordering::SeqCst) {
            info!("shutting down");
            break;
        }

        match stream {
            Ok(stream) => {
                backoff = MIN_ACCEPT_BACKOFF;
                next_id += 1;
                info!(id = next_id, "new client connected");
                // A stream that could not be dispatched is dropped, closing it.
                if let Err(e) = dispatch(stream, next_id) {
                    error!(id = next_id, "failed to spawn handler: {}", e);
                }
            }
            Err(e) => {
                warn!("error accepting connection: {}; retrying in {:?}", e, backoff);
                pause(backoff);
                backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        match fs::remove_file(&self.config.socket_path) {
            Ok(()) => debug!("removed {}", self.config.socket_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "failed to remove {}: {}",
                self.config.socket_path.display(),
                e
            ),
        }
    }
}

// Stops a running Server from another thread or a signal handler.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    path: PathBuf,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        // Wake the blocking accept so the loop sees the flag.
        if let Err(e) = UnixStream::connect(&self.path) {
            debug!("shutdown wake-up connect failed: {}", e);
        }
    }
}

// Removes a socket file left behind by a server that is no longer running.
fn clear_stale_socket(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if !metadata.file_type().is_socket() {
        return Err(Error::NotASocket(path.to_path_buf()));
    }
    if !is_stale(UnixStream::connect(path), path)? {
        return Ok(());
    }

    warn!("removing stale socket {}", path.display());
    fs::remove_file(path)?;
    Ok(())
}

// Interprets a connect attempt on an existing socket file. Only a refused
// connection proves nobody listens; any other failure (e.g. permission
// denied on another user's socket) may hide a live server and is returned.
fn is_stale(probe: io::Result<UnixStream>, path: &Path) -> Result<bool> {
    match probe {
        Ok(_) => Err(Error::AddrInUse(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(true),
        // Removed by someone else since we looked.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_a_stale_socket_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arith.sock");

        // A bound-then-dropped listener leaves its socket file behind.
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let server = Server::bind(ServerConfig::new(&path)).unwrap();
        assert_eq!(server.path(), path.as_path());
    }

    #[test]
    fn refuses_a_path_held_by_a_live_listener() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arith.sock");
        let _live = UnixListener::bind(&path).unwrap();

        match Server::bind(ServerConfig::new(&path)) {
            Err(Error::AddrInUse(p)) => assert_eq!(p, path),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("bound over a live listener"),
        }
        assert!(path.exists());
    }

    #[test]
    fn refuses_to_delete_a_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"keep me").unwrap();

        assert!(matches!(
            Server::bind(ServerConfig::new(&path)),
            Err(Error::NotASocket(_))
        ));
        assert_eq!(fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn shutdown_stops_the_loop_and_removes_the_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arith.sock");

        let server = Server::bind(ServerConfig::new(&path)).unwrap();
        let handle = server.shutdown_handle();
        let runner = thread::spawn(move || server.run());

        handle.shutdown();
        runner.join().unwrap();
        assert!(!path.exists());

        // Idempotent once the listener is gone.
        handle.shutdown();
    }

    #[test]
    fn only_a_refused_connect_marks_a_socket_stale() {
        let path = Path::new("/run/arith.sock");

        let refused = Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(is_stale(refused, path).unwrap());

        let gone = Err(io::Error::from(io::ErrorKind::NotFound));
        assert!(!is_stale(gone, path).unwrap());

        let denied = Err(io::Error::from(io::ErrorKind::PermissionDenied));
        match is_stale(denied, path) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("expected permission error, got {other:?}"),
        }
    }

    #[test]
    fn answering_socket_is_in_use() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arith.sock");
        let _live = UnixListener::bind(&path).unwrap();

        let probe = UnixStream::connect(&path);
        assert!(matches!(is_stale(probe, &path), Err(Error::AddrInUse(_))));
    }

    fn refused() -> io::Result<u32> {
        Err(io::Error::from(io::ErrorKind::ConnectionAborted))
    }

    #[test]
    fn accept_errors_back_off_and_never_end_the_loop() {
        let stop = AtomicBool::new(false);
        let mut dispatched = Vec::new();
        let mut pauses = Vec::new();

        let incoming = vec![refused(), refused(), Ok(7), refused(), Ok(8)];
        accept_loop(
            incoming,
            &stop,
            |stream, id| {
                dispatched.push((stream, id));
                Ok(())
            },
            |delay| pauses.push(delay),
        );

        assert_eq!(dispatched, [(7, 1), (8, 2)]);
        assert_eq!(
            pauses,
            [
                MIN_ACCEPT_BACKOFF,
                MIN_ACCEPT_BACKOFF * 2,
                MIN_ACCEPT_BACKOFF,
            ]
        );
    }

    #[test]
    fn accept_backoff_is_capped() {
        let stop = AtomicBool::new(false);
        let mut pauses = Vec::new();

        accept_loop(
            (0..12).map(|_| refused()),
            &stop,
            |_, _| Ok(()),
            |delay| pauses.push(delay),
        );

        assert_eq!(pauses.len(), 12);
        assert_eq!(pauses.last(), Some(&MAX_ACCEPT_BACKOFF));
        assert!(pauses.iter().all(|&delay| delay <= MAX_ACCEPT_BACKOFF));
    }

    #[test]
    fn failed_dispatch_does_not_stop_later_connections() {
        let stop = AtomicBool::new(false);
        let mut dispatched = Vec::new();

        accept_loop(
            vec![Ok(1u32), Ok(2), Ok(3)],
            &stop,
            |stream, _| {
                if stream == 1 {
                    return Err(io::Error::from(io::ErrorKind::OutOfMemory));
                }
                dispatched.push(stream);
                Ok(())
            },
            |_| panic!("no accept errors here"),
        );

        assert_eq!(dispatched, [2, 3]);
    }

    #[test]
    fn stop_flag_ends_the_loop_at_the_next_connection() {
        let stop = AtomicBool::new(true);
        let mut dispatched = 0;

        accept_loop(
            vec![Ok(1u32), Ok(2)],
            &stop,
            |_, _| {
                dispatched += 1;
                Ok(())
            },
            |_| {},
        );

        assert_eq!(dispatched, 0);
    }
}
