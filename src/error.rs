use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    // Peer closed the connection before the first byte of a message.
    #[error("connection closed by peer")]
    Eof,

    // Peer closed the connection in the middle of a message.
    #[error("truncated {what}: got {got} of {expected} bytes")]
    Truncated {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    // The exit request ends a session and never gets a response.
    #[error("'exit' ends the session and has no result")]
    ExitHasNoReply,

    #[error("another server is already listening on {}", .0.display())]
    AddrInUse(PathBuf),

    #[error("refusing to replace {}: not a socket", .0.display())]
    NotASocket(PathBuf),
}

impl Error {
    // True for a read that gave up because the idle timeout expired.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}
