use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use crate::error::Result;
use crate::eval::{evaluate, Outcome};
use crate::wire::{self, Operation, Response};

/// How a session ended when no transport error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent the exit request.
    Exit,
    /// The client closed the connection between requests.
    Disconnected,
}

// Request/response loop for one connection.
// A request is only read after the previous response has been written, and
// the exit request ends the session without a reply.
pub fn serve<S: Read + Write>(stream: &mut S) -> Result<SessionEnd> {
    loop {
        let request = match wire::read_request(stream)? {
            Some(request) => request,
            None => return Ok(SessionEnd::Disconnected),
        };

        if request.op == Operation::Exit {
            return Ok(SessionEnd::Exit);
        }

        info!("received {}", request);
        let outcome = evaluate(request.op, request.operand1, request.operand2);
        match outcome {
            Outcome::Value(result) => debug!("result {}", result),
            Outcome::Rejected(reason) => warn!("rejected {}: {}", request, reason),
        }

        wire::write_response(stream, &Response::from(outcome))?;
    }
}

// Services one accepted connection until it ends, then closes it.
// Errors are logged here and never reach the dispatcher.
pub fn handle_connection(mut stream: UnixStream, id: u64, idle_timeout: Option<Duration>) {
    let span = info_span!("conn", id);
    let _enter = span.enter();

    if let Err(e) = stream.set_read_timeout(idle_timeout) {
        warn!("failed to set idle timeout: {}", e);
    }

    match serve(&mut stream) {
        Ok(SessionEnd::Exit) => info!("client requested exit"),
        Ok(SessionEnd::Disconnected) => info!("client disconnected"),
        Err(e) if e.is_timeout() => info!("idle timeout, closing connection"),
        Err(e) => warn!("connection error: {}", e),
    }
}
