//! Fixed-size binary messages exchanged over the socket.
//!
//! A request is 12 bytes: a 4-byte operation tag followed by two `i32`
//! operands. A response is 8 bytes: a validity flag (`0` or `1`) followed by
//! the result. All integers are little-endian. The tag is NUL-padded ASCII
//! and is compared as a C string, so `exit` occupies the whole field without
//! a terminator.

use std::fmt;
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

pub const TAG_LEN: usize = 4;
pub const REQUEST_LEN: usize = TAG_LEN + 4 + 4;
pub const RESPONSE_LEN: usize = 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Sub,
    Mul,
    Div,
    Exit,
    /// A tag outside the known set, kept verbatim.
    Unknown([u8; TAG_LEN]),
}

impl Operation {
    /// Parses a keyword as typed by a user. Keywords longer than the tag
    /// field are truncated first, exactly as they would be on the wire.
    pub fn from_keyword(keyword: &str) -> Self {
        Self::from_tag(pack_tag(keyword.as_bytes()))
    }

    pub fn from_tag(tag: [u8; TAG_LEN]) -> Self {
        match c_str(&tag) {
            b"add" => Operation::Add,
            b"sub" => Operation::Sub,
            b"mul" => Operation::Mul,
            b"div" => Operation::Div,
            b"exit" => Operation::Exit,
            _ => Operation::Unknown(tag),
        }
    }

    pub fn tag(&self) -> [u8; TAG_LEN] {
        match self {
            Operation::Add => pack_tag(b"add"),
            Operation::Sub => pack_tag(b"sub"),
            Operation::Mul => pack_tag(b"mul"),
            Operation::Div => pack_tag(b"div"),
            Operation::Exit => pack_tag(b"exit"),
            Operation::Unknown(tag) => *tag,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        write!(f, "{}", String::from_utf8_lossy(c_str(&tag)).escape_debug())
    }
}

fn pack_tag(keyword: &[u8]) -> [u8; TAG_LEN] {
    let mut tag = [0u8; TAG_LEN];
    let n = keyword.len().min(TAG_LEN);
    tag[..n].copy_from_slice(&keyword[..n]);
    tag
}

fn c_str(tag: &[u8; TAG_LEN]) -> &[u8] {
    let end = tag.iter().position(|&b| b == 0).unwrap_or(TAG_LEN);
    &tag[..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub op: Operation,
    pub operand1: i32,
    pub operand2: i32,
}

impl Request {
    pub fn new(op: Operation, operand1: i32, operand2: i32) -> Self {
        Request {
            op,
            operand1,
            operand2,
        }
    }

    /// The termination request. Its operands are never consulted.
    pub fn exit() -> Self {
        Request::new(Operation::Exit, 0, 0)
    }

    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut buf = [0u8; REQUEST_LEN];
        buf[..4].copy_from_slice(&self.op.tag());
        buf[4..8].copy_from_slice(&self.operand1.to_le_bytes());
        buf[8..12].copy_from_slice(&self.operand2.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; REQUEST_LEN]) -> Self {
        Request {
            op: Operation::from_tag([buf[0], buf[1], buf[2], buf[3]]),
            operand1: i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            operand2: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.op, self.operand1, self.operand2)
    }
}

/// `result` is only meaningful when `valid` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub valid: bool,
    pub result: i32,
}

impl Response {
    pub fn value(result: i32) -> Self {
        Response {
            valid: true,
            result,
        }
    }

    pub fn rejected() -> Self {
        Response {
            valid: false,
            result: 0,
        }
    }

    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[..4].copy_from_slice(&i32::from(self.valid).to_le_bytes());
        buf[4..].copy_from_slice(&self.result.to_le_bytes());
        buf
    }

    /// Any non-zero flag counts as valid, as a C peer would read it.
    pub fn decode(buf: &[u8; RESPONSE_LEN]) -> Self {
        Response {
            valid: i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) != 0,
            result: i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

// Fills `buf` completely from `source`.
// Returns Ok(false) if the source is at EOF before any byte was read, and a
// Truncated error if it hits EOF part way through.
fn read_block<R: Read>(source: &mut R, buf: &mut [u8], what: &'static str) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(Error::Truncated {
                    what,
                    expected: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Reads the next request, or `None` if the peer closed the connection
/// cleanly between messages.
pub fn read_request<R: Read>(source: &mut R) -> Result<Option<Request>> {
    let mut buf = [0u8; REQUEST_LEN];
    if !read_block(source, &mut buf, "request")? {
        return Ok(None);
    }
    Ok(Some(Request::decode(&buf)))
}

pub fn write_request<W: Write>(destination: &mut W, request: &Request) -> Result<()> {
    destination.write_all(&request.encode())?;
    destination.flush()?;
    Ok(())
}

/// Reads the next response, or `None` if the peer closed the connection
/// without replying.
pub fn read_response<R: Read>(source: &mut R) -> Result<Option<Response>> {
    let mut buf = [0u8; RESPONSE_LEN];
    if !read_block(source, &mut buf, "response")? {
        return Ok(None);
    }
    Ok(Some(Response::decode(&buf)))
}

pub fn write_response<W: Write>(destination: &mut W, response: &Response) -> Result<()> {
    destination.write_all(&response.encode())?;
    destination.flush()?;
    Ok(())
}
