//! Arithmetic requests over a local AF_UNIX socket.
//!
//! A [`Server`] binds a well-known socket path and serves every client on its
//! own thread. Each request is a fixed-size block naming an operation
//! (`add`, `sub`, `mul`, `div` or `exit`) and two `i32` operands; each answer
//! is a validity flag and a result. See [`wire`] for the byte layout.

pub mod client;
pub mod config;
pub mod error;
pub mod eval;
pub mod handler;
pub mod server;
pub mod wire;

pub use client::{call_once, run_session, Client};
pub use config::{ClientConfig, ServerConfig, DEFAULT_SOCKET_PATH};
pub use error::{Error, Result};
pub use eval::{evaluate, Outcome, Rejection};
pub use server::{Server, ShutdownHandle};
pub use wire::{Operation, Request, Response};
