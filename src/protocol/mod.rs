//! Connection state machines for both ends of the native protocol.
//!
//! A connection starts with a handshake: the client sends its Hello, the
//! server replies with its own, and both sides continue with the lower of
//! the two protocol revisions. After that the client drives the exchange:
//!
//! - `Ping` is answered with `Pong`.
//! - `Query` is followed by the client's input as Data packets, terminated
//!   by an empty block. The server answers with result Data packets,
//!   ProfileInfo, Progress and EndOfStream, or with an Exception.
//! - `Cancel` while the server waits for input ends the query.
//!
//! When a query asks for compression, the block part of every Data packet
//! travels in compression frames while packet codes stay uncompressed.
//!
//! [`Server`] accepts connections on a fixed pool of workers and hands
//! queries to a [`Handler`]. [`Client`] drives the other end.
mod client;
mod handler;
mod server;
mod thread;
mod transport;

pub use client::{Client, ClientOptions, QueryResult};
pub use handler::{Echo, Handler};
pub use server::{Server, ServerConn, ServerOptions, State};
pub use thread::{Shutdown, WorkerPool};
pub use transport::Transport;
