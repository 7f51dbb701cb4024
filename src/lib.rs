pub mod compress;
pub mod error;
pub mod proto;
pub mod protocol;

pub use error::{Error, Result};
pub use proto::{Block, PROTOCOL_VERSION};
pub use protocol::{Client, ClientOptions, Server, ServerOptions, Shutdown};
