//! Wire encoding of the native protocol: primitives, packets and blocks.
mod block;
mod buffer;
mod code;
pub mod column;
mod exception;
mod feature;
mod hello;
mod progress;
mod query;
mod reader;

pub use block::{Block, BlockColumn, BlockInfo};
pub use buffer::Buffer;
pub use code::{ClientCode, ServerCode};
pub use exception::{Exception, code as error_code};
pub use feature::{Feature, PROTOCOL_VERSION};
pub use hello::{ClientHello, ServerHello};
pub use progress::{ProfileInfo, Progress};
pub use query::{ClientInfo, Compression, Interface, Query, QueryKind, Setting, Stage, TraceContext};
pub use reader::Reader;
