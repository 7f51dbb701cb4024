use std::fmt;

use super::{Buffer, Reader, ServerCode};
use crate::error::{Context, Result};

/// Error codes used by this crate when reporting exceptions.
pub mod code {
    pub const NOT_IMPLEMENTED: i32 = 48;
    pub const UNKNOWN_PACKET_FROM_CLIENT: i32 = 101;
    pub const UNEXPECTED_PACKET_FROM_CLIENT: i32 = 102;
    pub const UNKNOWN_EXCEPTION: i32 = 1002;
}

/// Exception reported by the server, possibly wrapping a chain of causes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exception {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack: String,
    pub nested: Option<Box<Exception>>,
}

impl Exception {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            name: "DB::Exception".into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn encode(&self, b: &mut Buffer) {
        ServerCode::Exception.encode(b);
        let mut next = Some(self);
        while let Some(e) = next {
            b.put_i32(e.code);
            b.put_string(&e.name);
            b.put_string(&e.message);
            b.put_string(&e.stack);
            b.put_bool(e.nested.is_some());
            next = e.nested.as_deref();
        }
    }

    /// Decodes the payload following the packet code.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let mut chain = Vec::new();
        loop {
            let e = Exception {
                code: r.i32().context("code")?,
                name: r.str().context("name")?,
                message: r.str().context("message")?,
                stack: r.str().context("stack trace")?,
                nested: None,
            };
            chain.push(e);
            if !r.bool().context("nested")? {
                break;
            }
        }

        let mut exception = chain.pop().unwrap_or_default();
        while let Some(mut outer) = chain.pop() {
            outer.nested = Some(Box::new(exception));
            exception = outer;
        }
        Ok(exception)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.code, self.message)?;
        if let Some(nested) = &self.nested {
            write!(f, ": {nested}")?;
        }
        Ok(())
    }
}
