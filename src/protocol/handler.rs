use crate::proto::{Block, Exception, Query};

/// Executes queries on behalf of server connections.
///
/// `input` holds the data blocks the client sent after the query. The
/// returned blocks are streamed back as Data packets; an [`Exception`] is
/// reported to the client and ends the connection.
pub trait Handler: Send + Sync {
    fn query(&self, query: &Query, input: Vec<Block>) -> Result<Vec<Block>, Exception>;
}

impl<F> Handler for F
where
    F: Fn(&Query, Vec<Block>) -> Result<Vec<Block>, Exception> + Send + Sync,
{
    fn query(&self, query: &Query, input: Vec<Block>) -> Result<Vec<Block>, Exception> {
        self(query, input)
    }
}

/// Returns the input blocks unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Handler for Echo {
    fn query(&self, _query: &Query, input: Vec<Block>) -> Result<Vec<Block>, Exception> {
        Ok(input)
    }
}
