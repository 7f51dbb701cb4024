use std::{
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
};

use log::{debug, info};

use super::Transport;
use crate::{
    compress::Method,
    error::{Context, Error, Result},
    proto::{
        Block, ClientCode, ClientHello, Compression, Exception, Interface, PROTOCOL_VERSION,
        ProfileInfo, Progress, Query, QueryKind, ServerCode, ServerHello,
    },
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub name: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Compress data blocks of queries with this method.
    pub compression: Option<Method>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: "nativewire".into(),
            major: 0,
            minor: 1,
            patch: 0,
            revision: PROTOCOL_VERSION,
            database: "default".into(),
            user: "default".into(),
            password: String::new(),
            compression: None,
        }
    }
}

/// Everything the server sent in response to a query.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub blocks: Vec<Block>,
    pub progress: Progress,
    pub profile: Option<ProfileInfo>,
}

impl QueryResult {
    pub fn rows(&self) -> usize {
        self.blocks.iter().map(Block::rows).sum()
    }
}

/// Client side of one connection.
pub struct Client<'a, W: Write> {
    transport: Transport<'a, W>,
    options: ClientOptions,
    server: ServerHello,
}

impl Client<'static, TcpStream> {
    pub fn dial<A: ToSocketAddrs>(address: A, options: ClientOptions) -> Result<Self> {
        let stream = TcpStream::connect(address).context("connect")?;
        stream.set_nodelay(true)?;
        info!("connected to {}", stream.peer_addr()?);
        let reader = stream.try_clone()?;
        Self::connect(reader, stream, options)
    }
}

impl<'a, W: Write> Client<'a, W> {
    /// Performs the handshake over an established byte stream.
    pub fn connect<R>(reader: R, writer: W, options: ClientOptions) -> Result<Self>
    where
        R: Read + Send + 'a,
    {
        let method = options.compression.unwrap_or_default();
        let mut client = Self {
            transport: Transport::new(reader, writer, method, options.revision),
            options,
            server: ServerHello::default(),
        };
        client.handshake().context("handshake")?;
        Ok(client)
    }

    fn handshake(&mut self) -> Result<()> {
        ClientHello {
            name: self.options.name.clone(),
            major: self.options.major,
            minor: self.options.minor,
            revision: self.options.revision,
            database: self.options.database.clone(),
            user: self.options.user.clone(),
            password: self.options.password.clone(),
        }
        .encode(&mut self.transport.buf);
        self.transport.flush()?;

        match self.transport.read_code::<ServerCode>()? {
            ServerCode::Hello => {}
            ServerCode::Exception => return Err(self.exception()),
            code => {
                return Err(Error::UnexpectedPacket {
                    expected: "Hello",
                    got: code.to_string(),
                });
            }
        }
        self.server
            .decode_aware(&mut self.transport.reader, self.options.revision)
            .context("decode hello")?;
        let revision = self.server.revision.min(self.options.revision);
        self.transport.set_revision(revision);
        info!("handshake with {} (revision {revision})", self.server);
        Ok(())
    }

    /// Server identity received in the handshake.
    pub fn server_info(&self) -> &ServerHello {
        &self.server
    }

    /// Negotiated protocol revision.
    pub fn revision(&self) -> u64 {
        self.transport.revision()
    }

    pub fn ping(&mut self) -> Result<()> {
        ClientCode::Ping.encode(&mut self.transport.buf);
        self.transport.flush()?;
        match self.transport.read_code::<ServerCode>()? {
            ServerCode::Pong => Ok(()),
            ServerCode::Exception => Err(self.exception()),
            code => Err(Error::UnexpectedPacket {
                expected: "Pong",
                got: code.to_string(),
            }),
        }
    }

    /// Sends `query` followed by the `input` blocks and collects the reply
    /// until the end of stream.
    pub fn query(&mut self, mut query: Query, input: &[Block]) -> Result<QueryResult> {
        let compressed = self.options.compression.is_some();
        query.compression = if compressed {
            Compression::Enabled
        } else {
            Compression::Disabled
        };
        if query.info.kind == QueryKind::None {
            query.info.kind = QueryKind::Initial;
            query.info.interface = Interface::Tcp;
            query.info.initial_user = self.options.user.clone();
            query.info.initial_query_id = query.id.clone();
            query.info.client_name = self.options.name.clone();
            query.info.major = self.options.major;
            query.info.minor = self.options.minor;
            query.info.patch = self.options.patch;
            query.info.revision = self.options.revision;
        }

        let revision = self.transport.revision();
        query.encode_aware(&mut self.transport.buf, revision);
        for block in input.iter().chain([&Block::new()]) {
            ClientCode::Data.encode(&mut self.transport.buf);
            self.transport.put_block(block, compressed)?;
        }
        self.transport.flush().context("send query")?;
        debug!("sent query {:?} with {} input blocks", query.id, input.len());

        let mut result = QueryResult::default();
        loop {
            let code = self.transport.read_code::<ServerCode>()?;
            debug!("packet {code}");
            match code {
                ServerCode::Data => {
                    let block = self
                        .transport
                        .read_block(compressed)
                        .context("read data")?;
                    if !block.is_empty() {
                        result.blocks.push(block);
                    }
                }
                ServerCode::Progress => {
                    result.progress += Progress::decode_aware(&mut self.transport.reader, revision)
                        .context("read progress")?;
                }
                ServerCode::ProfileInfo => {
                    result.profile = Some(
                        ProfileInfo::decode(&mut self.transport.reader)
                            .context("read profile info")?,
                    );
                }
                ServerCode::Log | ServerCode::ProfileEvents => {
                    self.transport.read_block(false).context("read log")?;
                }
                ServerCode::TableColumns => {
                    self.transport.reader.str().context("table columns")?;
                    self.transport.reader.str().context("table columns")?;
                }
                ServerCode::Exception => return Err(self.exception()),
                ServerCode::EndOfStream => return Ok(result),
                code => {
                    return Err(Error::UnexpectedPacket {
                        expected: "query response",
                        got: code.to_string(),
                    });
                }
            }
        }
    }

    /// Asks the server to stop the running query.
    pub fn cancel(&mut self) -> Result<()> {
        ClientCode::Cancel.encode(&mut self.transport.buf);
        self.transport.flush()
    }

    /// Reads an exception packet body, turning a failure to decode it into
    /// the returned error.
    fn exception(&mut self) -> Error {
        match Exception::decode(&mut self.transport.reader) {
            Ok(exception) => Error::Exception(exception),
            Err(err) => Error::Context {
                op: "decode exception".into(),
                source: Box::new(err),
            },
        }
    }
}
