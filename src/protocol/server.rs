use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};

use super::{Handler, Shutdown, Transport, WorkerPool};
use crate::{
    compress::Method,
    error::{Context, Error, Result},
    proto::{
        Block, ClientCode, ClientHello, Compression, Exception, PROTOCOL_VERSION, ProfileInfo,
        Progress, Query, ServerCode, ServerHello, error_code,
    },
};

/// How long an idle worker sleeps between accept attempts.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// How often a connection blocked on its client checks for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

const DEFAULT_WORKERS: usize = 100;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub name: String,
    pub display_name: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub timezone: String,
    pub workers: usize,
    /// Method used for result blocks of queries that ask for compression.
    pub compression: Method,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "nativewire".into(),
            display_name: "nativewire".into(),
            major: 0,
            minor: 1,
            patch: 0,
            revision: PROTOCOL_VERSION,
            timezone: "UTC".into(),
            workers: DEFAULT_WORKERS,
            compression: Method::Lz4,
        }
    }
}

/// Accepts connections on a pool of workers, each serving one connection
/// at a time.
pub struct Server {
    options: ServerOptions,
    handler: Arc<dyn Handler>,
    connections: AtomicU64,
}

impl Server {
    /// Creates a server. Zero `workers` means the default pool size.
    pub fn new<H: Handler + 'static>(mut options: ServerOptions, handler: H) -> Self {
        if options.workers == 0 {
            options.workers = DEFAULT_WORKERS;
        }
        Self {
            options,
            handler: Arc::new(handler),
            connections: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn listen<A: ToSocketAddrs>(&self, address: A, shutdown: &Shutdown) -> Result<()> {
        let listener = TcpListener::bind(address).context("bind")?;
        info!("listening at {}", listener.local_addr()?);
        self.serve(listener, shutdown)
    }

    /// Serves `listener` until `shutdown` is cancelled and every in-flight
    /// connection has finished.
    pub fn serve(&self, listener: TcpListener, shutdown: &Shutdown) -> Result<()> {
        listener.set_nonblocking(true).context("listener")?;
        WorkerPool::new(self.options.workers).run(shutdown, |worker| {
            self.accept(worker, &listener, shutdown)
        })?;
        info!("server stopped after {} connections", self.connections());
        Ok(())
    }

    fn accept(&self, worker: usize, listener: &TcpListener, shutdown: &Shutdown) -> Result<()> {
        while !shutdown.is_cancelled() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let id = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("worker {worker} takes conn {id}");
                    self.handle(id, stream, peer, shutdown);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("accept"),
            }
        }
        Ok(())
    }

    fn handle(&self, id: u64, stream: TcpStream, peer: SocketAddr, shutdown: &Shutdown) {
        info!("conn {id}: accepted from {peer}");
        let res = stream
            .set_nonblocking(false)
            .and_then(|_| stream.set_nodelay(true))
            .and_then(|_| stream.set_read_timeout(Some(SHUTDOWN_POLL)))
            .and_then(|_| stream.try_clone())
            .context("setup")
            .and_then(|reader| {
                let reader = ConnReader {
                    stream: reader,
                    shutdown: shutdown.clone(),
                };
                ServerConn::new(id, reader, stream, &self.options, self.handler.as_ref())
                    .with_shutdown(shutdown.clone())
                    .run()
            });

        match res {
            Ok(()) => info!("conn {id}: closed"),
            Err(err) if err.is_unexpected_eof() => debug!("conn {id}: peer went away: {err}"),
            Err(err) => error!("conn {id}: {err}"),
        }
    }
}

/// Read half of an accepted stream with a read timeout set. Waiting on the
/// client ends as a clean end of stream once shutdown is requested.
struct ConnReader {
    stream: TcpStream,
    shutdown: Shutdown,
}

impl Read for ConnReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(buf) {
                Err(e) if is_timeout(&e) => {
                    if self.shutdown.is_cancelled() {
                        return Ok(0);
                    }
                }
                res => return res,
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingHandshake,
    Ready,
    Closed,
}

enum Flow {
    Continue,
    Close,
}

/// Server side of one connection.
pub struct ServerConn<'a, W: Write> {
    id: u64,
    state: State,
    transport: Transport<'a, W>,
    options: &'a ServerOptions,
    handler: &'a dyn Handler,
    client: ClientHello,
    shutdown: Shutdown,
}

impl<'a, W: Write> ServerConn<'a, W> {
    pub fn new<R>(
        id: u64,
        reader: R,
        writer: W,
        options: &'a ServerOptions,
        handler: &'a dyn Handler,
    ) -> Self
    where
        R: Read + Send + 'a,
    {
        Self {
            id,
            state: State::AwaitingHandshake,
            transport: Transport::new(reader, writer, options.compression, options.revision),
            options,
            handler,
            client: ClientHello::default(),
            shutdown: Shutdown::new(),
        }
    }

    /// Stops serving at the next packet boundary once `shutdown` is
    /// cancelled.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Hello received from the client, empty before the handshake.
    pub fn client(&self) -> &ClientHello {
        &self.client
    }

    pub fn into_writer(self) -> W {
        self.transport.into_writer()
    }

    /// Performs the handshake and serves packets until the client leaves,
    /// a handler fails, or an error occurs.
    pub fn run(&mut self) -> Result<()> {
        let res = self.serve();
        self.state = State::Closed;
        res
    }

    fn serve(&mut self) -> Result<()> {
        self.handshake().context("handshake")?;
        while self.state == State::Ready {
            if self.shutdown.is_cancelled() {
                info!("conn {}: closing for shutdown", self.id);
                break;
            }
            let code = match self.transport.read_packet::<ClientCode>() {
                Ok(Some(code)) => code,
                Ok(None) if self.shutdown.is_cancelled() => {
                    info!("conn {}: closing for shutdown", self.id);
                    break;
                }
                Ok(None) => {
                    info!("conn {}: client closed the connection", self.id);
                    break;
                }
                Err(err) => {
                    if let Error::BadPacketCode { code, .. } = &err {
                        self.report(Exception::new(
                            error_code::UNKNOWN_PACKET_FROM_CLIENT,
                            format!("unknown packet {code} from client"),
                        ));
                    }
                    return Err(err);
                }
            };
            debug!("conn {}: packet {code}", self.id);
            if let Flow::Close = self.handle_packet(code)? {
                break;
            }
        }
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        let code = self.transport.read_code::<ClientCode>()?;
        if code != ClientCode::Hello {
            return Err(self.violation("Hello", code));
        }
        self.client
            .decode(&mut self.transport.reader)
            .context("decode hello")?;

        let revision = self.client.revision.min(self.options.revision);
        self.transport.set_revision(revision);
        ServerHello {
            name: self.options.name.clone(),
            major: self.options.major,
            minor: self.options.minor,
            revision: self.options.revision,
            timezone: self.options.timezone.clone(),
            display_name: self.options.display_name.clone(),
            patch: self.options.patch,
        }
        .encode_aware(&mut self.transport.buf, revision);
        self.transport.flush()?;

        self.state = State::Ready;
        info!(
            "conn {}: handshake with {} {}.{} (revision {revision}, user {:?})",
            self.id, self.client.name, self.client.major, self.client.minor, self.client.user
        );
        Ok(())
    }

    fn handle_packet(&mut self, code: ClientCode) -> Result<Flow> {
        match code {
            ClientCode::Ping => {
                ServerCode::Pong.encode(&mut self.transport.buf);
                self.transport.flush()?;
                Ok(Flow::Continue)
            }
            ClientCode::Query => self.query(),
            ClientCode::Cancel => {
                info!("conn {}: cancel outside of a query", self.id);
                Ok(Flow::Continue)
            }
            ClientCode::Data | ClientCode::Hello => Err(self.violation("Query or Ping", code)),
            code => {
                self.report(Exception::new(
                    error_code::NOT_IMPLEMENTED,
                    format!("packet {code} is not supported"),
                ));
                Err(Error::NotImplemented(format!("packet {code}")))
            }
        }
    }

    fn query(&mut self) -> Result<Flow> {
        let revision = self.transport.revision();
        let query = Query::decode_aware(&mut self.transport.reader, revision)
            .context("decode query")?;
        let compressed = query.compression == Compression::Enabled;
        info!("conn {}: query {:?} ({})", self.id, query.id, query.body);

        let mut input = Vec::new();
        loop {
            match self.transport.read_code::<ClientCode>().context("query input")? {
                ClientCode::Data => {
                    let block = self
                        .transport
                        .read_block(compressed)
                        .context("read input block")?;
                    if block.is_empty() {
                        break;
                    }
                    input.push(block);
                }
                ClientCode::Cancel => {
                    info!("conn {}: query {:?} cancelled", self.id, query.id);
                    ServerCode::EndOfStream.encode(&mut self.transport.buf);
                    self.transport.flush()?;
                    return Ok(Flow::Continue);
                }
                code => return Err(self.violation("Data", code)),
            }
        }

        match self.handler.query(&query, input) {
            Ok(blocks) => {
                self.send_result(&blocks, compressed)?;
                Ok(Flow::Continue)
            }
            Err(exception) => {
                warn!("conn {}: query {:?} failed: {exception}", self.id, query.id);
                exception.encode(&mut self.transport.buf);
                self.transport.flush()?;
                Ok(Flow::Close)
            }
        }
    }

    fn send_result(&mut self, blocks: &[Block], compressed: bool) -> Result<()> {
        let mut profile = ProfileInfo::default();
        let mut progress = Progress::default();
        for block in blocks {
            ServerCode::Data.encode(&mut self.transport.buf);
            let start = self.transport.buf.len();
            self.transport.put_block(block, compressed)?;
            let bytes = (self.transport.buf.len() - start) as u64;
            self.transport.flush()?;

            profile.rows += block.rows() as u64;
            profile.blocks += 1;
            profile.bytes += bytes;
            progress.rows += block.rows() as u64;
            progress.bytes += bytes;
        }

        let revision = self.transport.revision();
        profile.encode(&mut self.transport.buf);
        progress.encode_aware(&mut self.transport.buf, revision);
        ServerCode::EndOfStream.encode(&mut self.transport.buf);
        self.transport.flush()
    }

    /// Reports an unexpected packet to the client and builds the error that
    /// ends the connection.
    fn violation(&mut self, expected: &'static str, got: ClientCode) -> Error {
        self.report(Exception::new(
            error_code::UNEXPECTED_PACKET_FROM_CLIENT,
            format!("unexpected packet {got}, expected {expected}"),
        ));
        Error::UnexpectedPacket {
            expected,
            got: got.to_string(),
        }
    }

    /// Sends `exception` before the connection is dropped. Delivery is best
    /// effort: the connection is failing already.
    fn report(&mut self, exception: Exception) {
        self.transport.buf.reset();
        exception.encode(&mut self.transport.buf);
        if let Err(err) = self.transport.flush() {
            debug!("conn {}: exception not delivered: {err}", self.id);
        }
    }
}
