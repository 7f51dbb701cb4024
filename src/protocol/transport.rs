use std::io::{self, Read, Write};

use log::debug;

use crate::{
    compress::{self, Method},
    error::{Context, Error, Result},
    proto::{Block, Buffer, Feature, Reader},
};

/// Both directions of a connection: a [`Buffer`] of pending output flushed
/// to `W`, and a [`Reader`] over the incoming byte stream.
pub struct Transport<'a, W: Write> {
    writer: W,
    pub buf: Buffer,
    pub reader: Reader<'a>,
    raw: Buffer,
    compressor: compress::Writer,
    revision: u64,
}

impl<'a, W: Write> Transport<'a, W> {
    pub fn new<R>(reader: R, writer: W, method: Method, revision: u64) -> Self
    where
        R: Read + Send + 'a,
    {
        Self {
            writer,
            buf: Buffer::new(),
            reader: Reader::new(reader),
            raw: Buffer::new(),
            compressor: compress::Writer::new(method),
            revision,
        }
    }

    /// Negotiated protocol revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Sends the buffered packets and empties the buffer.
    pub fn flush(&mut self) -> Result<()> {
        let data = self.buf.as_slice();
        let mut written = 0;
        while written < data.len() {
            match self.writer.write(&data[written..]) {
                Ok(0) => {
                    return Err(Error::ShortWrite {
                        expected: data.len(),
                        written,
                    });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("flush"),
            }
        }
        self.writer.flush().context("flush")?;
        debug!("flushed {written} bytes");
        self.buf.reset();
        Ok(())
    }

    /// Reads the next packet code, or `None` when the peer closed the stream
    /// at a packet boundary.
    pub fn read_packet<T>(&mut self) -> Result<Option<T>>
    where
        T: TryFrom<u64, Error = Error>,
    {
        if self.reader.is_eof()? {
            return Ok(None);
        }
        self.read_code().map(Some)
    }

    /// Reads the next packet code; the stream ending here is an error.
    pub fn read_code<T>(&mut self) -> Result<T>
    where
        T: TryFrom<u64, Error = Error>,
    {
        let code = self.reader.uvarint().context("packet code")?;
        T::try_from(code)
    }

    /// Appends `[table name][block]` to the buffer, after a packet code
    /// already written there. Only the block part is compressed.
    pub fn put_block(&mut self, block: &Block, compressed: bool) -> Result<()> {
        if Feature::TempTables.in_version(self.revision) {
            self.buf.put_string("");
        }
        if !compressed {
            return block.encode(&mut self.buf, self.revision);
        }
        self.raw.reset();
        block.encode(&mut self.raw, self.revision)?;
        self.compressor.compress(self.raw.as_slice())?;
        self.buf.put_raw(&self.compressor.data);
        Ok(())
    }

    /// Reads the `[table name][block]` payload of a data packet.
    pub fn read_block(&mut self, compressed: bool) -> Result<Block> {
        if Feature::TempTables.in_version(self.revision) {
            self.reader.str().context("table name")?;
        }
        let mut block = Block::new();
        if !compressed {
            block.decode(&mut self.reader, self.revision)?;
            return Ok(block);
        }
        self.reader.enable_compression();
        let res = block.decode(&mut self.reader, self.revision);
        self.reader.disable_compression();
        res?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::proto::{ClientCode, PROTOCOL_VERSION, ServerCode, column::ColStr};

    /// Writer that accepts `limit` bytes and then stops making progress.
    struct Stalled {
        limit: usize,
        data: Vec<u8>,
    }

    impl Write for Stalled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit - self.data.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn transport(input: Vec<u8>) -> Transport<'static, Vec<u8>> {
        Transport::new(Cursor::new(input), Vec::new(), Method::Lz4, PROTOCOL_VERSION)
    }

    fn sample() -> Block {
        let mut block = Block::new();
        block
            .add_column("s", ["a", "bb", "ccc"].into_iter().collect::<ColStr>())
            .unwrap();
        block
    }

    #[test]
    fn flush_resets_buffer() {
        let mut t = transport(Vec::new());
        ServerCode::Pong.encode(&mut t.buf);
        t.flush().unwrap();
        assert!(t.buf.is_empty());
        assert_eq!(t.into_writer(), vec![ServerCode::Pong as u8]);
    }

    #[test]
    fn short_write() {
        let mut t = Transport::new(
            Cursor::new(Vec::new()),
            Stalled {
                limit: 3,
                data: Vec::new(),
            },
            Method::None,
            PROTOCOL_VERSION,
        );
        t.buf.put_raw(&[1, 2, 3, 4, 5]);
        let err = t.flush().unwrap_err();
        assert!(matches!(
            err,
            Error::ShortWrite {
                expected: 5,
                written: 3
            }
        ));
    }

    #[test]
    fn data_packets_roundtrip() {
        for compressed in [false, true] {
            let mut t = transport(Vec::new());
            ClientCode::Data.encode(&mut t.buf);
            t.put_block(&sample(), compressed).unwrap();
            ClientCode::Data.encode(&mut t.buf);
            t.put_block(&Block::new(), compressed).unwrap();
            ClientCode::Ping.encode(&mut t.buf);
            t.flush().unwrap();

            let mut t = transport(t.into_writer());
            assert_eq!(t.read_code::<ClientCode>().unwrap(), ClientCode::Data);
            let block = t.read_block(compressed).unwrap();
            assert_eq!(block.rows(), 3);
            assert_eq!(block.column("s").unwrap().get::<ColStr>().unwrap().row_bytes(2), b"ccc");

            assert_eq!(t.read_code::<ClientCode>().unwrap(), ClientCode::Data);
            assert!(t.read_block(compressed).unwrap().is_empty());

            // Packet codes after a compressed block are read uncompressed.
            assert_eq!(t.read_packet::<ClientCode>().unwrap(), Some(ClientCode::Ping));
            assert_eq!(t.read_packet::<ClientCode>().unwrap(), None);
        }
    }

    #[test]
    fn compressed_block_is_framed() {
        let mut t = transport(Vec::new());
        t.put_block(&sample(), true).unwrap();
        // Table name, then the checksum and the LZ4 method tag.
        assert_eq!(t.buf.as_slice()[0], 0);
        assert_eq!(t.buf.as_slice()[17], 0x82);
    }

    #[test]
    fn truncated_packet_code() {
        let mut t = transport(vec![0x80]);
        let err = t.read_packet::<ServerCode>().unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn unknown_packet_code() {
        let mut t = transport(vec![42]);
        let err = t.read_packet::<ServerCode>().unwrap_err();
        assert!(matches!(err, Error::BadPacketCode { code: 42, .. }));
    }
}
