use std::ops::AddAssign;

use super::{Buffer, Feature, Reader, ServerCode};
use crate::error::{Context, Result};

/// Incremental query progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
    pub wrote_rows: u64,
    pub wrote_bytes: u64,
    pub elapsed_ns: u64,
}

impl Progress {
    pub fn encode_aware(&self, b: &mut Buffer, revision: u64) {
        ServerCode::Progress.encode(b);
        b.put_uvarint(self.rows);
        b.put_uvarint(self.bytes);
        b.put_uvarint(self.total_rows);
        if Feature::ClientWriteInfo.in_version(revision) {
            b.put_uvarint(self.wrote_rows);
            b.put_uvarint(self.wrote_bytes);
        }
        if Feature::ServerQueryTimeInProgress.in_version(revision) {
            b.put_uvarint(self.elapsed_ns);
        }
    }

    pub fn decode_aware(r: &mut Reader<'_>, revision: u64) -> Result<Self> {
        let mut p = Progress {
            rows: r.uvarint().context("rows")?,
            bytes: r.uvarint().context("bytes")?,
            total_rows: r.uvarint().context("total rows")?,
            ..Default::default()
        };
        if Feature::ClientWriteInfo.in_version(revision) {
            p.wrote_rows = r.uvarint().context("wrote rows")?;
            p.wrote_bytes = r.uvarint().context("wrote bytes")?;
        }
        if Feature::ServerQueryTimeInProgress.in_version(revision) {
            p.elapsed_ns = r.uvarint().context("elapsed")?;
        }
        Ok(p)
    }
}

impl AddAssign for Progress {
    fn add_assign(&mut self, rhs: Self) {
        self.rows += rhs.rows;
        self.bytes += rhs.bytes;
        self.total_rows += rhs.total_rows;
        self.wrote_rows += rhs.wrote_rows;
        self.wrote_bytes += rhs.wrote_bytes;
        self.elapsed_ns = self.elapsed_ns.max(rhs.elapsed_ns);
    }
}

/// Summary sent once after a query's result blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

impl ProfileInfo {
    pub fn encode(&self, b: &mut Buffer) {
        ServerCode::ProfileInfo.encode(b);
        b.put_uvarint(self.rows);
        b.put_uvarint(self.blocks);
        b.put_uvarint(self.bytes);
        b.put_bool(self.applied_limit);
        b.put_uvarint(self.rows_before_limit);
        b.put_bool(self.calculated_rows_before_limit);
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(ProfileInfo {
            rows: r.uvarint().context("rows")?,
            blocks: r.uvarint().context("blocks")?,
            bytes: r.uvarint().context("bytes")?,
            applied_limit: r.bool().context("applied limit")?,
            rows_before_limit: r.uvarint().context("rows before limit")?,
            calculated_rows_before_limit: r.bool().context("calculated rows before limit")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::proto::PROTOCOL_VERSION;

    #[test]
    fn progress_gated_fields() {
        let p = Progress {
            rows: 10,
            bytes: 80,
            total_rows: 10,
            wrote_rows: 1,
            wrote_bytes: 2,
            elapsed_ns: 99,
        };
        let mut b = Buffer::new();
        p.encode_aware(&mut b, PROTOCOL_VERSION);

        let mut r = Reader::new(Cursor::new(b.buf));
        assert_eq!(r.uvarint().unwrap(), ServerCode::Progress as u64);
        let dec = Progress::decode_aware(&mut r, PROTOCOL_VERSION).unwrap();

        // Elapsed time is newer than the revision spoken here.
        assert_eq!(dec, Progress { elapsed_ns: 0, ..p });
        assert!(r.is_eof().unwrap());
    }

    #[test]
    fn progress_accumulates() {
        let mut total = Progress::default();
        total += Progress {
            rows: 2,
            bytes: 16,
            ..Default::default()
        };
        total += Progress {
            rows: 3,
            bytes: 24,
            ..Default::default()
        };
        assert_eq!(total.rows, 5);
        assert_eq!(total.bytes, 40);
    }

    #[test]
    fn profile_info_roundtrip() {
        let info = ProfileInfo {
            rows: 1000,
            blocks: 1,
            bytes: 8000,
            applied_limit: true,
            rows_before_limit: 5000,
            calculated_rows_before_limit: true,
        };
        let mut b = Buffer::new();
        info.encode(&mut b);

        let mut r = Reader::new(Cursor::new(b.buf[1..].to_vec()));
        assert_eq!(ProfileInfo::decode(&mut r).unwrap(), info);
    }
}
