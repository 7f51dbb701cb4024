//! Append-only byte accumulator with typed primitive writers.
//!
//! A [`Buffer`] is owned by exactly one writer between reset points. Encoders
//! append to [`Buffer::buf`] and the connection flushes it in one write, then
//! calls [`Buffer::reset`] so the allocation is reused for the next packet.

/// Growable byte buffer with little-endian primitive writers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub buf: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the contents, keeping capacity.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Appends `v` as base-128 groups, least significant group first, with
    /// the continuation bit set on every byte except the last.
    pub fn put_uvarint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push(v as u8 | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    /// Length or count, encoded as uvarint.
    pub fn put_int(&mut self, v: usize) {
        self.put_uvarint(v as u64);
    }

    pub fn put_raw(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Length-prefixed byte run.
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_int(v.len());
        self.put_raw(v);
    }

    pub fn put_string(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_u128(&mut self, v: u128) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.put_raw(&v.to_le_bytes());
    }
}
