//! Generic fixed-size-record lump reading.
//!
//! Binary asset files in this family address nested tables through
//! `(count, offset)` pairs. Stored offsets are relative to the stream
//! position immediately following the offset field itself, so the absolute
//! position of a table is `origin + offset` where `origin` is captured right
//! after the offset integer is read. The convention is reapplied at every
//! nesting level; each nested header resolves against its own post-field
//! position, never the file start.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, SourceError};

/// A fixed-layout record that can be read out of a lump.
pub trait LumpRecord: Sized {
    /// On-disk record size in bytes. Records are tightly packed.
    const SIZE: u64;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self>;
}

impl LumpRecord for u16 {
    const SIZE: u64 = 2;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        reader.read_u16()
    }
}

/// A `(count, offset)` pair with the stream position it resolves against.
#[derive(Debug, Clone, Copy)]
pub struct LumpRef {
    count: usize,
    offset: i32,
    origin: u64,
}

impl LumpRef {
    fn new(count: i32, offset: i32, origin: u64) -> Result<Self> {
        if count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative lump count {count}"
            )));
        }
        Ok(Self {
            count: count as usize,
            offset,
            origin,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Absolute position of the first record, validated against the stream
    /// length.
    pub fn resolve(&self, stream_len: u64) -> Result<u64> {
        let absolute = self.origin as i64 + self.offset as i64;
        if absolute < 0 || absolute as u64 > stream_len {
            return Err(SourceError::Malformed(format!(
                "lump offset {} from position {} resolves outside stream of {} bytes",
                self.offset, self.origin, stream_len
            )));
        }
        Ok(absolute as u64)
    }
}

/// Bounds-checked reader every binary decoder in this crate builds on.
pub struct LumpReader<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> LumpReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self { inner, len })
    }

    /// Total stream length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Seek to an absolute position, failing if it lies outside the stream.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(SourceError::Malformed(format!(
                "seek to {pos} outside stream of {} bytes",
                self.len
            )));
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn skip(&mut self, bytes: u64) -> Result<()> {
        let pos = self.position()?;
        self.seek_to(pos + bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.inner.read_u8().map_err(truncated)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.inner.read_i8().map_err(truncated)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.inner.read_u16::<LittleEndian>().map_err(truncated)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.inner.read_i16::<LittleEndian>().map_err(truncated)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.inner.read_u32::<LittleEndian>().map_err(truncated)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.inner.read_i32::<LittleEndian>().map_err(truncated)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.inner.read_f32::<LittleEndian>().map_err(truncated)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(truncated)?;
        Ok(())
    }

    /// Read a `(count, offset)` pair, capturing the post-field origin the
    /// offset is relative to.
    pub fn read_lump_ref(&mut self) -> Result<LumpRef> {
        let count = self.read_i32()?;
        let offset = self.read_i32()?;
        let origin = self.position()?;
        LumpRef::new(count, offset, origin)
    }

    /// Read `lump.count()` records, invoking `visit` for each.
    ///
    /// The stream is repositioned to the start of each record before it is
    /// read, so `visit` may seek freely to follow nested offsets.
    pub fn read_lump<T, F>(&mut self, lump: &LumpRef, mut visit: F) -> Result<()>
    where
        T: LumpRecord,
        F: FnMut(&mut Self, usize, T) -> Result<()>,
    {
        if lump.is_empty() {
            return Ok(());
        }
        let start = lump.resolve(self.len)?;
        for index in 0..lump.count() {
            self.seek_to(start + index as u64 * T::SIZE)?;
            let record = T::read(self)?;
            visit(self, index, record)?;
        }
        Ok(())
    }

    /// Bulk-append `lump.count()` records into a caller-supplied buffer.
    pub fn read_lump_into<T: LumpRecord>(&mut self, lump: &LumpRef, dest: &mut Vec<T>) -> Result<()> {
        if lump.is_empty() {
            return Ok(());
        }
        self.seek_to(lump.resolve(self.len)?)?;
        dest.reserve(lump.count());
        for _ in 0..lump.count() {
            dest.push(T::read(self)?);
        }
        Ok(())
    }
}

fn truncated(err: std::io::Error) -> SourceError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        SourceError::Malformed("record extends past end of stream".to_string())
    } else {
        SourceError::Io(err)
    }
}
