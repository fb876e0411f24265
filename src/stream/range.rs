//! Window streams over a single backing stream.
//!
//! [`RangeStream`] exposes a fixed `[offset, offset + size)` window,
//! [`RelativeStream`] everything from `offset` onward, and
//! [`BufferedStream`] simply adds aligned buffering in front of a stream.

use std::io::{Read, Seek, SeekFrom};

use crate::compression::read_up_to;
use crate::error::Result;
use crate::stream::{AlignedStream, ReadAt, STREAM_BUFFER_SIZE};

/// Offset view of a backing stream.
pub struct Offset<T> {
    source: T,
    offset: u64,
}

impl<T: Read + Seek> ReadAt for Offset<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.source.seek(SeekFrom::Start(self.offset + offset))?;
        read_up_to(&mut self.source, buf)
    }

    fn end_offset(&mut self) -> Result<u64> {
        let end = self.source.seek(SeekFrom::End(0))?;
        Ok(end.saturating_sub(self.offset))
    }
}

macro_rules! offset_source {
    ($name:ident) => {
        pub struct $name<T>(Offset<T>);

        impl<T: Read + Seek> ReadAt for $name<T> {
            fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
                self.0.read_at(offset, buf)
            }

            fn end_offset(&mut self) -> Result<u64> {
                self.0.end_offset()
            }
        }
    };
}

offset_source!(Range);
offset_source!(Relative);
offset_source!(Buffered);

/// A fixed-size window into a backing stream.
pub type RangeStream<T> = AlignedStream<Range<T>>;

impl<T: Read + Seek> RangeStream<T> {
    pub fn new(source: T, offset: u64, size: u64) -> Self {
        Self::with_align(source, offset, size, STREAM_BUFFER_SIZE)
    }

    pub fn with_align(source: T, offset: u64, size: u64, align: usize) -> Self {
        AlignedStream::from_source(Range(Offset { source, offset }), Some(size), align)
    }
}

/// An open-ended view of a backing stream starting at an offset.
///
/// Without a known size, [`SeekFrom::End`] resolves against the backing
/// stream's end.
pub type RelativeStream<T> = AlignedStream<Relative<T>>;

impl<T: Read + Seek> RelativeStream<T> {
    pub fn new(source: T, offset: u64) -> Self {
        Self::with_align(source, offset, None, STREAM_BUFFER_SIZE)
    }

    pub fn with_align(source: T, offset: u64, size: Option<u64>, align: usize) -> Self {
        AlignedStream::from_source(Relative(Offset { source, offset }), size, align)
    }
}

/// Aligned buffering in front of a backing stream.
pub type BufferedStream<T> = AlignedStream<Buffered<T>>;

impl<T: Read + Seek> BufferedStream<T> {
    pub fn new(source: T) -> Self {
        Self::with_align(source, 0, None, STREAM_BUFFER_SIZE)
    }

    pub fn with_align(source: T, offset: u64, size: Option<u64>, align: usize) -> Self {
        AlignedStream::from_source(Buffered(Offset { source, offset }), size, align)
    }
}
