//! Composable random-access byte streams with aligned buffered reads.
//!
//! The building block is [`AlignedStream`], a generic engine owning a logical
//! position, an optional size and a one-block cache. It issues reads to its
//! source only at alignment boundaries: a misaligned head is served from the
//! cached block, whole aligned blocks pass straight through, and a misaligned
//! tail lands in the cache again. Any seek that leaves the cached block
//! invalidates the cache.
//!
//! Sources implement the [`ReadAt`] primitive; each concrete stream is an
//! alias of `AlignedStream` over its source type:
//!
//! | Stream                | Source view                                       |
//! |-----------------------|---------------------------------------------------|
//! | [`RangeStream`]       | fixed window (offset + size) of a backing stream  |
//! | [`RelativeStream`]    | suffix (offset, open-ended) of a backing stream   |
//! | [`BufferedStream`]    | whole backing stream, buffered                    |
//! | [`MappingStream`]     | ordered disjoint runs over multiple sources       |
//! | [`RunlistStream`]     | block-granular runs with sparse (zero) holes      |
//! | [`OverlayStream`]     | backing stream with byte patches applied          |
//! | [`ZlibStream`]        | zlib-compressed backing stream, seekable          |
//!
//! All streams implement [`std::io::Read`] and [`std::io::Seek`], so they
//! compose: a `RangeStream` can carve a window out of a `RunlistStream`, an
//! `OverlayStream` can patch a `MappingStream`, and so on. A short source
//! read (gap or EOF) ends the engine read at the bytes actually produced.

pub mod mapping;
pub mod overlay;
pub mod range;
pub mod runlist;
pub mod zlib;

pub use mapping::MappingStream;
pub use overlay::OverlayStream;
pub use range::{BufferedStream, RangeStream, RelativeStream};
pub use runlist::RunlistStream;
pub use zlib::ZlibStream;

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// Default read alignment and cache block size in bytes.
pub const STREAM_BUFFER_SIZE: usize = 8192;

/// Aligned random-access read primitive backing an [`AlignedStream`].
///
/// The engine only calls [`read_at`](ReadAt::read_at) with offsets on its
/// alignment boundary and lengths that are whole multiples of the alignment,
/// except for the final tail of a sized stream. A short return means the
/// source has no more data at that offset (end of data, or a gap).
pub trait ReadAt {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// The end offset used to resolve [`SeekFrom::End`] when the stream has
    /// no known size. Sources over a seekable backing stream can consult it.
    fn end_offset(&mut self) -> Result<u64> {
        Err(Error::InvalidParam("seek from end on a stream without a known size"))
    }
}

/// Buffered stream engine providing aligned reads over a [`ReadAt`] source.
pub struct AlignedStream<S> {
    pub(crate) source: S,
    pub(crate) size: Option<u64>,
    align: usize,
    pos: u64,
    pos_align: u64,
    buf: Box<[u8]>,
    buf_len: usize,
}

impl<S: ReadAt> AlignedStream<S> {
    /// Creates an engine over `source` with the given size (if known) and
    /// alignment. Concrete streams expose their own `new`/`with_align` on
    /// top of this.
    pub(crate) fn from_source(source: S, size: Option<u64>, align: usize) -> Self {
        debug_assert!(align > 0);
        AlignedStream {
            source,
            size,
            align,
            pos: 0,
            pos_align: 0,
            buf: vec![0u8; align].into_boxed_slice(),
            buf_len: 0,
        }
    }

    /// The stream size, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// The read alignment.
    pub fn align(&self) -> usize {
        self.align
    }

    /// The current stream position.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// A shared reference to the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub(crate) fn invalidate(&mut self) {
        self.buf_len = 0;
    }

    /// Moves the position, dropping the cache when the aligned block changes.
    pub(crate) fn set_pos(&mut self, pos: u64) {
        let new_pos_align = pos - pos % self.align as u64;
        if self.pos_align != new_pos_align {
            self.pos_align = new_pos_align;
            self.buf_len = 0;
        }
        self.pos = pos;
    }

    fn fill_buf(&mut self) -> Result<()> {
        if self.buf_len != 0 {
            return Ok(());
        }
        if let Some(size) = self.size {
            if size <= self.pos || size <= self.pos_align {
                return Ok(());
            }
        }
        self.buf_len = self.source.read_at(self.pos_align, &mut self.buf)?;
        Ok(())
    }

    /// Reads into `out` from the current position, advancing it by the bytes
    /// actually produced. Returns 0 at end of stream.
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<usize> {
        let align = self.align as u64;
        let mut n = out.len() as u64;

        if let Some(size) = self.size {
            if size <= self.pos {
                return Ok(0);
            }
            n = n.min(size - self.pos);
        }
        if n == 0 {
            return Ok(0);
        }

        let mut total = 0usize;
        let mut out_pos = 0usize;

        // Misaligned head, from the cached block.
        if self.pos != self.pos_align {
            self.fill_buf()?;

            let buffer_pos = (self.pos - self.pos_align) as usize;
            let wanted = (n as usize).min(self.align - buffer_pos);
            let read_len = wanted.min(self.buf_len.saturating_sub(buffer_pos));

            out[..read_len].copy_from_slice(&self.buf[buffer_pos..buffer_pos + read_len]);
            out_pos += read_len;
            total += read_len;
            n -= read_len as u64;
            self.set_pos(self.pos + read_len as u64);

            if read_len < wanted {
                return Ok(total);
            }
        }

        // Whole aligned blocks, straight from the source.
        if n >= align {
            let read_len = ((n / align) * align) as usize;
            let actual = self
                .source
                .read_at(self.pos, &mut out[out_pos..out_pos + read_len])?;

            out_pos += actual;
            total += actual;
            self.set_pos(self.pos + actual as u64);

            if actual < read_len {
                return Ok(total);
            }
            n -= read_len as u64;
        }

        // Misaligned tail, through the cache again.
        if n > 0 {
            self.fill_buf()?;

            let read_len = (n as usize).min(self.buf_len);
            out[out_pos..out_pos + read_len].copy_from_slice(&self.buf[..read_len]);
            total += read_len;
            self.set_pos(self.pos + read_len as u64);
        }

        Ok(total)
    }

    /// Reads until end of stream.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        if let Some(size) = self.size {
            let mut out = vec![0u8; size.saturating_sub(self.pos) as usize];
            let n = self.read_into(&mut out)?;
            out.truncate(n);
            return Ok(out);
        }

        let mut out = Vec::new();
        let mut chunk = vec![0u8; self.align];
        loop {
            let n = self.read_into(&mut chunk)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    /// Reads up to `n` bytes without moving the stream position.
    pub fn peek(&mut self, n: usize) -> Result<Vec<u8>> {
        let pos = self.pos;
        let mut out = vec![0u8; n];
        let read = self.read_into(&mut out)?;
        out.truncate(read);
        self.set_pos(pos);
        Ok(out)
    }

    /// Seeks to `offset` and reads up to `n` bytes.
    pub fn read_offset(&mut self, offset: u64, n: usize) -> Result<Vec<u8>> {
        self.set_pos(offset);
        let mut out = vec![0u8; n];
        let read = self.read_into(&mut out)?;
        out.truncate(read);
        Ok(out)
    }

    fn resolve_seek(&mut self, target: SeekFrom) -> Result<u64> {
        match target {
            SeekFrom::Start(pos) => Ok(pos),
            SeekFrom::Current(delta) => Ok(self.pos.saturating_add_signed(delta)),
            SeekFrom::End(delta) => {
                let end = match self.size {
                    Some(size) => size,
                    None => self.source.end_offset()?,
                };
                Ok(end.saturating_add_signed(delta))
            }
        }
    }
}

impl<S: ReadAt> Read for AlignedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::from)
    }
}

impl<S: ReadAt> Seek for AlignedStream<S> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let pos = self.resolve_seek(target).map_err(io::Error::from)?;
        self.set_pos(pos);
        Ok(pos)
    }
}
