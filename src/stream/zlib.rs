//! Seekable stream over a raw zlib deflate stream.

use std::io::{Read, Seek, SeekFrom};

use flate2::read::ZlibDecoder;

use crate::compression::read_up_to;
use crate::error::{Error, Result};
use crate::stream::{AlignedStream, ReadAt, STREAM_BUFFER_SIZE};

/// Decompression state over a zlib-compressed backing stream.
///
/// The backing stream is rewound before the first read, and again whenever a
/// read lands before the bytes already produced, since inflate state cannot
/// run backwards.
pub struct Zlib<T> {
    decoder: Option<ZlibDecoder<T>>,
    // Decompressed bytes produced so far.
    offset: u64,
    started: bool,
}

impl<T: Read + Seek> Zlib<T> {
    fn rewind(&mut self) -> Result<()> {
        let Some(decoder) = self.decoder.take() else {
            return Err(Error::InvalidParam("zlib decoder unavailable"));
        };

        let mut source = decoder.into_inner();
        let seek = source.seek(SeekFrom::Start(0));
        self.decoder = Some(ZlibDecoder::new(source));
        self.offset = 0;
        self.started = true;
        seek?;

        Ok(())
    }

    fn read_decoded(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(Error::InvalidParam("zlib decoder unavailable"));
        };
        read_up_to(decoder, buf)
    }

    /// Decompresses up to `offset`, restarting from the beginning when the
    /// target lies behind the current decompression offset.
    fn skip_to(&mut self, offset: u64) -> Result<()> {
        if !self.started || offset < self.offset {
            self.rewind()?;
        }

        let mut scratch = vec![0u8; STREAM_BUFFER_SIZE];
        while self.offset < offset {
            let n = (offset - self.offset).min(scratch.len() as u64) as usize;
            let read = self.read_decoded(&mut scratch[..n])?;
            if read == 0 {
                break;
            }
            self.offset += read as u64;
        }

        Ok(())
    }
}

impl<T: Read + Seek> ReadAt for Zlib<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.skip_to(offset)?;
        let n = self.read_decoded(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

/// A random-access view of a raw zlib stream.
///
/// Seeking backwards resets the decompression context and replays from the
/// start, so prefer a large alignment when access is scattered.
pub type ZlibStream<T> = AlignedStream<Zlib<T>>;

impl<T: Read + Seek> ZlibStream<T> {
    pub fn new(source: T, size: Option<u64>) -> Self {
        Self::with_align(source, size, STREAM_BUFFER_SIZE)
    }

    pub fn with_align(source: T, size: Option<u64>, align: usize) -> Self {
        let inner = Zlib {
            decoder: Some(ZlibDecoder::new(source)),
            offset: 0,
            started: false,
        };
        AlignedStream::from_source(inner, size, align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn compressed(data: &[u8]) -> Cursor<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Cursor::new(encoder.finish().unwrap())
    }

    fn plain() -> Vec<u8> {
        [vec![1u8; 8192], vec![2u8; 8192], vec![3u8; 8192], vec![4u8; 8192]].concat()
    }

    #[test]
    fn sequential_reads() {
        let mut fh = ZlibStream::with_align(compressed(&plain()), Some(8192 * 4), 512);

        for byte in 1u8..=4 {
            let mut buf = [0u8; 8192];
            assert_eq!(fh.read_into(&mut buf).unwrap(), 8192);
            assert_eq!(buf[..], vec![byte; 8192][..]);
        }
        assert_eq!(fh.read_into(&mut [0u8; 1]).unwrap(), 0);
    }

    #[test]
    fn backward_seek_replays() {
        let mut fh = ZlibStream::with_align(compressed(&plain()), Some(8192 * 4), 512);

        let mut buf = [0u8; 8192];
        fh.read_into(&mut buf).unwrap();
        fh.read_into(&mut buf).unwrap();

        fh.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(fh.read_into(&mut buf).unwrap(), 8192);
        assert_eq!(buf[..], vec![1u8; 8192][..]);

        fh.seek(SeekFrom::Start(1024)).unwrap();
        assert_eq!(fh.read_into(&mut buf).unwrap(), 8192);
        assert_eq!(buf[..], [vec![1u8; 7168], vec![2u8; 1024]].concat()[..]);

        fh.seek(SeekFrom::Start(512)).unwrap();
        let mut buf = [0u8; 1024];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 1024);
        assert_eq!(buf[..], vec![1u8; 1024][..]);
    }

    #[test]
    fn unknown_size_reads_to_end() {
        let mut fh = ZlibStream::new(compressed(b"hello zlib stream"), None);
        assert_eq!(fh.read_all().unwrap(), b"hello zlib stream");
    }

    #[test]
    fn corrupt_stream_is_an_error() {
        let mut fh = ZlibStream::new(Cursor::new(vec![0xAA; 64]), Some(64));
        assert!(fh.read_into(&mut [0u8; 16]).is_err());
    }
}
