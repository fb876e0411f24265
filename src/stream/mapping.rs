//! Stream stitched together from multiple mapped sources.

use std::io::{Read, Seek, SeekFrom};

use crate::compression::read_up_to;
use crate::error::{Error, Result};
use crate::stream::{AlignedStream, ReadAt, STREAM_BUFFER_SIZE};

struct Run<T> {
    offset: u64,
    size: u64,
    source: T,
    source_offset: u64,
}

/// Ordered runs mapping ranges of the stream onto backing sources.
pub struct Mapping<T> {
    runs: Vec<Run<T>>,
}

impl<T> Mapping<T> {
    /// Total size: the end of the last run.
    fn total_size(&self) -> u64 {
        self.runs.last().map_or(0, |run| run.offset + run.size)
    }

    fn run_index(&self, offset: u64) -> Option<usize> {
        self.runs
            .iter()
            .position(|run| run.offset <= offset && offset < run.offset + run.size)
    }
}

impl<T: Read + Seek> ReadAt for Mapping<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = self.total_size();
        let mut run_idx = self
            .run_index(offset)
            .ok_or(Error::InvalidParam("no mapping for offset"))?;

        let mut offset = offset;
        let mut buf_pos = 0usize;
        let mut n = 0usize;
        let mut length = buf.len();

        while length > 0 {
            let Some(run) = self.runs.get_mut(run_idx) else {
                break;
            };
            if run.offset > offset {
                // Landed in a gap, stop reading.
                break;
            }

            let run_pos = offset - run.offset;
            let Some(run_remaining) = run.size.checked_sub(run_pos) else {
                break;
            };

            let read_count = (size - offset).min(run_remaining).min(length as u64) as usize;

            run.source.seek(SeekFrom::Start(run.source_offset + run_pos))?;
            n += read_up_to(&mut run.source, &mut buf[buf_pos..buf_pos + read_count])?;

            offset += read_count as u64;
            length -= read_count;
            buf_pos += read_count;
            run_idx += 1;
        }

        Ok(n)
    }
}

/// A stream composed of ordered, possibly gapped runs over multiple backing
/// sources.
///
/// Reads span run boundaries, stop short at gaps, and fail when they start at
/// an unmapped offset.
pub type MappingStream<T> = AlignedStream<Mapping<T>>;

impl<T: Read + Seek> MappingStream<T> {
    pub fn new() -> Self {
        Self::with_align(STREAM_BUFFER_SIZE)
    }

    pub fn with_align(align: usize) -> Self {
        AlignedStream::from_source(Mapping { runs: Vec::new() }, None, align)
    }

    /// Maps `size` bytes of `source`, starting at `source_offset`, at stream
    /// offset `offset`.
    ///
    /// Runs stay sorted by offset (insertion order preserved among equal
    /// offsets) and the stream size grows to the end of the last run.
    pub fn add(&mut self, offset: u64, size: u64, source: T, source_offset: u64) {
        self.source.runs.push(Run { offset, size, source, source_offset });
        self.source.runs.sort_by_key(|run| (run.offset, run.size));
        self.size = Some(self.source.total_size());
        self.invalidate();
    }
}

impl<T: Read + Seek> Default for MappingStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn runs_are_sorted_on_add() {
        let mut fh = MappingStream::new();
        fh.add(0, 512, Cursor::new(vec![1u8; 512]), 0);
        fh.add(1536, 512, Cursor::new(vec![4u8; 512]), 0);
        fh.add(1024, 512, Cursor::new(vec![3u8; 512]), 0);
        fh.add(512, 512, Cursor::new(vec![2u8; 512]), 0);

        assert_eq!(fh.size(), Some(2048));
        let expected =
            [vec![1u8; 512], vec![2u8; 512], vec![3u8; 512], vec![4u8; 512]].concat();
        assert_eq!(fh.read_all().unwrap(), expected);
    }

    #[test]
    fn run_with_source_offset_and_clamped_size() {
        let mut fh = MappingStream::new();
        fh.add(0, 512, Cursor::new(vec![1u8; 512]), 0);
        fh.add(512, 412, Cursor::new(vec![5u8; 512]), 100);

        fh.seek(SeekFrom::Start(512)).unwrap();
        let mut buf = [0u8; 512];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 412);
        assert_eq!(buf[..412], vec![5u8; 412][..]);
        assert_eq!(fh.read_into(&mut [0u8; 1]).unwrap(), 0);
    }

    #[test]
    fn insertion_order_kept_for_equal_offsets() {
        let mut fh = MappingStream::new();
        fh.add(0, 1024, Cursor::new(vec![1u8; 1024]), 0);
        fh.add(0, 1024, Cursor::new(vec![2u8; 1024]), 0);

        // The first-added run wins for reads at offset 0.
        let mut buf = [0u8; 16];
        fh.read_into(&mut buf).unwrap();
        assert_eq!(buf, [1u8; 16]);
    }

    #[test]
    fn read_at_gap_start_is_an_error() {
        let mut fh = MappingStream::with_align(512);
        fh.add(0, 512, Cursor::new(vec![1u8; 512]), 0);
        fh.add(1024, 512, Cursor::new(vec![3u8; 512]), 0);

        // A read starting inside the gap cannot be mapped.
        fh.seek(SeekFrom::Start(512)).unwrap();
        assert!(fh.read_into(&mut [0u8; 16]).is_err());
    }

    #[test]
    fn read_stops_at_gap() {
        let mut fh = MappingStream::with_align(512);
        fh.add(0, 512, Cursor::new(vec![1u8; 512]), 0);
        fh.add(1024, 512, Cursor::new(vec![3u8; 512]), 0);

        // Aligned read spanning the gap returns only the mapped head.
        let mut buf = [0u8; 1024];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 512);
    }
}
