//! Stream over filesystem-style block runs.

use std::io::{Read, Seek, SeekFrom};

use crate::compression::read_up_to;
use crate::error::Result;
use crate::stream::{AlignedStream, ReadAt};

/// Block-granular runs over a backing stream.
///
/// A run is `(block_offset, block_count)`: `block_count` consecutive blocks
/// starting at `block_offset` on the backing stream. A `None` block offset is
/// a sparse run reading as zeroes.
pub struct Runlist<T> {
    source: T,
    runlist: Vec<(Option<u64>, u64)>,
    // Starting block offset of every run but the first, for binary search.
    run_offsets: Vec<u64>,
    block_size: u64,
    size: u64,
}

impl<T> Runlist<T> {
    fn set_runlist(&mut self, runlist: Vec<(Option<u64>, u64)>) {
        self.runlist = runlist;
        self.run_offsets.clear();

        let mut offset = 0;
        for &(_, block_count) in &self.runlist {
            if offset != 0 {
                self.run_offsets.push(offset);
            }
            offset += block_count;
        }
    }
}

impl<T: Read + Seek> ReadAt for Runlist<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.block_size;
        let block_offset = offset / block_size;
        let mut run_idx = self.run_offsets.partition_point(|&o| o <= block_offset);

        let mut offset = offset;
        let mut buf_pos = 0usize;
        let mut n = 0usize;
        let mut length = buf.len();

        while length > 0 {
            let Some(&(run_block_offset, run_block_count)) = self.runlist.get(run_idx) else {
                break;
            };

            let run_block_pos = if run_idx == 0 { 0 } else { self.run_offsets[run_idx - 1] };
            let run_size = run_block_count * block_size;
            let run_pos = offset - run_block_pos * block_size;

            // The size can exceed what the runs cover; stop at the shortfall.
            let Some(run_remaining) = run_size.checked_sub(run_pos) else {
                break;
            };
            let Some(stream_remaining) = self.size.checked_sub(offset) else {
                break;
            };

            let read_count = stream_remaining.min(run_remaining).min(length as u64) as usize;

            match run_block_offset {
                // Sparse run.
                None => {
                    buf[buf_pos..buf_pos + read_count].fill(0);
                    n += read_count;
                }
                Some(run_block_offset) => {
                    self.source
                        .seek(SeekFrom::Start(run_block_offset * block_size + run_pos))?;
                    n += read_up_to(&mut self.source, &mut buf[buf_pos..buf_pos + read_count])?;
                }
            }

            offset += read_count as u64;
            length -= read_count;
            buf_pos += read_count;
            run_idx += 1;
        }

        Ok(n)
    }
}

/// A stream reassembling file content from block runs, as filesystems store
/// it.
///
/// The size may be smaller than the run total to account for slack space.
pub type RunlistStream<T> = AlignedStream<Runlist<T>>;

impl<T: Read + Seek> RunlistStream<T> {
    /// Creates a stream over `runlist` with blocks of `block_size` bytes,
    /// aligned on the block size.
    pub fn new(source: T, runlist: Vec<(Option<u64>, u64)>, size: u64, block_size: u64) -> Self {
        Self::with_align(source, runlist, size, block_size, block_size as usize)
    }

    pub fn with_align(
        source: T,
        runlist: Vec<(Option<u64>, u64)>,
        size: u64,
        block_size: u64,
        align: usize,
    ) -> Self {
        let mut inner = Runlist {
            source,
            runlist: Vec::new(),
            run_offsets: Vec::new(),
            block_size,
            size,
        };
        inner.set_runlist(runlist);
        AlignedStream::from_source(inner, Some(size), align)
    }

    pub fn runlist(&self) -> &[(Option<u64>, u64)] {
        &self.source.runlist
    }

    /// Replaces the runlist, rebuilding the search offsets and dropping the
    /// cache.
    pub fn set_runlist(&mut self, runlist: Vec<(Option<u64>, u64)>) {
        self.source.set_runlist(runlist);
        self.invalidate();
    }

    /// Grows or shrinks the stream, e.g. after appending runs.
    pub fn set_size(&mut self, size: u64) {
        self.source.size = size;
        self.size = Some(size);
    }

    pub fn block_size(&self) -> u64 {
        self.source.block_size
    }
}
