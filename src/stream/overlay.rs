//! Patching a stream with byte overlays.

use std::io::{Read, Seek, SeekFrom};

use crate::compression::read_up_to;
use crate::error::{Error, Result};
use crate::stream::{AlignedStream, ReadAt, STREAM_BUFFER_SIZE};

/// A backing stream with non-overlapping byte patches on top.
pub struct Overlay<T> {
    source: T,
    // Sorted by offset; patches never overlap.
    overlays: Vec<(u64, Vec<u8>)>,
}

impl<T: Read + Seek> Overlay<T> {
    fn read_base(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.source.seek(SeekFrom::Start(offset))?;
        read_up_to(&mut self.source, buf)
    }
}

impl<T: Read + Seek> ReadAt for Overlay<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut overlay_idx = self.overlays.partition_point(|&(o, _)| o < offset);

        let mut offset = offset;
        let mut buf_pos = 0usize;
        let mut n = 0usize;
        let mut length = buf.len();

        while length > 0 {
            // Serve the tail of an overlay the read starts inside of.
            if let Some(prev_idx) = overlay_idx.checked_sub(1) {
                let (prev_offset, prev_data) = &self.overlays[prev_idx];
                let prev_end = prev_offset + prev_data.len() as u64;

                if prev_end > offset {
                    let pos = (offset - prev_offset) as usize;
                    let read_count = length.min(prev_data.len() - pos);

                    buf[buf_pos..buf_pos + read_count]
                        .copy_from_slice(&prev_data[pos..pos + read_count]);
                    n += read_count;

                    offset += read_count as u64;
                    length -= read_count;
                    buf_pos += read_count;
                }
            }

            if length == 0 {
                break;
            }

            let Some((next_offset, next_len)) = self
                .overlays
                .get(overlay_idx)
                .map(|(o, data)| (*o, data.len()))
            else {
                // No next overlay, complete the read from the backing stream.
                n += self.read_base(offset, &mut buf[buf_pos..buf_pos + length])?;
                break;
            };

            let gap = (next_offset - offset) as usize;
            if gap >= length {
                // Next overlay is too far away, complete the read.
                n += self.read_base(offset, &mut buf[buf_pos..buf_pos + length])?;
                break;
            }

            if gap > 0 {
                n += self.read_base(offset, &mut buf[buf_pos..buf_pos + gap])?;
                buf_pos += gap;
            }

            let read_count = next_len.min(length - gap);
            buf[buf_pos..buf_pos + read_count]
                .copy_from_slice(&self.overlays[overlay_idx].1[..read_count]);
            n += read_count;

            offset += (gap + read_count) as u64;
            length -= gap + read_count;
            buf_pos += read_count;
            overlay_idx += 1;
        }

        Ok(n)
    }

    fn end_offset(&mut self) -> Result<u64> {
        Ok(self.source.seek(SeekFrom::End(0))?)
    }
}

/// A stream patching byte ranges on top of a backing stream, without caching
/// the full contents.
pub type OverlayStream<T> = AlignedStream<Overlay<T>>;

impl<T: Read + Seek> OverlayStream<T> {
    pub fn new(source: T, size: Option<u64>) -> Self {
        Self::with_align(source, size, STREAM_BUFFER_SIZE)
    }

    pub fn with_align(source: T, size: Option<u64>, align: usize) -> Self {
        AlignedStream::from_source(Overlay { source, overlays: Vec::new() }, size, align)
    }

    /// Adds a patch of `data` at `offset`.
    ///
    /// Empty patches are ignored; a patch overlapping an existing one is
    /// rejected.
    pub fn add(&mut self, offset: u64, data: Vec<u8>) -> Result<()> {
        let size = data.len() as u64;
        if size == 0 {
            return Ok(());
        }

        for (other_offset, other_data) in &self.source.overlays {
            if *other_offset < offset + size && offset < other_offset + other_data.len() as u64 {
                return Err(Error::InvalidParam("overlap with existing overlay"));
            }
        }

        let idx = self.source.overlays.partition_point(|&(o, _)| o < offset);
        self.source.overlays.insert(idx, (offset, data));

        // Drop the cache if the patch touches the cached block.
        let align = self.align() as u64;
        let pos_align = self.tell() - self.tell() % align;
        if pos_align < offset + size && offset <= pos_align + align {
            self.invalidate();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn patched_reads() {
        let mut fh =
            OverlayStream::with_align(Cursor::new(vec![0u8; 512 * 8]), Some(512 * 8), 512);
        assert_eq!(fh.read_all().unwrap(), vec![0u8; 512 * 8]);
        fh.seek(SeekFrom::Start(0)).unwrap();

        fh.add(512, vec![0xFF; 4]).unwrap();

        let mut buf = [1u8; 512];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 512);
        assert_eq!(buf, [0u8; 512]);
        assert_eq!(fh.read_into(&mut buf).unwrap(), 512);
        assert_eq!(buf[..], [vec![0xFFu8; 4], vec![0u8; 508]].concat()[..]);

        fh.seek(SeekFrom::Start(510)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 4);
        assert_eq!(buf, [0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn unaligned_overlay_spanning_blocks() {
        let mut fh =
            OverlayStream::with_align(Cursor::new(vec![0u8; 512 * 8]), Some(512 * 8), 512);
        fh.add(1000, vec![1u8; 1024]).unwrap();

        fh.seek(SeekFrom::Start(1000)).unwrap();
        let mut buf = [0u8; 1024];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 1024);
        assert_eq!(buf[..], vec![1u8; 1024][..]);

        fh.seek(SeekFrom::Start(1024)).unwrap();
        let mut buf = [0u8; 512];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 512);
        assert_eq!(buf, [1u8; 512]);

        fh.seek(SeekFrom::Start(2000)).unwrap();
        assert_eq!(fh.read_into(&mut buf).unwrap(), 512);
        assert_eq!(buf[..], [vec![1u8; 24], vec![0u8; 488]].concat()[..]);

        fh.seek(SeekFrom::Start(2048)).unwrap();
        assert_eq!(fh.read_into(&mut buf).unwrap(), 512);
        assert_eq!(buf, [0u8; 512]);
    }

    #[test]
    fn consecutive_overlays_and_overlap() {
        let mut fh =
            OverlayStream::with_align(Cursor::new(vec![0u8; 512 * 8]), Some(512 * 8), 512);
        fh.add(512, vec![0xFF; 4]).unwrap();
        fh.add(516, vec![2u8; 10]).unwrap();

        fh.seek(SeekFrom::Start(510)).unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 32);
        let expected = [&[0u8, 0][..], &[0xFF; 4], &[2u8; 10], &[0u8; 16]].concat();
        assert_eq!(buf[..], expected[..]);

        assert!(fh.add(500, vec![3u8; 100]).is_err());
    }

    #[test]
    fn overlay_at_offset_zero() {
        let mut fh =
            OverlayStream::with_align(Cursor::new(vec![0u8; 512]), Some(512), 512);
        fh.add(0, vec![9u8; 8]).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 16);
        assert_eq!(buf[..], [vec![9u8; 8], vec![0u8; 8]].concat()[..]);
    }

    #[test]
    fn overlay_past_size_is_clamped() {
        let mut fh =
            OverlayStream::with_align(Cursor::new(vec![0u8; 512 * 8]), Some(512 * 8), 512);
        fh.add(512 * 8 - 4, vec![4u8; 100]).unwrap();

        fh.seek(SeekFrom::Start(512 * 8 - 4)).unwrap();
        let mut buf = [0u8; 100];
        assert_eq!(fh.read_into(&mut buf).unwrap(), 4);
        assert_eq!(buf[..4], [4u8; 4]);
    }

    #[test]
    fn empty_overlay_is_ignored() {
        let mut fh = OverlayStream::new(Cursor::new(vec![0u8; 64]), Some(64));
        fh.add(10, Vec::new()).unwrap();
        assert_eq!(fh.read_all().unwrap(), vec![0u8; 64]);
    }
}
