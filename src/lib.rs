//! Decoders for legacy and proprietary compression formats, plus composable
//! random-access byte streams.
//!
//! The [`compression`] module holds pure decode functions for formats that
//! turn up when parsing disk images, file systems and application artifacts:
//! LZ4 block data, LZNT1, LZO1X, the two [MS-XCA] LZXPRESS variants, Apple's
//! LZFSE, LZVN and LZBITMAP, and GSM-style 7-bit packing.
//!
//! The [`stream`] module provides seekable [`std::io::Read`] views that carve
//! windows out of, stitch together, patch or transparently decompress other
//! streams, all buffered on an alignment boundary so the backing source only
//! sees aligned reads.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//!
//! use lzkit::stream::RangeStream;
//!
//! # fn main() -> lzkit::Result<()> {
//! let fh = File::open("image.bin")?;
//! let mut volume = RangeStream::new(fh, 0x10000, 0x8000);
//!
//! let mut header = [0u8; 512];
//! volume.read_exact(&mut header)?;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod error;
pub mod stream;

pub use error::{Error, Result};
