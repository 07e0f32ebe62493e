//! Virtual Ogg Opus stream over a proprietary packet stream.
//!
//! # Address spaces
//! The *physical* space is the source file: packets with inline size headers
//! (or a side table) starting at `stream_offset`.  The *logical* space is the
//! Ogg file a decoder sees: two header pages, then one data page per packet.
//!
//! ```text
//! logical:  [OpusHead page][OpusTags page][page 2][page 3] ...
//! physical:                               [pkt 0 ][pkt 1 ] ...
//! ```
//!
//! Pages are synthesized one at a time into a fixed scratch buffer as reads
//! advance.  Nothing maps a logical offset back to a physical one directly:
//! a read behind the buffered page restarts the walk from the first packet,
//! so backward seeks cost O(packets skipped).
//!
//! # Errors
//! Construction fails hard on malformed configuration (see [`StreamError`]).
//! Once open, reads never fail: out-of-range offsets read zero bytes and
//! source problems surface as short reads.

pub mod scan;

use std::io::{self, BufReader, Read, Seek, SeekFrom};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::StreamConfig;
use crate::head::HeaderBytes;
use crate::page::{finalize_page, page_overhead, PageError, SCRATCH_CAPACITY};
use crate::samples::packet_samples;
use crate::source::{read_exact_at, PhysicalSource};
use crate::variant::{get_layout, Packet, PacketLayout, VariantError};

pub use scan::{count_samples, encoder_delay_at, prescan, ScanReport};

/// Sequence number of the first data page; 0 and 1 are the header pages.
pub const FIRST_DATA_SEQUENCE: u32 = 2;
/// Capacity of the read-ahead stage added by [`open_buffered`].
pub const READ_BUFFER_SIZE: usize = 0x8000;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{0}")]
    Variant(#[from] VariantError),
    #[error("unsupported channel count {0}, expected 1 or 2")]
    UnsupportedChannels(u8),
    #[error("stream {offset:#x}+{size:#x} exceeds source size {source_size:#x}")]
    ExtentOutOfBounds { offset: u64, size: u64, source_size: u64 },
    #[error("packets end at {end:#x}, past source size {source_size:#x}")]
    InconsistentSize { end: u64, source_size: u64 },
    #[error("packet at {offset:#x} needs a {need} byte page, scratch holds {capacity}")]
    PageTooLarge { offset: u64, need: usize, capacity: usize },
    #[error("zero-length packet record at {0:#x}")]
    EmptyPacket(u64),
    #[error("Page error: {0}")]
    Page(#[from] PageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Mutable walk state.  Owned by one stream, never shared.
struct TranscodeState {
    physical_cursor: u64,
    /// Logical start of `page`, or of the next page when none is buffered.
    logical_cursor:  u64,
    page:            Box<[u8]>,
    /// Bytes of `page` in use; 0 when no page is buffered.
    page_len:        usize,
    /// Framing of the packet behind the buffered page.
    packet:          Packet,
    packet_index:    u64,
    page_sequence:   u32,
    running_samples: u64,
}

impl TranscodeState {
    fn new(base: u64, data_start: u64) -> Self {
        Self {
            physical_cursor: base,
            logical_cursor:  data_start,
            page:            vec![0u8; SCRATCH_CAPACITY].into_boxed_slice(),
            page_len:        0,
            packet:          Packet { payload_size: 0, skip_size: 0 },
            packet_index:    0,
            page_sequence:   FIRST_DATA_SEQUENCE,
            running_samples: 0,
        }
    }

    fn reset(&mut self, base: u64, data_start: u64) {
        self.physical_cursor = base;
        self.logical_cursor  = data_start;
        self.page_len        = 0;
        self.packet_index    = 0;
        self.page_sequence   = FIRST_DATA_SEQUENCE;
        self.running_samples = 0;
    }

    /// Drop the buffered page and move both cursors past it.
    fn advance(&mut self) {
        self.physical_cursor += self.packet.physical_size();
        self.logical_cursor  += self.page_len as u64;
        self.page_len = 0;
    }
}

/// Read-only view of the walk state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    pub physical:        u64,
    pub logical:         u64,
    pub page_len:        usize,
    pub next_sequence:   u32,
    pub running_samples: u64,
}

/// A proprietary packet stream presented as an Ogg Opus file.
pub struct VirtualStream<S: PhysicalSource> {
    source:       S,
    config:       StreamConfig,
    layout:       Box<dyn PacketLayout + Send + Sync>,
    header:       HeaderBytes,
    state:        TranscodeState,
    logical_size: u64,
    /// Position used by the `Read`/`Seek` impls only.
    position:     u64,
}

impl<S: PhysicalSource> VirtualStream<S> {
    /// Build the header pages and pre-scan the packets.  No stream is
    /// returned unless every packet maps onto a valid page.
    pub fn new(mut source: S, config: StreamConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let header = HeaderBytes::build(config.channels, config.skip, config.sample_rate)?;
        let report = prescan(&mut source, &config, header.len() as u64)?;
        debug!(
            variant = %config.variant,
            offset = config.stream_offset,
            packets = report.packets,
            logical_size = report.logical_size,
            "opened virtual stream"
        );
        Ok(Self {
            layout:       get_layout(config.variant),
            state:        TranscodeState::new(config.stream_offset, header.len() as u64),
            logical_size: report.logical_size,
            position:     0,
            source,
            config,
            header,
        })
    }

    /// Total logical size: header pages plus every data page.
    pub fn size(&self) -> u64 {
        self.logical_size
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn header(&self) -> &HeaderBytes {
        &self.header
    }

    pub fn cursors(&self) -> Cursors {
        Cursors {
            physical:        self.state.physical_cursor,
            logical:         self.state.logical_cursor,
            page_len:        self.state.page_len,
            next_sequence:   self.state.page_sequence,
            running_samples: self.state.running_samples,
        }
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Copy logical bytes starting at `offset` into `buf`.
    ///
    /// Returns the bytes written, which is short at end of stream and zero
    /// for negative offsets or offsets at or past [`size`](Self::size).
    pub fn read_at(&mut self, offset: i64, buf: &mut [u8]) -> usize {
        let Ok(mut offset) = u64::try_from(offset) else {
            return 0;
        };
        if offset >= self.logical_size || buf.is_empty() {
            return 0;
        }

        let head_len = self.header.len() as u64;
        if offset.max(head_len) < self.state.logical_cursor {
            debug!(offset, cursor = self.state.logical_cursor, "backward seek, restarting walk");
            self.state.reset(self.config.stream_offset, head_len);
        }

        let mut written = 0usize;
        if offset < head_len {
            let start = offset as usize;
            let n = (head_len as usize - start).min(buf.len());
            buf[..n].copy_from_slice(&self.header.as_slice()[start..start + n]);
            written += n;
            offset  += n as u64;
        }

        while written < buf.len() {
            if self.state.logical_cursor >= self.logical_size {
                break;
            }

            if self.state.page_len == 0 {
                if let Err(e) = self.synthesize_page() {
                    warn!(physical = self.state.physical_cursor, error = %e, "page synthesis failed");
                    break;
                }
            }

            let page_start = self.state.logical_cursor;
            let page_len   = self.state.page_len;
            if offset >= page_start + page_len as u64 {
                self.state.advance();
                continue;
            }

            let start = (offset - page_start) as usize;
            let n = (page_len - start).min(buf.len() - written);
            if n == 0 {
                break;
            }
            buf[written..written + n].copy_from_slice(&self.state.page[start..start + n]);
            written += n;
            offset  += n as u64;
        }

        written
    }

    /// Read the packet at the physical cursor and turn it into a page.
    fn synthesize_page(&mut self) -> Result<(), StreamError> {
        let state = &mut self.state;
        let packet = self.layout.packet_at(&mut self.source, state.physical_cursor, state.packet_index)?;

        let payload_len = packet.payload_size as usize;
        let overhead = page_overhead(payload_len);
        let need = overhead + payload_len;
        if need > state.page.len() {
            return Err(StreamError::PageTooLarge {
                offset:   state.physical_cursor,
                need,
                capacity: state.page.len(),
            });
        }

        let payload = &mut state.page[overhead..need];
        read_exact_at(&mut self.source, packet.payload_offset(state.physical_cursor), payload)?;
        state.running_samples += u64::from(packet_samples(payload));

        let len = finalize_page(&mut state.page, payload_len, state.page_sequence, state.running_samples)?;
        trace!(
            sequence = state.page_sequence,
            granule = state.running_samples,
            len,
            physical = state.physical_cursor,
            "synthesized page"
        );

        state.page_len = len;
        state.packet = packet;
        state.packet_index += 1;
        state.page_sequence += 1;
        Ok(())
    }
}

impl<S: PhysicalSource> Read for VirtualStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let offset = i64::try_from(self.position).unwrap_or(i64::MAX);
        let n = self.read_at(offset, buf);
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: PhysicalSource> Seek for VirtualStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n)   => Some(n),
            SeekFrom::End(d)     => self.logical_size.checked_add_signed(d),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
        };
        match target {
            Some(p) => {
                self.position = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

/// Open a virtual stream behind a read-ahead buffer, the shape a decoder
/// expects from an ordinary file handle.
pub fn open_buffered<S: PhysicalSource>(
    source: S,
    config: StreamConfig,
) -> Result<BufReader<VirtualStream<S>>, StreamError> {
    let stream = VirtualStream::new(source, config)?;
    Ok(BufReader::with_capacity(READ_BUFFER_SIZE, stream))
}
