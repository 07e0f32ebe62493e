//! Packet walks that never copy payloads: the size pre-scan run at open time,
//! plus the sample-count and encoder-delay probes format detection uses.

use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::page::{page_size, SCRATCH_CAPACITY};
use crate::samples::{encoder_delay, packet_samples};
use crate::source::PhysicalSource;
use crate::variant::{get_layout, Packet, PacketLayout};

use super::StreamError;

/// Leading payload bytes needed to count a packet's samples.
const TOC_PROBE_SIZE: usize = 4;

/// Result of walking every packet once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Header pages plus every synthesized data page.
    pub logical_size: u64,
    pub packets:      u64,
    /// Physical offset one past the last packet walked.
    pub physical_end: u64,
}

fn next_packet(
    layout: &dyn PacketLayout,
    source: &mut dyn PhysicalSource,
    offset: u64,
    index:  u64,
) -> Result<Packet, StreamError> {
    let packet = layout.packet_at(source, offset, index)?;
    if packet.physical_size() == 0 {
        return Err(StreamError::EmptyPacket(offset));
    }
    Ok(packet)
}

/// Compute the logical size of the virtual stream for `config`.
///
/// Fails when the declared extent or the walked packets reach past the end
/// of the source, or when any packet would not fit the page scratch buffer.
pub fn prescan(
    source:     &mut dyn PhysicalSource,
    config:     &StreamConfig,
    header_len: u64,
) -> Result<ScanReport, StreamError> {
    let source_size = source.size()?;
    let end = config
        .stream_offset
        .checked_add(config.stream_size)
        .filter(|&end| end <= source_size)
        .ok_or(StreamError::ExtentOutOfBounds {
            offset: config.stream_offset,
            size:   config.stream_size,
            source_size,
        })?;

    let layout = get_layout(config.variant);
    let mut physical = config.stream_offset;
    let mut logical  = header_len;
    let mut packets  = 0u64;

    while physical < end {
        let packet = next_packet(layout.as_ref(), source, physical, packets)?;
        let need = page_size(packet.payload_size as usize);
        if need > SCRATCH_CAPACITY {
            return Err(StreamError::PageTooLarge {
                offset:   physical,
                need,
                capacity: SCRATCH_CAPACITY,
            });
        }
        physical += packet.physical_size();
        logical  += need as u64;
        packets  += 1;
    }

    // The last packet may run past the declared extent, never past the source.
    if physical > source_size {
        return Err(StreamError::InconsistentSize { end: physical, source_size });
    }

    debug!(variant = %config.variant, packets, logical, physical, "pre-scan complete");
    Ok(ScanReport { logical_size: logical, packets, physical_end: physical })
}

/// Total decoded samples over every packet of the stream.
///
/// Reads only the first bytes of each payload.  A declared extent past the
/// end of the source is clamped rather than rejected.
pub fn count_samples(source: &mut dyn PhysicalSource, config: &StreamConfig) -> Result<u64, StreamError> {
    let source_size = source.size()?;
    let mut end = config.stream_end();
    if end > source_size {
        warn!(end, source_size, "declared stream end past source, clamping");
        end = source_size;
    }

    let layout = get_layout(config.variant);
    let mut physical = config.stream_offset;
    let mut index    = 0u64;
    let mut samples  = 0u64;
    let mut toc      = [0u8; TOC_PROBE_SIZE];

    while physical < end {
        let packet = next_packet(layout.as_ref(), source, physical, index)?;
        let want = TOC_PROBE_SIZE.min(packet.payload_size as usize);
        let got = source.read_at(packet.payload_offset(physical), &mut toc[..want])?;
        samples  += u64::from(packet_samples(&toc[..got]));
        physical += packet.physical_size();
        index    += 1;
    }
    Ok(samples)
}

/// Encoder delay estimate from the first packet at `config.stream_offset`.
pub fn encoder_delay_at(source: &mut dyn PhysicalSource, config: &StreamConfig) -> Result<u32, StreamError> {
    let layout = get_layout(config.variant);
    let packet = layout.packet_at(source, config.stream_offset, 0)?;
    let mut toc = [0u8; TOC_PROBE_SIZE];
    let want = TOC_PROBE_SIZE.min(packet.payload_size as usize);
    let got = source.read_at(packet.payload_offset(config.stream_offset), &mut toc[..want])?;
    Ok(encoder_delay(&toc[..got]))
}
