//! Sample accounting from an Opus packet's TOC byte (RFC 6716 §3.1).
//!
//! Only the first one or two bytes of a packet are inspected.  The result
//! feeds the granule position of each synthesized page, which is a running
//! total and not a decoder-verified sample position.

/// Rate every Opus stream is decoded at, whatever the input rate was.
pub const OPUS_RATE: u32 = 48_000;

/// Coding family selected by the high bits of the TOC byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Silk,
    Hybrid,
    Celt,
}

impl Family {
    pub fn from_toc(toc: u8) -> Self {
        if toc & 0x80 != 0 {
            Family::Celt
        } else if toc & 0x60 == 0x60 {
            Family::Hybrid
        } else {
            Family::Silk
        }
    }
}

/// Samples in one frame of a packet with this TOC byte, at `rate` Hz.
pub fn samples_per_frame(toc: u8, rate: u32) -> u32 {
    let duration = u32::from((toc >> 3) & 0x03);
    match Family::from_toc(toc) {
        // 2.5, 5, 10, 20 ms
        Family::Celt => (rate << duration) / 400,
        // 10, 20 ms
        Family::Hybrid => if toc & 0x08 != 0 { rate / 50 } else { rate / 100 },
        // 10, 20, 40, 60 ms
        Family::Silk => match duration {
            3 => rate * 60 / 1000,
            d => (rate << d) / 100,
        },
    }
}

/// Number of frames in `packet`; 0 when the packet is too short to tell.
pub fn frame_count(packet: &[u8]) -> u32 {
    let Some(&toc) = packet.first() else {
        return 0;
    };
    match toc & 0x03 {
        0 => 1,
        1 | 2 => 2,
        _ => packet.get(1).map_or(0, |&b| u32::from(b & 0x3F)),
    }
}

/// Decoded samples in `packet` at 48 kHz.
pub fn packet_samples(packet: &[u8]) -> u32 {
    match packet.first() {
        Some(&toc) => frame_count(packet) * samples_per_frame(toc, OPUS_RATE),
        None => 0,
    }
}

/// Encoder delay estimate from the first packet of a stream.
///
/// Taken as one eighth of the packet's samples.  This is an empirical fit
/// over observed files, not a value derived from the encoder; callers needing
/// an exact pre-skip must get it from the container metadata.
pub fn encoder_delay(first_packet: &[u8]) -> u32 {
    packet_samples(first_packet) / 8
}
