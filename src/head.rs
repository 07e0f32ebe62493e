//! Identification and comment header pages (RFC 7845 §5).
//!
//! Both pages are built once per stream and served verbatim ahead of the
//! data pages.  Channel mapping family 0 only: one mono or stereo stream.

use byteorder::{ByteOrder, LittleEndian};

use crate::page::{build_page, PageError};

pub const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
pub const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";
/// Size of the identification record for mapping family 0.
pub const OPUS_HEAD_SIZE: usize = 0x13;
/// Highest channel count mapping family 0 can describe.
pub const MAX_CHANNELS: u8 = 2;

pub const VENDOR: &str = "custom-opus";
pub const COMMENT: &str = "custom-opus packet transmuxer";

/// `OpusHead` record.
pub fn opus_head(channels: u8, pre_skip: u16, sample_rate: u32) -> [u8; OPUS_HEAD_SIZE] {
    let mut rec = [0u8; OPUS_HEAD_SIZE];
    rec[0x00..0x08].copy_from_slice(OPUS_HEAD_MAGIC);
    rec[0x08] = 1; // version
    rec[0x09] = channels;
    LittleEndian::write_u16(&mut rec[0x0A..0x0C], pre_skip);
    LittleEndian::write_u32(&mut rec[0x0C..0x10], sample_rate);
    LittleEndian::write_i16(&mut rec[0x10..0x12], 0); // output gain
    rec[0x12] = 0; // mapping family
    rec
}

/// `OpusTags` record with the crate's vendor string and one comment.
pub fn opus_tags() -> Vec<u8> {
    let mut rec = Vec::with_capacity(0x14 + VENDOR.len() + COMMENT.len());
    rec.extend_from_slice(OPUS_TAGS_MAGIC);
    rec.extend_from_slice(&(VENDOR.len() as u32).to_le_bytes());
    rec.extend_from_slice(VENDOR.as_bytes());
    rec.extend_from_slice(&1u32.to_le_bytes());
    rec.extend_from_slice(&(COMMENT.len() as u32).to_le_bytes());
    rec.extend_from_slice(COMMENT.as_bytes());
    rec
}

/// The two header pages, sequence numbers 0 and 1, granule 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBytes {
    bytes: Vec<u8>,
}

impl HeaderBytes {
    pub fn build(channels: u8, pre_skip: u16, sample_rate: u32) -> Result<Self, PageError> {
        let mut bytes = build_page(&opus_head(channels, pre_skip, sample_rate), 0, 0)?;
        bytes.extend(build_page(&opus_tags(), 1, 0)?);
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for HeaderBytes {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{split_pages, verify_checksum, PageHeader, FLAG_FIRST_PAGE};

    #[test]
    fn head_record_layout() {
        let rec = opus_head(2, 312, 44_100);
        assert_eq!(&rec[..8], b"OpusHead");
        assert_eq!(rec[8], 1);
        assert_eq!(rec[9], 2);
        assert_eq!(LittleEndian::read_u16(&rec[10..12]), 312);
        assert_eq!(LittleEndian::read_u32(&rec[12..16]), 44_100);
        assert_eq!(&rec[16..], &[0, 0, 0]);
    }

    #[test]
    fn tags_record_layout() {
        let rec = opus_tags();
        assert_eq!(rec.len(), 0x14 + VENDOR.len() + COMMENT.len());
        assert_eq!(&rec[..8], b"OpusTags");
        let vendor_len = LittleEndian::read_u32(&rec[8..12]) as usize;
        assert_eq!(&rec[12..12 + vendor_len], VENDOR.as_bytes());
        assert_eq!(LittleEndian::read_u32(&rec[12 + vendor_len..]), 1);
    }

    #[test]
    fn header_pages() {
        let head = HeaderBytes::build(1, 0, 48_000).unwrap();
        assert_eq!(head.len(), 0x1C + OPUS_HEAD_SIZE + 0x1C + opus_tags().len());

        let pages = split_pages(head.as_slice()).unwrap();
        assert_eq!(pages.len(), 2);
        for (seq, page) in pages.iter().enumerate() {
            let h = PageHeader::read(*page).unwrap();
            assert_eq!(h.sequence, seq as u32);
            assert_eq!(h.granule, 0);
            assert!(verify_checksum(page));
        }
        assert_eq!(PageHeader::read(pages[0]).unwrap().flags, FLAG_FIRST_PAGE);
        assert_eq!(&pages[0][0x1C..0x24], OPUS_HEAD_MAGIC);
        assert_eq!(&pages[1][0x1C..0x24], OPUS_TAGS_MAGIC);
    }

    #[test]
    fn header_depends_only_on_parameters() {
        let a = HeaderBytes::build(2, 120, 48_000).unwrap();
        let b = HeaderBytes::build(2, 120, 48_000).unwrap();
        let c = HeaderBytes::build(2, 121, 48_000).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), c.len());
    }
}
