//! Ogg page synthesis.
//!
//! # Layout (RFC 3533)
//! ```text
//! 0x00  "OggS"            capture pattern
//! 0x04  u8                stream structure version (0)
//! 0x05  u8                header type flags (0x02 = first page of stream)
//! 0x06  u64 LE            granule position
//! 0x0E  u32 LE            stream serial number
//! 0x12  u32 LE            page sequence number
//! 0x16  u32 LE            CRC-32 of the whole page, computed with this field zeroed
//! 0x1A  u8                segment count
//! 0x1B  [u8; count]       lacing values
//!       ...               payload
//! ```
//!
//! Every page synthesized here carries exactly one packet.  The lacing table
//! encodes the packet length in 255-byte runs; when the length is a multiple
//! of 255 an explicit zero terminator follows the last full run.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read};
use thiserror::Error;

use crate::crc;

/// "OggS", read as a big-endian u32.
pub const CAPTURE_PATTERN: u32 = 0x4F67_6753;
/// Fixed part of every page header, before the lacing table.
pub const PAGE_HEADER_SIZE: usize = 0x1B;
/// Serial number shared by every page of a synthesized stream.
pub const STREAM_SERIAL: u32 = 0x7667;
/// Header type flag marking the beginning of a logical stream.
pub const FLAG_FIRST_PAGE: u8 = 0x02;
/// Scratch capacity for one data page.  Observed pages stay well under 0xC00.
pub const SCRATCH_CAPACITY: usize = 0x2000;

const CHECKSUM_FIELD: std::ops::Range<usize> = 0x16..0x1A;
const LACING_RUN: usize = 0xFF;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("page of {need} bytes does not fit in {capacity} byte buffer")]
    Overflow { need: usize, capacity: usize },
    #[error("payload of {0} bytes needs more than 255 lacing values")]
    TooManySegments(usize),
    #[error("page too short: {len} bytes")]
    Truncated { len: usize },
}

/// Header bytes plus lacing table needed for a payload of `payload_len` bytes.
#[inline]
pub fn page_overhead(payload_len: usize) -> usize {
    PAGE_HEADER_SIZE + lacing_len(payload_len)
}

/// Total synthesized page size for a payload of `payload_len` bytes.
#[inline]
pub fn page_size(payload_len: usize) -> usize {
    page_overhead(payload_len) + payload_len
}

#[inline]
fn lacing_len(payload_len: usize) -> usize {
    payload_len / LACING_RUN + 1
}

/// Finish a page whose payload already sits at `buf[page_overhead(len)..]`.
///
/// Writes the header and lacing table in front of the payload, then the
/// checksum over the completed page.  Returns the page size.
pub fn finalize_page(
    buf:         &mut [u8],
    payload_len: usize,
    sequence:    u32,
    granule:     u64,
) -> Result<usize, PageError> {
    let total = page_size(payload_len);
    if total > buf.len() {
        return Err(PageError::Overflow { need: total, capacity: buf.len() });
    }

    let segments = lacing_len(payload_len);
    if segments > u8::MAX as usize {
        return Err(PageError::TooManySegments(payload_len));
    }
    let flags = if sequence == 0 { FLAG_FIRST_PAGE } else { 0 };

    BigEndian::write_u32(&mut buf[0x00..0x04], CAPTURE_PATTERN);
    buf[0x04] = 0;
    buf[0x05] = flags;
    LittleEndian::write_u64(&mut buf[0x06..0x0E], granule);
    LittleEndian::write_u32(&mut buf[0x0E..0x12], STREAM_SERIAL);
    LittleEndian::write_u32(&mut buf[0x12..0x16], sequence);
    buf[CHECKSUM_FIELD].fill(0);
    buf[0x1A] = segments as u8;

    let lacing = &mut buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + segments];
    let full_runs = payload_len / LACING_RUN;
    lacing[..full_runs].fill(LACING_RUN as u8);
    lacing[full_runs] = (payload_len % LACING_RUN) as u8;

    let sum = crc::checksum(&buf[..total]);
    LittleEndian::write_u32(&mut buf[CHECKSUM_FIELD], sum);
    Ok(total)
}

/// Build a standalone page around `payload`.
pub fn build_page(payload: &[u8], sequence: u32, granule: u64) -> Result<Vec<u8>, PageError> {
    let overhead = page_overhead(payload.len());
    let mut page = vec![0u8; overhead + payload.len()];
    page[overhead..].copy_from_slice(payload);
    finalize_page(&mut page, payload.len(), sequence, granule)?;
    Ok(page)
}

/// Recompute the checksum of a finished page and compare it with the stored one.
pub fn verify_checksum(page: &[u8]) -> bool {
    if page.len() < PAGE_HEADER_SIZE {
        return false;
    }
    let stored = LittleEndian::read_u32(&page[CHECKSUM_FIELD]);
    let sum = crc::update(crc::update(0, &page[..CHECKSUM_FIELD.start]), &[0u8; 4]);
    crc::update(sum, &page[CHECKSUM_FIELD.end..]) == stored
}

/// Parsed fixed header of one page, lacing table included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub capture:  u32,
    pub version:  u8,
    pub flags:    u8,
    pub granule:  u64,
    pub serial:   u32,
    pub sequence: u32,
    pub checksum: u32,
    pub lacing:   Vec<u8>,
}

impl PageHeader {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let capture = reader.read_u32::<BigEndian>()?;
        if capture != CAPTURE_PATTERN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad capture pattern {capture:#010x}"),
            ));
        }
        let version  = reader.read_u8()?;
        let flags    = reader.read_u8()?;
        let granule  = reader.read_u64::<LittleEndian>()?;
        let serial   = reader.read_u32::<LittleEndian>()?;
        let sequence = reader.read_u32::<LittleEndian>()?;
        let checksum = reader.read_u32::<LittleEndian>()?;
        let segments = reader.read_u8()?;
        let mut lacing = vec![0u8; segments as usize];
        reader.read_exact(&mut lacing)?;
        Ok(Self { capture, version, flags, granule, serial, sequence, checksum, lacing })
    }

    /// Size of header plus lacing table.
    pub fn header_len(&self) -> usize {
        PAGE_HEADER_SIZE + self.lacing.len()
    }

    /// Payload length described by the lacing table.
    pub fn payload_len(&self) -> usize {
        self.lacing.iter().map(|&v| v as usize).sum()
    }

    /// Total size of the page this header describes.
    pub fn page_len(&self) -> usize {
        self.header_len() + self.payload_len()
    }
}

/// Split a byte stream made of whole pages into page slices.
pub fn split_pages(mut data: &[u8]) -> Result<Vec<&[u8]>, PageError> {
    let mut pages = Vec::new();
    while !data.is_empty() {
        let header = PageHeader::read(data)
            .map_err(|_| PageError::Truncated { len: data.len() })?;
        let len = header.page_len();
        if len > data.len() {
            return Err(PageError::Truncated { len: data.len() });
        }
        let (page, rest) = data.split_at(len);
        pages.push(page);
        data = rest;
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overhead_counts_lacing_values() {
        assert_eq!(page_overhead(0), 0x1C);
        assert_eq!(page_overhead(10), 0x1C);
        assert_eq!(page_overhead(254), 0x1C);
        assert_eq!(page_overhead(255), 0x1D);
        assert_eq!(page_overhead(300), 0x1D);
        assert_eq!(page_overhead(510), 0x1E);
    }

    #[test]
    fn lacing_for_exact_run_has_zero_terminator() {
        let page = build_page(&[0xAB; 255], 5, 0).unwrap();
        let header = PageHeader::read(&page[..]).unwrap();
        assert_eq!(header.lacing, vec![255, 0]);
        assert_eq!(header.payload_len(), 255);

        let page = build_page(&[0xAB; 510], 5, 0).unwrap();
        let header = PageHeader::read(&page[..]).unwrap();
        assert_eq!(header.lacing, vec![255, 255, 0]);
    }

    #[test]
    fn lacing_for_partial_run() {
        let page = build_page(&[1; 300], 2, 960).unwrap();
        let header = PageHeader::read(&page[..]).unwrap();
        assert_eq!(header.lacing, vec![255, 45]);
        assert_eq!(page.len(), page_size(300));
        assert_eq!(&page[header.header_len()..], &[1; 300][..]);
    }

    #[test]
    fn empty_payload_gets_one_lacing_value() {
        let page = build_page(&[], 3, 0).unwrap();
        assert_eq!(page.len(), 0x1C);
        assert_eq!(page[0x1A], 1);
        assert_eq!(page[0x1B], 0);
        assert!(verify_checksum(&page));
    }

    #[test]
    fn header_fields() {
        let page = build_page(b"payload", 0, 0x1_0000_0002).unwrap();
        assert_eq!(&page[..4], b"OggS");
        let header = PageHeader::read(&page[..]).unwrap();
        assert_eq!(header.version, 0);
        assert_eq!(header.flags, FLAG_FIRST_PAGE);
        assert_eq!(header.granule, 0x1_0000_0002);
        assert_eq!(header.serial, STREAM_SERIAL);
        assert_eq!(header.sequence, 0);

        let page = build_page(b"payload", 1, 0).unwrap();
        assert_eq!(PageHeader::read(&page[..]).unwrap().flags, 0);
    }

    #[test]
    fn checksum_is_computed_over_zeroed_field() {
        let page = build_page(b"some opus bytes", 7, 1920).unwrap();
        let mut zeroed = page.clone();
        zeroed[0x16..0x1A].fill(0);
        let expected = crc::checksum(&zeroed);
        assert_eq!(LittleEndian::read_u32(&page[0x16..0x1A]), expected);
        assert!(verify_checksum(&page));
    }

    #[test]
    fn corrupted_page_fails_verification() {
        let mut page = build_page(b"some opus bytes", 7, 1920).unwrap();
        let last = page.len() - 1;
        page[last] ^= 0xFF;
        assert!(!verify_checksum(&page));
    }

    #[test]
    fn finalize_rejects_small_buffer() {
        let mut buf = [0u8; 40];
        let err = finalize_page(&mut buf, 20, 2, 0).unwrap_err();
        assert_eq!(err, PageError::Overflow { need: 48, capacity: 40 });
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let err = build_page(&vec![0u8; 255 * 255], 2, 0).unwrap_err();
        assert_eq!(err, PageError::TooManySegments(255 * 255));
    }

    #[test]
    fn split_pages_walks_concatenation() {
        let mut stream = build_page(b"first", 0, 0).unwrap();
        stream.extend(build_page(&[9; 600], 1, 0).unwrap());
        let pages = split_pages(&stream).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].len(), page_size(600));
        assert!(split_pages(&stream[..stream.len() - 1]).is_err());
    }
}
