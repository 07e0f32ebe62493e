//! Ogg page checksum.
//!
//! CRC-32 with polynomial `0x04C11DB7`, initial value 0, no reflection and no
//! final XOR.  This is *not* the zlib/IEEE CRC that `crc32fast` computes, so
//! the table is generated here at compile time.

/// Generator polynomial used by every Ogg page checksum.
pub const POLYNOMIAL: u32 = 0x04C1_1DB7;

const fn table_entry(index: u32) -> u32 {
    let mut r = index << 24;
    let mut bit = 0;
    while bit < 8 {
        r = if r & 0x8000_0000 != 0 { (r << 1) ^ POLYNOMIAL } else { r << 1 };
        bit += 1;
    }
    r
}

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = table_entry(i as u32);
        i += 1;
    }
    table
}

/// Precomputed lookup table, one entry per leading byte.
pub const TABLE: [u32; 256] = build_table();

/// Continue a running checksum over `data`.
#[inline]
pub fn update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &b| {
        (crc << 8) ^ TABLE[(((crc >> 24) as u8) ^ b) as usize]
    })
}

/// Checksum of `data` from a zero initial value.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    update(0, data)
}
