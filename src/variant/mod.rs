//! Packet layouts: how each proprietary format frames its Opus packets.
//!
//! # Variants
//!
//! | Variant  | Size field                        | Bytes before payload |
//! |----------|-----------------------------------|----------------------|
//! | `Switch` | u32 BE at the packet start        | 8 (size + 4 opaque)  |
//! | `Ue4`    | u16 LE at the packet start        | 2                    |
//! | `Ea`     | u16 BE at the packet start        | 2                    |
//! | `X`      | u16 LE entry in a table at 0x20   | 0                    |
//!
//! Every layout answers one question through [`PacketLayout`]: given the
//! physical offset and index of a packet, how big is its payload and how many
//! bytes precede it.  Call sites never match on the variant themselves.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;

use crate::source::{read_u16_be_at, read_u16_le_at, read_u32_be_at, PhysicalSource};

/// Absolute offset of the packet size table in `X` streams.
pub const SIZE_TABLE_OFFSET: u64 = 0x20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantError {
    #[error("unknown packet layout tag {0}")]
    UnknownTag(u8),
    #[error("unknown packet layout '{0}'")]
    UnknownName(String),
}

/// Supported proprietary packet layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Switch,
    Ue4,
    Ea,
    X,
}

impl Variant {
    pub const ALL: [Variant; 4] = [Variant::Switch, Variant::Ue4, Variant::Ea, Variant::X];

    /// Resolve a numeric tag as handed over by format detection.
    pub fn from_tag(tag: u8) -> Result<Self, VariantError> {
        match tag {
            0 => Ok(Variant::Switch),
            1 => Ok(Variant::Ue4),
            2 => Ok(Variant::Ea),
            3 => Ok(Variant::X),
            t => Err(VariantError::UnknownTag(t)),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Variant::Switch => 0,
            Variant::Ue4    => 1,
            Variant::Ea     => 2,
            Variant::X      => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Switch => "switch",
            Variant::Ue4    => "ue4",
            Variant::Ea     => "ea",
            Variant::X      => "x",
        }
    }

    /// Bytes preceding each payload in the physical stream.
    pub fn skip_size(self) -> u64 {
        match self {
            Variant::Switch => 0x08,
            Variant::Ue4    => 0x02,
            Variant::Ea     => 0x02,
            Variant::X      => 0x00,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = VariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "switch" => Ok(Variant::Switch),
            "ue4"    => Ok(Variant::Ue4),
            "ea"     => Ok(Variant::Ea),
            "x"      => Ok(Variant::X),
            _        => Err(VariantError::UnknownName(s.to_string())),
        }
    }
}

/// Size and framing of one physical packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Opus payload bytes.
    pub payload_size: u64,
    /// Header bytes in front of the payload.
    pub skip_size:    u64,
}

impl Packet {
    /// Bytes the packet occupies in the physical stream.
    #[inline]
    pub fn physical_size(&self) -> u64 {
        self.payload_size + self.skip_size
    }

    /// Physical offset of the payload for a packet starting at `offset`.
    #[inline]
    pub fn payload_offset(&self, offset: u64) -> u64 {
        offset + self.skip_size
    }
}

/// Per-variant packet framing.
pub trait PacketLayout {
    fn variant(&self) -> Variant;

    /// Payload size of packet number `index`, which starts at `offset`.
    fn payload_size(
        &self,
        source: &mut dyn PhysicalSource,
        offset: u64,
        index:  u64,
    ) -> io::Result<u64>;

    fn skip_size(&self) -> u64 {
        self.variant().skip_size()
    }

    fn packet_at(
        &self,
        source: &mut dyn PhysicalSource,
        offset: u64,
        index:  u64,
    ) -> io::Result<Packet> {
        Ok(Packet {
            payload_size: self.payload_size(source, offset, index)?,
            skip_size:    self.skip_size(),
        })
    }
}

/// 32-bit big-endian size, then 4 bytes of encoder state.
pub struct SwitchLayout;
impl PacketLayout for SwitchLayout {
    fn variant(&self) -> Variant { Variant::Switch }
    fn payload_size(&self, source: &mut dyn PhysicalSource, offset: u64, _: u64) -> io::Result<u64> {
        read_u32_be_at(source, offset).map(u64::from)
    }
}

pub struct Ue4Layout;
impl PacketLayout for Ue4Layout {
    fn variant(&self) -> Variant { Variant::Ue4 }
    fn payload_size(&self, source: &mut dyn PhysicalSource, offset: u64, _: u64) -> io::Result<u64> {
        read_u16_le_at(source, offset).map(u64::from)
    }
}

pub struct EaLayout;
impl PacketLayout for EaLayout {
    fn variant(&self) -> Variant { Variant::Ea }
    fn payload_size(&self, source: &mut dyn PhysicalSource, offset: u64, _: u64) -> io::Result<u64> {
        read_u16_be_at(source, offset).map(u64::from)
    }
}

/// Packets carry no inline header; sizes live in a table near the file start.
pub struct TableLayout {
    pub table_offset: u64,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self { table_offset: SIZE_TABLE_OFFSET }
    }
}

impl PacketLayout for TableLayout {
    fn variant(&self) -> Variant { Variant::X }
    fn payload_size(&self, source: &mut dyn PhysicalSource, _: u64, index: u64) -> io::Result<u64> {
        // Table is not cached; one u16 read per packet.
        read_u16_le_at(source, self.table_offset + index * 2).map(u64::from)
    }
}

/// Resolve a variant to its layout.
pub fn get_layout(variant: Variant) -> Box<dyn PacketLayout + Send + Sync> {
    match variant {
        Variant::Switch => Box::new(SwitchLayout),
        Variant::Ue4    => Box::new(Ue4Layout),
        Variant::Ea     => Box::new(EaLayout),
        Variant::X      => Box::new(TableLayout::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tags_round_trip_and_reject_unknown() {
        for v in Variant::ALL {
            assert_eq!(Variant::from_tag(v.tag()).unwrap(), v);
        }
        assert_eq!(Variant::from_tag(4), Err(VariantError::UnknownTag(4)));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("UE4".parse::<Variant>().unwrap(), Variant::Ue4);
        assert_eq!("switch".parse::<Variant>().unwrap(), Variant::Switch);
        assert!(matches!("ogg".parse::<Variant>(), Err(VariantError::UnknownName(_))));
    }

    #[test]
    fn skip_sizes() {
        assert_eq!(Variant::Switch.skip_size(), 8);
        assert_eq!(Variant::Ue4.skip_size(), 2);
        assert_eq!(Variant::Ea.skip_size(), 2);
        assert_eq!(Variant::X.skip_size(), 0);
    }

    #[test]
    fn inline_size_fields() {
        let mut src = Cursor::new(vec![0x00, 0x00, 0x01, 0x2C, 0xAA, 0xBB, 0xCC, 0xDD]);
        let p = get_layout(Variant::Switch).packet_at(&mut src, 0, 0).unwrap();
        assert_eq!(p, Packet { payload_size: 300, skip_size: 8 });
        assert_eq!(p.physical_size(), 308);
        assert_eq!(p.payload_offset(16), 24);

        assert_eq!(get_layout(Variant::Ue4).payload_size(&mut src, 2, 0).unwrap(), 0x2C01);
        assert_eq!(get_layout(Variant::Ea).payload_size(&mut src, 2, 0).unwrap(), 0x012C);
    }

    #[test]
    fn table_sizes_are_indexed_by_packet() {
        let mut data = vec![0u8; 0x20];
        data.extend_from_slice(&[10, 0, 44, 1, 5, 0]);
        let mut src = Cursor::new(data);
        let layout = get_layout(Variant::X);
        assert_eq!(layout.payload_size(&mut src, 0x1234, 0).unwrap(), 10);
        assert_eq!(layout.payload_size(&mut src, 0x1234, 1).unwrap(), 300);
        assert_eq!(layout.packet_at(&mut src, 0, 2).unwrap(), Packet { payload_size: 5, skip_size: 0 });
        assert!(layout.payload_size(&mut src, 0, 3).is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Variant::Ue4).unwrap(), "\"ue4\"");
        let v: Variant = serde_json::from_str("\"ea\"").unwrap();
        assert_eq!(v, Variant::Ea);
    }
}
