//! Physical sources: the original proprietary bytes the virtual stream maps onto.
//!
//! Any `Read + Seek` value is a source, so files, `Cursor<Vec<u8>>` and
//! `&mut File` all work.  Sources are addressed by absolute offset; the
//! virtual stream never relies on the source's own cursor between calls.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::{self, Read, Seek, SeekFrom};

/// Seekable, sized byte source.
pub trait PhysicalSource {
    /// Read up to `buf.len()` bytes at absolute `offset`.  Returns bytes read;
    /// fewer than requested only at end of source.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total size of the source in bytes.
    fn size(&mut self) -> io::Result<u64>;
}

impl<R: Read + Seek> PhysicalSource for R {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < buf.len() {
            match self.read(&mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(done)
    }

    fn size(&mut self) -> io::Result<u64> {
        let here = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(here))?;
        Ok(end)
    }
}

/// Fill `buf` completely from `offset`, or fail with `UnexpectedEof`.
pub fn read_exact_at(source: &mut dyn PhysicalSource, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let n = source.read_at(offset, buf)?;
    if n < buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("wanted {} bytes at {offset:#x}, source has {n}", buf.len()),
        ));
    }
    Ok(())
}

pub fn read_u16_le_at(source: &mut dyn PhysicalSource, offset: u64) -> io::Result<u16> {
    let mut b = [0u8; 2];
    read_exact_at(source, offset, &mut b)?;
    Ok(LittleEndian::read_u16(&b))
}

pub fn read_u16_be_at(source: &mut dyn PhysicalSource, offset: u64) -> io::Result<u16> {
    let mut b = [0u8; 2];
    read_exact_at(source, offset, &mut b)?;
    Ok(BigEndian::read_u16(&b))
}

pub fn read_u32_be_at(source: &mut dyn PhysicalSource, offset: u64) -> io::Result<u32> {
    let mut b = [0u8; 4];
    read_exact_at(source, offset, &mut b)?;
    Ok(BigEndian::read_u32(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_is_a_source() {
        let mut src = Cursor::new(vec![0x12, 0x34, 0x56, 0x78, 0x9A]);
        assert_eq!(src.size().unwrap(), 5);
        assert_eq!(read_u16_le_at(&mut src, 0).unwrap(), 0x3412);
        assert_eq!(read_u16_be_at(&mut src, 1).unwrap(), 0x3456);
        assert_eq!(read_u32_be_at(&mut src, 1).unwrap(), 0x3456_789A);
    }

    #[test]
    fn short_read_at_end() {
        let mut src = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(src.read_at(1, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[2, 3]);
        assert_eq!(src.read_at(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn exact_read_past_end_fails() {
        let mut src = Cursor::new(vec![1u8, 2, 3]);
        let err = read_u32_be_at(&mut src, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn size_preserves_position() {
        let mut src = Cursor::new(vec![0u8; 16]);
        src.set_position(4);
        assert_eq!(PhysicalSource::size(&mut src).unwrap(), 16);
        assert_eq!(src.position(), 4);
    }
}
