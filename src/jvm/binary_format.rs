use super::{Error, Result};
use byteorder::{BigEndian, ByteOrder};

/// Cursor over an immutable class file buffer
///
/// All multi-byte integers in class files are big-endian. Every read either advances the cursor
/// by exactly the width read, or fails with [`Error::TruncatedInput`] and leaves it untouched.
///
/// Readers created with [`ByteReader::sub_reader`] report offsets relative to the outermost
/// buffer, so errors always point into the original input.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
    base_offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ByteReader<'a> {
        ByteReader {
            bytes,
            position: 0,
            base_offset: 0,
        }
    }

    /// Reader over bytes that were taken from a larger buffer at `base_offset`
    pub fn with_base_offset(bytes: &'a [u8], base_offset: usize) -> ByteReader<'a> {
        ByteReader {
            bytes,
            position: 0,
            base_offset,
        }
    }

    /// Absolute offset of the next byte to be read
    pub fn offset(&self) -> usize {
        self.base_offset + self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if needed > available {
            return Err(Error::TruncatedInput {
                offset: self.offset(),
                needed,
                available,
            });
        }
        let slice = &self.bytes[self.position..self.position + needed];
        self.position += needed;
        Ok(slice)
    }

    pub fn read_u1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u2(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_u4(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_u8(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Read a `u2` count followed by that many `u2` values
    pub fn read_u2_list(&mut self) -> Result<Vec<u16>> {
        let count = self.read_u2()?;
        (0..count).map(|_| self.read_u2()).collect()
    }

    /// Split off the next `len` bytes into their own reader
    pub fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>> {
        let base_offset = self.offset();
        let bytes = self.take(len)?;
        Ok(ByteReader {
            bytes,
            position: 0,
            base_offset,
        })
    }

    /// Fail if any input is left over
    pub fn expect_end(&self, what: &str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed(
                self.offset(),
                format!("{} trailing bytes after {}", self.remaining(), what),
            ))
        }
    }
}

/// Growable big-endian output buffer
#[derive(Default, Debug)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> ByteWriter {
        ByteWriter { bytes: vec![] }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_u1(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u2(&mut self, value: u16) {
        let mut buf = [0; 2];
        BigEndian::write_u16(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn write_u4(&mut self, value: u32) {
        let mut buf = [0; 4];
        BigEndian::write_u32(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn write_u8(&mut self, value: u64) {
        let mut buf = [0; 8];
        BigEndian::write_u64(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Write a length or count that the format stores in a `u2`
    pub fn write_len_u2(&mut self, what: &'static str, len: usize) -> Result<()> {
        let len = u16::try_from(len).map_err(|_| Error::overflow(what, len, u16::MAX as usize))?;
        self.write_u2(len);
        Ok(())
    }

    /// Write a length that the format stores in a `u4`
    pub fn write_len_u4(&mut self, what: &'static str, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| Error::overflow(what, len, u32::MAX as usize))?;
        self.write_u4(len);
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
/// Serialization only fails when a count or length does not fit its field.
pub trait Serialize {
    /// Serialize construct into the output buffer
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()>;

    /// Serialize into a fresh buffer
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        self.serialize(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

impl Serialize for u8 {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_u1(*self);
        Ok(())
    }
}

impl Serialize for u16 {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_u2(*self);
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_u4(*self);
        Ok(())
    }
}

/// Size in `u16` is the first thing serialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_len_u2("sequence length", self.len())?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}
