//! Declarative little-endian field encoder.
//!
//! Every ZIP record is described as an ordered list of [`Field`]s and turned
//! into bytes by [`encode`]. Keeping the layout as data makes it easy to see
//! that a record matches the APPNOTE table and that its encoded length matches
//! what the size predictor assumes.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, ZipError};

/// One field of a header record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    /// Unsigned integer written little-endian in `width` bytes.
    Int { value: u64, width: usize },
    /// Byte span copied verbatim.
    Raw(&'a [u8]),
}

impl<'a> Field<'a> {
    pub fn int(value: u64, width: usize) -> Self {
        Field::Int { value, width }
    }

    pub fn u8(value: u8) -> Self {
        Field::int(value as u64, 1)
    }

    pub fn u16(value: u16) -> Self {
        Field::int(value as u64, 2)
    }

    pub fn u32(value: u32) -> Self {
        Field::int(value as u64, 4)
    }

    pub fn u64(value: u64) -> Self {
        Field::int(value, 8)
    }

    /// Number of bytes this field occupies once encoded.
    pub fn len(&self) -> usize {
        match self {
            Field::Int { width, .. } => *width,
            Field::Raw(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Total encoded length of a field list, without allocating.
pub fn encoded_len(fields: &[Field<'_>]) -> usize {
    fields.iter().map(Field::len).sum()
}

/// Encode an ordered list of fields into a little-endian byte buffer.
///
/// # Errors
///
/// * [`ZipError::UnsupportedWidth`] for integer widths other than 1, 2, 4 or 8
/// * [`ZipError::FieldOverflow`] when a value does not fit its width
pub fn encode(fields: &[Field<'_>]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(fields));
    for field in fields {
        match *field {
            Field::Raw(data) => buf.extend_from_slice(data),
            Field::Int { value, width } => write_int(&mut buf, value, width)?,
        }
    }
    Ok(buf)
}

fn write_int(buf: &mut Vec<u8>, value: u64, width: usize) -> Result<()> {
    if !matches!(width, 1 | 2 | 4 | 8) {
        return Err(ZipError::UnsupportedWidth(width));
    }
    if width < 8 && value >> (width * 8) != 0 {
        return Err(ZipError::FieldOverflow { value, width });
    }

    let start = buf.len();
    buf.resize(start + width, 0);
    let slot = &mut buf[start..];
    match width {
        1 => slot[0] = value as u8,
        2 => LittleEndian::write_u16(slot, value as u16),
        4 => LittleEndian::write_u32(slot, value as u32),
        _ => LittleEndian::write_u64(slot, value),
    }
    Ok(())
}
