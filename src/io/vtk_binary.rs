//! Binary data blocks of VTK XML files.
//!
//! Every `binary` or base64 `appended` array is a base64 stream that starts
//! with a size header of `header_type` integers:
//!
//! - uncompressed: `[byte_count]`, encoded together with the data;
//! - zlib: `[block_count, block_size, last_block_size, compressed_size...]`,
//!   encoded on its own and followed by the compressed blocks.
//!
//! Appended arrays address the stream after the leading `_` by character
//! offset.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;

use super::{MeshIoError, MeshIoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// File-wide settings from the `VTKFile` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct BinaryLayout {
    byte_order: ByteOrder,
    header_width: usize,
    zlib: bool,
}

impl Default for BinaryLayout {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Little,
            header_width: 4,
            zlib: false,
        }
    }
}

impl BinaryLayout {
    pub(super) fn from_attributes(
        byte_order: Option<&str>,
        header_type: Option<&str>,
        compressor: Option<&str>,
    ) -> MeshIoResult<Self> {
        let byte_order = match byte_order {
            None | Some("LittleEndian") => ByteOrder::Little,
            Some("BigEndian") => ByteOrder::Big,
            Some(other) => return Err(malformed(format!("unknown byte_order `{other}`"))),
        };
        let header_width = match header_type {
            None | Some("UInt32") => 4,
            Some("UInt64") => 8,
            Some(other) => return Err(malformed(format!("unknown header_type `{other}`"))),
        };
        let zlib = match compressor {
            None | Some("") => false,
            Some("vtkZLibDataCompressor") => true,
            Some(other) => return Err(MeshIoError::UnsupportedFormat(format!("compressor {other}"))),
        };
        Ok(Self {
            byte_order,
            header_width,
            zlib,
        })
    }

    /// Decode one array from the start of `stream` into numbers.
    pub(super) fn decode_values(&self, stream: &str, data_type: &str) -> MeshIoResult<Vec<f64>> {
        let scalar = ScalarType::from_name(data_type)
            .ok_or_else(|| MeshIoError::UnsupportedFormat(format!("data type {data_type}")))?;
        let bytes = self.decode_bytes(stream)?;
        scalar.read_all(&bytes, self.byte_order)
    }

    fn decode_bytes(&self, stream: &str) -> MeshIoResult<Vec<u8>> {
        let width = self.header_width;
        let first = decode_prefix(stream, width)?;
        let leading = self.header_value(&first[..width])?;

        if !self.zlib {
            let all = decode_prefix(stream, width.saturating_add(leading))?;
            return Ok(all[width..width + leading].to_vec());
        }

        let block_count = leading;
        let header_len = block_count
            .checked_add(3)
            .and_then(|words| words.checked_mul(width))
            .ok_or_else(|| malformed("compression header too large"))?;
        let header = decode_prefix(stream, header_len)?;
        let words = header[..header_len]
            .chunks_exact(width)
            .map(|w| self.header_value(w))
            .collect::<MeshIoResult<Vec<usize>>>()?;
        let (block_size, last_size) = (words[1], words[2]);
        let compressed_sizes = &words[3..];

        let data_stream = &stream[encoded_len(header_len)..];
        let total = compressed_sizes
            .iter()
            .try_fold(0usize, |acc, &size| acc.checked_add(size))
            .ok_or_else(|| malformed("compressed sizes overflow"))?;
        let data = decode_prefix(data_stream, total)?;

        let expected = match block_count {
            0 => 0,
            n if last_size == 0 => n.saturating_mul(block_size),
            n => (n - 1).saturating_mul(block_size).saturating_add(last_size),
        };
        let mut out = Vec::with_capacity(expected.min(data.len().saturating_mul(4)));
        let mut start = 0;
        for &size in compressed_sizes {
            ZlibDecoder::new(&data[start..start + size])
                .read_to_end(&mut out)
                .map_err(|e| malformed(format!("zlib block: {e}")))?;
            start += size;
        }
        if out.len() != expected {
            return Err(malformed(format!(
                "compression header promises {expected} bytes, blocks held {}",
                out.len()
            )));
        }
        Ok(out)
    }

    fn header_value(&self, bytes: &[u8]) -> MeshIoResult<usize> {
        let value = match self.header_width {
            8 => u64::from_le_bytes(word(bytes, self.byte_order)),
            _ => u64::from(u32::from_le_bytes(word(bytes, self.byte_order))),
        };
        usize::try_from(value).map_err(|_| malformed("block size exceeds address space"))
    }
}

/// Base64 characters needed for `bytes` bytes, padding included.
fn encoded_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}

/// Decode at least `bytes` bytes from the front of `stream`.
fn decode_prefix(stream: &str, bytes: usize) -> MeshIoResult<Vec<u8>> {
    if bytes > stream.len() {
        return Err(malformed("binary data block is truncated"));
    }
    let chars = stream
        .get(..encoded_len(bytes))
        .ok_or_else(|| malformed("binary data block is truncated"))?;
    let decoded = STANDARD
        .decode(chars)
        .map_err(|e| malformed(format!("base64: {e}")))?;
    if decoded.len() < bytes {
        return Err(malformed("binary data block is truncated"));
    }
    Ok(decoded)
}

fn malformed(message: impl Into<String>) -> MeshIoError {
    MeshIoError::MalformedVtp(message.into())
}

/// Copy a word into little-endian order.
fn word<const N: usize>(bytes: &[u8], order: ByteOrder) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[..N]);
    if order == ByteOrder::Big {
        buf.reverse();
    }
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl ScalarType {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Int8" => Self::Int8,
            "UInt8" => Self::UInt8,
            "Int16" => Self::Int16,
            "UInt16" => Self::UInt16,
            "Int32" => Self::Int32,
            "UInt32" => Self::UInt32,
            "Int64" => Self::Int64,
            "UInt64" => Self::UInt64,
            "Float32" => Self::Float32,
            "Float64" => Self::Float64,
            _ => return None,
        })
    }

    const fn width(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn read(self, b: &[u8], order: ByteOrder) -> f64 {
        match self {
            Self::Int8 => f64::from(i8::from_le_bytes(word(b, order))),
            Self::UInt8 => f64::from(b[0]),
            Self::Int16 => f64::from(i16::from_le_bytes(word(b, order))),
            Self::UInt16 => f64::from(u16::from_le_bytes(word(b, order))),
            Self::Int32 => f64::from(i32::from_le_bytes(word(b, order))),
            Self::UInt32 => f64::from(u32::from_le_bytes(word(b, order))),
            Self::Int64 => i64::from_le_bytes(word(b, order)) as f64,
            Self::UInt64 => u64::from_le_bytes(word(b, order)) as f64,
            Self::Float32 => f64::from(f32::from_le_bytes(word(b, order))),
            Self::Float64 => f64::from_le_bytes(word(b, order)),
        }
    }

    fn read_all(self, bytes: &[u8], order: ByteOrder) -> MeshIoResult<Vec<f64>> {
        let width = self.width();
        if bytes.len() % width != 0 {
            return Err(malformed(format!(
                "{} bytes is not a whole number of {width}-byte values",
                bytes.len()
            )));
        }
        Ok(bytes.chunks_exact(width).map(|b| self.read(b, order)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompressed_big_endian_uint32_header() {
        let layout = BinaryLayout::from_attributes(Some("BigEndian"), None, None).unwrap();
        let values = layout
            .decode_values("AAAAEAAAAAAAAAACAAAAAAAAAAE=", "Int32")
            .unwrap();
        assert_eq!(values, vec![0.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_zlib_blocks_with_separate_header() {
        let layout =
            BinaryLayout::from_attributes(Some("BigEndian"), Some("UInt32"), Some("vtkZLibDataCompressor")).unwrap();
        let values = layout
            .decode_values("AAAAAQAAgAAAAAAYAAAAEw==eJxjYAADRiBmgjDBNDMAAFAACQ==", "Int32")
            .unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_compressed_block() {
        let layout =
            BinaryLayout::from_attributes(None, Some("UInt64"), Some("vtkZLibDataCompressor")).unwrap();
        assert!(layout.decode_values("AAAAAAAAAAAAgAAAAAAAAAAAAAAAAAAA", "Int64").unwrap().is_empty());
    }

    #[test]
    fn test_truncated_and_unknown_inputs() {
        let layout = BinaryLayout::default();
        assert!(matches!(
            layout.decode_values("EAAAAAAA", "Int32"),
            Err(MeshIoError::MalformedVtp(_))
        ));
        assert!(matches!(
            layout.decode_values("BAAAAAAAAAA=", "Bit"),
            Err(MeshIoError::UnsupportedFormat(_))
        ));
        assert!(BinaryLayout::from_attributes(None, None, Some("vtkLZ4DataCompressor")).is_err());
        assert!(BinaryLayout::from_attributes(None, Some("UInt16"), None).is_err());
    }
}
