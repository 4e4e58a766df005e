use std::io::prelude::*;

use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use log::warn;
use num_traits::cast::AsPrimitive;
use num_traits::ops::bytes::FromBytes;
use thiserror::Error;

use crate::params::Unit;

pub type Bytes = Vec<u8>;

/// The semantic role of a binary-encoded array within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayKind {
    #[default]
    Unknown,
    MzArray,
    IntensityArray,
    TimeArray,
}

/// The element type a binary array was encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryDataArrayType {
    #[default]
    Unknown,
    Float64,
    Float32,
    Int64,
    Int32,
}

impl BinaryDataArrayType {
    /// Get the size in bytes of a single value of this type
    pub const fn size_of(&self) -> usize {
        match self {
            BinaryDataArrayType::Unknown => 1,
            BinaryDataArrayType::Float32 | BinaryDataArrayType::Int32 => 4,
            BinaryDataArrayType::Float64 | BinaryDataArrayType::Int64 => 8,
        }
    }
}

/// The compression applied to a binary array's bytes, beneath the base64
/// text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryCompressionType {
    #[default]
    NoCompression,
    Zlib,
}

/// The byte order the array values were serialized with. mzML mandates
/// little endian; mzData declares the order per array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

/// All the ways decoding a binary array payload can go wrong. These are
/// record-level structural failures: the record cannot be salvaged once its
/// point data is unreadable.
#[derive(Debug, Error)]
pub enum ArrayDecodingError {
    #[error("Failed to decode base64 data: {0}")]
    Base64Error(String),
    #[error("An error occurred while decompressing: {0}")]
    DecompressionError(String),
    #[error("Byte buffer of length {0} cannot be split into values of width {1}")]
    DataTypeSizeMismatch(usize, usize),
}

/// One `<binary>`/`<data>` payload as accumulated from the document: the
/// raw base64 text plus the encoding declarations that arrived alongside it.
///
/// This type is modeled on the `<binaryDataArray>` element of mzML but also
/// serves the mzData `<data>` element, which declares precision and byte
/// order as attributes instead of vocabulary terms.
#[derive(Debug, Default, Clone)]
pub struct DataArray {
    pub data: Bytes,
    pub dtype: BinaryDataArrayType,
    pub compression: BinaryCompressionType,
    pub name: ArrayKind,
    pub unit: Unit,
    pub byte_order: ByteOrder,
    /// The value count the document declared for this array, if any.
    pub declared_length: Option<usize>,
}

impl DataArray {
    pub fn new() -> DataArray {
        DataArray {
            ..Default::default()
        }
    }

    /// Reset to the pristine state, keeping the text buffer's allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.dtype = BinaryDataArrayType::default();
        self.compression = BinaryCompressionType::default();
        self.name = ArrayKind::default();
        self.unit = Unit::default();
        self.byte_order = ByteOrder::default();
        self.declared_length = None;
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base64-decode and decompress the payload into raw value bytes.
    pub fn decode(&self) -> Result<Bytes, ArrayDecodingError> {
        if self.data.is_empty() {
            return Ok(Bytes::new());
        }
        let bytestring = base64_simd::STANDARD
            .decode_type::<Bytes>(&self.data)
            .map_err(|e| ArrayDecodingError::Base64Error(e.to_string()))?;
        match self.compression {
            BinaryCompressionType::NoCompression => Ok(bytestring),
            BinaryCompressionType::Zlib => decompress_zlib(&bytestring),
        }
    }

    /// Decode the payload and append its values, widened to `f64`, onto
    /// `out`. Returns the number of values appended.
    pub fn copy_to_f64(&self, out: &mut Vec<f64>) -> Result<usize, ArrayDecodingError> {
        let bytes = self.decode()?;
        // Already in the wire layout; reinterpret the buffer wholesale when
        // its alignment allows.
        if self.dtype == BinaryDataArrayType::Float64
            && self.byte_order == ByteOrder::LittleEndian
            && cfg!(target_endian = "little")
        {
            if let Ok(view) = bytemuck::try_cast_slice::<u8, f64>(&bytes) {
                out.extend_from_slice(view);
                return Ok(view.len());
            }
        }
        self.convert_into(&bytes, out)
    }

    /// Decode the payload and append its values, narrowed to `f32`, onto
    /// `out`. Returns the number of values appended.
    pub fn copy_to_f32(&self, out: &mut Vec<f32>) -> Result<usize, ArrayDecodingError> {
        let bytes = self.decode()?;
        self.convert_into(&bytes, out)
    }

    fn convert_into<D>(&self, bytes: &[u8], out: &mut Vec<D>) -> Result<usize, ArrayDecodingError>
    where
        D: Copy + 'static,
        f64: AsPrimitive<D>,
        f32: AsPrimitive<D>,
        i64: AsPrimitive<D>,
        i32: AsPrimitive<D>,
    {
        let dtype = match self.dtype {
            BinaryDataArrayType::Unknown => {
                warn!("No data type declared for a binary array, assuming 64-bit float");
                BinaryDataArrayType::Float64
            }
            t => t,
        };
        match dtype {
            BinaryDataArrayType::Float64 => convert_values::<f64, D, 8>(bytes, self.byte_order, out),
            BinaryDataArrayType::Float32 => convert_values::<f32, D, 4>(bytes, self.byte_order, out),
            BinaryDataArrayType::Int64 => convert_values::<i64, D, 8>(bytes, self.byte_order, out),
            BinaryDataArrayType::Int32 => convert_values::<i32, D, 4>(bytes, self.byte_order, out),
            BinaryDataArrayType::Unknown => unreachable!(),
        }
    }
}

fn convert_values<S, D, const W: usize>(
    bytes: &[u8],
    byte_order: ByteOrder,
    out: &mut Vec<D>,
) -> Result<usize, ArrayDecodingError>
where
    S: FromBytes<Bytes = [u8; W]> + AsPrimitive<D>,
    D: Copy + 'static,
{
    if bytes.len() % W != 0 {
        return Err(ArrayDecodingError::DataTypeSizeMismatch(bytes.len(), W));
    }
    let n = bytes.len() / W;
    out.reserve(n);
    for chunk in bytes.chunks_exact(W) {
        let raw: [u8; W] = chunk.try_into().unwrap();
        let value = match byte_order {
            ByteOrder::LittleEndian => S::from_le_bytes(&raw),
            ByteOrder::BigEndian => S::from_be_bytes(&raw),
        };
        out.push(value.as_());
    }
    Ok(n)
}

pub fn compress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayDecodingError> {
    let result = Bytes::new();
    let mut compressor = ZlibEncoder::new(result, Compression::best());
    compressor
        .write_all(bytestring)
        .map_err(|e| ArrayDecodingError::DecompressionError(e.to_string()))?;
    compressor
        .finish()
        .map_err(|e| ArrayDecodingError::DecompressionError(e.to_string()))
}

pub fn decompress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayDecodingError> {
    let result = Bytes::new();
    let mut decompressor = ZlibDecoder::new(result);
    decompressor
        .write_all(bytestring)
        .map_err(|e| ArrayDecodingError::DecompressionError(e.to_string()))?;
    decompressor
        .finish()
        .map_err(|e| ArrayDecodingError::DecompressionError(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn f64_le_bytes(values: &[f64]) -> Bytes {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn base64_of(bytes: &[u8]) -> Bytes {
        base64_simd::STANDARD.encode_type::<Bytes>(bytes)
    }

    #[test]
    fn test_decode_f64_plain() {
        let values = [100.25, 200.5, 300.75];
        let mut da = DataArray::new();
        da.data = base64_of(&f64_le_bytes(&values));
        da.dtype = BinaryDataArrayType::Float64;

        let mut out = Vec::new();
        let n = da.copy_to_f64(&mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, values);
    }

    #[test]
    fn test_decode_f32_zlib() {
        let values = [1.5f32, 2.5, 3.5, 4.5];
        let raw: Bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut da = DataArray::new();
        da.data = base64_of(&compress_zlib(&raw).unwrap());
        da.dtype = BinaryDataArrayType::Float32;
        da.compression = BinaryCompressionType::Zlib;

        let mut out: Vec<f32> = Vec::new();
        da.copy_to_f32(&mut out).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_decode_big_endian() {
        let raw: Bytes = [10.0f64, 20.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let mut da = DataArray::new();
        da.data = base64_of(&raw);
        da.dtype = BinaryDataArrayType::Float64;
        da.byte_order = ByteOrder::BigEndian;

        let mut out = Vec::new();
        da.copy_to_f64(&mut out).unwrap();
        assert_eq!(out, vec![10.0, 20.0]);
    }

    #[test]
    fn test_decode_integer_widening() {
        let raw: Bytes = [7i32, -3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut da = DataArray::new();
        da.data = base64_of(&raw);
        da.dtype = BinaryDataArrayType::Int32;

        let mut out = Vec::new();
        da.copy_to_f64(&mut out).unwrap();
        assert_eq!(out, vec![7.0, -3.0]);
    }

    #[test]
    fn test_empty_payload() {
        let da = DataArray::new();
        let mut out = Vec::new();
        assert_eq!(da.copy_to_f64(&mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_payload_rejected() {
        // 10 bytes is not a whole number of f64s
        let mut da = DataArray::new();
        da.data = base64_of(&[0u8; 10]);
        da.dtype = BinaryDataArrayType::Float64;

        let mut out = Vec::new();
        let err = da.copy_to_f64(&mut out).unwrap_err();
        assert!(matches!(
            err,
            ArrayDecodingError::DataTypeSizeMismatch(10, 8)
        ));
    }

    #[test]
    fn test_garbage_base64_rejected() {
        let mut da = DataArray::new();
        da.data = b"!!!not base64!!!".to_vec();
        da.dtype = BinaryDataArrayType::Float64;

        let mut out = Vec::new();
        assert!(matches!(
            da.copy_to_f64(&mut out),
            Err(ArrayDecodingError::Base64Error(_))
        ));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut da = DataArray::new();
        da.data = b"AAAA".to_vec();
        da.dtype = BinaryDataArrayType::Float32;
        da.compression = BinaryCompressionType::Zlib;
        da.name = ArrayKind::MzArray;
        da.clear();
        assert!(da.is_empty());
        assert_eq!(da.dtype, BinaryDataArrayType::Unknown);
        assert_eq!(da.compression, BinaryCompressionType::NoCompression);
        assert_eq!(da.name, ArrayKind::Unknown);
    }
}
