//! Flat binary dumps of single cores ("stock" files).
//!
//! ```text
//! u64 ndim
//! u64 shape[ndim]
//! u64 kind            (ElementKind::code)
//! payload             (row-major, interleaved re/im for complex)
//! ```
//! All integers and payload values are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::dtype::{checked_nbytes, ByteOrder, Dtype, ElementKind, TypedBuffer};
use crate::error::{ReadMpoError, Result};
use crate::tensor_core::TensorCore;

/// Contents of a stock file: a bare array without axis labels.
#[derive(Debug, Clone, PartialEq)]
pub struct StockArray {
    /// Dimensions
    pub shape: Vec<usize>,
    /// Row-major elements
    pub data: TypedBuffer,
}

impl StockArray {
    /// Attach bond flags to turn the array back into a core.
    pub fn into_core(self, has_left: bool, has_right: bool) -> Result<TensorCore> {
        TensorCore::with_bonds(self.shape, has_left, has_right, self.data)
    }
}

/// Write one core.
pub fn write_stock<W: Write>(writer: &mut W, core: &TensorCore) -> Result<()> {
    writer.write_u64::<LittleEndian>(core.rank() as u64)?;
    for &dim in core.shape() {
        writer.write_u64::<LittleEndian>(dim as u64)?;
    }
    writer.write_u64::<LittleEndian>(u64::from(core.kind().code()))?;
    writer.write_all(&core.data().to_bytes(ByteOrder::Little))?;
    Ok(())
}

fn read_dim<R: Read>(reader: &mut R) -> Result<usize> {
    let value = reader.read_u64::<LittleEndian>()?;
    usize::try_from(value)
        .map_err(|_| ReadMpoError::decode(None, format!("stock dimension {} is too large", value)))
}

/// Read one array.
pub fn read_stock<R: Read>(reader: &mut R) -> Result<StockArray> {
    let ndim = read_dim(reader)?;
    if ndim > 16 {
        return Err(ReadMpoError::decode(
            None,
            format!("stock header claims {} dimensions", ndim),
        ));
    }
    let shape = (0..ndim)
        .map(|_| read_dim(reader))
        .collect::<Result<Vec<_>>>()?;
    let code = reader.read_u64::<LittleEndian>()?;
    let kind = u32::try_from(code)
        .ok()
        .and_then(ElementKind::from_code)
        .ok_or_else(|| ReadMpoError::decode(None, format!("unknown stock element code {}", code)))?;

    let nbytes = checked_nbytes(&shape, kind.size())
        .ok_or_else(|| ReadMpoError::decode(None, format!("stock shape {:?} overflows", shape)))?;
    // Allocated as payload arrives, not from the header.
    let mut bytes = Vec::new();
    reader.by_ref().take(nbytes as u64).read_to_end(&mut bytes)?;
    if bytes.len() != nbytes {
        return Err(ReadMpoError::decode(
            None,
            format!(
                "stock payload has {} bytes, header declares {} for shape {:?}",
                bytes.len(),
                nbytes,
                shape
            ),
        ));
    }

    let data = TypedBuffer::from_bytes(
        &bytes,
        Dtype {
            kind,
            order: ByteOrder::Little,
        },
    )?;
    Ok(StockArray { shape, data })
}

/// Write one core to a new file.
pub fn write_stock_file(path: impl AsRef<Path>, core: &TensorCore) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_stock(&mut writer, core)?;
    writer.flush()?;
    Ok(())
}

/// Read one array from a file.
pub fn read_stock_file(path: impl AsRef<Path>) -> Result<StockArray> {
    let mut reader = BufReader::new(File::open(path)?);
    read_stock(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_header_layout() {
        let core = TensorCore::with_bonds(vec![2, 3], false, true, vec![1.0f64; 6]).unwrap();
        let mut buf = Vec::new();
        write_stock(&mut buf, &core).unwrap();
        assert_eq!(buf.len(), 8 * 4 + 48);
        assert_eq!(&buf[..8], &2u64.to_le_bytes());
        assert_eq!(&buf[8..16], &2u64.to_le_bytes());
        assert_eq!(&buf[16..24], &3u64.to_le_bytes());
        assert_eq!(&buf[24..32], &1u64.to_le_bytes());
        assert_eq!(&buf[32..40], &1.0f64.to_le_bytes());
    }

    #[test]
    fn test_oversized_header() {
        // 40-byte file claiming 2^40 doubles.
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&(1u64 << 40).to_le_bytes());
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        assert_eq!(buf.len(), 40);

        let err = read_stock(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, ReadMpoError::Decode { .. }));
        assert!(err.to_string().contains("stock payload has 16 bytes"));
    }

    #[test]
    fn test_overflowing_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u64.to_le_bytes());
        for dim in [1u64 << 32, 1 << 32, 2] {
            buf.extend_from_slice(&dim.to_le_bytes());
        }
        buf.extend_from_slice(&1u64.to_le_bytes());

        let err = read_stock(&mut buf.as_slice()).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_file_roundtrip_complex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site_1.stock");
        let data: Vec<Complex64> = (0..16).map(|i| Complex64::new(i as f64, -0.5)).collect();
        let core = TensorCore::with_bonds(vec![2, 2, 2, 2], true, true, data).unwrap();

        write_stock_file(&path, &core).unwrap();
        let back = read_stock_file(&path).unwrap().into_core(true, true).unwrap();
        assert_eq!(back, core);
    }

    #[test]
    fn test_truncated_stock() {
        let core = TensorCore::with_bonds(vec![2, 2], false, false, vec![0.0f32; 4]).unwrap();
        let mut buf = Vec::new();
        write_stock(&mut buf, &core).unwrap();
        buf.pop();
        let err = read_stock(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, ReadMpoError::Decode { .. }));
        assert!(err.to_string().contains("15 bytes, header declares 16"));
    }

    #[test]
    fn test_unknown_code() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&7u64.to_le_bytes());
        let err = read_stock(&mut buf.as_slice()).unwrap_err();
        assert!(err.to_string().contains("unknown stock element code 7"));
    }
}
