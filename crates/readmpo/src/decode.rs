//! Decoding of site payloads into tensor cores.

use tracing::debug;

use crate::container::Container;
use crate::dtype::TypedBuffer;
use crate::error::{ReadMpoError, Result};
use crate::layout::{StorageOrder, ToRowMajor};
use crate::schema::SchemaDescriptor;
use crate::tensor_core::TensorCore;

/// Read and decode the payload of `site`.
///
/// The payload must hold exactly `product(shape)` elements of the
/// descriptor's element kind. Bytes are converted to host order and
/// column-major payloads are reordered to row-major.
pub fn decode_core<C: Container>(
    container: &C,
    descriptor: &SchemaDescriptor,
    site: usize,
) -> Result<TensorCore> {
    let sd = descriptor.site(site)?;
    let raw = container
        .read_dataset(&sd.data_path())
        .map_err(|e| e.at_site(site))?;

    if raw.dtype.kind != sd.element {
        return Err(ReadMpoError::decode(
            Some(site),
            format!(
                "payload is {} but the layout declared {}",
                raw.dtype.kind, sd.element
            ),
        ));
    }
    let expected = sd.nbytes().ok_or_else(|| {
        ReadMpoError::decode(Some(site), format!("shape {:?} overflows", sd.shape))
    })?;
    if raw.bytes.len() != expected {
        return Err(ReadMpoError::decode(
            Some(site),
            format!(
                "payload has {} bytes, expected {} ({} x {} for shape {:?})",
                raw.bytes.len(),
                expected,
                expected / sd.element.size(),
                sd.element,
                sd.shape
            ),
        ));
    }

    let mut data = TypedBuffer::from_bytes(&raw.bytes, raw.dtype).map_err(|e| e.at_site(site))?;
    if sd.layout == StorageOrder::ColumnMajor {
        data = data
            .try_map_elements(ToRowMajor(&sd.shape))
            .map_err(|e| e.at_site(site))?;
    }

    debug!(
        site,
        shape = ?sd.shape,
        order = ?raw.dtype.order,
        layout = sd.layout.tag(),
        "decoded core"
    );
    TensorCore::new(sd.shape.clone(), sd.labels(), data).map_err(|e| e.at_site(site))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{AttrValue, ContainerSink, MemoryContainer, RawDataset};
    use crate::dtype::{ByteOrder, Dtype, ElementKind};
    use crate::layout::SiteNaming;
    use crate::schema::validate;
    use num_complex::Complex64;

    fn single_site(shape: &[i64], data: &TypedBuffer) -> MemoryContainer {
        let mut c = MemoryContainer::new();
        c.create_group("/mpo/site_0").unwrap();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(1)).unwrap();
        c.write_attribute("/mpo/site_0", "shape", &AttrValue::Ints(shape.to_vec()))
            .unwrap();
        c.write_dataset("/mpo/site_0/data", data).unwrap();
        c
    }

    fn describe(c: &MemoryContainer) -> SchemaDescriptor {
        validate(c, "/mpo", &SiteNaming::default()).unwrap()
    }

    #[test]
    fn test_decode_row_major() {
        let data = TypedBuffer::F64((0..6).map(|i| i as f64).collect());
        let c = single_site(&[2, 3], &data);
        let core = decode_core(&c, &describe(&c), 0).unwrap();
        assert_eq!(core.shape(), &[2, 3]);
        assert_eq!(core.data(), &data);
    }

    #[test]
    fn test_decode_column_major() {
        // Column-major storage of [[0, 1, 2], [3, 4, 5]].
        let stored = TypedBuffer::F64(vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        let mut c = single_site(&[2, 3], &stored);
        c.write_attribute("/mpo/site_0", "layout", &AttrValue::Text("F".into()))
            .unwrap();
        let core = decode_core(&c, &describe(&c), 0).unwrap();
        assert_eq!(core.as_slice::<f64>().unwrap(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_decode_big_endian_complex() {
        let values: Vec<Complex64> = (0..4)
            .map(|i| Complex64::new(i as f64 + 0.25, -(i as f64)))
            .collect();
        let buffer = TypedBuffer::C128(values.clone());
        let mut c = single_site(&[2, 2], &buffer);
        c.insert_raw_dataset(
            "/mpo/site_0/data",
            RawDataset {
                bytes: buffer.to_bytes(ByteOrder::Big),
                dtype: Dtype {
                    kind: ElementKind::Complex128,
                    order: ByteOrder::Big,
                },
                shape: vec![4],
            },
        )
        .unwrap();
        let core = decode_core(&c, &describe(&c), 0).unwrap();
        assert_eq!(core.as_slice::<Complex64>().unwrap(), values.as_slice());
    }

    #[test]
    fn test_truncated_payload() {
        let c = single_site(&[2, 3], &TypedBuffer::F32(vec![0.0; 5]));
        let err = decode_core(&c, &describe(&c), 0).unwrap_err();
        assert!(matches!(err, ReadMpoError::Decode { site: Some(0), .. }));
        assert!(err.to_string().contains("payload has 20 bytes, expected 24"));
    }

    #[test]
    fn test_overflowing_shape_is_rejected() {
        // 2^32 * 2^32 * 2 elements wrap to zero in unchecked arithmetic, which
        // an empty payload would match.
        let c = single_site(&[2, 2, 2], &TypedBuffer::F64(Vec::new()));
        let mut desc = describe(&c);
        desc.sites[0].shape = vec![1 << 32, 1 << 32, 2];

        let err = decode_core(&c, &desc, 0).unwrap_err();
        assert!(matches!(err, ReadMpoError::Decode { site: Some(0), .. }));
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_site_out_of_range() {
        let c = single_site(&[2, 2], &TypedBuffer::F32(vec![0.0; 4]));
        let err = decode_core(&c, &describe(&c), 1).unwrap_err();
        assert!(matches!(err, ReadMpoError::SiteOutOfRange { site: 1, .. }));
    }

    #[test]
    fn test_payload_kind_changed_after_validation() {
        let mut c = single_site(&[2, 2], &TypedBuffer::F64(vec![0.0; 4]));
        let desc = describe(&c);
        c.remove_dataset("/mpo/site_0/data");
        c.write_dataset("/mpo/site_0/data", &TypedBuffer::F32(vec![0.0; 4]))
            .unwrap();
        let err = decode_core(&c, &desc, 0).unwrap_err();
        assert!(err.to_string().contains("payload is float32"));
    }
}
