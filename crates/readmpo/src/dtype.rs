//! Element kinds, byte order, and the typed payload buffer.
//!
//! Every payload enters the crate as raw bytes tagged with a [`Dtype`] and is
//! turned into a [`TypedBuffer`] by [`TypedBuffer::from_bytes`]. That function
//! is the only place where bytes are reinterpreted as numbers.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian, NativeEndian};
use num_complex::{Complex32, Complex64};
use std::fmt;

use crate::error::{ReadMpoError, Result};

/// Numeric element type of a tensor core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// IEEE 754 single precision
    Float32,
    /// IEEE 754 double precision
    Float64,
    /// Single precision complex, stored as interleaved (re, im)
    Complex64,
    /// Double precision complex, stored as interleaved (re, im)
    Complex128,
}

impl ElementKind {
    /// All supported element kinds.
    pub const ALL: [ElementKind; 4] = [
        ElementKind::Float32,
        ElementKind::Float64,
        ElementKind::Complex64,
        ElementKind::Complex128,
    ];

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
        }
    }

    /// Size of one real component in bytes.
    fn component_size(self) -> usize {
        match self {
            Self::Float32 | Self::Complex64 => 4,
            Self::Float64 | Self::Complex128 => 8,
        }
    }

    /// Whether elements are complex numbers.
    pub fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Short lowercase name (`float32`, `complex128`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }

    /// Python buffer-protocol format string (`f`, `d`, `Zf`, `Zd`).
    pub fn format_code(self) -> &'static str {
        match self {
            Self::Float32 => "f",
            Self::Float64 => "d",
            Self::Complex64 => "Zf",
            Self::Complex128 => "Zd",
        }
    }

    /// Stable numeric code, used by stock dumps and the C API.
    pub fn code(self) -> u32 {
        match self {
            Self::Float32 => 0,
            Self::Float64 => 1,
            Self::Complex64 => 2,
            Self::Complex128 => 3,
        }
    }

    /// Inverse of [`ElementKind::code`].
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl ByteOrder {
    /// Byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// Element kind plus the byte order it is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dtype {
    /// Element kind
    pub kind: ElementKind,
    /// Stored byte order
    pub order: ByteOrder,
}

impl Dtype {
    /// A dtype in host byte order.
    pub const fn native(kind: ElementKind) -> Self {
        Self {
            kind,
            order: ByteOrder::native(),
        }
    }
}

/// Owned, contiguous payload of a tensor core.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedBuffer {
    /// `float32` elements
    F32(Vec<f32>),
    /// `float64` elements
    F64(Vec<f64>),
    /// `complex64` elements
    C64(Vec<Complex32>),
    /// `complex128` elements
    C128(Vec<Complex64>),
}

impl TypedBuffer {
    /// Reinterpret raw bytes as typed elements, converting from `dtype.order`
    /// to host order. Values are copied bit for bit.
    pub fn from_bytes(bytes: &[u8], dtype: Dtype) -> Result<Self> {
        let kind = dtype.kind;
        if bytes.len() % kind.size() != 0 {
            return Err(ReadMpoError::decode(
                None,
                format!(
                    "payload of {} bytes is not a whole number of {} elements",
                    bytes.len(),
                    kind
                ),
            ));
        }
        let n_components = bytes.len() / kind.component_size();

        let buffer = match kind.component_size() {
            4 => {
                let mut comps = vec![0f32; n_components];
                match dtype.order {
                    ByteOrder::Little => LittleEndian::read_f32_into(bytes, &mut comps),
                    ByteOrder::Big => BigEndian::read_f32_into(bytes, &mut comps),
                }
                if kind.is_complex() {
                    Self::C64(
                        comps
                            .chunks_exact(2)
                            .map(|c| Complex32::new(c[0], c[1]))
                            .collect(),
                    )
                } else {
                    Self::F32(comps)
                }
            }
            _ => {
                let mut comps = vec![0f64; n_components];
                match dtype.order {
                    ByteOrder::Little => LittleEndian::read_f64_into(bytes, &mut comps),
                    ByteOrder::Big => BigEndian::read_f64_into(bytes, &mut comps),
                }
                if kind.is_complex() {
                    Self::C128(
                        comps
                            .chunks_exact(2)
                            .map(|c| Complex64::new(c[0], c[1]))
                            .collect(),
                    )
                } else {
                    Self::F64(comps)
                }
            }
        };
        Ok(buffer)
    }

    /// Serialize the elements as bytes in the requested order.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        fn put_f32(src: &[f32], order: ByteOrder) -> Vec<u8> {
            let mut out = vec![0u8; src.len() * 4];
            match order {
                ByteOrder::Little => LittleEndian::write_f32_into(src, &mut out),
                ByteOrder::Big => BigEndian::write_f32_into(src, &mut out),
            }
            out
        }
        fn put_f64(src: &[f64], order: ByteOrder) -> Vec<u8> {
            let mut out = vec![0u8; src.len() * 8];
            match order {
                ByteOrder::Little => LittleEndian::write_f64_into(src, &mut out),
                ByteOrder::Big => BigEndian::write_f64_into(src, &mut out),
            }
            out
        }

        match self {
            Self::F32(v) => put_f32(v, order),
            Self::F64(v) => put_f64(v, order),
            Self::C64(v) => {
                let comps: Vec<f32> = v.iter().flat_map(|c| [c.re, c.im]).collect();
                put_f32(&comps, order)
            }
            Self::C128(v) => {
                let comps: Vec<f64> = v.iter().flat_map(|c| [c.re, c.im]).collect();
                put_f64(&comps, order)
            }
        }
    }

    /// Serialize in host byte order.
    pub fn to_native_bytes(&self) -> Vec<u8> {
        self.to_bytes(ByteOrder::native())
    }

    /// Element kind of the buffer.
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::F32(_) => ElementKind::Float32,
            Self::F64(_) => ElementKind::Float64,
            Self::C64(_) => ElementKind::Complex64,
            Self::C128(_) => ElementKind::Complex128,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::C64(v) => v.len(),
            Self::C128(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the payload in bytes.
    pub fn nbytes(&self) -> usize {
        self.len() * self.kind().size()
    }

    /// Pointer to the first element.
    pub fn as_ptr(&self) -> *const u8 {
        match self {
            Self::F32(v) => v.as_ptr() as *const u8,
            Self::F64(v) => v.as_ptr() as *const u8,
            Self::C64(v) => v.as_ptr() as *const u8,
            Self::C128(v) => v.as_ptr() as *const u8,
        }
    }

    /// Apply the same element permutation to any variant.
    pub(crate) fn try_map_elements<F>(self, f: F) -> Result<Self>
    where
        F: ElementPermutation,
    {
        Ok(match self {
            Self::F32(v) => Self::F32(f.apply(v)?),
            Self::F64(v) => Self::F64(f.apply(v)?),
            Self::C64(v) => Self::C64(f.apply(v)?),
            Self::C128(v) => Self::C128(f.apply(v)?),
        })
    }
}

/// A reordering of elements that does not depend on their type.
pub(crate) trait ElementPermutation {
    fn apply<T: Clone>(&self, data: Vec<T>) -> Result<Vec<T>>;
}

/// Native element types a [`TypedBuffer`] can hold.
pub trait Element: Copy + Send + Sync + 'static {
    /// Kind tag of this type.
    const KIND: ElementKind;

    /// Borrow the buffer's elements if it holds this type.
    fn slice(buffer: &TypedBuffer) -> Option<&[Self]>;

    /// Wrap a vector of this type.
    fn into_buffer(data: Vec<Self>) -> TypedBuffer;
}

macro_rules! impl_element {
    ($t:ty, $kind:ident, $variant:ident) => {
        impl Element for $t {
            const KIND: ElementKind = ElementKind::$kind;

            fn slice(buffer: &TypedBuffer) -> Option<&[Self]> {
                match buffer {
                    TypedBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_buffer(data: Vec<Self>) -> TypedBuffer {
                TypedBuffer::$variant(data)
            }
        }

        impl From<Vec<$t>> for TypedBuffer {
            fn from(data: Vec<$t>) -> Self {
                TypedBuffer::$variant(data)
            }
        }
    };
}

impl_element!(f32, Float32, F32);
impl_element!(f64, Float64, F64);
impl_element!(Complex32, Complex64, C64);
impl_element!(Complex64, Complex128, C128);

/// Byte size of a dense array of `shape` with `itemsize`-byte elements.
///
/// `None` if the size does not fit in `isize`, the limit for one allocation.
pub fn checked_nbytes(shape: &[usize], itemsize: usize) -> Option<usize> {
    shape
        .iter()
        .try_fold(itemsize, |acc, &dim| acc.checked_mul(dim))
        .filter(|&n| isize::try_from(n).is_ok())
}

/// Host-order bytes for a slice of `f64`, used by backends that receive
/// already-converted values.
pub(crate) fn native_bytes_f64(src: &[f64]) -> Vec<u8> {
    let mut out = vec![0u8; src.len() * 8];
    NativeEndian::write_f64_into(src, &mut out);
    out
}

/// Host-order bytes for a slice of `f32`.
pub(crate) fn native_bytes_f32(src: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; src.len() * 4];
    NativeEndian::write_f32_into(src, &mut out);
    out
}
