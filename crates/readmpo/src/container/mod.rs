//! Access to hierarchical containers (groups, datasets, attributes).
//!
//! [`Container`] is the read seam used by validation and decoding; the HDF5
//! file is one implementation, [`MemoryContainer`] another. Writers go through
//! [`ContainerSink`].

mod counting;
mod h5;
mod memory;

pub use self::counting::CountingContainer;
pub use self::h5::{Hdf5Container, Hdf5Sink};
pub use self::memory::MemoryContainer;

use crate::dtype::{Dtype, TypedBuffer};
use crate::error::Result;

/// Value of a scalar or small-vector attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer scalar
    Int(i64),
    /// Integer vector
    Ints(Vec<i64>),
    /// Floating-point scalar
    Float(f64),
    /// Floating-point vector
    Floats(Vec<f64>),
    /// String
    Text(String),
}

impl AttrValue {
    /// The integer, if this is an integer scalar (or a one-element vector).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Ints(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    /// The integers, if this is an integer scalar or vector.
    pub fn as_ints(&self) -> Option<Vec<i64>> {
        match self {
            Self::Int(v) => Some(vec![*v]),
            Self::Ints(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// The string, if this is a string attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short description of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Ints(_) => "integer vector",
            Self::Float(_) => "float",
            Self::Floats(_) => "float vector",
            Self::Text(_) => "string",
        }
    }
}

/// Metadata of a dataset; obtaining it never reads the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    /// Element type and stored byte order
    pub dtype: Dtype,
    /// Dataspace shape
    pub shape: Vec<usize>,
}

/// A dataset payload as read from the container.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDataset {
    /// Payload bytes, in `dtype.order`
    pub bytes: Vec<u8>,
    /// Element type and stored byte order
    pub dtype: Dtype,
    /// Dataspace shape
    pub shape: Vec<usize>,
}

impl RawDataset {
    /// Raw dataset holding `buffer` in host byte order.
    pub fn from_buffer(buffer: &TypedBuffer, shape: Vec<usize>) -> Self {
        Self {
            bytes: buffer.to_native_bytes(),
            dtype: Dtype::native(buffer.kind()),
            shape,
        }
    }
}

/// Read access to a hierarchical container.
///
/// Paths are absolute, `/`-separated (`"/mpo/site_0/data"`). All calls are
/// synchronous. Only [`Container::read_dataset`] touches payload data.
pub trait Container {
    /// Short description of the container, for logs and errors.
    fn describe(&self) -> String;

    /// Whether a group exists at `path`.
    fn has_group(&self, path: &str) -> bool;

    /// Whether a dataset exists at `path`.
    fn has_dataset(&self, path: &str) -> bool;

    /// Names of the groups and datasets directly under `group`, sorted.
    fn list_children(&self, group: &str) -> Result<Vec<String>>;

    /// Names of the attributes attached to the object at `path`, sorted.
    fn attribute_names(&self, path: &str) -> Result<Vec<String>>;

    /// Read an attribute.
    fn read_attribute(&self, path: &str, name: &str) -> Result<AttrValue>;

    /// Dataset metadata (element type and shape).
    fn dataset_info(&self, path: &str) -> Result<DatasetInfo>;

    /// Read a full dataset payload.
    fn read_dataset(&self, path: &str) -> Result<RawDataset>;

    /// Whether the object at `path` has the attribute `name`.
    fn has_attribute(&self, path: &str, name: &str) -> Result<bool> {
        Ok(self.attribute_names(path)?.iter().any(|n| n == name))
    }

    /// Children of `group` whose name contains `substring` (ASCII case-insensitive).
    fn list_children_matching(&self, group: &str, substring: &str) -> Result<Vec<String>> {
        let needle = substring.to_ascii_lowercase();
        Ok(self
            .list_children(group)?
            .into_iter()
            .filter(|name| name.to_ascii_lowercase().contains(&needle))
            .collect())
    }
}

impl<C: Container + ?Sized> Container for &C {
    fn describe(&self) -> String {
        (**self).describe()
    }
    fn has_group(&self, path: &str) -> bool {
        (**self).has_group(path)
    }
    fn has_dataset(&self, path: &str) -> bool {
        (**self).has_dataset(path)
    }
    fn list_children(&self, group: &str) -> Result<Vec<String>> {
        (**self).list_children(group)
    }
    fn attribute_names(&self, path: &str) -> Result<Vec<String>> {
        (**self).attribute_names(path)
    }
    fn read_attribute(&self, path: &str, name: &str) -> Result<AttrValue> {
        (**self).read_attribute(path, name)
    }
    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        (**self).dataset_info(path)
    }
    fn read_dataset(&self, path: &str) -> Result<RawDataset> {
        (**self).read_dataset(path)
    }
}

/// Write access to a hierarchical container.
pub trait ContainerSink {
    /// Create a group (and any missing parents). Existing groups are kept.
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Attach an attribute to the group at `path`.
    fn write_attribute(&mut self, path: &str, name: &str, value: &AttrValue) -> Result<()>;

    /// Create a one-dimensional dataset holding `data`.
    fn write_dataset(&mut self, path: &str, data: &TypedBuffer) -> Result<()>;
}
