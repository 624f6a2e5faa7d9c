//! HDF5 file backend.

use hdf5::types::{FixedUnicode, FloatSize, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, File, Group, Location};
use num_complex::{Complex32, Complex64};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use super::{AttrValue, Container, ContainerSink, DatasetInfo, RawDataset};
use crate::dtype::{native_bytes_f32, native_bytes_f64, Dtype, ElementKind, TypedBuffer};
use crate::error::{ReadMpoError, Result};
use crate::layout::{join, normalize, split_last};

/// An open HDF5 file, read-only.
///
/// The file is closed when the value is dropped.
#[derive(Debug)]
pub struct Hdf5Container {
    file: File,
    path: PathBuf,
}

impl Hdf5Container {
    /// Open an existing HDF5 file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        crate::init::hdf5_init();

        if !path.exists() {
            return Err(ReadMpoError::container(path, "no such file"));
        }
        let file = File::open(path).map_err(|e| {
            ReadMpoError::container(path, format!("not a readable HDF5 file: {}", e))
        })?;
        debug!(path = %path.display(), "opened HDF5 container");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, object: &str, message: impl std::fmt::Display) -> ReadMpoError {
        located_err(&self.path, object, message)
    }

    fn with_group<T>(&self, path: &str, f: impl FnOnce(&Group) -> Result<T>) -> Result<T> {
        with_group(&self.file, &self.path, path, f)
    }

    /// Run `f` on the group or dataset at `path`.
    fn with_location<T>(&self, path: &str, f: impl FnOnce(&Location) -> Result<T>) -> Result<T> {
        let path = normalize(path);
        if path == "/" {
            return f(&**self.file);
        }
        if let Ok(group) = self.file.group(&path) {
            return f(&*group);
        }
        match self.file.dataset(&path) {
            Ok(ds) => f(&**ds),
            Err(_) => Err(self.err(&path, "no such group or dataset")),
        }
    }
}

fn located_err(file: &Path, object: &str, message: impl std::fmt::Display) -> ReadMpoError {
    ReadMpoError::container(
        format!("{}:{}", file.display(), object),
        message.to_string(),
    )
}

fn with_group<T>(
    file: &File,
    file_path: &Path,
    path: &str,
    f: impl FnOnce(&Group) -> Result<T>,
) -> Result<T> {
    let path = normalize(path);
    if path == "/" {
        return f(&**file);
    }
    let group = file
        .group(&path)
        .map_err(|e| located_err(file_path, &path, format!("no such group ({})", e)))?;
    f(&group)
}

/// Map an HDF5 datatype to a supported element kind.
///
/// Complex numbers are compounds of two floats of the same width, as written
/// by the `hdf5` crate for `num_complex` types.
fn element_kind(desc: &TypeDescriptor) -> Option<ElementKind> {
    match desc {
        TypeDescriptor::Float(FloatSize::U4) => Some(ElementKind::Float32),
        TypeDescriptor::Float(FloatSize::U8) => Some(ElementKind::Float64),
        TypeDescriptor::Compound(ct) if ct.fields.len() == 2 => {
            match (&ct.fields[0].ty, &ct.fields[1].ty) {
                (TypeDescriptor::Float(FloatSize::U4), TypeDescriptor::Float(FloatSize::U4)) => {
                    Some(ElementKind::Complex64)
                }
                (TypeDescriptor::Float(FloatSize::U8), TypeDescriptor::Float(FloatSize::U8)) => {
                    Some(ElementKind::Complex128)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Read a string attribute that may be stored as either fixed-length or
/// variable-length text.
fn read_string_attr(attr: &Attribute) -> Option<String> {
    if let Ok(val) = attr.as_reader().read_scalar::<VarLenUnicode>() {
        return Some(val.as_str().to_string());
    }
    // Fixed-length strings are null padded.
    if let Ok(val) = attr.as_reader().read_scalar::<FixedUnicode<256>>() {
        return Some(val.as_str().trim_end_matches('\0').to_string());
    }
    if let Ok(val) = attr.as_reader().read_scalar::<VarLenAscii>() {
        return Some(val.as_str().to_string());
    }
    None
}

fn read_attr_value(attr: &Attribute) -> std::result::Result<AttrValue, String> {
    let desc = attr
        .dtype()
        .and_then(|t| t.to_descriptor())
        .map_err(|e| e.to_string())?;
    let scalar = attr.ndim() == 0;
    let reader = attr.as_reader();

    let value = match desc {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            if scalar {
                AttrValue::Int(reader.read_scalar::<i64>().map_err(|e| e.to_string())?)
            } else {
                AttrValue::Ints(reader.read_raw::<i64>().map_err(|e| e.to_string())?)
            }
        }
        TypeDescriptor::Float(_) => {
            if scalar {
                AttrValue::Float(reader.read_scalar::<f64>().map_err(|e| e.to_string())?)
            } else {
                AttrValue::Floats(reader.read_raw::<f64>().map_err(|e| e.to_string())?)
            }
        }
        TypeDescriptor::VarLenUnicode
        | TypeDescriptor::VarLenAscii
        | TypeDescriptor::FixedAscii(_)
        | TypeDescriptor::FixedUnicode(_) => AttrValue::Text(
            read_string_attr(attr).ok_or_else(|| "unsupported string encoding".to_string())?,
        ),
        other => return Err(format!("unsupported attribute type {:?}", other)),
    };
    Ok(value)
}

impl Container for Hdf5Container {
    fn describe(&self) -> String {
        format!("HDF5 file {}", self.path.display())
    }

    fn has_group(&self, path: &str) -> bool {
        let path = normalize(path);
        path == "/" || self.file.group(&path).is_ok()
    }

    fn has_dataset(&self, path: &str) -> bool {
        self.file.dataset(&normalize(path)).is_ok()
    }

    fn list_children(&self, group: &str) -> Result<Vec<String>> {
        self.with_group(group, |g| {
            let mut names = g
                .member_names()
                .map_err(|e| self.err(group, format!("cannot list members: {}", e)))?;
            names.sort();
            Ok(names)
        })
    }

    fn attribute_names(&self, path: &str) -> Result<Vec<String>> {
        self.with_location(path, |loc| {
            let mut names = loc
                .attr_names()
                .map_err(|e| self.err(path, format!("cannot list attributes: {}", e)))?;
            names.sort();
            Ok(names)
        })
    }

    fn read_attribute(&self, path: &str, name: &str) -> Result<AttrValue> {
        let full = join(&normalize(path), name);
        self.with_location(path, |loc| {
            let present = loc
                .attr_names()
                .map_err(|e| self.err(path, format!("cannot list attributes: {}", e)))?
                .iter()
                .any(|n| n == name);
            if !present {
                return Err(self.err(&full, "attribute not found"));
            }
            let attr = loc
                .attr(name)
                .map_err(|e| self.err(&full, format!("cannot open attribute: {}", e)))?;
            read_attr_value(&attr).map_err(|msg| self.err(&full, msg))
        })
    }

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        let path = normalize(path);
        let ds = self
            .file
            .dataset(&path)
            .map_err(|e| self.err(&path, format!("no such dataset ({})", e)))?;
        let desc = ds
            .dtype()
            .and_then(|t| t.to_descriptor())
            .map_err(|e| self.err(&path, format!("cannot read datatype: {}", e)))?;
        let kind = element_kind(&desc).ok_or_else(|| {
            ReadMpoError::decode(
                None,
                format!("dataset '{}' has unsupported element type {:?}", path, desc),
            )
        })?;
        // HDF5 converts to host order on read.
        Ok(DatasetInfo {
            dtype: Dtype::native(kind),
            shape: ds.shape(),
        })
    }

    fn read_dataset(&self, path: &str) -> Result<RawDataset> {
        let info = self.dataset_info(path)?;
        let path = normalize(path);
        let ds = self
            .file
            .dataset(&path)
            .map_err(|e| self.err(&path, format!("no such dataset ({})", e)))?;
        let read_err = |e: hdf5::Error| self.err(&path, format!("cannot read payload: {}", e));

        let reader = ds.as_reader();
        let bytes = match info.dtype.kind {
            ElementKind::Float32 => native_bytes_f32(&reader.read_raw::<f32>().map_err(read_err)?),
            ElementKind::Float64 => native_bytes_f64(&reader.read_raw::<f64>().map_err(read_err)?),
            ElementKind::Complex64 => {
                let data: Vec<Complex32> = reader.read_raw().map_err(read_err)?;
                let comps: Vec<f32> = data.iter().flat_map(|c| [c.re, c.im]).collect();
                native_bytes_f32(&comps)
            }
            ElementKind::Complex128 => {
                let data: Vec<Complex64> = reader.read_raw().map_err(read_err)?;
                let comps: Vec<f64> = data.iter().flat_map(|c| [c.re, c.im]).collect();
                native_bytes_f64(&comps)
            }
        };
        debug!(dataset = %path, bytes = bytes.len(), "read payload");

        Ok(RawDataset {
            bytes,
            dtype: info.dtype,
            shape: info.shape,
        })
    }
}

/// A newly created HDF5 file, written through [`ContainerSink`].
#[derive(Debug)]
pub struct Hdf5Sink {
    file: File,
    path: PathBuf,
}

impl Hdf5Sink {
    /// Create (or truncate) an HDF5 file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        crate::init::hdf5_init();
        let file = File::create(path)
            .map_err(|e| ReadMpoError::container(path, format!("cannot create file: {}", e)))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, object: &str, message: impl std::fmt::Display) -> ReadMpoError {
        located_err(&self.path, object, message)
    }
}

fn write_attr(group: &Group, name: &str, value: &AttrValue) -> hdf5::Result<()> {
    match value {
        AttrValue::Int(v) => group
            .new_attr::<i64>()
            .shape(())
            .create(name)?
            .as_writer()
            .write_scalar(v),
        AttrValue::Ints(v) => group
            .new_attr::<i64>()
            .shape([v.len()])
            .create(name)?
            .as_writer()
            .write(v),
        AttrValue::Float(v) => group
            .new_attr::<f64>()
            .shape(())
            .create(name)?
            .as_writer()
            .write_scalar(v),
        AttrValue::Floats(v) => group
            .new_attr::<f64>()
            .shape([v.len()])
            .create(name)?
            .as_writer()
            .write(v),
        AttrValue::Text(s) => {
            let text = VarLenUnicode::from_str(s).map_err(|e| hdf5::Error::from(e.to_string()))?;
            group
                .new_attr::<VarLenUnicode>()
                .shape(())
                .create(name)?
                .as_writer()
                .write_scalar(&text)
        }
    }
}

fn write_data(group: &Group, name: &str, data: &TypedBuffer) -> hdf5::Result<()> {
    match data {
        TypedBuffer::F32(v) => group
            .new_dataset::<f32>()
            .shape([v.len()])
            .create(name)?
            .as_writer()
            .write(v),
        TypedBuffer::F64(v) => group
            .new_dataset::<f64>()
            .shape([v.len()])
            .create(name)?
            .as_writer()
            .write(v),
        TypedBuffer::C64(v) => group
            .new_dataset::<Complex32>()
            .shape([v.len()])
            .create(name)?
            .as_writer()
            .write(v),
        TypedBuffer::C128(v) => group
            .new_dataset::<Complex64>()
            .shape([v.len()])
            .create(name)?
            .as_writer()
            .write(v),
    }
}

impl ContainerSink for Hdf5Sink {
    fn create_group(&mut self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut current = String::from("/");
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join(&current, part);
            if self.file.group(&current).is_err() {
                self.file
                    .create_group(&current)
                    .map_err(|e| self.err(&current, format!("cannot create group: {}", e)))?;
            }
        }
        Ok(())
    }

    fn write_attribute(&mut self, path: &str, name: &str, value: &AttrValue) -> Result<()> {
        with_group(&self.file, &self.path, path, |g| {
            write_attr(g, name, value).map_err(|e| {
                self.err(
                    &join(&normalize(path), name),
                    format!("cannot write attribute: {}", e),
                )
            })
        })
    }

    fn write_dataset(&mut self, path: &str, data: &TypedBuffer) -> Result<()> {
        let path = normalize(path);
        let (parent, name) = split_last(&path);
        self.create_group(&parent)?;
        with_group(&self.file, &self.path, &parent, |g| {
            write_data(g, name, data)
                .map_err(|e| self.err(&path, format!("cannot write dataset: {}", e)))
        })
    }
}
