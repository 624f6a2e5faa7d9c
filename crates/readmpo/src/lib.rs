#![warn(missing_docs)]
//! Reader for Matrix Product Operators (MPOs) stored in HDF5 containers.
//!
//! This crate decodes an MPO into an ordered chain of tensor cores and hands
//! out zero-copy views of them:
//! - `Container`: groups, datasets and attributes (HDF5 or in-memory)
//! - `validate`: schema checks on metadata only, producing a `SchemaDescriptor`
//! - `decode_core`: one site's payload to a row-major `TensorCore`
//! - `MpoChain`: the assembled, bond-consistent chain
//! - `export_chain`: eager or lazy `BufferView`s over the cores
//! - `MpoFile`: reader handle driving the steps above
//!
//! # Example
//!
//! ```no_run
//! use readmpo::{export_chain, load, LoadOptions};
//!
//! let chain = load("hamiltonian.h5", &LoadOptions::default())?;
//! let views = export_chain(&chain, false);
//! for view in views.iter() {
//!     println!("{:?} {}", view.shape(), view.kind());
//! }
//! # Ok::<(), readmpo::ReadMpoError>(())
//! ```

pub mod chain;
pub mod container;
pub mod decode;
pub mod dtype;
pub mod error;
pub mod export;
pub mod init;
pub mod layout;
pub mod options;
pub mod reader;
pub mod schema;
pub mod stock;
pub mod tensor_core;
pub mod writer;

use std::path::{Path, PathBuf};
use tracing::info;

// Re-export main types
pub use chain::{assemble, MpoChain};
pub use container::{
    AttrValue, Container, ContainerSink, CountingContainer, DatasetInfo, Hdf5Container, Hdf5Sink,
    MemoryContainer, RawDataset,
};
pub use decode::decode_core;
pub use dtype::{checked_nbytes, ByteOrder, Dtype, Element, ElementKind, TypedBuffer};
pub use error::{ErrorKind, ReadMpoError, Result};
pub use export::{export_chain, export_core, BufferView, ChainExport};
pub use init::{hdf5_init, hdf5_is_initialized, Hdf5Runtime};
pub use layout::{SiteNaming, StorageOrder, DEFAULT_ROOT};
pub use options::LoadOptions;
pub use reader::{MpoFile, ReaderState};
pub use schema::{validate, SchemaDescriptor, SiteDescriptor};
pub use tensor_core::{labels_for, row_major_strides, IndexLabel, TensorCore};
pub use writer::{save_chain, save_chain_with, write_chain};

/// Open, validate and assemble the MPO in an HDF5 file.
///
/// The file is closed before returning.
pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Result<MpoChain> {
    let mut file = MpoFile::open_with(path, options)?;
    file.validate()?;
    let chain = file.assemble()?;
    file.close();
    Ok(chain)
}

/// Load every HDF5 file matching a glob pattern, in sorted path order.
///
/// Fails if the pattern is invalid or matches nothing, and on the first file
/// that does not load.
pub fn load_glob(pattern: &str, options: &LoadOptions) -> Result<Vec<(PathBuf, MpoChain)>> {
    let entries = glob::glob(pattern).map_err(|e| {
        ReadMpoError::container(pattern, format!("invalid glob pattern: {}", e))
    })?;
    let mut paths = entries
        .map(|entry| entry.map_err(|e| ReadMpoError::Io(e.into_error())))
        .collect::<Result<Vec<_>>>()?;
    if paths.is_empty() {
        return Err(ReadMpoError::container(pattern, "no files match"));
    }
    paths.sort();

    info!(pattern, n_files = paths.len(), "loading MPO files");
    paths
        .into_iter()
        .map(|path| {
            let chain = load(&path, options)?;
            Ok((path, chain))
        })
        .collect()
}
