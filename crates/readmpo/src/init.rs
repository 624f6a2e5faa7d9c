//! HDF5 library initialization.
//!
//! The library is linked at build time. [`hdf5_init`] runs once per process
//! and records the linked version; every HDF5 container open calls it.
//! Teardown is left to the library's own exit hook.

use std::fmt;
use std::sync::OnceLock;
use tracing::info;

static RUNTIME: OnceLock<Hdf5Runtime> = OnceLock::new();

/// Facts about the linked HDF5 library, gathered at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hdf5Runtime {
    /// `(major, minor, release)`
    pub version: (u8, u8, u8),
}

impl fmt::Display for Hdf5Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, release) = self.version;
        write!(f, "HDF5 {}.{}.{}", major, minor, release)
    }
}

/// Initialize the HDF5 library. Subsequent calls return the same value.
pub fn hdf5_init() -> &'static Hdf5Runtime {
    RUNTIME.get_or_init(|| {
        let runtime = Hdf5Runtime {
            version: hdf5::library_version(),
        };
        info!(version = %runtime, "initialized HDF5 library");
        runtime
    })
}

/// Check if [`hdf5_init`] has run in this process.
pub fn hdf5_is_initialized() -> bool {
    RUNTIME.get().is_some()
}
