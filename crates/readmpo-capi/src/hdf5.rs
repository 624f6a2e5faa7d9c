//! C API for HDF5 library initialization.

use crate::{guard, StatusCode, RMPO_NULL_POINTER, RMPO_SUCCESS};

/// Initialize the HDF5 library (once per process) and report its version.
///
/// Loading a chain initializes the library as well, so calling this first
/// is optional.
///
/// # Arguments
/// * `out_major`, `out_minor`, `out_release` - Output: version components
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_hdf5_version(
    out_major: *mut libc::c_uint,
    out_minor: *mut libc::c_uint,
    out_release: *mut libc::c_uint,
) -> StatusCode {
    if out_major.is_null() || out_minor.is_null() || out_release.is_null() {
        return RMPO_NULL_POINTER;
    }

    guard(|| {
        let (major, minor, release) = readmpo::hdf5_init().version;
        unsafe {
            *out_major = major.into();
            *out_minor = minor.into();
            *out_release = release.into();
        }
        RMPO_SUCCESS
    })
}

/// Check if the HDF5 library has been initialized.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_hdf5_is_initialized() -> bool {
    readmpo::hdf5_is_initialized()
}
