//! C API for loading MPO chains and reading their cores.

use std::ffi::CStr;

use readmpo::{load, LoadOptions, DEFAULT_ROOT};
use tracing::debug;

use crate::types::{rmpo_buffer_view, rmpo_chain};
use crate::{
    err_status, guard, reader_err, StatusCode, RMPO_INTERNAL_ERROR, RMPO_INVALID_ARGUMENT,
    RMPO_NULL_POINTER, RMPO_SUCCESS,
};

/// Convert a C string pointer to a Rust `&str`, distinguishing null from invalid UTF-8.
fn cstr_to_str_checked<'a>(ptr: *const libc::c_char) -> Result<&'a str, StatusCode> {
    if ptr.is_null() {
        return Err(RMPO_NULL_POINTER);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| err_status("string argument is not valid UTF-8", RMPO_INVALID_ARGUMENT))
}

/// Load, validate and assemble the MPO stored in an HDF5 file.
///
/// # Arguments
/// * `path` - Path to the HDF5 file (UTF-8, null-terminated)
/// * `root` - Group holding the MPO; null selects `"/mpo"`
/// * `eager` - Nonzero to export every core immediately, zero to export on first access
/// * `out` - Output: new chain handle, to be freed with `rmpo_chain_release()`
///
/// # Returns
/// `RMPO_SUCCESS`, or an error code with details available from
/// `rmpo_last_error_*()`. On error `*out` is set to null.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_load(
    path: *const libc::c_char,
    root: *const libc::c_char,
    eager: libc::c_int,
    out: *mut *mut rmpo_chain,
) -> StatusCode {
    if out.is_null() {
        return RMPO_NULL_POINTER;
    }
    unsafe { *out = std::ptr::null_mut() };

    let path = match cstr_to_str_checked(path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let root = if root.is_null() {
        DEFAULT_ROOT
    } else {
        match cstr_to_str_checked(root) {
            Ok(s) => s,
            Err(code) => return code,
        }
    };

    guard(|| {
        let options = LoadOptions::default()
            .with_root_group(root)
            .with_eager(eager != 0);
        match load(path, &options) {
            Ok(chain) => {
                debug!(path, root, n_sites = chain.len(), "loaded chain for C caller");
                let handle = Box::new(rmpo_chain::new(chain, options.eager));
                unsafe { *out = Box::into_raw(handle) };
                RMPO_SUCCESS
            }
            Err(e) => reader_err(e),
        }
    })
}

/// Release a chain handle. Null is ignored.
///
/// # Safety
/// `ptr` must come from `rmpo_load` or `rmpo_chain_clone` and must not be
/// used afterwards. Views obtained from it become invalid.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_chain_release(ptr: *mut rmpo_chain) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr) });
    }
}

/// Deep-copy a chain handle, including its eager/lazy export mode.
///
/// # Returns
/// A new handle to be freed with `rmpo_chain_release()`, or null if `ptr`
/// is null or the copy failed.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_chain_clone(ptr: *const rmpo_chain) -> *mut rmpo_chain {
    if ptr.is_null() {
        return std::ptr::null_mut();
    }
    let mut copy = std::ptr::null_mut();
    match guard(|| {
        copy = Box::into_raw(Box::new(unsafe { &*ptr }.clone()));
        RMPO_SUCCESS
    }) {
        RMPO_SUCCESS => copy,
        _ => std::ptr::null_mut(),
    }
}

/// 1 if `ptr` is a non-null handle, 0 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_chain_is_assigned(ptr: *const rmpo_chain) -> libc::c_int {
    libc::c_int::from(!ptr.is_null())
}

/// Get the number of sites.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_chain_len(
    ptr: *const rmpo_chain,
    out_len: *mut libc::size_t,
) -> StatusCode {
    if ptr.is_null() || out_len.is_null() {
        return RMPO_NULL_POINTER;
    }

    guard(|| {
        unsafe { *out_len = (*ptr).chain.len() };
        RMPO_SUCCESS
    })
}

/// Describe the core at `site` as a read-only strided buffer.
///
/// The core is exported on first access (unless the chain was loaded
/// eagerly) and the same view is returned afterwards. The view's pointers
/// stay valid until the chain is released.
///
/// # Returns
/// `RMPO_INVALID_ARGUMENT` if `site` is out of range.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_chain_core_view(
    ptr: *const rmpo_chain,
    site: libc::size_t,
    out_view: *mut rmpo_buffer_view,
) -> StatusCode {
    if ptr.is_null() || out_view.is_null() {
        return RMPO_NULL_POINTER;
    }

    guard(|| {
        let handle = unsafe { &*ptr };
        let Some((core, cached)) = handle.view(site) else {
            return match handle.chain.core(site) {
                Err(e) => reader_err(e),
                Ok(_) => err_status("core view unavailable", RMPO_INTERNAL_ERROR),
            };
        };
        unsafe {
            *out_view = rmpo_buffer_view {
                data: core.data().as_ptr() as *const std::ffi::c_void,
                dtype: core.kind().into(),
                itemsize: core.kind().size(),
                ndim: cached.shape.len(),
                shape: cached.shape.as_ptr(),
                strides: cached.strides.as_ptr(),
                readonly: 1,
            }
        };
        RMPO_SUCCESS
    })
}

/// Get how many cores have been exported so far.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_chain_export_count(
    ptr: *const rmpo_chain,
    out_count: *mut libc::size_t,
) -> StatusCode {
    if ptr.is_null() || out_count.is_null() {
        return RMPO_NULL_POINTER;
    }

    guard(|| {
        unsafe { *out_count = (*ptr).export_count() };
        RMPO_SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::rmpo_dtype;
    use crate::{
        rmpo_last_error_message, rmpo_last_error_site, rmpo_last_error_status,
        RMPO_CONTAINER_ERROR, RMPO_DECODE_ERROR,
    };
    use readmpo::{
        save_chain, AttrValue, ContainerSink, Hdf5Sink, MpoChain, TensorCore, TypedBuffer,
    };
    use std::ffi::CString;
    use std::path::Path;

    fn write_chain(path: &Path) -> MpoChain {
        let core = |shape: Vec<usize>, left, right| {
            let n: usize = shape.iter().product();
            let data: Vec<f64> = (0..n).map(|i| i as f64 * 0.5).collect();
            TensorCore::with_bonds(shape, left, right, data).unwrap()
        };
        let chain = MpoChain::new(vec![
            core(vec![2, 4], false, true),
            core(vec![4, 2, 4], true, true),
            core(vec![4, 2], true, false),
        ])
        .unwrap();
        save_chain(path, "/mpo", &chain).unwrap();
        chain
    }

    fn cpath(path: &Path) -> CString {
        CString::new(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_load_and_view() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.h5");
        let expected = write_chain(&path);
        let c_path = cpath(&path);

        let mut chain: *mut rmpo_chain = std::ptr::null_mut();
        let status = rmpo_load(c_path.as_ptr(), std::ptr::null(), 0, &mut chain);
        assert_eq!(status, RMPO_SUCCESS);
        assert!(!chain.is_null());

        let mut len: libc::size_t = 0;
        assert_eq!(rmpo_chain_len(chain, &mut len), RMPO_SUCCESS);
        assert_eq!(len, 3);

        let mut count: libc::size_t = 99;
        assert_eq!(rmpo_chain_export_count(chain, &mut count), RMPO_SUCCESS);
        assert_eq!(count, 0);

        let mut view = rmpo_buffer_view::default();
        assert_eq!(rmpo_chain_core_view(chain, 1, &mut view), RMPO_SUCCESS);
        assert_eq!(view.dtype, rmpo_dtype::Float64);
        assert_eq!(view.itemsize, 8);
        assert_eq!(view.ndim, 3);
        assert_eq!(view.readonly, 1);
        let shape = unsafe { std::slice::from_raw_parts(view.shape, view.ndim) };
        let strides = unsafe { std::slice::from_raw_parts(view.strides, view.ndim) };
        assert_eq!(shape, &[4, 2, 4]);
        assert_eq!(strides, &[64, 32, 8]);
        let data = unsafe { std::slice::from_raw_parts(view.data as *const f64, 32) };
        assert_eq!(data, expected.core(1).unwrap().as_slice::<f64>().unwrap());

        let mut again = rmpo_buffer_view::default();
        assert_eq!(rmpo_chain_core_view(chain, 1, &mut again), RMPO_SUCCESS);
        assert_eq!(again.data, view.data);
        assert_eq!(again.shape, view.shape);
        assert_eq!(rmpo_chain_export_count(chain, &mut count), RMPO_SUCCESS);
        assert_eq!(count, 1);

        assert_eq!(
            rmpo_chain_core_view(chain, 3, &mut again),
            RMPO_INVALID_ARGUMENT
        );

        rmpo_chain_release(chain);
    }

    #[test]
    fn test_eager_load_and_clone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.h5");
        write_chain(&path);
        let c_path = cpath(&path);
        let c_root = CString::new("/mpo").unwrap();

        let mut chain: *mut rmpo_chain = std::ptr::null_mut();
        assert_eq!(
            rmpo_load(c_path.as_ptr(), c_root.as_ptr(), 1, &mut chain),
            RMPO_SUCCESS
        );
        let mut count: libc::size_t = 0;
        assert_eq!(rmpo_chain_export_count(chain, &mut count), RMPO_SUCCESS);
        assert_eq!(count, 3);

        let copy = rmpo_chain_clone(chain);
        assert_eq!(rmpo_chain_is_assigned(copy), 1);
        rmpo_chain_release(chain);

        let mut view = rmpo_buffer_view::default();
        assert_eq!(rmpo_chain_core_view(copy, 0, &mut view), RMPO_SUCCESS);
        assert_eq!(view.ndim, 2);
        rmpo_chain_release(copy);
        assert_eq!(rmpo_chain_is_assigned(std::ptr::null()), 0);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut chain: *mut rmpo_chain = std::ptr::null_mut();

        let missing = cpath(&dir.path().join("missing.h5"));
        assert_eq!(
            rmpo_load(missing.as_ptr(), std::ptr::null(), 0, &mut chain),
            RMPO_CONTAINER_ERROR
        );
        assert!(chain.is_null());
        let mut len: libc::size_t = 0;
        assert_eq!(
            rmpo_last_error_message(std::ptr::null_mut(), 0, &mut len),
            RMPO_SUCCESS
        );
        assert!(len > 1);

        let path = dir.path().join("short.h5");
        {
            let mut sink = Hdf5Sink::create(&path).unwrap();
            sink.create_group("/mpo/site_0").unwrap();
            sink.write_attribute("/mpo", "n_sites", &AttrValue::Int(1))
                .unwrap();
            sink.write_attribute("/mpo/site_0", "shape", &AttrValue::Ints(vec![2, 2]))
                .unwrap();
            sink.write_dataset("/mpo/site_0/data", &TypedBuffer::F64(vec![0.0; 3]))
                .unwrap();
        }
        let short = cpath(&path);
        assert_eq!(
            rmpo_load(short.as_ptr(), std::ptr::null(), 0, &mut chain),
            RMPO_DECODE_ERROR
        );
        assert_eq!(rmpo_last_error_status(), RMPO_DECODE_ERROR);
        let (mut site, mut has_site) = (99, 0);
        assert_eq!(rmpo_last_error_site(&mut site, &mut has_site), RMPO_SUCCESS);
        assert_eq!((has_site, site), (1, 0));

        assert_eq!(
            rmpo_load(std::ptr::null(), std::ptr::null(), 0, &mut chain),
            RMPO_NULL_POINTER
        );
        assert_eq!(
            rmpo_load(short.as_ptr(), std::ptr::null(), 0, std::ptr::null_mut()),
            RMPO_NULL_POINTER
        );
    }
}
