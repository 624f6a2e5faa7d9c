#![warn(missing_docs)]
//! C API for the readmpo MPO reader
//!
//! Lets foreign numeric environments (Julia, Python, C++) load an MPO from an
//! HDF5 file and read each core in place through a strided buffer view.
//!
//! ## Conventions
//!
//! - `rmpo_chain` is opaque; it is created by `rmpo_load` and freed with
//!   `rmpo_chain_release`
//! - Every fallible call returns a status code. Details of the most recent
//!   failure on the calling thread are available from `rmpo_last_error_*`
//! - Panics are caught at the boundary and reported as `RMPO_INTERNAL_ERROR`

// C API requires unsafe operations with raw pointers
#![allow(clippy::not_unsafe_ptr_arg_deref)]

mod chain;
mod hdf5;
mod types;

pub use chain::*;
pub use hdf5::*;
pub use types::*;

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};

use readmpo::{ErrorKind, ReadMpoError};

/// Status code type for C API
pub type StatusCode = libc::c_int;

/// Operation completed successfully.
pub const RMPO_SUCCESS: StatusCode = 0;
/// A null pointer was passed where a valid pointer was required.
pub const RMPO_NULL_POINTER: StatusCode = -1;
/// An invalid argument was provided (bad UTF-8, site out of range, ...).
pub const RMPO_INVALID_ARGUMENT: StatusCode = -2;
/// The provided output buffer is too small for the result.
pub const RMPO_BUFFER_TOO_SMALL: StatusCode = -5;
/// An internal error occurred (e.g., a panic was caught).
pub const RMPO_INTERNAL_ERROR: StatusCode = -6;
/// The file or a group in it could not be opened.
pub const RMPO_CONTAINER_ERROR: StatusCode = -10;
/// The file does not follow the MPO layout.
pub const RMPO_SCHEMA_ERROR: StatusCode = -11;
/// A payload could not be decoded.
pub const RMPO_DECODE_ERROR: StatusCode = -12;
/// Neighbouring cores disagree on a bond dimension.
pub const RMPO_CONSISTENCY_ERROR: StatusCode = -13;
/// The operation is not allowed in the reader's current state.
pub const RMPO_STATE_ERROR: StatusCode = -14;

/// Most recent failure on this thread.
#[derive(Debug, Default)]
struct LastError {
    status: StatusCode,
    site: Option<usize>,
    message: String,
}

thread_local! {
    static LAST_ERROR: RefCell<LastError> = RefCell::new(LastError::default());
}

fn record(status: StatusCode, site: Option<usize>, message: String) -> StatusCode {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = LastError {
            status,
            site,
            message,
        }
    });
    status
}

/// Record a failure that is not tied to a site and return `code`.
pub(crate) fn err_status<E: std::fmt::Display>(err: E, code: StatusCode) -> StatusCode {
    record(code, None, err.to_string())
}

/// Status code for a reader error.
pub(crate) fn status_of(err: &ReadMpoError) -> StatusCode {
    match err.kind() {
        ErrorKind::Container => RMPO_CONTAINER_ERROR,
        ErrorKind::Schema => RMPO_SCHEMA_ERROR,
        ErrorKind::Decode => RMPO_DECODE_ERROR,
        ErrorKind::Consistency => RMPO_CONSISTENCY_ERROR,
        ErrorKind::State => RMPO_STATE_ERROR,
        ErrorKind::OutOfRange => RMPO_INVALID_ARGUMENT,
    }
}

/// Record a reader error, keeping the site it names, and return its status.
pub(crate) fn reader_err(err: ReadMpoError) -> StatusCode {
    record(status_of(&err), err.site(), err.to_string())
}

/// Run `body`, turning a panic into `RMPO_INTERNAL_ERROR`.
pub(crate) fn guard(body: impl FnOnce() -> StatusCode) -> StatusCode {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(code) => code,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic without message".to_string());
            record(RMPO_INTERNAL_ERROR, None, message)
        }
    }
}

/// Retrieve the message of the last error on this thread.
///
/// # Arguments
/// * `buf` - Output buffer for the message (UTF-8, null-terminated).
///   Pass null to query the required length only.
/// * `buf_len` - Size of the buffer in bytes.
/// * `out_len` - Output: required buffer length including null terminator.
///
/// # Returns
/// * `RMPO_SUCCESS` - Message written (or length query succeeded).
/// * `RMPO_NULL_POINTER` - `out_len` is null.
/// * `RMPO_BUFFER_TOO_SMALL` - Buffer too small; `out_len` has the required size.
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_last_error_message(
    buf: *mut u8,
    buf_len: libc::size_t,
    out_len: *mut libc::size_t,
) -> StatusCode {
    if out_len.is_null() {
        return RMPO_NULL_POINTER;
    }

    LAST_ERROR.with(|cell| {
        let bytes = cell.borrow().message.as_bytes().to_vec();
        unsafe { *out_len = bytes.len() + 1 };
        if buf.is_null() {
            return RMPO_SUCCESS;
        }
        if buf_len <= bytes.len() {
            return RMPO_BUFFER_TOO_SMALL;
        }
        let dst = unsafe { std::slice::from_raw_parts_mut(buf, bytes.len() + 1) };
        dst[..bytes.len()].copy_from_slice(&bytes);
        dst[bytes.len()] = 0;
        RMPO_SUCCESS
    })
}

/// Status code of the last error on this thread (`RMPO_SUCCESS` if none).
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_last_error_status() -> StatusCode {
    LAST_ERROR.with(|cell| cell.borrow().status)
}

/// Site named by the last error on this thread.
///
/// # Arguments
/// * `out_site` - Output: 0-based site index, written only if one is known
/// * `out_has_site` - Output: 1 if the error names a site, 0 otherwise
#[unsafe(no_mangle)]
pub extern "C" fn rmpo_last_error_site(
    out_site: *mut libc::size_t,
    out_has_site: *mut libc::c_int,
) -> StatusCode {
    if out_site.is_null() || out_has_site.is_null() {
        return RMPO_NULL_POINTER;
    }

    let site = LAST_ERROR.with(|cell| cell.borrow().site);
    unsafe {
        *out_has_site = libc::c_int::from(site.is_some());
        if let Some(site) = site {
            *out_site = site;
        }
    }
    RMPO_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_message() -> String {
        let mut len: libc::size_t = 0;
        assert_eq!(
            rmpo_last_error_message(std::ptr::null_mut(), 0, &mut len),
            RMPO_SUCCESS
        );
        let mut buf = vec![0u8; len];
        assert_eq!(
            rmpo_last_error_message(buf.as_mut_ptr(), len, &mut len),
            RMPO_SUCCESS
        );
        assert_eq!(buf.pop(), Some(0));
        String::from_utf8(buf).unwrap()
    }

    fn last_site() -> Option<usize> {
        let mut site: libc::size_t = 0;
        let mut has_site: libc::c_int = -1;
        assert_eq!(rmpo_last_error_site(&mut site, &mut has_site), RMPO_SUCCESS);
        (has_site == 1).then_some(site)
    }

    #[test]
    fn test_message_buffer_sizes() {
        assert_eq!(err_status("boom", RMPO_INVALID_ARGUMENT), RMPO_INVALID_ARGUMENT);
        assert_eq!(last_message(), "boom");
        assert_eq!(rmpo_last_error_status(), RMPO_INVALID_ARGUMENT);
        assert_eq!(last_site(), None);

        let mut len: libc::size_t = 0;
        let mut small = [0u8; 4];
        assert_eq!(
            rmpo_last_error_message(small.as_mut_ptr(), small.len(), &mut len),
            RMPO_BUFFER_TOO_SMALL
        );
        assert_eq!(len, 5);
        assert_eq!(
            rmpo_last_error_message(small.as_mut_ptr(), 4, std::ptr::null_mut()),
            RMPO_NULL_POINTER
        );
    }

    #[test]
    fn test_reader_error_keeps_site() {
        let code = reader_err(ReadMpoError::Decode {
            site: Some(2),
            message: "payload has 8 bytes".to_string(),
        });
        assert_eq!(code, RMPO_DECODE_ERROR);
        assert_eq!(rmpo_last_error_status(), RMPO_DECODE_ERROR);
        assert_eq!(last_site(), Some(2));
        assert!(last_message().contains("payload has 8 bytes"));

        let mut has_site: libc::c_int = 0;
        assert_eq!(
            rmpo_last_error_site(std::ptr::null_mut(), &mut has_site),
            RMPO_NULL_POINTER
        );
    }

    #[test]
    fn test_panic_is_caught() {
        let code = guard(|| panic!("kaboom"));
        assert_eq!(code, RMPO_INTERNAL_ERROR);
        assert_eq!(last_message(), "kaboom");
        assert_eq!(rmpo_last_error_status(), RMPO_INTERNAL_ERROR);
    }

    #[test]
    fn test_status_codes() {
        let err = ReadMpoError::SiteOutOfRange {
            site: 4,
            n_sites: 2,
        };
        assert_eq!(status_of(&err), RMPO_INVALID_ARGUMENT);
        let err = ReadMpoError::State {
            operation: "assemble",
            state: "opened",
        };
        assert_eq!(status_of(&err), RMPO_STATE_ERROR);
    }
}
