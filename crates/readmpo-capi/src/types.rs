//! Opaque and `repr(C)` types for C API

#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use readmpo::{export_core, ElementKind, MpoChain, TensorCore};

/// Shape and strides of an exported core, owned by the chain handle so the
/// pointers handed to C stay valid until the handle is released.
#[derive(Debug, Clone)]
pub(crate) struct CachedView {
    pub(crate) shape: Vec<libc::size_t>,
    pub(crate) strides: Vec<libc::ssize_t>,
}

/// Opaque MPO chain type for C API
///
/// An assembled `MpoChain` together with its per-core view cache. Handed to
/// C as a single boxed pointer.
#[derive(Debug)]
pub struct rmpo_chain {
    pub(crate) chain: MpoChain,
    views: Vec<OnceLock<CachedView>>,
    exports: AtomicUsize,
}

impl rmpo_chain {
    pub(crate) fn new(chain: MpoChain, eager: bool) -> Self {
        let handle = Self {
            views: (0..chain.len()).map(|_| OnceLock::new()).collect(),
            chain,
            exports: AtomicUsize::new(0),
        };
        if eager {
            for (cell, core) in handle.views.iter().zip(handle.chain.iter()) {
                handle.fill(cell, core);
            }
        }
        handle
    }

    fn fill<'a>(&self, cell: &'a OnceLock<CachedView>, core: &TensorCore) -> &'a CachedView {
        cell.get_or_init(|| {
            self.exports.fetch_add(1, Ordering::Relaxed);
            let view = export_core(core);
            CachedView {
                shape: view.shape().to_vec(),
                strides: view.strides().to_vec(),
            }
        })
    }

    /// Cached view of `site`, exporting it on first access.
    pub(crate) fn view(&self, site: usize) -> Option<(&TensorCore, &CachedView)> {
        let core = self.chain.cores().get(site)?;
        Some((core, self.fill(&self.views[site], core)))
    }

    pub(crate) fn export_count(&self) -> usize {
        self.exports.load(Ordering::Relaxed)
    }

    fn is_eager(&self) -> bool {
        self.views.iter().all(|v| v.get().is_some())
    }
}

impl Clone for rmpo_chain {
    fn clone(&self) -> Self {
        Self::new(self.chain.clone(), self.is_eager())
    }
}

/// Element type for C API
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum rmpo_dtype {
    /// `float`
    Float32 = 0,
    /// `double`
    Float64 = 1,
    /// `float _Complex`, interleaved (re, im)
    Complex64 = 2,
    /// `double _Complex`, interleaved (re, im)
    Complex128 = 3,
}

impl From<ElementKind> for rmpo_dtype {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Float32 => Self::Float32,
            ElementKind::Float64 => Self::Float64,
            ElementKind::Complex64 => Self::Complex64,
            ElementKind::Complex128 => Self::Complex128,
        }
    }
}

/// Read-only strided view of one core.
///
/// `shape` and `strides` (in bytes) point to `ndim` values. All pointers
/// stay valid until the chain handle is released.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct rmpo_buffer_view {
    /// First element
    pub data: *const c_void,
    /// Element type
    pub dtype: rmpo_dtype,
    /// Size of one element in bytes
    pub itemsize: libc::size_t,
    /// Number of dimensions
    pub ndim: libc::size_t,
    /// Dimensions
    pub shape: *const libc::size_t,
    /// Byte strides, row-major
    pub strides: *const libc::ssize_t,
    /// Always 1
    pub readonly: libc::c_int,
}

impl Default for rmpo_buffer_view {
    fn default() -> Self {
        Self {
            data: std::ptr::null(),
            dtype: rmpo_dtype::Float64,
            itemsize: 0,
            ndim: 0,
            shape: std::ptr::null(),
            strides: std::ptr::null(),
            readonly: 1,
        }
    }
}
