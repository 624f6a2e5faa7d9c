//! Zero-copy buffer views over decoded cores.
//!
//! A [`BufferView`] describes a core's memory the way a strided-array
//! consumer (the Python buffer protocol, a C caller) needs it: pointer,
//! element type, shape and byte strides. The view borrows the core, so it
//! cannot outlive the chain it was exported from.

use ndarray::ArrayViewD;
use std::cell::{Cell, OnceCell};
use tracing::debug;

use crate::chain::MpoChain;
use crate::dtype::{Element, ElementKind};
use crate::error::Result;
use crate::tensor_core::TensorCore;

/// Read-only strided view of one core.
#[derive(Debug, Clone)]
pub struct BufferView<'a> {
    core: &'a TensorCore,
}

impl<'a> BufferView<'a> {
    /// Pointer to the first element.
    pub fn as_ptr(&self) -> *const u8 {
        self.core.data().as_ptr()
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        self.core.kind()
    }

    /// Size of one element in bytes.
    pub fn itemsize(&self) -> usize {
        self.core.kind().size()
    }

    /// Buffer-protocol format string.
    pub fn format(&self) -> &'static str {
        self.core.kind().format_code()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.core.rank()
    }

    /// Dimensions.
    pub fn shape(&self) -> &'a [usize] {
        self.core.shape()
    }

    /// Strides in bytes.
    pub fn strides(&self) -> &'a [isize] {
        self.core.strides()
    }

    /// Total size in bytes.
    pub fn nbytes(&self) -> usize {
        self.core.data().nbytes()
    }

    /// Always true; exported buffers are never writable.
    pub fn readonly(&self) -> bool {
        true
    }

    /// The core behind the view.
    pub fn core(&self) -> &'a TensorCore {
        self.core
    }

    /// Typed n-dimensional view, if the elements are of type `T`.
    pub fn typed<T: Element>(&self) -> Option<ArrayViewD<'a, T>> {
        self.core.view::<T>()
    }
}

/// Export one core without copying.
pub fn export_core(core: &TensorCore) -> BufferView<'_> {
    BufferView { core }
}

/// Buffer views for every core of a chain.
///
/// Views are created up front (eager) or on first access (lazy). Either way
/// each core is exported at most once and later accesses return the cached
/// view.
#[derive(Debug)]
pub struct ChainExport<'a> {
    chain: &'a MpoChain,
    views: Vec<OnceCell<BufferView<'a>>>,
    exports: Cell<usize>,
}

impl<'a> ChainExport<'a> {
    /// View of the core at `site`, exporting it if needed.
    pub fn get(&self, site: usize) -> Result<&BufferView<'a>> {
        let core = self.chain.core(site)?;
        Ok(self.fill(site, core))
    }

    fn fill(&self, site: usize, core: &'a TensorCore) -> &BufferView<'a> {
        self.views[site].get_or_init(|| {
            self.exports.set(self.exports.get() + 1);
            debug!(site, shape = ?core.shape(), "exported core");
            export_core(core)
        })
    }

    /// Number of sites.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Always false; a chain has at least one core.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Number of cores exported so far.
    pub fn export_count(&self) -> usize {
        self.exports.get()
    }

    /// Whether the view of `site` has been created.
    pub fn is_exported(&self, site: usize) -> bool {
        self.views.get(site).is_some_and(|v| v.get().is_some())
    }

    /// Iterate over all views in site order. Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = &BufferView<'a>> + '_ {
        (0..self.views.len()).filter_map(move |site| self.get(site).ok())
    }

    /// The exported chain.
    pub fn chain(&self) -> &'a MpoChain {
        self.chain
    }
}

/// Export all cores of `chain`, immediately if `eager`, otherwise on demand.
pub fn export_chain(chain: &MpoChain, eager: bool) -> ChainExport<'_> {
    let export = ChainExport {
        chain,
        views: (0..chain.len()).map(|_| OnceCell::new()).collect(),
        exports: Cell::new(0),
    };
    if eager {
        for (site, core) in chain.iter().enumerate() {
            export.fill(site, core);
        }
    }
    export
}
