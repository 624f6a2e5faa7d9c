//! Read-count instrumentation for any [`Container`].

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AttrValue, Container, DatasetInfo, RawDataset};
use crate::error::Result;

/// Wraps a container and counts payload and metadata reads.
///
/// Payload reads are calls to [`Container::read_dataset`]; everything else
/// (attributes, dataset info, listings) counts as a metadata read.
#[derive(Debug, Default)]
pub struct CountingContainer<C> {
    inner: C,
    payload_reads: AtomicUsize,
    payload_bytes: AtomicUsize,
    metadata_reads: AtomicUsize,
}

impl<C> CountingContainer<C> {
    /// Start counting reads on `inner`.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            payload_reads: AtomicUsize::new(0),
            payload_bytes: AtomicUsize::new(0),
            metadata_reads: AtomicUsize::new(0),
        }
    }

    /// Number of dataset payloads read so far.
    pub fn payload_reads(&self) -> usize {
        self.payload_reads.load(Ordering::Relaxed)
    }

    /// Total payload bytes read so far.
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes.load(Ordering::Relaxed)
    }

    /// Number of metadata queries so far.
    pub fn metadata_reads(&self) -> usize {
        self.metadata_reads.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.payload_reads.store(0, Ordering::Relaxed);
        self.payload_bytes.store(0, Ordering::Relaxed);
        self.metadata_reads.store(0, Ordering::Relaxed);
    }

    /// The wrapped container.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Stop counting and return the wrapped container.
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn meta(&self) {
        self.metadata_reads.fetch_add(1, Ordering::Relaxed);
    }
}

impl<C: Container> Container for CountingContainer<C> {
    fn describe(&self) -> String {
        format!("counting {}", self.inner.describe())
    }

    fn has_group(&self, path: &str) -> bool {
        self.meta();
        self.inner.has_group(path)
    }

    fn has_dataset(&self, path: &str) -> bool {
        self.meta();
        self.inner.has_dataset(path)
    }

    fn list_children(&self, group: &str) -> Result<Vec<String>> {
        self.meta();
        self.inner.list_children(group)
    }

    fn attribute_names(&self, path: &str) -> Result<Vec<String>> {
        self.meta();
        self.inner.attribute_names(path)
    }

    fn read_attribute(&self, path: &str, name: &str) -> Result<AttrValue> {
        self.meta();
        self.inner.read_attribute(path, name)
    }

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        self.meta();
        self.inner.dataset_info(path)
    }

    fn read_dataset(&self, path: &str) -> Result<RawDataset> {
        self.payload_reads.fetch_add(1, Ordering::Relaxed);
        let raw = self.inner.read_dataset(path)?;
        self.payload_bytes.fetch_add(raw.bytes.len(), Ordering::Relaxed);
        Ok(raw)
    }
}
