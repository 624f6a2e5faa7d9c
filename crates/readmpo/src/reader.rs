//! Reader handle and its lifecycle.
//!
//! ```text
//! open ──> Opened ──validate──> Validated ──assemble──> Assembled
//!            ^                                              │
//!            └──────────────── reroot ──────────────────────┘
//! any state ──close──> Closed
//! ```

use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::chain::{assemble, MpoChain};
use crate::container::{Container, Hdf5Container};
use crate::decode::decode_core;
use crate::error::{ReadMpoError, Result};
use crate::layout::{normalize, SiteNaming};
use crate::options::LoadOptions;
use crate::schema::{validate, SchemaDescriptor};
use crate::tensor_core::TensorCore;

/// Lifecycle state of an [`MpoFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Container open, layout not yet checked
    Opened,
    /// Layout checked, descriptor cached
    Validated,
    /// At least one chain assembled
    Assembled,
    /// Container released
    Closed,
}

impl ReaderState {
    /// Lowercase name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Validated => "validated",
            Self::Assembled => "assembled",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An open MPO container.
///
/// The container is released by [`MpoFile::close`] or when the handle is
/// dropped. Chains returned by [`MpoFile::assemble`] own their data and stay
/// valid after that.
#[derive(Debug)]
pub struct MpoFile<C = Hdf5Container> {
    container: Option<C>,
    root: String,
    naming: SiteNaming,
    state: ReaderState,
    descriptor: Option<SchemaDescriptor>,
}

impl MpoFile<Hdf5Container> {
    /// Open an HDF5 file with the MPO stored under `root`.
    pub fn open(path: impl AsRef<Path>, root: &str) -> Result<Self> {
        Self::open_with(path, &LoadOptions::default().with_root_group(root))
    }

    /// Open an HDF5 file with explicit options.
    pub fn open_with(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let container = Hdf5Container::open(path)?;
        Self::from_container(container, &options.root_group, options.naming.clone())
    }
}

impl<C: Container> MpoFile<C> {
    /// Wrap an already-open container.
    ///
    /// Fails with a container error if `root` is not a group.
    pub fn from_container(container: C, root: &str, naming: SiteNaming) -> Result<Self> {
        let root = normalize(root);
        if !container.has_group(&root) {
            return Err(ReadMpoError::container(
                &root,
                format!("root group not found in {}", container.describe()),
            ));
        }
        debug!(root = %root, container = %container.describe(), "opened MPO reader");
        Ok(Self {
            container: Some(container),
            root,
            naming,
            state: ReaderState::Opened,
            descriptor: None,
        })
    }

    /// Current state.
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Root group in use.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Site naming convention in use.
    pub fn naming(&self) -> &SiteNaming {
        &self.naming
    }

    /// Cached descriptor, if the layout has been validated.
    pub fn descriptor(&self) -> Option<&SchemaDescriptor> {
        self.descriptor.as_ref()
    }

    /// The underlying container.
    pub fn container(&self) -> Result<&C> {
        self.open_container("access the container")
    }

    fn open_container(&self, operation: &'static str) -> Result<&C> {
        self.container.as_ref().ok_or(ReadMpoError::State {
            operation,
            state: ReaderState::Closed.name(),
        })
    }

    /// Validate the layout under the root group.
    ///
    /// The descriptor is computed once and cached; later calls return it
    /// without touching the container. On failure the state is unchanged.
    pub fn validate(&mut self) -> Result<&SchemaDescriptor> {
        let container = self.open_container("validate")?;
        if self.descriptor.is_none() {
            let descriptor = validate(container, &self.root, &self.naming)?;
            self.descriptor = Some(descriptor);
            self.state = ReaderState::Validated;
        }
        self.descriptor
            .as_ref()
            .ok_or_else(|| ReadMpoError::schema(None, "descriptor missing after validation"))
    }

    fn validated(&self, operation: &'static str) -> Result<(&C, &SchemaDescriptor)> {
        let container = self.open_container(operation)?;
        match &self.descriptor {
            Some(descriptor) => Ok((container, descriptor)),
            None => Err(ReadMpoError::State {
                operation,
                state: self.state.name(),
            }),
        }
    }

    /// Decode every site and assemble the chain.
    ///
    /// Requires a validated layout. The returned chain is independent of
    /// this handle.
    pub fn assemble(&mut self) -> Result<MpoChain> {
        let (container, descriptor) = self.validated("assemble")?;
        let chain = assemble(container, descriptor)?;
        self.state = ReaderState::Assembled;
        Ok(chain)
    }

    /// Decode a single site. Requires a validated layout.
    pub fn decode_site(&self, site: usize) -> Result<TensorCore> {
        let (container, descriptor) = self.validated("decode a site")?;
        decode_core(container, descriptor, site)
    }

    /// Switch to another root group, discarding the cached descriptor.
    ///
    /// On success the handle is back in the `Opened` state. If `root` does
    /// not exist the handle is left as it was.
    pub fn reroot(&mut self, root: &str) -> Result<()> {
        let container = self.open_container("reroot")?;
        let root = normalize(root);
        if !container.has_group(&root) {
            return Err(ReadMpoError::container(
                &root,
                format!("root group not found in {}", container.describe()),
            ));
        }
        info!(from = %self.root, to = %root, "rerooting MPO reader");
        self.root = root;
        self.descriptor = None;
        self.state = ReaderState::Opened;
        Ok(())
    }

    /// Release the container. Calling this again is a no-op.
    pub fn close(&mut self) {
        if self.container.take().is_some() {
            debug!(root = %self.root, "closed MPO reader");
        }
        self.descriptor = None;
        self.state = ReaderState::Closed;
    }

    /// Release the container and return it.
    pub fn into_container(self) -> Option<C> {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{AttrValue, ContainerSink, CountingContainer, MemoryContainer};
    use crate::dtype::TypedBuffer;
    use crate::error::ErrorKind;

    fn two_roots() -> MemoryContainer {
        let mut c = MemoryContainer::new();
        for root in ["/good", "/bad"] {
            c.create_group(&format!("{}/site_0", root)).unwrap();
            c.write_attribute(
                &format!("{}/site_0", root),
                "shape",
                &AttrValue::Ints(vec![2, 2]),
            )
            .unwrap();
            c.write_dataset(
                &format!("{}/site_0/data", root),
                &TypedBuffer::F64(vec![1.0, 2.0, 3.0, 4.0]),
            )
            .unwrap();
        }
        c.write_attribute("/good", "n_sites", &AttrValue::Int(1)).unwrap();
        c
    }

    fn reader(root: &str) -> MpoFile<MemoryContainer> {
        MpoFile::from_container(two_roots(), root, SiteNaming::default()).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let mut file = reader("/good");
        assert_eq!(file.state(), ReaderState::Opened);

        let desc = file.validate().unwrap().clone();
        assert_eq!(file.state(), ReaderState::Validated);
        assert_eq!(file.validate().unwrap(), &desc);

        let chain = file.assemble().unwrap();
        assert_eq!(file.state(), ReaderState::Assembled);
        assert_eq!(file.validate().unwrap(), &desc);
        assert_eq!(file.state(), ReaderState::Assembled);
        assert_eq!(file.assemble().unwrap(), chain);

        file.close();
        assert_eq!(file.state(), ReaderState::Closed);
        file.close();
        assert_eq!(file.state(), ReaderState::Closed);
        assert_eq!(chain.core(0).unwrap().as_slice::<f64>().unwrap()[3], 4.0);
    }

    #[test]
    fn test_assemble_before_validate() {
        let mut file = reader("/good");
        let err = file.assemble().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(err.to_string(), "Invalid state: cannot assemble while opened");
        assert!(file.decode_site(0).is_err());
    }

    #[test]
    fn test_closed_handle_rejects_operations() {
        let mut file = reader("/good");
        file.close();
        assert_eq!(file.validate().unwrap_err().kind(), ErrorKind::State);
        assert_eq!(file.assemble().unwrap_err().kind(), ErrorKind::State);
        assert_eq!(file.reroot("/good").unwrap_err().kind(), ErrorKind::State);
        assert_eq!(file.decode_site(0).unwrap_err().kind(), ErrorKind::State);
        assert!(file.container().is_err());
    }

    #[test]
    fn test_failed_validation_keeps_state_and_reroot_recovers() {
        let mut file = reader("/bad");
        let err = file.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.is_retryable());
        assert_eq!(file.state(), ReaderState::Opened);

        assert!(file.reroot("/missing").is_err());
        assert_eq!(file.root(), "/bad");

        file.reroot("good").unwrap();
        assert_eq!(file.root(), "/good");
        assert_eq!(file.validate().unwrap().n_sites, 1);
        file.assemble().unwrap();

        file.reroot("/bad").unwrap();
        assert_eq!(file.state(), ReaderState::Opened);
        assert!(file.descriptor().is_none());
    }

    #[test]
    fn test_missing_root_fails_open() {
        let err = MpoFile::from_container(two_roots(), "/nope", SiteNaming::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Container);
    }

    #[test]
    fn test_validate_is_cached() {
        let counting = CountingContainer::new(two_roots());
        let mut file = MpoFile::from_container(&counting, "/good", SiteNaming::default()).unwrap();
        file.validate().unwrap();
        let after_first = counting.metadata_reads();
        file.validate().unwrap();
        assert_eq!(counting.metadata_reads(), after_first);
        assert_eq!(counting.payload_reads(), 0);
        file.assemble().unwrap();
        assert_eq!(counting.payload_reads(), 1);
    }
}
