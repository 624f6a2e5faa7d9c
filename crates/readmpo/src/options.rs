//! Load options.

use crate::layout::{SiteNaming, DEFAULT_ROOT};

/// Options for [`crate::load`] and [`crate::MpoFile::open_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Group holding the MPO.
    /// Default: `"/mpo"`
    pub root_group: String,

    /// Export every core as soon as the chain is loaded, instead of on
    /// first access.
    /// Default: false
    pub eager: bool,

    /// Naming convention of the site groups.
    /// Default: `site_0`, `site_1`, ...
    pub naming: SiteNaming,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            root_group: DEFAULT_ROOT.to_string(),
            eager: false,
            naming: SiteNaming::default(),
        }
    }
}

impl LoadOptions {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root group.
    pub fn with_root_group(mut self, root_group: impl Into<String>) -> Self {
        self.root_group = root_group.into();
        self
    }

    /// Enable eager export.
    pub fn with_eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Set the site naming convention.
    pub fn with_naming(mut self, naming: SiteNaming) -> Self {
        self.naming = naming;
        self
    }
}
