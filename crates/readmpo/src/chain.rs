//! Assembly of decoded cores into an MPO chain.

use tracing::info;

use crate::container::Container;
use crate::decode::decode_core;
use crate::dtype::ElementKind;
use crate::error::{ReadMpoError, Result};
use crate::schema::SchemaDescriptor;
use crate::tensor_core::TensorCore;

/// Matrix Product Operator: an ordered chain of tensor cores.
///
/// The right bond dimension of core `i` equals the left bond dimension of
/// core `i + 1`, and both chain ends have bond dimension 1. A chain owns its
/// data and does not refer back to the container it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct MpoChain {
    cores: Vec<TensorCore>,
}

impl MpoChain {
    /// Create a chain, checking bond agreement.
    pub fn new(cores: Vec<TensorCore>) -> Result<Self> {
        check_chain(&cores)?;
        Ok(Self { cores })
    }

    /// Number of sites.
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// Always false; a chain has at least one core.
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Core at `site`.
    pub fn core(&self, site: usize) -> Result<&TensorCore> {
        self.cores.get(site).ok_or(ReadMpoError::SiteOutOfRange {
            site,
            n_sites: self.cores.len(),
        })
    }

    /// All cores in site order.
    pub fn cores(&self) -> &[TensorCore] {
        &self.cores
    }

    /// Iterate over the cores in site order.
    pub fn iter(&self) -> std::slice::Iter<'_, TensorCore> {
        self.cores.iter()
    }

    /// Consume the chain, returning its cores.
    pub fn into_cores(self) -> Vec<TensorCore> {
        self.cores
    }

    /// Element kind shared by all cores.
    pub fn element_kind(&self) -> ElementKind {
        self.cores[0].kind()
    }

    /// Bond dimensions between adjacent cores.
    pub fn bond_dims(&self) -> Vec<usize> {
        self.cores.windows(2).map(|w| w[0].right_dim()).collect()
    }
}

impl<'a> IntoIterator for &'a MpoChain {
    type Item = &'a TensorCore;
    type IntoIter = std::slice::Iter<'a, TensorCore>;

    fn into_iter(self) -> Self::IntoIter {
        self.cores.iter()
    }
}

fn check_chain(cores: &[TensorCore]) -> Result<()> {
    let (Some(first), Some(last)) = (cores.first(), cores.last()) else {
        return Err(ReadMpoError::schema(None, "a chain needs at least one core"));
    };
    let n = cores.len();

    let kind = first.kind();
    if let Some(i) = cores.iter().position(|c| c.kind() != kind) {
        return Err(ReadMpoError::decode(
            Some(i),
            format!("element type {} differs from site 0 ({})", cores[i].kind(), kind),
        ));
    }

    // Inner sides must carry a bond axis.
    for (i, core) in cores.iter().enumerate() {
        if i > 0 && !core.has_left() {
            return Err(ReadMpoError::schema(Some(i), "core has no left bond axis"));
        }
        if i + 1 < n && !core.has_right() {
            return Err(ReadMpoError::schema(Some(i), "core has no right bond axis"));
        }
    }

    if first.left_dim() != 1 {
        return Err(ReadMpoError::InvalidBoundary {
            site: 0,
            side: "left",
            dim: first.left_dim(),
        });
    }
    if last.right_dim() != 1 {
        return Err(ReadMpoError::InvalidBoundary {
            site: n - 1,
            side: "right",
            dim: last.right_dim(),
        });
    }

    for (boundary, pair) in cores.windows(2).enumerate() {
        if pair[0].right_dim() != pair[1].left_dim() {
            return Err(ReadMpoError::Consistency {
                boundary,
                left_right: pair[0].right_dim(),
                right_left: pair[1].left_dim(),
            });
        }
    }
    Ok(())
}

/// Decode every site described by `descriptor` and assemble the chain.
///
/// Sites are decoded in index order. On any failure the cores decoded so
/// far are dropped and the error is returned.
pub fn assemble<C: Container>(container: &C, descriptor: &SchemaDescriptor) -> Result<MpoChain> {
    let cores = (0..descriptor.n_sites)
        .map(|site| decode_core(container, descriptor, site))
        .collect::<Result<Vec<_>>>()?;
    let chain = MpoChain::new(cores)?;
    info!(
        n_sites = chain.len(),
        bonds = ?chain.bond_dims(),
        element = %chain.element_kind(),
        "assembled MPO chain"
    );
    Ok(chain)
}
