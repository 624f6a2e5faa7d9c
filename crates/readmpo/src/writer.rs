//! Writing chains back into containers.

use std::path::Path;
use tracing::info;

use crate::chain::MpoChain;
use crate::container::{AttrValue, ContainerSink, Hdf5Sink};
use crate::error::Result;
use crate::layout::{
    join, normalize, SiteNaming, StorageOrder, ToColMajor, DATA_DATASET, LAYOUT_ATTR,
    LEFT_BOND_ATTR, N_SITES_ATTR, RIGHT_BOND_ATTR, SHAPE_ATTR,
};

/// Write `chain` under `root` in any sink.
///
/// Layout:
/// ```text
/// <root>/
///   @n_sites
///   <site group>/
///     @shape, @left_bond, @right_bond, @layout
///     data
/// ```
/// Bond attributes are written for every bond axis a core carries.
pub fn write_chain<S: ContainerSink>(
    sink: &mut S,
    root: &str,
    chain: &MpoChain,
    naming: &SiteNaming,
    order: StorageOrder,
) -> Result<()> {
    let root = normalize(root);
    sink.create_group(&root)?;
    sink.write_attribute(&root, N_SITES_ATTR, &AttrValue::Int(chain.len() as i64))?;

    for (i, core) in chain.iter().enumerate() {
        let path = join(&root, &naming.name(i));
        sink.create_group(&path)?;

        let shape: Vec<i64> = core.shape().iter().map(|&d| d as i64).collect();
        sink.write_attribute(&path, SHAPE_ATTR, &AttrValue::Ints(shape))?;
        if core.has_left() {
            sink.write_attribute(&path, LEFT_BOND_ATTR, &AttrValue::Int(core.left_dim() as i64))?;
        }
        if core.has_right() {
            sink.write_attribute(
                &path,
                RIGHT_BOND_ATTR,
                &AttrValue::Int(core.right_dim() as i64),
            )?;
        }
        sink.write_attribute(&path, LAYOUT_ATTR, &AttrValue::Text(order.tag().to_string()))?;

        let data = match order {
            StorageOrder::RowMajor => core.data().clone(),
            StorageOrder::ColumnMajor => core
                .data()
                .clone()
                .try_map_elements(ToColMajor(core.shape()))?,
        };
        sink.write_dataset(&join(&path, DATA_DATASET), &data)?;
    }
    Ok(())
}

/// Save `chain` to a new HDF5 file under `root`, row-major.
pub fn save_chain(path: impl AsRef<Path>, root: &str, chain: &MpoChain) -> Result<()> {
    save_chain_with(path, root, chain, StorageOrder::RowMajor)
}

/// Save `chain` to a new HDF5 file under `root` in the given storage order.
pub fn save_chain_with(
    path: impl AsRef<Path>,
    root: &str,
    chain: &MpoChain,
    order: StorageOrder,
) -> Result<()> {
    let path = path.as_ref();
    let mut sink = Hdf5Sink::create(path)?;
    write_chain(&mut sink, root, chain, &SiteNaming::default(), order)?;
    info!(
        path = %path.display(),
        root,
        n_sites = chain.len(),
        layout = order.tag(),
        "saved MPO chain"
    );
    Ok(())
}
