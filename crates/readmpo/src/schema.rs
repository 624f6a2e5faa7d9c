//! MPO schema validation.
//!
//! [`validate`] inspects groups, attributes and dataset metadata only. It
//! never reads a payload, so a malformed file is rejected before any data
//! is decoded.

use tracing::{debug, info};

use crate::container::{AttrValue, Container};
use crate::dtype::{checked_nbytes, ElementKind};
use crate::error::{ReadMpoError, Result};
use crate::layout::{
    join, normalize, SiteNaming, StorageOrder, DATA_DATASET, LAYOUT_ATTR, LEFT_BOND_ATTR,
    N_SITES_ATTR, RIGHT_BOND_ATTR, SHAPE_ATTR,
};
use crate::tensor_core::{labels_for, IndexLabel};

/// Validated description of one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDescriptor {
    /// 0-based site index
    pub index: usize,
    /// Path of the site group
    pub path: String,
    /// Declared dimensions
    pub shape: Vec<usize>,
    /// Declared left bond, if the site has a left bond axis
    pub left_bond: Option<usize>,
    /// Declared right bond, if the site has a right bond axis
    pub right_bond: Option<usize>,
    /// Element kind of the payload
    pub element: ElementKind,
    /// Storage order of the payload
    pub layout: StorageOrder,
    /// Names of all attributes on the site group
    pub attributes: Vec<String>,
}

impl SiteDescriptor {
    /// Path of the payload dataset.
    pub fn data_path(&self) -> String {
        join(&self.path, DATA_DATASET)
    }

    /// Number of elements in the payload, `None` if the shape overflows.
    pub fn n_elements(&self) -> Option<usize> {
        checked_nbytes(&self.shape, 1)
    }

    /// Size of the payload in bytes, `None` if the shape overflows.
    pub fn nbytes(&self) -> Option<usize> {
        checked_nbytes(&self.shape, self.element.size())
    }

    /// Axis labels implied by the declared bonds.
    pub fn labels(&self) -> Vec<IndexLabel> {
        // Checked by `validate`.
        labels_for(
            self.shape.len(),
            self.left_bond.is_some(),
            self.right_bond.is_some(),
        )
        .unwrap_or_default()
    }
}

/// Validated layout of a whole MPO container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    /// Normalized root group
    pub root: String,
    /// Number of sites
    pub n_sites: usize,
    /// Element kind shared by all sites
    pub element: ElementKind,
    /// Per-site descriptions, in site order
    pub sites: Vec<SiteDescriptor>,
    /// Names of all attributes on the root group
    pub attributes: Vec<String>,
}

impl SchemaDescriptor {
    /// Description of `site`.
    pub fn site(&self, site: usize) -> Result<&SiteDescriptor> {
        self.sites.get(site).ok_or(ReadMpoError::SiteOutOfRange {
            site,
            n_sites: self.n_sites,
        })
    }

    /// Bond dimensions between adjacent sites (`n_sites - 1` values).
    pub fn bond_dims(&self) -> Vec<usize> {
        self.sites
            .windows(2)
            .map(|w| w[0].right_bond.unwrap_or(1))
            .collect()
    }
}

fn positive(value: i64, site: Option<usize>, what: &str) -> Result<usize> {
    if value <= 0 {
        return Err(ReadMpoError::schema(
            site,
            format!("{} must be positive, found {}", what, value),
        ));
    }
    usize::try_from(value)
        .map_err(|_| ReadMpoError::schema(site, format!("{} {} is too large", what, value)))
}

fn read_int<C: Container>(c: &C, path: &str, name: &str, site: Option<usize>) -> Result<i64> {
    let value = c.read_attribute(path, name)?;
    value.as_int().ok_or_else(|| {
        ReadMpoError::schema(
            site,
            format!(
                "attribute '{}' must be an integer, found {}",
                name,
                value.type_name()
            ),
        )
    })
}

/// Read an optional bond attribute.
///
/// Required on the inner side of a site; at a chain end it may be omitted
/// or must be 1.
fn read_bond<C: Container>(
    c: &C,
    path: &str,
    name: &str,
    site: usize,
    at_end: bool,
) -> Result<Option<usize>> {
    if !c.has_attribute(path, name)? {
        if at_end {
            return Ok(None);
        }
        return Err(ReadMpoError::schema(
            Some(site),
            format!("missing attribute '{}'", name),
        ));
    }
    let dim = positive(read_int(c, path, name, Some(site))?, Some(site), name)?;
    if at_end && dim != 1 {
        return Err(ReadMpoError::schema(
            Some(site),
            format!("'{}' at the chain end must be 1, found {}", name, dim),
        ));
    }
    Ok(Some(dim))
}

fn validate_site<C: Container>(
    c: &C,
    path: String,
    index: usize,
    n_sites: usize,
) -> Result<SiteDescriptor> {
    let site = Some(index);

    if !c.has_attribute(&path, SHAPE_ATTR)? {
        return Err(ReadMpoError::schema(
            site,
            format!("missing attribute '{}'", SHAPE_ATTR),
        ));
    }
    let raw_shape = c.read_attribute(&path, SHAPE_ATTR)?;
    let raw_shape = raw_shape.as_ints().ok_or_else(|| {
        ReadMpoError::schema(
            site,
            format!(
                "attribute '{}' must be an integer vector, found {}",
                SHAPE_ATTR,
                raw_shape.type_name()
            ),
        )
    })?;
    if !(2..=4).contains(&raw_shape.len()) {
        return Err(ReadMpoError::schema(
            site,
            format!("rank {} is not in {{2, 3, 4}}", raw_shape.len()),
        ));
    }
    let shape = raw_shape
        .iter()
        .map(|&d| positive(d, site, "dimension"))
        .collect::<Result<Vec<_>>>()?;

    let left_bond = read_bond(c, &path, LEFT_BOND_ATTR, index, index == 0)?;
    let right_bond = read_bond(c, &path, RIGHT_BOND_ATTR, index, index + 1 == n_sites)?;

    let rank = shape.len();
    let n_bonds = usize::from(left_bond.is_some()) + usize::from(right_bond.is_some());
    if rank <= n_bonds {
        return Err(ReadMpoError::schema(
            site,
            format!("shape {:?} leaves no physical axis", shape),
        ));
    }
    if let Some(left) = left_bond {
        if shape[0] != left {
            return Err(ReadMpoError::schema(
                site,
                format!(
                    "left bond {} does not match first axis of shape {:?}",
                    left, shape
                ),
            ));
        }
    }
    if let Some(right) = right_bond {
        if shape[rank - 1] != right {
            return Err(ReadMpoError::schema(
                site,
                format!(
                    "right bond {} does not match last axis of shape {:?}",
                    right, shape
                ),
            ));
        }
    }

    let layout = match c.has_attribute(&path, LAYOUT_ATTR)? {
        false => StorageOrder::default(),
        true => match c.read_attribute(&path, LAYOUT_ATTR)? {
            AttrValue::Text(tag) => StorageOrder::from_tag(&tag).ok_or_else(|| {
                ReadMpoError::schema(site, format!("unknown layout '{}', expected C or F", tag))
            })?,
            other => {
                return Err(ReadMpoError::schema(
                    site,
                    format!(
                        "attribute '{}' must be a string, found {}",
                        LAYOUT_ATTR,
                        other.type_name()
                    ),
                ))
            }
        },
    };

    let data_path = join(&path, DATA_DATASET);
    if !c.has_dataset(&data_path) {
        return Err(ReadMpoError::schema(
            site,
            format!("missing dataset '{}'", DATA_DATASET),
        ));
    }
    let element = c
        .dataset_info(&data_path)
        .map_err(|e| e.at_site(index))?
        .dtype
        .kind;
    if checked_nbytes(&shape, element.size()).is_none() {
        return Err(ReadMpoError::schema(
            site,
            format!("shape {:?} overflows", shape),
        ));
    }

    Ok(SiteDescriptor {
        index,
        attributes: c.attribute_names(&path)?,
        path,
        shape,
        left_bond,
        right_bond,
        element,
        layout,
    })
}

/// Check the layout under `root` and describe it.
///
/// Checks run in this order: the root `n_sites` attribute, the set of site
/// groups, each site's attributes and dataset, and finally that every site
/// shares one element kind. The first violation is returned.
pub fn validate<C: Container>(
    container: &C,
    root: &str,
    naming: &SiteNaming,
) -> Result<SchemaDescriptor> {
    let root = normalize(root);
    if !container.has_group(&root) {
        return Err(ReadMpoError::container(&root, "root group not found"));
    }

    // (a) site count
    if !container.has_attribute(&root, N_SITES_ATTR)? {
        return Err(ReadMpoError::schema(
            None,
            format!("missing attribute '{}' on '{}'", N_SITES_ATTR, root),
        ));
    }
    let n_sites = positive(
        read_int(container, &root, N_SITES_ATTR, None)?,
        None,
        N_SITES_ATTR,
    )?;

    // (b) site groups
    for child in container.list_children(&root)? {
        if let Some(index) = naming.parse(&child) {
            if index >= n_sites {
                return Err(ReadMpoError::schema(
                    Some(index),
                    format!(
                        "unexpected site group '{}' ({} is {})",
                        child, N_SITES_ATTR, n_sites
                    ),
                ));
            }
        }
    }
    for index in 0..n_sites {
        let path = join(&root, &naming.name(index));
        if !container.has_group(&path) {
            return Err(ReadMpoError::schema(
                Some(index),
                format!("missing site group '{}'", naming.name(index)),
            ));
        }
    }

    // (c) per-site metadata
    let mut sites: Vec<SiteDescriptor> = Vec::with_capacity(n_sites);
    for index in 0..n_sites {
        let path = join(&root, &naming.name(index));
        let site = validate_site(container, path, index, n_sites)?;
        if let Some(prev) = sites.last() {
            let (left_right, right_left) = (prev.right_bond, site.left_bond);
            if left_right != right_left {
                return Err(ReadMpoError::schema(
                    Some(index),
                    format!(
                        "left bond {} does not match right bond {} of site {}",
                        right_left.unwrap_or(1),
                        left_right.unwrap_or(1),
                        prev.index
                    ),
                ));
            }
        }
        debug!(site = index, shape = ?site.shape, element = %site.element, "validated site");
        sites.push(site);
    }

    // (d) common element kind
    let element = sites[0].element;
    if let Some(odd) = sites.iter().find(|s| s.element != element) {
        return Err(ReadMpoError::schema(
            Some(odd.index),
            format!(
                "element type {} differs from site 0 ({})",
                odd.element, element
            ),
        ));
    }

    info!(root = %root, n_sites, element = %element, "validated MPO layout");
    Ok(SchemaDescriptor {
        attributes: container.attribute_names(&root)?,
        root,
        n_sites,
        element,
        sites,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerSink, CountingContainer, MemoryContainer};
    use crate::dtype::TypedBuffer;

    fn site(c: &mut MemoryContainer, i: usize, shape: &[i64], left: Option<i64>, right: Option<i64>) {
        let path = format!("/mpo/site_{}", i);
        c.create_group(&path).unwrap();
        c.write_attribute(&path, "shape", &AttrValue::Ints(shape.to_vec()))
            .unwrap();
        if let Some(l) = left {
            c.write_attribute(&path, "left_bond", &AttrValue::Int(l)).unwrap();
        }
        if let Some(r) = right {
            c.write_attribute(&path, "right_bond", &AttrValue::Int(r)).unwrap();
        }
        let n: i64 = shape.iter().product();
        c.write_dataset(&format!("{}/data", path), &TypedBuffer::F64(vec![0.0; n as usize]))
            .unwrap();
    }

    fn three_sites() -> MemoryContainer {
        let mut c = MemoryContainer::new();
        c.create_group("/mpo").unwrap();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(3)).unwrap();
        site(&mut c, 0, &[2, 4], None, Some(4));
        site(&mut c, 1, &[4, 2, 4], Some(4), Some(4));
        site(&mut c, 2, &[4, 2], Some(4), None);
        c
    }

    fn schema_err(c: &MemoryContainer) -> (Option<usize>, String) {
        match validate(c, "/mpo", &SiteNaming::default()).unwrap_err() {
            ReadMpoError::Schema { site, message } => (site, message),
            other => panic!("expected schema error, got {other}"),
        }
    }

    #[test]
    fn test_overflowing_shape() {
        let mut c = MemoryContainer::new();
        c.create_group("/mpo/site_0").unwrap();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(1)).unwrap();
        c.write_attribute(
            "/mpo/site_0",
            "shape",
            &AttrValue::Ints(vec![1 << 32, 1 << 32, 2]),
        )
        .unwrap();
        c.write_dataset("/mpo/site_0/data", &TypedBuffer::F64(Vec::new()))
            .unwrap();

        let (site, message) = schema_err(&c);
        assert_eq!(site, Some(0));
        assert!(message.contains("overflows"), "{message}");
    }

    #[test]
    fn test_valid_layout() {
        let c = CountingContainer::new(three_sites());
        let desc = validate(&c, "mpo/", &SiteNaming::default()).unwrap();
        assert_eq!(desc.root, "/mpo");
        assert_eq!(desc.n_sites, 3);
        assert_eq!(desc.element, ElementKind::Float64);
        assert_eq!(desc.bond_dims(), vec![4, 4]);
        assert_eq!(desc.sites[0].left_bond, None);
        assert_eq!(
            desc.sites[0].labels(),
            vec![IndexLabel::Physical(0), IndexLabel::RightBond]
        );
        assert_eq!(desc.sites[1].data_path(), "/mpo/site_1/data");
        assert_eq!(desc.attributes, vec!["n_sites".to_string()]);
        assert_eq!(c.payload_reads(), 0);
        assert!(matches!(
            desc.site(3),
            Err(ReadMpoError::SiteOutOfRange { site: 3, n_sites: 3 })
        ));
    }

    #[test]
    fn test_missing_n_sites() {
        let mut c = three_sites();
        c.remove_attribute("/mpo", "n_sites");
        let (site, msg) = schema_err(&c);
        assert_eq!(site, None);
        assert!(msg.contains("n_sites"));
    }

    #[test]
    fn test_non_positive_n_sites() {
        let mut c = three_sites();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(0)).unwrap();
        assert!(schema_err(&c).1.contains("must be positive"));
        c.write_attribute("/mpo", "n_sites", &AttrValue::Text("3".into()))
            .unwrap();
        assert!(schema_err(&c).1.contains("must be an integer"));
    }

    #[test]
    fn test_site_count_mismatch() {
        let mut c = three_sites();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(4)).unwrap();
        assert_eq!(schema_err(&c).0, Some(3));

        let mut c = three_sites();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(2)).unwrap();
        let (site, msg) = schema_err(&c);
        assert_eq!(site, Some(2));
        assert!(msg.contains("unexpected site group"));
    }

    #[test]
    fn test_missing_site_group() {
        let mut c = MemoryContainer::new();
        c.create_group("/mpo").unwrap();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(2)).unwrap();
        site(&mut c, 0, &[2, 1], None, Some(1));
        let (site, msg) = schema_err(&c);
        assert_eq!(site, Some(1));
        assert!(msg.contains("missing site group 'site_1'"));
    }

    #[test]
    fn test_bad_rank() {
        let mut c = three_sites();
        c.write_attribute("/mpo/site_1", "shape", &AttrValue::Ints(vec![4, 2, 2, 2, 4]))
            .unwrap();
        let (site, msg) = schema_err(&c);
        assert_eq!(site, Some(1));
        assert!(msg.contains("rank 5"));
    }

    #[test]
    fn test_bond_mismatch_between_sites() {
        let mut c = three_sites();
        c.write_attribute("/mpo/site_1", "shape", &AttrValue::Ints(vec![5, 2, 4]))
            .unwrap();
        c.write_attribute("/mpo/site_1", "left_bond", &AttrValue::Int(5))
            .unwrap();
        let counting = CountingContainer::new(c);
        let err = validate(&counting, "/mpo", &SiteNaming::default()).unwrap_err();
        assert_eq!(err.site(), Some(1));
        assert!(err.to_string().contains("does not match right bond 4"));
        assert_eq!(counting.payload_reads(), 0);
    }

    #[test]
    fn test_bond_disagrees_with_shape() {
        let mut c = three_sites();
        c.write_attribute("/mpo/site_1", "right_bond", &AttrValue::Int(3))
            .unwrap();
        assert!(schema_err(&c).1.contains("does not match last axis"));
    }

    #[test]
    fn test_missing_inner_bond() {
        let mut c = three_sites();
        c.remove_attribute("/mpo/site_1", "left_bond");
        let (site, msg) = schema_err(&c);
        assert_eq!(site, Some(1));
        assert!(msg.contains("missing attribute 'left_bond'"));
    }

    #[test]
    fn test_open_end_bond() {
        let mut c = three_sites();
        c.write_attribute("/mpo/site_0", "shape", &AttrValue::Ints(vec![2, 2, 4]))
            .unwrap();
        c.write_attribute("/mpo/site_0", "left_bond", &AttrValue::Int(2))
            .unwrap();
        assert!(schema_err(&c).1.contains("chain end must be 1"));
    }

    #[test]
    fn test_unknown_layout() {
        let mut c = three_sites();
        c.write_attribute("/mpo/site_2", "layout", &AttrValue::Text("K".into()))
            .unwrap();
        assert!(schema_err(&c).1.contains("unknown layout 'K'"));
    }

    #[test]
    fn test_missing_data() {
        let mut c = three_sites();
        c.remove_dataset("/mpo/site_2/data");
        let (site, msg) = schema_err(&c);
        assert_eq!(site, Some(2));
        assert!(msg.contains("missing dataset"));
    }

    #[test]
    fn test_mixed_element_kinds() {
        let mut c = three_sites();
        c.remove_dataset("/mpo/site_1/data");
        c.write_dataset("/mpo/site_1/data", &TypedBuffer::F32(vec![0.0; 32]))
            .unwrap();
        let (site, msg) = schema_err(&c);
        assert_eq!(site, Some(1));
        assert!(msg.contains("float32 differs from site 0 (float64)"));
    }

    #[test]
    fn test_missing_root() {
        let c = three_sites();
        let err = validate(&c, "/nope", &SiteNaming::default()).unwrap_err();
        assert!(matches!(err, ReadMpoError::Container { .. }));
    }

    #[test]
    fn test_julia_naming() {
        let mut c = MemoryContainer::new();
        c.create_group("/mpo/MPO[1]").unwrap();
        c.write_attribute("/mpo", "n_sites", &AttrValue::Int(1)).unwrap();
        c.write_attribute("/mpo/MPO[1]", "shape", &AttrValue::Ints(vec![2, 2]))
            .unwrap();
        c.write_dataset("/mpo/MPO[1]/data", &TypedBuffer::F64(vec![0.0; 4]))
            .unwrap();
        let desc = validate(&c, "/mpo", &SiteNaming::julia()).unwrap();
        assert_eq!(desc.sites[0].path, "/mpo/MPO[1]");
        assert_eq!(
            desc.sites[0].labels(),
            vec![IndexLabel::Physical(0), IndexLabel::Physical(1)]
        );
    }
}
