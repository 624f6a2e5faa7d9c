//! On-disk layout of an MPO container.
//!
//! ```text
//! <root>/                       (default "/mpo")
//!   @n_sites: Int64
//!   site_0/
//!     @shape: Int64[rank]
//!     @left_bond: Int64         (optional on the first site)
//!     @right_bond: Int64        (optional on the last site)
//!     @layout: String           (optional, "C" or "F")
//!     data: Float32 | Float64 | Complex64 | Complex128
//!   site_1/ ...
//! ```
//!
//! Payloads are flat. Their axis order follows `@shape` in row-major (C)
//! order unless `@layout = "F"`, in which case they are column-major and are
//! converted on decode.

use ndarray::ArrayD;

use crate::dtype::{checked_nbytes, ElementPermutation};
use crate::error::{ReadMpoError, Result};

/// Default root group.
pub const DEFAULT_ROOT: &str = "/mpo";
/// Root attribute holding the site count.
pub const N_SITES_ATTR: &str = "n_sites";
/// Per-site attribute holding the declared shape.
pub const SHAPE_ATTR: &str = "shape";
/// Per-site attribute holding the left bond dimension.
pub const LEFT_BOND_ATTR: &str = "left_bond";
/// Per-site attribute holding the right bond dimension.
pub const RIGHT_BOND_ATTR: &str = "right_bond";
/// Per-site attribute holding the storage order.
pub const LAYOUT_ATTR: &str = "layout";
/// Per-site payload dataset.
pub const DATA_DATASET: &str = "data";

/// Naming convention for per-site groups: `{prefix}{base + i}{suffix}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteNaming {
    /// Text before the index
    pub prefix: String,
    /// Text after the index
    pub suffix: String,
    /// Index of the first site as written in the container
    pub base: usize,
}

impl Default for SiteNaming {
    fn default() -> Self {
        Self {
            prefix: "site_".to_string(),
            suffix: String::new(),
            base: 0,
        }
    }
}

impl SiteNaming {
    /// `MPO[1]`, `MPO[2]`, ... (1-indexed, ITensorMPS.jl style).
    pub fn julia() -> Self {
        Self {
            prefix: "MPO[".to_string(),
            suffix: "]".to_string(),
            base: 1,
        }
    }

    /// Group name of the `site`-th (0-based) site.
    pub fn name(&self, site: usize) -> String {
        format!("{}{}{}", self.prefix, site + self.base, self.suffix)
    }

    /// 0-based site index encoded in `name`, if it follows the convention.
    pub fn parse(&self, name: &str) -> Option<usize> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Reject "site_01" so that each site has exactly one spelling.
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        digits.parse::<usize>().ok()?.checked_sub(self.base)
    }
}

/// Order of the elements in a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageOrder {
    /// Last axis varies fastest (C order)
    #[default]
    RowMajor,
    /// First axis varies fastest (Fortran order)
    ColumnMajor,
}

impl StorageOrder {
    /// Value of the `@layout` attribute.
    pub fn tag(self) -> &'static str {
        match self {
            Self::RowMajor => "C",
            Self::ColumnMajor => "F",
        }
    }

    /// Parse a `@layout` attribute value.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "C" | "c" => Some(Self::RowMajor),
            "F" | "f" => Some(Self::ColumnMajor),
            _ => None,
        }
    }
}

/// Join an in-container path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{}/{}", parent, child.trim_start_matches('/'))
}

/// Normalize a group path to an absolute form without trailing slash.
///
/// `""`, `"/"` and `"//"` all map to `"/"`; `"mpo/"` maps to `"/mpo"`.
pub fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

/// Split a normalized path into parent and final component.
pub(crate) fn split_last(path: &str) -> (String, &str) {
    match path.rfind('/') {
        Some(0) => ("/".to_string(), &path[1..]),
        Some(i) => (path[..i].to_string(), &path[i + 1..]),
        None => ("/".to_string(), path),
    }
}

/// Convert row-major flat data to column-major flat data.
///
/// Row-major (C order): last axis varies fastest.
/// Column-major (Fortran order): first axis varies fastest.
pub(crate) fn row_major_to_col_major<T: Clone>(data: Vec<T>, dims: &[usize]) -> Result<Vec<T>> {
    if dims.is_empty() || data.len() <= 1 {
        return Ok(data);
    }
    check_len(data.len(), dims)?;
    let arr = ArrayD::from_shape_vec(dims.to_vec(), data)
        .map_err(|e| ReadMpoError::decode(None, e.to_string()))?;
    let arr_f = arr.reversed_axes();
    Ok(arr_f.iter().cloned().collect())
}

/// Convert column-major flat data to row-major flat data.
pub(crate) fn col_major_to_row_major<T: Clone>(data: Vec<T>, dims: &[usize]) -> Result<Vec<T>> {
    if dims.is_empty() || data.len() <= 1 {
        return Ok(data);
    }
    check_len(data.len(), dims)?;
    // Column-major data with dims [d0, ..., d_{n-1}] is row-major data with reversed dims.
    let reversed_dims: Vec<usize> = dims.iter().rev().copied().collect();
    let arr = ArrayD::from_shape_vec(reversed_dims, data)
        .map_err(|e| ReadMpoError::decode(None, e.to_string()))?;
    let arr_c = arr.reversed_axes();
    Ok(arr_c.iter().cloned().collect())
}

fn check_len(len: usize, dims: &[usize]) -> Result<()> {
    let expected = checked_nbytes(dims, 1)
        .ok_or_else(|| ReadMpoError::decode(None, format!("shape {:?} overflows", dims)))?;
    if len != expected {
        return Err(ReadMpoError::decode(
            None,
            format!(
                "shape mismatch: data length {} vs shape {:?} (expected {})",
                len, dims, expected
            ),
        ));
    }
    Ok(())
}

/// Column-major to row-major conversion for a fixed shape.
pub(crate) struct ToRowMajor<'a>(pub &'a [usize]);

impl ElementPermutation for ToRowMajor<'_> {
    fn apply<T: Clone>(&self, data: Vec<T>) -> Result<Vec<T>> {
        col_major_to_row_major(data, self.0)
    }
}

/// Row-major to column-major conversion for a fixed shape.
pub(crate) struct ToColMajor<'a>(pub &'a [usize]);

impl ElementPermutation for ToColMajor<'_> {
    fn apply<T: Clone>(&self, data: Vec<T>) -> Result<Vec<T>> {
        row_major_to_col_major(data, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_row_col_major_roundtrip_f64() {
        let dims = vec![2, 3];
        let row_major = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let col_major = row_major_to_col_major(row_major.clone(), &dims).unwrap();
        assert_eq!(col_major, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

        let back = col_major_to_row_major(col_major, &dims).unwrap();
        assert_eq!(back, row_major);
    }

    #[test]
    fn test_row_col_major_4d_complex() {
        let dims = vec![2, 3, 2, 4];
        let row_major: Vec<Complex64> = (0..48)
            .map(|i| Complex64::new(i as f64, -(i as f64)))
            .collect();
        let col_major = row_major_to_col_major(row_major.clone(), &dims).unwrap();
        assert_ne!(col_major, row_major);
        let back = col_major_to_row_major(col_major, &dims).unwrap();
        assert_eq!(back, row_major);
    }

    #[test]
    fn test_shape_mismatch_returns_error() {
        let result = col_major_to_row_major(vec![1.0, 2.0, 3.0], &[2, 3]);
        assert!(result.unwrap_err().to_string().contains("shape mismatch"));
    }

    #[test]
    fn test_site_naming() {
        let naming = SiteNaming::default();
        assert_eq!(naming.name(0), "site_0");
        assert_eq!(naming.parse("site_12"), Some(12));
        assert_eq!(naming.parse("site_"), None);
        assert_eq!(naming.parse("site_01"), None);
        assert_eq!(naming.parse("site_x"), None);
        assert_eq!(naming.parse("other"), None);

        let julia = SiteNaming::julia();
        assert_eq!(julia.name(0), "MPO[1]");
        assert_eq!(julia.parse("MPO[3]"), Some(2));
        assert_eq!(julia.parse("MPO[0]"), None);
    }

    #[test]
    fn test_paths() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("//"), "/");
        assert_eq!(normalize("mpo/"), "/mpo");
        assert_eq!(normalize("/a//b/"), "/a/b");
        assert_eq!(join("/", "mpo"), "/mpo");
        assert_eq!(join("/mpo", "site_0"), "/mpo/site_0");
        assert_eq!(split_last("/mpo/site_0"), ("/mpo".to_string(), "site_0"));
        assert_eq!(split_last("/mpo"), ("/".to_string(), "mpo"));
    }

    #[test]
    fn test_storage_order_tags() {
        assert_eq!(StorageOrder::from_tag("F"), Some(StorageOrder::ColumnMajor));
        assert_eq!(StorageOrder::from_tag(" C "), Some(StorageOrder::RowMajor));
        assert_eq!(StorageOrder::from_tag("K"), None);
        assert_eq!(StorageOrder::ColumnMajor.tag(), "F");
    }
}
