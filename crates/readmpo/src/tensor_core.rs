//! Decoded tensor cores.

use ndarray::{ArrayViewD, IxDyn};
use std::fmt;

use crate::dtype::{checked_nbytes, Element, ElementKind, TypedBuffer};
use crate::error::{ReadMpoError, Result};

/// Role of one axis of a tensor core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexLabel {
    /// Bond to the previous site
    LeftBond,
    /// Physical index; `0` is the output index, `1` the input index
    Physical(usize),
    /// Bond to the next site
    RightBond,
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftBond => f.write_str("left"),
            Self::Physical(k) => write!(f, "phys{}", k),
            Self::RightBond => f.write_str("right"),
        }
    }
}

/// Labels for a core of the given rank.
///
/// A missing bond axis (at a chain end) is simply not listed; every other
/// axis is physical.
pub fn labels_for(rank: usize, has_left: bool, has_right: bool) -> Result<Vec<IndexLabel>> {
    let n_bonds = usize::from(has_left) + usize::from(has_right);
    if !(2..=4).contains(&rank) {
        return Err(ReadMpoError::decode(
            None,
            format!("rank {} is not in {{2, 3, 4}}", rank),
        ));
    }
    if rank <= n_bonds {
        return Err(ReadMpoError::decode(
            None,
            format!("rank {} leaves no physical axis", rank),
        ));
    }
    let mut labels = Vec::with_capacity(rank);
    if has_left {
        labels.push(IndexLabel::LeftBond);
    }
    labels.extend((0..rank - n_bonds).map(IndexLabel::Physical));
    if has_right {
        labels.push(IndexLabel::RightBond);
    }
    Ok(labels)
}

/// Byte strides of a contiguous row-major array.
///
/// `None` if the array would span more than `isize::MAX` bytes.
pub fn row_major_strides(shape: &[usize], itemsize: usize) -> Option<Vec<isize>> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = isize::try_from(itemsize).ok()?;
    for (stride, &dim) in strides.iter_mut().zip(shape).rev() {
        *stride = step;
        step = step.checked_mul(isize::try_from(dim).ok()?)?;
    }
    Some(strides)
}

/// One site of an MPO: a dense row-major tensor with labelled axes.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorCore {
    shape: Vec<usize>,
    strides: Vec<isize>,
    labels: Vec<IndexLabel>,
    data: TypedBuffer,
}

impl TensorCore {
    /// Create a core from row-major data.
    ///
    /// Fails if the labels do not describe `shape`, a dimension is zero, or
    /// the element count does not match.
    pub fn new(shape: Vec<usize>, labels: Vec<IndexLabel>, data: TypedBuffer) -> Result<Self> {
        let has_left = labels.first() == Some(&IndexLabel::LeftBond);
        let has_right = labels.last() == Some(&IndexLabel::RightBond);
        if labels.len() != shape.len() || labels != labels_for(shape.len(), has_left, has_right)? {
            return Err(ReadMpoError::decode(
                None,
                format!("labels {:?} do not fit shape {:?}", labels, shape),
            ));
        }
        if shape.contains(&0) {
            return Err(ReadMpoError::decode(
                None,
                format!("shape {:?} has a zero dimension", shape),
            ));
        }
        let itemsize = data.kind().size();
        let overflow = || ReadMpoError::decode(None, format!("shape {:?} overflows", shape));
        let expected = checked_nbytes(&shape, itemsize).ok_or_else(overflow)? / itemsize;
        if data.len() != expected {
            return Err(ReadMpoError::decode(
                None,
                format!(
                    "{} elements do not fill shape {:?} ({} expected)",
                    data.len(),
                    shape,
                    expected
                ),
            ));
        }
        let strides = row_major_strides(&shape, itemsize).ok_or_else(overflow)?;
        Ok(Self {
            shape,
            strides,
            labels,
            data,
        })
    }

    /// Convenience constructor deriving the labels from the bond flags.
    pub fn with_bonds(
        shape: Vec<usize>,
        has_left: bool,
        has_right: bool,
        data: impl Into<TypedBuffer>,
    ) -> Result<Self> {
        let labels = labels_for(shape.len(), has_left, has_right)?;
        Self::new(shape, labels, data.into())
    }

    /// Dimensions, in row-major axis order.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Byte strides of the row-major payload.
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// One label per axis.
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Element kind of the payload.
    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }

    /// The owned payload.
    pub fn data(&self) -> &TypedBuffer {
        &self.data
    }

    /// Consume the core, returning its payload.
    pub fn into_data(self) -> TypedBuffer {
        self.data
    }

    /// Whether the core carries a left bond axis.
    pub fn has_left(&self) -> bool {
        self.labels.first() == Some(&IndexLabel::LeftBond)
    }

    /// Whether the core carries a right bond axis.
    pub fn has_right(&self) -> bool {
        self.labels.last() == Some(&IndexLabel::RightBond)
    }

    /// Left bond dimension (1 if the axis is absent).
    pub fn left_dim(&self) -> usize {
        if self.has_left() {
            self.shape[0]
        } else {
            1
        }
    }

    /// Right bond dimension (1 if the axis is absent).
    pub fn right_dim(&self) -> usize {
        if self.has_right() {
            self.shape[self.shape.len() - 1]
        } else {
            1
        }
    }

    /// Dimensions of the physical axes.
    pub fn physical_dims(&self) -> Vec<usize> {
        self.labels
            .iter()
            .zip(&self.shape)
            .filter(|(l, _)| matches!(l, IndexLabel::Physical(_)))
            .map(|(_, &d)| d)
            .collect()
    }

    /// Elements as a slice, if they are of type `T`.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// Borrow the core as an n-dimensional array of `T`.
    pub fn view<T: Element>(&self) -> Option<ArrayViewD<'_, T>> {
        ArrayViewD::from_shape(IxDyn(&self.shape), self.as_slice::<T>()?).ok()
    }
}
