//! Tensor API.
//!
//! Tensors are the inputs and outputs of the landmark networks: one image tensor goes in, a few
//! tensors of box, landmark and score values come out.

use std::fmt;

use tinyvec::TinyVec;

use crate::iter::zip_exact;

#[derive(Clone)]
struct Layout(TinyVec<[usize; 8]>);

impl Layout {
    fn from_shape(shape: &[usize]) -> Self {
        let mut vec = TinyVec::from(shape);
        vec.extend(shape.iter().map(|_| 0));

        let mut stride = 1;
        for (out, size) in zip_exact(
            vec[shape.len()..].iter_mut().rev(),
            shape.iter().copied().rev(),
        ) {
            *out = stride;
            stride *= size;
        }

        Self(vec)
    }

    fn shape(&self) -> &[usize] {
        &self.0[..self.0.len() / 2]
    }

    fn elements(&self) -> usize {
        self.shape().iter().product()
    }

    fn strides(&self) -> &[usize] {
        &self.0[self.0.len() / 2..]
    }

    fn remove_prefix(&self, num: usize) -> Layout {
        assert!(num <= self.shape().len());

        let mut vec = TinyVec::with_capacity((self.shape().len() - num) * 2);
        vec.extend(self.shape()[num..].iter().copied());
        vec.extend(self.strides()[num..].iter().copied());
        Layout(vec)
    }
}

/// Iterates over all index vectors of a shape, last dimension fastest.
struct ShapeIndices<const N: usize> {
    shape: [usize; N],
    next: Option<[usize; N]>,
}

impl<const N: usize> ShapeIndices<N> {
    fn new(shape: [usize; N]) -> Self {
        let empty = shape.iter().any(|&x| x == 0);
        Self {
            shape,
            next: if empty { None } else { Some([0; N]) },
        }
    }
}

impl<const N: usize> Iterator for ShapeIndices<N> {
    type Item = [usize; N];

    fn next(&mut self) -> Option<[usize; N]> {
        let current = self.next?;

        let mut following = current;
        let mut carry = true;
        for (index, &size) in following.iter_mut().zip(&self.shape).rev() {
            if *index + 1 == size {
                *index = 0;
            } else {
                *index += 1;
                carry = false;
                break;
            }
        }
        self.next = if carry { None } else { Some(following) };

        Some(current)
    }
}

/// A dynamically sized `f32` tensor.
///
/// Through [`Tensor::index`] it is possible to create a [`TensorView`] that refers to a specific
/// suffix of a tensor. One-dimensional data is accessed with `as_slice`, zero-dimensional data with
/// `as_singular`.
#[derive(Clone)]
pub struct Tensor {
    layout: Layout,
    data: Box<[f32]>,
}

/// A borrowed view into a [`Tensor`].
#[derive(Clone)]
pub struct TensorView<'a> {
    layout: Layout,
    data: &'a [f32],
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// `f` is invoked with successive indices, starting with `[0, ..., 0, 0]`, then
    /// `[0, ..., 0, 1]` and so on.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        f: F,
    ) -> Self {
        let data: Box<[f32]> = ShapeIndices::new(shape).map(f).collect();
        Self {
            layout: Layout::from_shape(&shape),
            data,
        }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as specified by `shape`.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let layout = Layout::from_shape(shape);
        let data: Box<_> = iter.into_iter().collect();
        assert_eq!(data.len(), layout.elements());
        Self { layout, data }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?;
        Ok(Self::from_iter(tract.shape(), data.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            self.shape(),
            &self.data,
        )?)
    }

    /// Returns the shape of this tensor.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Returns the number of dimensions of this tensor.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the tensor's dimensions with `indices`.
    ///
    /// Indexing a tensor of shape `[2, 3, 4, 5]` with `[a, b]` returns a view of shape `[4, 5]`.
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        self.as_view().index(indices)
    }

    /// Iterates over the outermost dimension of this tensor.
    #[track_caller]
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> {
        assert!(
            self.rank() > 0,
            "attempted to iterate over 0-dimensional tensor"
        );
        (0..self.shape()[0]).map(|index| self.index([index]))
    }

    /// Returns the values stored in a 1-dimensional tensor as a slice.
    #[track_caller]
    pub fn as_slice(&self) -> &[f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor of shape {:?} as slice",
            self.shape()
        );
        &self.data
    }

    fn as_view(&self) -> TensorView<'_> {
        TensorView {
            layout: self.layout.clone(),
            data: &self.data,
        }
    }
}

impl<'d> TensorView<'d> {
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the view's dimensions with `indices`.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'d> {
        assert!(
            N <= self.rank(),
            "attempted to index tensor of shape {:?} with {:?}",
            self.shape(),
            indices
        );

        let mut data = self.data;
        for ((&length, &stride), index) in self
            .layout
            .shape()
            .iter()
            .zip(self.layout.strides())
            .zip(indices)
        {
            assert!(
                index < length,
                "attempted to index tensor of shape {:?} with {:?}",
                self.shape(),
                indices
            );
            data = &data[index * stride..(index + 1) * stride];
        }
        TensorView {
            layout: self.layout.remove_prefix(N),
            data,
        }
    }

    /// Returns the values stored in a 1-dimensional view as a slice.
    #[track_caller]
    pub fn as_slice(&self) -> &'d [f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor view of shape {:?} as slice",
            self.shape()
        );
        self.data
    }

    /// Returns the value stored in a 0-dimensional view.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert_eq!(
            self.rank(),
            0,
            "attempted to access view of shape {:?} as singular element",
            self.shape(),
        );
        self.data[0]
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .finish()
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shape_fn_order() {
        let expected = [
            [0, 0, 0],
            [0, 0, 1],
            [0, 0, 2],
            [0, 1, 0],
            [0, 1, 1],
            [0, 1, 2],
        ];

        let mut iter = expected.into_iter();
        let tensor = Tensor::from_array_shape_fn([1, 2, 3], |index| {
            assert_eq!(iter.next(), Some(index));
            0.0
        });
        assert_eq!(iter.next(), None);
        assert_eq!(tensor.rank(), 3);
        assert_eq!(tensor.shape(), &[1, 2, 3]);
    }

    #[test]
    fn empty() {
        let tensor = Tensor::from_array_shape_fn([1, 2, 0, 3], |idx| unreachable!("{idx:?}"));
        assert_eq!(tensor.shape(), &[1, 2, 0, 3]);
        assert_eq!(tensor.iter().count(), 1);
        assert_eq!(tensor.index([0, 1]).shape(), &[0, 3]);
    }

    #[test]
    fn singular_shape() {
        let tensor = Tensor::from_array_shape_fn([], |[]| 1.0);
        assert_eq!(tensor.rank(), 0);
        assert_eq!(tensor.index([]).as_singular(), 1.0);
    }

    #[test]
    fn index_nested() {
        let tensor = Tensor::from_iter(&[1, 2, 3], (0..6).map(|i| i as f32));
        let row = tensor.index([0, 1]);
        assert_eq!(row.shape(), &[3]);
        assert_eq!(row.as_slice(), &[3.0, 4.0, 5.0]);
        assert_eq!(tensor.index([0]).index([1, 2]).as_singular(), 5.0);
        assert_eq!(tensor.index([0, 0, 1]).as_singular(), 1.0);
    }

    #[test]
    #[should_panic]
    fn index_out_of_bounds() {
        let tensor = Tensor::from_iter(&[2, 2], [0.0; 4]);
        tensor.index([2]);
    }

    #[test]
    fn tract_roundtrip_keeps_shape() {
        let tensor = Tensor::from_iter(&[1, 4], [1.0, 2.0, 3.0, 4.0]);
        let back = Tensor::from_tract(&tensor.to_tract().unwrap()).unwrap();
        assert_eq!(back.shape(), &[1, 4]);
        assert_eq!(back.index([0]).as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
