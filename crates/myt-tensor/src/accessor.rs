//! Typed, rank-aware element access for host-resident tensors.
//!
//! An [`Accessor`] is created from a tensor with a compile-time rank and
//! indexes with fixed-size arrays. [`Accessor::at`] starts nested indexing
//! (`acc.at(i)?.at(j)?.element()?`), each step dropping one dimension.
//! Elements are handed out as `&Cell<T>`, so aliased tensors can be read and
//! written without unsafe code.

use std::cell::Cell;

use crate::dtype::Element;
use crate::error::{Result, TensorError};
use crate::tensor::Tensor;

/// Typed accessor of rank `R` over a tensor's elements.
#[derive(Debug, Clone, Copy)]
pub struct Accessor<'t, T: Element, const R: usize> {
    view: AccessorView<'t, T>,
}

impl<'t, T: Element, const R: usize> Accessor<'t, T, R> {
    pub(crate) fn new(tensor: &'t Tensor) -> Result<Self> {
        let rank = tensor.shape().ndim();
        if rank != R {
            return Err(TensorError::RankMismatch {
                expected: rank,
                got: R,
            });
        }
        Ok(Accessor {
            view: AccessorView {
                cells: tensor.cells::<T>()?,
                dims: tensor.shape().dims(),
            },
        })
    }

    pub fn rank(&self) -> usize {
        R
    }

    pub fn dims(&self) -> &'t [usize] {
        self.view.dims
    }

    /// The element at `index`.
    pub fn cell(&self, index: [usize; R]) -> Result<&'t Cell<T>> {
        self.view.cell(&index)
    }

    pub fn get(&self, index: [usize; R]) -> Result<T> {
        Ok(self.cell(index)?.get())
    }

    pub fn set(&self, index: [usize; R], value: T) -> Result<()> {
        self.cell(index)?.set(value);
        Ok(())
    }

    /// Fixes the leading index, starting a nested lookup.
    pub fn at(&self, index: usize) -> Result<AccessorView<'t, T>> {
        self.view.at(index)
    }
}

/// A partially indexed accessor with a run-time rank.
#[derive(Debug, Clone, Copy)]
pub struct AccessorView<'t, T: Element> {
    cells: &'t [Cell<T>],
    dims: &'t [usize],
}

impl<'t, T: Element> AccessorView<'t, T> {
    /// Number of indices still needed to reach an element.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &'t [usize] {
        self.dims
    }

    pub fn at(&self, index: usize) -> Result<AccessorView<'t, T>> {
        let (&size, rest) = self
            .dims
            .split_first()
            .ok_or(TensorError::IndexOutOfBounds { index, size: 0 })?;
        if index >= size {
            return Err(TensorError::IndexOutOfBounds { index, size });
        }
        let stride = self.cells.len() / size;
        Ok(AccessorView {
            cells: &self.cells[index * stride..(index + 1) * stride],
            dims: rest,
        })
    }

    /// The single element of a fully indexed (rank 0) view.
    pub fn element(&self) -> Result<&'t Cell<T>> {
        if !self.dims.is_empty() {
            return Err(TensorError::RankMismatch {
                expected: 0,
                got: self.dims.len(),
            });
        }
        self.cells
            .first()
            .ok_or(TensorError::IndexOutOfBounds { index: 0, size: 0 })
    }

    pub fn get(&self) -> Result<T> {
        Ok(self.element()?.get())
    }

    pub fn set(&self, value: T) -> Result<()> {
        self.element()?.set(value);
        Ok(())
    }

    /// Resolves a full index (one entry per remaining dimension).
    pub fn cell(&self, index: &[usize]) -> Result<&'t Cell<T>> {
        if index.len() != self.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                got: index.len(),
            });
        }
        index
            .iter()
            .try_fold(*self, |view, &i| view.at(i))?
            .element()
    }
}
