//! Process-local column-major buffers
//!
//! [`Matrix`] owns its storage. [`MatrixRef`] and [`MatrixMut`] borrow a
//! rectangle of some buffer together with its leading dimension, so a view
//! of a view costs nothing and never copies.

use crate::dtype::Element;
use std::fmt;

#[inline]
fn span_len(height: usize, width: usize, ldim: usize) -> usize {
    if height == 0 || width == 0 {
        0
    } else {
        (width - 1) * ldim + height
    }
}

/// An owned column-major matrix
#[derive(Clone, PartialEq)]
pub struct Matrix<T> {
    data: Vec<T>,
    height: usize,
    width: usize,
    ldim: usize,
}

impl<T: Element> Matrix<T> {
    /// Zero-filled `height × width` matrix
    pub fn zeros(height: usize, width: usize) -> Self {
        let ldim = height.max(1);
        Self {
            data: vec![T::zero(); ldim * width],
            height,
            width,
            ldim,
        }
    }

    /// Matrix whose entry (i, j) is `f(i, j)`
    pub fn from_fn(height: usize, width: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut m = Self::zeros(height, width);
        for j in 0..width {
            for i in 0..height {
                m.data[i + j * m.ldim] = f(i, j);
            }
        }
        m
    }

    /// Wrap column-major data with `ldim == max(1, height)`
    pub fn from_col_major(height: usize, width: usize, data: Vec<T>) -> Self {
        let ldim = height.max(1);
        assert_eq!(
            data.len(),
            height * width,
            "{height}x{width} matrix needs {} entries",
            height * width
        );
        if height == 0 {
            return Self::zeros(0, width);
        }
        Self {
            data,
            height,
            width,
            ldim,
        }
    }

    /// Reallocate to `height × width`, zero-filled
    pub fn resize(&mut self, height: usize, width: usize) {
        if height == self.height && width == self.width {
            return;
        }
        *self = Self::zeros(height, width);
    }

    /// Number of rows
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Leading dimension
    #[inline]
    pub fn ldim(&self) -> usize {
        self.ldim
    }

    /// Underlying storage
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Entry (i, j)
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(i < self.height && j < self.width, "({i}, {j}) out of bounds");
        self.data[i + j * self.ldim]
    }

    /// Overwrite entry (i, j)
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        assert!(i < self.height && j < self.width, "({i}, {j}) out of bounds");
        self.data[i + j * self.ldim] = value;
    }

    /// Borrow the whole matrix
    #[inline]
    pub fn as_ref(&self) -> MatrixRef<'_, T> {
        MatrixRef {
            data: &self.data,
            height: self.height,
            width: self.width,
            ldim: self.ldim,
        }
    }

    /// Mutably borrow the whole matrix
    #[inline]
    pub fn as_mut(&mut self) -> MatrixMut<'_, T> {
        MatrixMut {
            data: &mut self.data,
            height: self.height,
            width: self.width,
            ldim: self.ldim,
        }
    }
}

impl<T: Element> fmt::Debug for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// A read-only borrow of a column-major rectangle
#[derive(Copy, Clone)]
pub struct MatrixRef<'a, T> {
    data: &'a [T],
    height: usize,
    width: usize,
    ldim: usize,
}

impl<'a, T: Element> MatrixRef<'a, T> {
    /// Borrow `data` as a `height × width` matrix with leading dimension `ldim`
    pub fn from_slice(data: &'a [T], height: usize, width: usize, ldim: usize) -> Self {
        assert!(ldim >= height.max(1), "leading dimension {ldim} below height {height}");
        let needed = span_len(height, width, ldim);
        assert!(data.len() >= needed, "slice of {} entries cannot hold {needed}", data.len());
        Self {
            data: &data[..needed],
            height,
            width,
            ldim,
        }
    }

    /// Number of rows
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Leading dimension
    #[inline]
    pub fn ldim(&self) -> usize {
        self.ldim
    }

    /// Entry (i, j)
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.height && j < self.width, "({i}, {j}) out of bounds");
        self.data[i + j * self.ldim]
    }

    /// Column `j` as a contiguous slice
    #[inline]
    pub fn col(&self, j: usize) -> &'a [T] {
        assert!(j < self.width, "column {j} out of bounds");
        if self.height == 0 {
            return &[];
        }
        &self.data[j * self.ldim..j * self.ldim + self.height]
    }

    /// Sub-rectangle starting at (i, j)
    pub fn view(&self, i: usize, j: usize, height: usize, width: usize) -> MatrixRef<'a, T> {
        assert!(
            i + height <= self.height && j + width <= self.width,
            "view [{i}, {}) x [{j}, {}) exceeds {}x{}",
            i + height,
            j + width,
            self.height,
            self.width
        );
        let len = span_len(height, width, self.ldim);
        let data = if len == 0 {
            &[][..]
        } else {
            let offset = i + j * self.ldim;
            &self.data[offset..offset + len]
        };
        MatrixRef {
            data,
            height,
            width,
            ldim: self.ldim,
        }
    }

    /// Copy into an owned matrix
    pub fn to_owned(&self) -> Matrix<T> {
        Matrix::from_fn(self.height, self.width, |i, j| self.get(i, j))
    }

    /// Append the entries column by column to `out`
    pub fn pack_into(&self, out: &mut Vec<T>) {
        for j in 0..self.width {
            out.extend_from_slice(self.col(j));
        }
    }
}

impl<T: Element> fmt::Debug for MatrixRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for i in 0..self.height {
            let row: Vec<T> = (0..self.width).map(|j| self.get(i, j)).collect();
            list.entry(&row);
        }
        list.finish()
    }
}

/// A mutable borrow of a column-major rectangle
pub struct MatrixMut<'a, T> {
    data: &'a mut [T],
    height: usize,
    width: usize,
    ldim: usize,
}

impl<'a, T: Element> MatrixMut<'a, T> {
    /// Borrow `data` as a `height × width` matrix with leading dimension `ldim`
    pub fn from_slice(data: &'a mut [T], height: usize, width: usize, ldim: usize) -> Self {
        assert!(ldim >= height.max(1), "leading dimension {ldim} below height {height}");
        let needed = span_len(height, width, ldim);
        assert!(data.len() >= needed, "slice of {} entries cannot hold {needed}", data.len());
        Self {
            data: &mut data[..needed],
            height,
            width,
            ldim,
        }
    }

    /// Number of rows
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Leading dimension
    #[inline]
    pub fn ldim(&self) -> usize {
        self.ldim
    }

    /// Entry (i, j)
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.height && j < self.width, "({i}, {j}) out of bounds");
        self.data[i + j * self.ldim]
    }

    /// Overwrite entry (i, j)
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        debug_assert!(i < self.height && j < self.width, "({i}, {j}) out of bounds");
        self.data[i + j * self.ldim] = value;
    }

    /// Add `value` to entry (i, j)
    #[inline]
    pub fn update(&mut self, i: usize, j: usize, value: T) {
        debug_assert!(i < self.height && j < self.width, "({i}, {j}) out of bounds");
        let entry = &mut self.data[i + j * self.ldim];
        *entry = *entry + value;
    }

    /// Column `j` as a contiguous mutable slice
    #[inline]
    pub fn col_mut(&mut self, j: usize) -> &mut [T] {
        assert!(j < self.width, "column {j} out of bounds");
        if self.height == 0 {
            return &mut [];
        }
        let start = j * self.ldim;
        &mut self.data[start..start + self.height]
    }

    /// Reborrow read-only
    #[inline]
    pub fn rb(&self) -> MatrixRef<'_, T> {
        MatrixRef {
            data: &*self.data,
            height: self.height,
            width: self.width,
            ldim: self.ldim,
        }
    }

    /// Reborrow mutably for a shorter lifetime
    #[inline]
    pub fn rb_mut(&mut self) -> MatrixMut<'_, T> {
        MatrixMut {
            data: &mut *self.data,
            height: self.height,
            width: self.width,
            ldim: self.ldim,
        }
    }

    /// Consume into a sub-rectangle starting at (i, j)
    pub fn into_view(self, i: usize, j: usize, height: usize, width: usize) -> MatrixMut<'a, T> {
        assert!(
            i + height <= self.height && j + width <= self.width,
            "view [{i}, {}) x [{j}, {}) exceeds {}x{}",
            i + height,
            j + width,
            self.height,
            self.width
        );
        let len = span_len(height, width, self.ldim);
        let data = if len == 0 {
            &mut [][..]
        } else {
            let offset = i + j * self.ldim;
            &mut self.data[offset..offset + len]
        };
        MatrixMut {
            data,
            height,
            width,
            ldim: self.ldim,
        }
    }

    /// Sub-rectangle starting at (i, j)
    pub fn view_mut(&mut self, i: usize, j: usize, height: usize, width: usize) -> MatrixMut<'_, T> {
        self.rb_mut().into_view(i, j, height, width)
    }

    /// Storage, height, width and leading dimension
    pub(crate) fn into_raw(self) -> (&'a mut [T], usize, usize, usize) {
        (self.data, self.height, self.width, self.ldim)
    }

    /// Split into the columns before `j` and the columns from `j` on
    pub fn split_cols_mut(self, j: usize) -> (MatrixMut<'a, T>, MatrixMut<'a, T>) {
        assert!(j <= self.width, "split column {j} exceeds width {}", self.width);
        let (height, width, ldim) = (self.height, self.width, self.ldim);
        let cut = (j * ldim).min(self.data.len());
        let (left, right) = self.data.split_at_mut(cut);
        (
            MatrixMut {
                data: left,
                height,
                width: j,
                ldim,
            },
            MatrixMut {
                data: right,
                height,
                width: width - j,
                ldim,
            },
        )
    }

    /// Set every entry to `value`
    pub fn fill(&mut self, value: T) {
        for j in 0..self.width {
            self.col_mut(j).fill(value);
        }
    }

    /// Copy entries from a matrix of the same shape
    pub fn copy_from(&mut self, src: MatrixRef<'_, T>) {
        assert_eq!(
            (self.height, self.width),
            (src.height(), src.width()),
            "copy between differently shaped matrices"
        );
        for j in 0..self.width {
            self.col_mut(j).copy_from_slice(src.col(j));
        }
    }

    /// Overwrite from column-major packed entries; returns the count consumed
    pub fn unpack_from(&mut self, packed: &[T]) -> usize {
        let h = self.height;
        for j in 0..self.width {
            self.col_mut(j).copy_from_slice(&packed[j * h..(j + 1) * h]);
        }
        h * self.width
    }
}

impl<T: Element> fmt::Debug for MatrixMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rb().fmt(f)
    }
}
