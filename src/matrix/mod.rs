use crate::prelude::*;
use std::ops::{Index, IndexMut};

pub mod functions;
pub mod ops;

/// Dense row-major matrix. `data.len()` is always `rows * cols`.
#[derive(Debug, PartialEq, Clone)]
pub struct Matrix2<T> {
    data: Vec<T>,
    dim: (usize, usize),
}

impl<T: Clone> Matrix2<T> {
    /// Overwrites this matrix with the contents of `other`, which must have the same shape.
    pub fn copy_from(&mut self, other: &Matrix2<T>) -> Result<()> {
        if self.dim != other.dim {
            return dimension_err("copy_from", self.dim, other.dim);
        }
        self.data.clone_from_slice(&other.data);
        Ok(())
    }
}

impl<T: Default + Clone> Matrix2<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            dim: (rows, cols),
        }
    }

    pub fn zero(&mut self) {
        for x in &mut self.data {
            *x = T::default();
        }
    }
}

impl<T> Matrix2<T> {
    pub fn from_array<const R: usize, const C: usize>(arr: [[T; C]; R]) -> Self {
        let mut data = Vec::with_capacity(R * C);

        for row in arr {
            for x in row {
                data.push(x);
            }
        }

        Self { data, dim: (R, C) }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn rows(&self) -> usize {
        self.dim.0
    }

    pub fn cols(&self) -> usize {
        self.dim.1
    }

    /// The flat row-major buffer.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.cols();
        &self.data[start..start + self.cols()]
    }

    pub fn from_row(row_vec: Vec<T>) -> Self {
        Self {
            dim: (1, row_vec.len()),
            data: row_vec,
        }
    }

    /// Wraps a flat row-major buffer. Fails unless `data.len() == rows * cols`.
    pub fn from_flat(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return dimension_err("from_flat", (rows, cols), (data.len(), 1));
        }
        Ok(Self {
            data,
            dim: (rows, cols),
        })
    }

    pub fn from_vec(vec: Vec<Vec<T>>) -> Result<Self> {
        let rows = vec.len();
        let cols = vec.first().map(|row| row.len()).unwrap_or(0);

        let mut data = Vec::with_capacity(rows * cols);
        for row in vec {
            if cols != row.len() {
                return dimension_err("from_vec", (rows, cols), (1, row.len()));
            }

            data.extend(row);
        }

        Ok(Self {
            data,
            dim: (rows, cols),
        })
    }

    pub fn to_vec(self) -> Vec<Vec<T>> {
        let cols = self.cols();
        let mut res = Vec::with_capacity(self.rows());
        let mut it = self.data.into_iter();
        for _ in 0..self.dim.0 {
            res.push(it.by_ref().take(cols).collect());
        }
        res
    }

    /// Overwrites every element with successive values of `f`, in row-major order.
    pub fn fill_with<F: FnMut() -> T>(&mut self, mut f: F) {
        for x in &mut self.data {
            *x = f();
        }
    }
}

impl Matrix2<f64> {
    pub fn frobenius_norm(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// True when no element is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

impl<T> Index<(usize, usize)> for Matrix2<T> {
    type Output = T;
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.data[i * self.cols() + j]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix2<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        let idx = i * self.cols() + j;
        &mut self.data[idx]
    }
}
