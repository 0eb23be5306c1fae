use super::Matrix2;
use crate::prelude::*;
use std::ops::{Add, AddAssign, Mul, Sub};

pub trait Dot<I> {
    type Output;
    fn dot(self, rhs: I) -> Result<Self::Output>;
}

pub trait Transpose {
    fn transpose(&self) -> Self;
}

/// Selects which operand of a product is read as transposed.
/// The transpose is never materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transposition {
    /// `a · b`
    Neither,
    /// `aᵗ · b`
    Left,
    /// `a · bᵗ`
    Right,
}

impl<T: Default + Copy> Transpose for Matrix2<T> {
    fn transpose(&self) -> Self {
        let mut transposed = Matrix2::new(self.cols(), self.rows());

        for row in 0..self.rows() {
            for col in 0..self.cols() {
                transposed[(col, row)] = self[(row, col)];
            }
        }
        transposed
    }
}

/// Output shape and inner dimension of a product, or an error when the inner
/// dimensions disagree.
pub fn dot_shape<T>(
    a: &Matrix2<T>,
    b: &Matrix2<T>,
    transposition: Transposition,
) -> Result<(usize, usize, usize)> {
    let (lhs_inner, rhs_inner, rows, cols) = match transposition {
        Transposition::Neither => (a.cols(), b.rows(), a.rows(), b.cols()),
        Transposition::Left => (a.rows(), b.rows(), a.cols(), b.cols()),
        Transposition::Right => (a.cols(), b.cols(), a.rows(), b.rows()),
    };

    if lhs_inner != rhs_inner {
        return dimension_err("dot", a.dim(), b.dim());
    }

    Ok((rows, cols, lhs_inner))
}

/// Writes the product of `a` and `b` into `dst`, reading one operand as transposed
/// when asked to.
pub fn dot_into<T>(
    dst: &mut Matrix2<T>,
    a: &Matrix2<T>,
    b: &Matrix2<T>,
    transposition: Transposition,
) -> Result<()>
where
    T: Mul<Output = T> + Default + AddAssign + Copy,
{
    let (rows, cols, inner) = dot_shape(a, b, transposition)?;
    if dst.dim() != (rows, cols) {
        return dimension_err("dot", dst.dim(), (rows, cols));
    }

    let (a_cols, b_cols) = (a.cols(), b.cols());
    for r in 0..rows {
        for c in 0..cols {
            let mut sum = T::default();
            for k in 0..inner {
                sum += match transposition {
                    Transposition::Neither => a.data[r * a_cols + k] * b.data[k * b_cols + c],
                    Transposition::Left => a.data[k * a_cols + r] * b.data[k * b_cols + c],
                    Transposition::Right => a.data[r * a_cols + k] * b.data[c * b_cols + k],
                };
            }
            dst.data[r * cols + c] = sum;
        }
    }
    Ok(())
}

/// Allocating form of [`dot_into`].
pub fn dot<T>(a: &Matrix2<T>, b: &Matrix2<T>, transposition: Transposition) -> Result<Matrix2<T>>
where
    T: Mul<Output = T> + Default + AddAssign + Copy,
{
    let (rows, cols, _) = dot_shape(a, b, transposition)?;
    let mut res = Matrix2::new(rows, cols);
    dot_into(&mut res, a, b, transposition)?;
    Ok(res)
}

impl<'a, T> Dot<&Matrix2<T>> for &'a Matrix2<T>
where
    T: Mul<Output = T> + Default + AddAssign + Copy,
{
    type Output = Matrix2<T>;
    fn dot(self, rhs: &Matrix2<T>) -> Result<Self::Output> {
        dot(self, rhs, Transposition::Neither)
    }
}

/// `dst = a + b`. When `b` is a single row with `a`'s width it is broadcast
/// across every row of `a`, which is how biases are added.
pub fn sum_into<T>(dst: &mut Matrix2<T>, a: &Matrix2<T>, b: &Matrix2<T>) -> Result<()>
where
    T: Add<Output = T> + Copy,
{
    if dst.dim() != a.dim() {
        return dimension_err("sum", dst.dim(), a.dim());
    }

    if a.dim() == b.dim() {
        for (d, (&x, &y)) in dst.data.iter_mut().zip(a.data.iter().zip(&b.data)) {
            *d = x + y;
        }
    } else if b.rows() == 1 && a.cols() == b.cols() {
        let cols = a.cols();
        for (i, d) in dst.data.iter_mut().enumerate() {
            *d = a.data[i] + b.data[i % cols];
        }
    } else {
        return dimension_err("sum", a.dim(), b.dim());
    }
    Ok(())
}

fn zip_into<T, F>(
    op: &'static str,
    dst: &mut Matrix2<T>,
    a: &Matrix2<T>,
    b: &Matrix2<T>,
    f: F,
) -> Result<()>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    if a.dim() != b.dim() {
        return dimension_err(op, a.dim(), b.dim());
    }
    if dst.dim() != a.dim() {
        return dimension_err(op, dst.dim(), a.dim());
    }

    for (d, (&x, &y)) in dst.data.iter_mut().zip(a.data.iter().zip(&b.data)) {
        *d = f(x, y);
    }
    Ok(())
}

/// `dst = a - b`, identical shapes only.
pub fn sub_into<T>(dst: &mut Matrix2<T>, a: &Matrix2<T>, b: &Matrix2<T>) -> Result<()>
where
    T: Sub<Output = T> + Copy,
{
    zip_into("sub", dst, a, b, |x, y| x - y)
}

/// Elementwise product, identical shapes only.
pub fn mul_into<T>(dst: &mut Matrix2<T>, a: &Matrix2<T>, b: &Matrix2<T>) -> Result<()>
where
    T: Mul<Output = T> + Copy,
{
    zip_into("mul", dst, a, b, |x, y| x * y)
}

/// Allocating form of [`mul_into`].
pub fn mul<T>(a: &Matrix2<T>, b: &Matrix2<T>) -> Result<Matrix2<T>>
where
    T: Mul<Output = T> + Default + Copy,
{
    let mut res = Matrix2::new(a.rows(), a.cols());
    mul_into(&mut res, a, b)?;
    Ok(res)
}

/// Adds two Matrix2s element-wise, broadcasting a single-row `rhs`.
impl<'a, T> Add for &'a Matrix2<T>
where
    T: Add<Output = T> + Default + Copy,
{
    type Output = Result<Matrix2<T>>;
    fn add(self, rhs: Self) -> Self::Output {
        let mut res = Matrix2::new(self.rows(), self.cols());
        sum_into(&mut res, self, rhs)?;
        Ok(res)
    }
}

/// Subs two Matrix2s element-wise.
impl<'a, T> Sub for &'a Matrix2<T>
where
    T: Sub<Output = T> + Default + Copy,
{
    type Output = Result<Matrix2<T>>;
    fn sub(self, rhs: Self) -> Self::Output {
        let mut res = Matrix2::new(self.rows(), self.cols());
        sub_into(&mut res, self, rhs)?;
        Ok(res)
    }
}

impl<T> Matrix2<T>
where
    T: Add<Output = T> + Copy,
{
    /// `self += rhs`, broadcasting a single-row `rhs` like [`sum_into`].
    pub fn add_in_place(&mut self, rhs: &Matrix2<T>) -> Result<()> {
        if self.dim == rhs.dim {
            for (x, &y) in self.data.iter_mut().zip(&rhs.data) {
                *x = *x + y;
            }
        } else if rhs.rows() == 1 && self.cols() == rhs.cols() {
            let cols = self.cols();
            for (i, x) in self.data.iter_mut().enumerate() {
                *x = *x + rhs.data[i % cols];
            }
        } else {
            return dimension_err("sum", self.dim, rhs.dim);
        }
        Ok(())
    }
}

impl<T> Matrix2<T>
where
    T: Sub<Output = T> + Copy,
{
    /// `self -= rhs`, identical shapes only.
    pub fn sub_in_place(&mut self, rhs: &Matrix2<T>) -> Result<()> {
        if self.dim != rhs.dim {
            return dimension_err("sub", self.dim, rhs.dim);
        }
        for (x, &y) in self.data.iter_mut().zip(&rhs.data) {
            *x = *x - y;
        }
        Ok(())
    }
}

impl<T> Matrix2<T>
where
    T: Mul<Output = T> + Copy,
{
    /// Multiplies every element by `scalar`.
    pub fn scale(&mut self, scalar: T) {
        for x in &mut self.data {
            *x = *x * scalar;
        }
    }
}

/// Column sums of `a` written into the single-row `dst`.
pub fn sum_axis0_into<T>(dst: &mut Matrix2<T>, a: &Matrix2<T>) -> Result<()>
where
    T: AddAssign + Default + Copy,
{
    if dst.dim() != (1, a.cols()) {
        return dimension_err("sum_axis0", dst.dim(), (1, a.cols()));
    }

    dst.zero();
    let cols = a.cols();
    for (i, &x) in a.data.iter().enumerate() {
        dst.data[i % cols] += x;
    }
    Ok(())
}

/// Allocating form of [`sum_axis0_into`].
pub fn sum_axis0<T>(a: &Matrix2<T>) -> Matrix2<T>
where
    T: AddAssign + Default + Copy,
{
    let mut res = Matrix2::new(1, a.cols());
    for (i, &x) in a.data.iter().enumerate() {
        res.data[i % a.cols()] += x;
    }
    res
}

/// Sum of every element divided by the row count. Only a true mean when
/// the matrix has a single column.
pub fn mean(a: &Matrix2<f64>) -> f64 {
    a.data.iter().sum::<f64>() / a.rows() as f64
}

/// Copies `dst.rows()` consecutive rows of `src`, starting at `row_offset`, into `dst`.
pub fn copy_batch<T: Copy>(dst: &mut Matrix2<T>, src: &Matrix2<T>, row_offset: usize) -> Result<()> {
    if dst.cols() != src.cols() || row_offset + dst.rows() > src.rows() {
        return dimension_err("copy_batch", dst.dim(), src.dim());
    }

    let start = row_offset * src.cols();
    let len = dst.data.len();
    dst.data.copy_from_slice(&src.data[start..start + len]);
    Ok(())
}
