//! Elementwise activation and loss functions over `Matrix2<f64>`.
//!
//! Every function comes in an `_into` form writing into a destination of the
//! same shape and an allocating form returning a new matrix.

use super::Matrix2;
use crate::prelude::*;

pub fn sigmoid_scalar(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn leaky_relu_scalar(x: f64, alpha: f64) -> f64 {
    x.max(x * alpha)
}

/// Derivative of sigmoid expressed through its output `y = sigmoid(x)`.
pub fn dsigmoid_scalar(y: f64) -> f64 {
    y * (1.0 - y)
}

pub fn dleaky_relu_scalar(x: f64, alpha: f64) -> f64 {
    if x >= 0.0 {
        1.0
    } else {
        alpha
    }
}

pub fn dtanh_scalar(x: f64) -> f64 {
    let t = x.tanh();
    1.0 - t * t
}

/// `-log(label) - log(1 - pred)`
pub fn cross_entropy_scalar(pred: f64, label: f64) -> f64 {
    -label.ln() - (1.0 - pred).ln()
}

/// Writes `f` of every element of `a` into `dst`.
pub fn map_into<F: Fn(f64) -> f64>(
    op: &'static str,
    dst: &mut Matrix2<f64>,
    a: &Matrix2<f64>,
    f: F,
) -> Result<()> {
    if dst.dim() != a.dim() {
        return dimension_err(op, dst.dim(), a.dim());
    }
    for (d, &x) in dst.data.iter_mut().zip(&a.data) {
        *d = f(x);
    }
    Ok(())
}

pub fn map<F: Fn(f64) -> f64>(a: &Matrix2<f64>, f: F) -> Matrix2<f64> {
    Matrix2 {
        data: a.data.iter().map(|&x| f(x)).collect(),
        dim: a.dim(),
    }
}

pub fn sigmoid_into(dst: &mut Matrix2<f64>, a: &Matrix2<f64>) -> Result<()> {
    map_into("sigmoid", dst, a, sigmoid_scalar)
}

pub fn sigmoid(a: &Matrix2<f64>) -> Matrix2<f64> {
    map(a, sigmoid_scalar)
}

pub fn leaky_relu_into(dst: &mut Matrix2<f64>, a: &Matrix2<f64>, alpha: f64) -> Result<()> {
    map_into("leaky_relu", dst, a, |x| leaky_relu_scalar(x, alpha))
}

pub fn leaky_relu(a: &Matrix2<f64>, alpha: f64) -> Matrix2<f64> {
    map(a, |x| leaky_relu_scalar(x, alpha))
}

pub fn tanh_into(dst: &mut Matrix2<f64>, a: &Matrix2<f64>) -> Result<()> {
    map_into("tanh", dst, a, f64::tanh)
}

pub fn tanh(a: &Matrix2<f64>) -> Matrix2<f64> {
    map(a, f64::tanh)
}

/// Expects sigmoid *outputs*, not pre-activations.
pub fn dsigmoid_into(dst: &mut Matrix2<f64>, y: &Matrix2<f64>) -> Result<()> {
    map_into("dsigmoid", dst, y, dsigmoid_scalar)
}

pub fn dsigmoid(y: &Matrix2<f64>) -> Matrix2<f64> {
    map(y, dsigmoid_scalar)
}

pub fn dleaky_relu_into(dst: &mut Matrix2<f64>, x: &Matrix2<f64>, alpha: f64) -> Result<()> {
    map_into("dleaky_relu", dst, x, |x| dleaky_relu_scalar(x, alpha))
}

pub fn dleaky_relu(x: &Matrix2<f64>, alpha: f64) -> Matrix2<f64> {
    map(x, |x| dleaky_relu_scalar(x, alpha))
}

pub fn dtanh_into(dst: &mut Matrix2<f64>, x: &Matrix2<f64>) -> Result<()> {
    map_into("dtanh", dst, x, dtanh_scalar)
}

pub fn dtanh(x: &Matrix2<f64>) -> Matrix2<f64> {
    map(x, dtanh_scalar)
}

/// Elementwise [`cross_entropy_scalar`] of two same-shaped matrices.
pub fn cross_entropy_into(
    dst: &mut Matrix2<f64>,
    pred: &Matrix2<f64>,
    labels: &Matrix2<f64>,
) -> Result<()> {
    if pred.dim() != labels.dim() {
        return dimension_err("cross_entropy", pred.dim(), labels.dim());
    }
    if dst.dim() != pred.dim() {
        return dimension_err("cross_entropy", dst.dim(), pred.dim());
    }
    for (d, (&p, &l)) in dst.data.iter_mut().zip(pred.data.iter().zip(&labels.data)) {
        *d = cross_entropy_scalar(p, l);
    }
    Ok(())
}

pub fn cross_entropy(pred: &Matrix2<f64>, labels: &Matrix2<f64>) -> Result<Matrix2<f64>> {
    let mut res = Matrix2::new(pred.rows(), pred.cols());
    cross_entropy_into(&mut res, pred, labels)?;
    Ok(res)
}

/// Elementwise `-log(pred)`.
pub fn neg_log_into(dst: &mut Matrix2<f64>, pred: &Matrix2<f64>) -> Result<()> {
    map_into("neg_log", dst, pred, |x| -x.ln())
}

pub fn neg_log(pred: &Matrix2<f64>) -> Matrix2<f64> {
    map(pred, |x| -x.ln())
}
