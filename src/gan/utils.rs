use std::f64::consts::TAU;

use rand::Rng;

use crate::matrix::Matrix2;

/// Draws a standard-normal sample with the Box-Muller transform.
pub fn normal_rand<R: Rng>(rng: &mut R) -> f64 {
    // (0, 1] so the logarithm stays finite
    let v1 = 1.0 - rng.gen::<f64>();
    let v2 = rng.gen::<f64>();
    (TAU * v2).cos() * (-2.0 * v1.ln()).sqrt()
}

/// Refills `z` with independent standard-normal draws.
pub fn fill_noise<R: Rng>(z: &mut Matrix2<f64>, rng: &mut R) {
    z.fill_with(|| normal_rand(rng));
}

/// He initialization: `N(0, 1) * sqrt(2 / fan_in)` for a `fan_in x fan_out` weight matrix.
pub fn he_weights<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Matrix2<f64> {
    let scale = (2.0 / fan_in as f64).sqrt();
    let mut weights = Matrix2::new(fan_in, fan_out);
    weights.fill_with(|| normal_rand(rng) * scale);
    weights
}
