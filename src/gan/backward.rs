//! Backpropagation through the two coupled networks and the SGD update.
//!
//! The discriminator is trained on two sweeps per step, one for the real batch
//! and one for the generated batch, whose gradients are summed before the
//! update. The generator's gradient is obtained by running the fake sweep again
//! under the generator's loss and carrying it through the discriminator's first
//! layer, without touching the discriminator's weights.

use serde::Deserialize;

use super::{DenseLayer, Gan};
use crate::matrix::{
    functions,
    ops::{self, Transposition},
    Matrix2,
};
use crate::prelude::*;

/// Keeps `1 / a` and `1 / (1 - a)` finite when the discriminator saturates.
pub const EPSILON: f64 = 1e-8;

/// Where the real-sample sweep of the discriminator reads its intermediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealSweepBuffers {
    /// Output layer derivative at the real pre-activation. Hidden layer
    /// derivatives and the activations feeding hidden weight gradients come
    /// from the fake buffers.
    #[default]
    FakeHidden,
    /// Every value comes from the real buffers.
    Real,
}

/// Gradient mirrors of the generator's buffers.
#[derive(Debug, Clone)]
pub struct GeneratorGrads {
    pub da: Vec<Matrix2<f64>>,
    pub dz: Vec<Matrix2<f64>>,
    pub dw: Vec<Matrix2<f64>>,
    pub db: Vec<Matrix2<f64>>,
}

impl GeneratorGrads {
    pub(crate) fn new(layers: &[DenseLayer], batch_size: usize) -> Self {
        Self {
            da: activation_shapes(layers, batch_size),
            dz: activation_shapes(layers, batch_size),
            dw: weight_shapes(layers),
            db: bias_shapes(layers),
        }
    }
}

/// Gradient mirrors of the discriminator's buffers. `da`/`dz` are shared by
/// both sweeps; weight and bias gradients are kept per sweep and summed into
/// `dw_sum`/`db_sum`.
#[derive(Debug, Clone)]
pub struct DiscriminatorGrads {
    pub da: Vec<Matrix2<f64>>,
    pub dz: Vec<Matrix2<f64>>,
    pub dw_real: Vec<Matrix2<f64>>,
    pub dw_fake: Vec<Matrix2<f64>>,
    pub db_real: Vec<Matrix2<f64>>,
    pub db_fake: Vec<Matrix2<f64>>,
    pub dw_sum: Vec<Matrix2<f64>>,
    pub db_sum: Vec<Matrix2<f64>>,
    /// Gradient of the generator loss at the discriminator's input.
    pub input: Matrix2<f64>,
}

impl DiscriminatorGrads {
    pub(crate) fn new(layers: &[DenseLayer], batch_size: usize) -> Self {
        let input_width = layers.first().map_or(0, DenseLayer::input_amount);
        Self {
            da: activation_shapes(layers, batch_size),
            dz: activation_shapes(layers, batch_size),
            dw_real: weight_shapes(layers),
            dw_fake: weight_shapes(layers),
            db_real: bias_shapes(layers),
            db_fake: bias_shapes(layers),
            dw_sum: weight_shapes(layers),
            db_sum: bias_shapes(layers),
            input: Matrix2::new(batch_size, input_width),
        }
    }
}

pub(super) fn activation_shapes(layers: &[DenseLayer], batch_size: usize) -> Vec<Matrix2<f64>> {
    layers
        .iter()
        .map(|l| Matrix2::new(batch_size, l.neuron_amount()))
        .collect()
}

fn weight_shapes(layers: &[DenseLayer]) -> Vec<Matrix2<f64>> {
    layers
        .iter()
        .map(|l| Matrix2::new(l.input_amount(), l.neuron_amount()))
        .collect()
}

fn bias_shapes(layers: &[DenseLayer]) -> Vec<Matrix2<f64>> {
    layers
        .iter()
        .map(|l| Matrix2::new(1, l.neuron_amount()))
        .collect()
}

/// Carries the gradient seeded in the last entry of `da` down to every layer:
/// `da[i] = dz[i + 1] · W[i + 1]ᵗ` and `dz[i] = da[i] ⊙ φ'(site(i))`.
fn propagate<'a, F>(
    layers: &[DenseLayer],
    da: &mut [Matrix2<f64>],
    dz: &mut [Matrix2<f64>],
    site: F,
) -> Result<()>
where
    F: Fn(usize) -> &'a Matrix2<f64>,
{
    for i in (0..layers.len()).rev() {
        if i + 1 < layers.len() {
            ops::dot_into(&mut da[i], &dz[i + 1], layers[i + 1].weights(), Transposition::Right)?;
        }
        layers[i]
            .activation()
            .backward_into(&mut dz[i], &da[i], site(i))?;
    }
    Ok(())
}

/// `dw[i] = prev(i)ᵗ · dz[i]` and `db[i] = Σ_rows dz[i]`.
fn accumulate<'a, F>(
    dz: &[Matrix2<f64>],
    dw: &mut [Matrix2<f64>],
    db: &mut [Matrix2<f64>],
    prev: F,
) -> Result<()>
where
    F: Fn(usize) -> &'a Matrix2<f64>,
{
    for (i, grad) in dz.iter().enumerate() {
        ops::dot_into(&mut dw[i], prev(i), grad, Transposition::Left)?;
        ops::sum_axis0_into(&mut db[i], grad)?;
    }
    Ok(())
}

impl Gan {
    /// Backpropagates the discriminator loss over the real batch `x_real` and
    /// the generator's current output, then updates the discriminator.
    /// Expects the forward passes of the step to have run.
    pub fn backward_discriminator(&mut self, x_real: &Matrix2<f64>) -> Result<()> {
        let lr = self.hyperparameters.learning_rate;
        {
            let d = &self.discriminator;
            let fake_batch = self.generator.output();
            let grads = &mut self.discriminator_grads;
            let out = d.layers.len() - 1;

            // real sweep
            functions::map_into("real loss gradient", &mut grads.da[out], d.real.output(), |a| {
                -1.0 / (a + EPSILON)
            })?;
            let hidden = match self.real_sweep {
                RealSweepBuffers::FakeHidden => &d.fake,
                RealSweepBuffers::Real => &d.real,
            };
            propagate(&d.layers, &mut grads.da, &mut grads.dz, |i| {
                if i == out {
                    &d.real.z[i]
                } else {
                    &hidden.z[i]
                }
            })?;
            accumulate(&grads.dz, &mut grads.dw_real, &mut grads.db_real, |i| {
                if i == 0 {
                    x_real
                } else {
                    &hidden.a[i - 1]
                }
            })?;

            // fake sweep
            functions::map_into("fake loss gradient", &mut grads.da[out], d.fake.output(), |a| {
                1.0 / (1.0 - a + EPSILON)
            })?;
            propagate(&d.layers, &mut grads.da, &mut grads.dz, |i| &d.fake.z[i])?;
            accumulate(&grads.dz, &mut grads.dw_fake, &mut grads.db_fake, |i| {
                if i == 0 {
                    fake_batch
                } else {
                    &d.fake.a[i - 1]
                }
            })?;
        }

        let grads = &mut self.discriminator_grads;
        for (i, layer) in self.discriminator.layers.iter_mut().enumerate() {
            ops::sum_into(&mut grads.dw_sum[i], &grads.dw_real[i], &grads.dw_fake[i])?;
            ops::sum_into(&mut grads.db_sum[i], &grads.db_real[i], &grads.db_fake[i])?;
            layer.descend(&mut grads.dw_sum[i], &mut grads.db_sum[i], lr)?;
        }
        Ok(())
    }

    /// Backpropagates the generator loss `-log(D(G(noise)))` through the
    /// discriminator into the generator and updates the generator only.
    pub fn backward_generator(&mut self, noise: &Matrix2<f64>) -> Result<()> {
        let lr = self.hyperparameters.learning_rate;
        {
            let d = &self.discriminator;
            let dg = &mut self.discriminator_grads;
            let out = d.layers.len() - 1;

            functions::map_into("generator loss gradient", &mut dg.da[out], d.fake.output(), |a| {
                -1.0 / (a + EPSILON)
            })?;
            propagate(&d.layers, &mut dg.da, &mut dg.dz, |i| &d.fake.z[i])?;
            ops::dot_into(&mut dg.input, &dg.dz[0], d.layers[0].weights(), Transposition::Right)?;

            let g = &self.generator;
            let gg = &mut self.generator_grads;
            let g_out = g.layers.len() - 1;

            gg.da[g_out].copy_from(&dg.input)?;
            propagate(&g.layers, &mut gg.da, &mut gg.dz, |i| &g.pass.z[i])?;
            accumulate(&gg.dz, &mut gg.dw, &mut gg.db, |i| {
                if i == 0 {
                    noise
                } else {
                    &g.pass.a[i - 1]
                }
            })?;
        }

        let gg = &mut self.generator_grads;
        for (i, layer) in self.generator.layers.iter_mut().enumerate() {
            layer.descend(&mut gg.dw[i], &mut gg.db[i], lr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gan::{
        tests::{noise, real_batch, tiny_spec},
        Branch, GanSpec,
    };
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn forwarded(spec: &GanSpec, seed: u64) -> Gan {
        let mut gan = Gan::new(spec, &mut StdRng::seed_from_u64(seed)).unwrap();
        gan.forward_generator(&noise(seed + 1)).unwrap();
        gan.forward_discriminator(&real_batch(), Branch::Real).unwrap();
        gan.forward_discriminator_fake().unwrap();
        gan
    }

    fn discriminator_loss(gan: &mut Gan) -> f64 {
        gan.forward_discriminator(&real_batch(), Branch::Real).unwrap();
        gan.forward_discriminator_fake().unwrap();
        let real = gan.discriminator().output(Branch::Real);
        let fake = gan.discriminator().output(Branch::Fake);
        (0..real.rows())
            .map(|r| -real[(r, 0)].ln() - (1.0 - fake[(r, 0)]).ln())
            .sum()
    }

    fn generator_loss(gan: &mut Gan, z: &Matrix2<f64>) -> f64 {
        gan.forward_generator(z).unwrap();
        gan.forward_discriminator_fake().unwrap();
        let fake = gan.discriminator().output(Branch::Fake);
        (0..fake.rows()).map(|r| -fake[(r, 0)].ln()).sum()
    }

    #[test]
    fn train_step_keeps_shapes_and_changes_weights() {
        let spec = tiny_spec();
        let mut gan = Gan::new(&spec, &mut StdRng::seed_from_u64(4)).unwrap();
        let before = gan.clone();

        gan.train_step(&noise(5), &real_batch()).unwrap();

        let layer_pairs = gan
            .generator()
            .layers()
            .iter()
            .zip(before.generator().layers())
            .chain(
                gan.discriminator()
                    .layers()
                    .iter()
                    .zip(before.discriminator().layers()),
            );
        for (after, before) in layer_pairs {
            assert_eq!(after.weights().dim(), before.weights().dim());
            assert_eq!(after.biases().dim(), before.biases().dim());
            assert!(after.weights().is_finite() && after.biases().is_finite());

            let norm = after.weights().frobenius_norm();
            assert!(norm.is_finite());
            assert_ne!(norm, before.weights().frobenius_norm());
        }
    }

    #[test]
    fn repeated_steps_stay_finite() {
        let mut gan = Gan::new(&tiny_spec(), &mut StdRng::seed_from_u64(8)).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut z = Matrix2::new(4, 2);

        for _ in 0..50 {
            crate::gan::utils::fill_noise(&mut z, &mut rng);
            gan.train_step(&z, &real_batch()).unwrap();
        }

        let losses = gan.losses().unwrap();
        assert!(losses.discriminator.is_finite() && losses.generator.is_finite());
        assert!(gan.generator().output().is_finite());
    }

    #[test]
    fn loss_gradient_seeds() {
        let mut gan = forwarded(&tiny_spec(), 1);
        let fake = gan.discriminator().output(Branch::Fake).clone();

        gan.backward_discriminator(&real_batch()).unwrap();
        let seed = &gan.discriminator_grads().da[1];
        for r in 0..4 {
            assert_abs_diff_eq!(seed[(r, 0)], 1.0 / (1.0 - fake[(r, 0)] + EPSILON), epsilon = 1e-12);
        }

        gan.backward_generator(&noise(2)).unwrap();
        let seed = &gan.discriminator_grads().da[1];
        for r in 0..4 {
            assert_abs_diff_eq!(seed[(r, 0)], -1.0 / (fake[(r, 0)] + EPSILON), epsilon = 1e-12);
        }
    }

    #[test]
    fn discriminator_gradient_matches_finite_differences() {
        let mut spec = tiny_spec();
        spec.real_sweep = RealSweepBuffers::Real;
        let mut base = forwarded(&spec, 3);

        // dead generator rows feed zeros; keep hidden pre-activations off the leaky relu kink
        base.discriminator.layers[0].biases = Matrix2::from_array([[0.15, -0.2, 0.25]]);
        discriminator_loss(&mut base);
        for branch in [Branch::Real, Branch::Fake] {
            let z = &base.discriminator().pass(branch).z[0];
            assert!(z.as_slice().iter().all(|&x| x.abs() > 1e-5));
        }

        let mut analytic = base.clone();
        analytic.backward_discriminator(&real_batch()).unwrap();
        let grads = analytic.discriminator_grads();

        let h = 1e-6;
        for layer in 0..2 {
            let (rows, cols) = base.discriminator().layers()[layer].weights().dim();
            for (p, q) in [(0, 0), (rows - 1, cols - 1), (rows / 2, 0)] {
                let mut plus = base.clone();
                plus.discriminator.layers[layer].weights[(p, q)] += h;
                let mut minus = base.clone();
                minus.discriminator.layers[layer].weights[(p, q)] -= h;

                let numeric = (discriminator_loss(&mut plus) - discriminator_loss(&mut minus)) / (2.0 * h);
                let exact = grads.dw_real[layer][(p, q)] + grads.dw_fake[layer][(p, q)];
                assert_abs_diff_eq!(exact, numeric, epsilon = 1e-5);
            }

            let mut plus = base.clone();
            plus.discriminator.layers[layer].biases[(0, 0)] += h;
            let mut minus = base.clone();
            minus.discriminator.layers[layer].biases[(0, 0)] -= h;

            let numeric = (discriminator_loss(&mut plus) - discriminator_loss(&mut minus)) / (2.0 * h);
            let exact = grads.db_real[layer][(0, 0)] + grads.db_fake[layer][(0, 0)];
            assert_abs_diff_eq!(exact, numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn generator_gradient_matches_finite_differences() {
        let mut spec = tiny_spec();
        spec.hyperparameters.learning_rate = 1.0;
        let z = noise(7);
        let mut base = Gan::new(&spec, &mut StdRng::seed_from_u64(6)).unwrap();
        base.forward_generator(&z).unwrap();
        base.forward_discriminator_fake().unwrap();

        // with a unit rate the scaled gradients are the gradients
        let mut analytic = base.clone();
        analytic.backward_generator(&z).unwrap();
        let grads = analytic.generator_grads();

        let h = 1e-6;
        for layer in 0..2 {
            let (rows, cols) = base.generator().layers()[layer].weights().dim();
            for (p, q) in [(0, 0), (rows - 1, cols - 1), (0, cols - 1)] {
                let mut plus = base.clone();
                plus.generator.layers[layer].weights[(p, q)] += h;
                let mut minus = base.clone();
                minus.generator.layers[layer].weights[(p, q)] -= h;

                let numeric = (generator_loss(&mut plus, &z) - generator_loss(&mut minus, &z)) / (2.0 * h);
                assert_abs_diff_eq!(grads.dw[layer][(p, q)], numeric, epsilon = 1e-5);
            }
        }

        // the discriminator is left alone
        for (a, b) in analytic
            .discriminator()
            .layers()
            .iter()
            .zip(base.discriminator().layers())
        {
            assert_eq!(a.weights(), b.weights());
            assert_eq!(a.biases(), b.biases());
        }
    }

    #[test]
    fn real_sweep_buffers_only_affect_the_real_sweep() {
        let mut fake_hidden = forwarded(&tiny_spec(), 12);
        let mut spec = tiny_spec();
        spec.real_sweep = RealSweepBuffers::Real;
        let mut real = forwarded(&spec, 12);

        fake_hidden.backward_discriminator(&real_batch()).unwrap();
        real.backward_discriminator(&real_batch()).unwrap();

        let (a, b) = (fake_hidden.discriminator_grads(), real.discriminator_grads());
        assert_eq!(a.dw_fake, b.dw_fake);
        assert_eq!(a.db_fake, b.db_fake);
        // the output layer's weight gradient reads the hidden activation
        assert_ne!(a.dw_real[1], b.dw_real[1]);
        // the output layer's bias gradient only depends on the real output
        assert_eq!(a.db_real[1], b.db_real[1]);
    }

    #[test]
    fn sweep_mode_parses_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: RealSweepBuffers,
        }

        let w: Wrapper = toml::from_str("mode = \"fake_hidden\"").unwrap();
        assert_eq!(w.mode, RealSweepBuffers::FakeHidden);
        let w: Wrapper = toml::from_str("mode = \"real\"").unwrap();
        assert_eq!(w.mode, RealSweepBuffers::Real);
        assert!(toml::from_str::<Wrapper>("mode = \"both\"").is_err());
        assert_eq!(RealSweepBuffers::default(), RealSweepBuffers::FakeHidden);
    }
}
