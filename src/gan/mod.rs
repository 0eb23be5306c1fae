pub mod activations;
pub mod backward;
pub mod trainer;
pub mod utils;

use crate::prelude::*;

use crate::matrix::{
    functions,
    ops::{self, Transposition},
    Matrix2,
};
use rand::Rng;
use tracing::debug;

use self::activations::Activations;
use self::backward::activation_shapes;
pub use self::backward::{DiscriminatorGrads, GeneratorGrads, RealSweepBuffers};

/// Affine transform followed by an activation: `a = φ(x · W + b)`.
/// `W` is `n_inputs x n_neurons` and `b` a single row broadcast over the batch.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    weights: Matrix2<f64>,
    biases: Matrix2<f64>,
    activation: Activations,
}

impl DenseLayer {
    /// Initializes a layer given the number of inputs and neurons.
    /// Weights are He-initialized from `rng`, biases start at zero.
    pub fn new<R: Rng>(n_inputs: usize, n_neurons: usize, activation: Activations, rng: &mut R) -> Self {
        Self {
            weights: utils::he_weights(n_inputs, n_neurons, rng),
            biases: Matrix2::new(1, n_neurons),
            activation,
        }
    }

    /// Builds a layer from explicit parameters.
    pub fn from_parts(
        weights: Matrix2<f64>,
        biases: Matrix2<f64>,
        activation: Activations,
    ) -> Result<Self> {
        if biases.dim() != (1, weights.cols()) {
            return dimension_err("layer biases", biases.dim(), (1, weights.cols()));
        }
        Ok(Self {
            weights,
            biases,
            activation,
        })
    }

    /// Writes the pre-activation of `input` into `z` and its activation into `a`.
    pub fn forward_into(
        &self,
        input: &Matrix2<f64>,
        z: &mut Matrix2<f64>,
        a: &mut Matrix2<f64>,
    ) -> Result<()> {
        ops::dot_into(z, input, &self.weights, Transposition::Neither)?;
        z.add_in_place(&self.biases)?;
        self.activation.forward_into(a, z)
    }

    /// Plain SGD step. `dw` and `db` are scaled by `rate` in place before being
    /// subtracted from the parameters.
    pub fn descend(
        &mut self,
        dw: &mut Matrix2<f64>,
        db: &mut Matrix2<f64>,
        rate: f64,
    ) -> Result<()> {
        dw.scale(rate);
        self.weights.sub_in_place(dw)?;

        db.scale(rate);
        self.biases.sub_in_place(db)
    }

    pub fn weights(&self) -> &Matrix2<f64> {
        &self.weights
    }

    pub fn biases(&self) -> &Matrix2<f64> {
        &self.biases
    }

    pub fn activation(&self) -> Activations {
        self.activation
    }

    /// Returns the amount of inputs this layer accepts
    pub fn input_amount(&self) -> usize {
        self.weights.rows()
    }

    /// Returns the amount of neurons in the layer
    pub fn neuron_amount(&self) -> usize {
        self.weights.cols()
    }
}

/// Pre-activation (`z`) and activation (`a`) buffers of one forward pass,
/// one pair per layer, each `batch_size x neuron_amount`.
#[derive(Debug, Clone)]
pub struct Pass {
    pub z: Vec<Matrix2<f64>>,
    pub a: Vec<Matrix2<f64>>,
}

impl Pass {
    fn new(layers: &[DenseLayer], batch_size: usize) -> Self {
        Self {
            z: activation_shapes(layers, batch_size),
            a: activation_shapes(layers, batch_size),
        }
    }

    /// Activation of the last layer.
    pub fn output(&self) -> &Matrix2<f64> {
        &self.a[self.a.len() - 1]
    }
}

/// Propagates `input` through `layers`, storing every intermediate in `pass`.
pub fn forward_layers(layers: &[DenseLayer], input: &Matrix2<f64>, pass: &mut Pass) -> Result<()> {
    for (i, layer) in layers.iter().enumerate() {
        let (done, rest) = pass.a.split_at_mut(i);
        let act = if i == 0 { input } else { &done[i - 1] };
        layer.forward_into(act, &mut pass.z[i], &mut rest[0])?;
    }
    Ok(())
}

fn build_layers<R: Rng>(
    sizes: &[usize],
    activations: &[Activations],
    rng: &mut R,
) -> Vec<DenseLayer> {
    sizes
        .windows(2)
        .zip(activations)
        .map(|(w, &act)| DenseLayer::new(w[0], w[1], act, rng))
        .collect()
}

/// Maps noise to synthetic samples.
#[derive(Debug, Clone)]
pub struct Generator {
    layers: Vec<DenseLayer>,
    pass: Pass,
}

impl Generator {
    pub fn forward(&mut self, noise: &Matrix2<f64>) -> Result<()> {
        forward_layers(&self.layers, noise, &mut self.pass)
    }

    /// The generated batch from the last forward pass.
    pub fn output(&self) -> &Matrix2<f64> {
        self.pass.output()
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn pass(&self) -> &Pass {
        &self.pass
    }
}

/// Which input stream a discriminator pass scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Real,
    Fake,
}

/// Scores samples as real or generated. One set of weights, two sets of
/// forward buffers so both streams of a step can be kept side by side.
#[derive(Debug, Clone)]
pub struct Discriminator {
    layers: Vec<DenseLayer>,
    real: Pass,
    fake: Pass,
}

impl Discriminator {
    pub fn forward(&mut self, x: &Matrix2<f64>, branch: Branch) -> Result<()> {
        let pass = match branch {
            Branch::Real => &mut self.real,
            Branch::Fake => &mut self.fake,
        };
        forward_layers(&self.layers, x, pass)
    }

    pub fn pass(&self, branch: Branch) -> &Pass {
        match branch {
            Branch::Real => &self.real,
            Branch::Fake => &self.fake,
        }
    }

    pub fn output(&self, branch: Branch) -> &Matrix2<f64> {
        self.pass(branch).output()
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
    pub learning_rate: f64,
    pub decay_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

/// Everything needed to build a [`Gan`].
#[derive(Debug, Clone, PartialEq)]
pub struct GanSpec {
    /// Layer widths from noise input to sample output.
    pub generator_sizes: Vec<usize>,
    /// One activation per generator layer transition.
    pub generator_activations: Vec<Activations>,
    /// Layer widths from sample input to score output.
    pub discriminator_sizes: Vec<usize>,
    pub discriminator_activations: Vec<Activations>,
    pub hyperparameters: Hyperparameters,
    pub real_sweep: RealSweepBuffers,
}

impl GanSpec {
    pub fn validate(&self) -> Result<()> {
        check_network("generator", &self.generator_sizes, &self.generator_activations)?;
        check_network(
            "discriminator",
            &self.discriminator_sizes,
            &self.discriminator_activations,
        )?;

        let sample = self.generator_sizes[self.generator_sizes.len() - 1];
        if sample != self.discriminator_sizes[0] {
            return Err(Error::Config(format!(
                "generator output width {sample} does not match discriminator input width {}",
                self.discriminator_sizes[0]
            )));
        }
        if self.hyperparameters.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".into()));
        }
        Ok(())
    }
}

fn check_network(name: &str, sizes: &[usize], activations: &[Activations]) -> Result<()> {
    if sizes.len() < 2 {
        return Err(Error::Config(format!("{name} needs at least two layer sizes")));
    }
    if sizes.contains(&0) {
        return Err(Error::Config(format!("{name} layer sizes must be positive")));
    }
    if activations.len() != sizes.len() - 1 {
        return Err(Error::Config(format!(
            "{name} has {} layers but {} activations",
            sizes.len() - 1,
            activations.len()
        )));
    }
    Ok(())
}

/// Losses of the most recent forward passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Losses {
    /// Mean of `-log(D(real)) - log(1 - D(fake))`.
    pub discriminator: f64,
    /// Mean of `-log(D(fake))`.
    pub generator: f64,
}

/// Generator, discriminator and their gradient buffers. Owns every matrix
/// used by a training step; none is shared.
#[derive(Debug, Clone)]
pub struct Gan {
    generator_sizes: Vec<usize>,
    discriminator_sizes: Vec<usize>,
    hyperparameters: Hyperparameters,
    real_sweep: RealSweepBuffers,

    generator: Generator,
    discriminator: Discriminator,
    generator_grads: GeneratorGrads,
    discriminator_grads: DiscriminatorGrads,
}

impl Gan {
    pub fn new<R: Rng>(spec: &GanSpec, rng: &mut R) -> Result<Self> {
        spec.validate()?;
        let batch = spec.hyperparameters.batch_size;

        let g_layers = build_layers(&spec.generator_sizes, &spec.generator_activations, rng);
        let d_layers = build_layers(
            &spec.discriminator_sizes,
            &spec.discriminator_activations,
            rng,
        );

        let generator = Generator {
            pass: Pass::new(&g_layers, batch),
            layers: g_layers,
        };
        let discriminator = Discriminator {
            real: Pass::new(&d_layers, batch),
            fake: Pass::new(&d_layers, batch),
            layers: d_layers,
        };

        debug!(
            generator = ?spec.generator_sizes,
            discriminator = ?spec.discriminator_sizes,
            batch,
            "initialized GAN"
        );

        Ok(Self {
            generator_sizes: spec.generator_sizes.clone(),
            discriminator_sizes: spec.discriminator_sizes.clone(),
            hyperparameters: spec.hyperparameters.clone(),
            real_sweep: spec.real_sweep,
            generator_grads: GeneratorGrads::new(&generator.layers, batch),
            discriminator_grads: DiscriminatorGrads::new(&discriminator.layers, batch),
            generator,
            discriminator,
        })
    }

    /// Runs the noise batch through the generator.
    pub fn forward_generator(&mut self, noise: &Matrix2<f64>) -> Result<()> {
        self.generator.forward(noise)
    }

    /// Scores `x` with the discriminator, storing intermediates in the `branch` buffers.
    pub fn forward_discriminator(&mut self, x: &Matrix2<f64>, branch: Branch) -> Result<()> {
        self.discriminator.forward(x, branch)
    }

    /// Scores the generator's current output into the fake buffers.
    pub fn forward_discriminator_fake(&mut self) -> Result<()> {
        self.discriminator.forward(self.generator.output(), Branch::Fake)
    }

    /// One full step: forward both networks, then backpropagate and update
    /// the discriminator followed by the generator.
    pub fn train_step(&mut self, noise: &Matrix2<f64>, real: &Matrix2<f64>) -> Result<()> {
        self.forward_generator(noise)?;
        self.forward_discriminator(real, Branch::Real)?;
        self.forward_discriminator_fake()?;

        self.backward_discriminator(real)?;
        self.backward_generator(noise)
    }

    /// `lr <- lr / (1 + decay_rate * epoch)`, compounding across epochs.
    pub fn decay_learning_rate(&mut self, epoch: usize) {
        let hp = &mut self.hyperparameters;
        hp.learning_rate *= 1.0 / (1.0 + hp.decay_rate * epoch as f64);
    }

    pub fn losses(&self) -> Result<Losses> {
        let fake = self.discriminator.output(Branch::Fake);
        let real = self.discriminator.output(Branch::Real);

        Ok(Losses {
            discriminator: ops::mean(&functions::cross_entropy(fake, real)?),
            generator: ops::mean(&functions::neg_log(fake)),
        })
    }

    /// First generated sample of the last generator pass.
    pub fn sample(&self) -> &[f64] {
        self.generator.output().row(0)
    }

    pub fn learning_rate(&self) -> f64 {
        self.hyperparameters.learning_rate
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn generator_sizes(&self) -> &[usize] {
        &self.generator_sizes
    }

    pub fn discriminator_sizes(&self) -> &[usize] {
        &self.discriminator_sizes
    }

    /// Width of a noise row.
    pub fn noise_width(&self) -> usize {
        self.generator_sizes[0]
    }

    /// Width of a sample row.
    pub fn sample_width(&self) -> usize {
        self.discriminator_sizes[0]
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    pub fn generator_grads(&self) -> &GeneratorGrads {
        &self.generator_grads
    }

    pub fn discriminator_grads(&self) -> &DiscriminatorGrads {
        &self.discriminator_grads
    }
}
