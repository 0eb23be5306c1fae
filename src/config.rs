//! Training configuration read from a TOML file.
//!
//! Flat `key=value` files such as
//!
//! ```text
//! batch_sz=64
//! chosen_label=3
//! learning_rate=0.0002
//! ```
//!
//! are valid TOML, so the short legacy key names are accepted next to the
//! full field names.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::{
    gan::{activations::Activations, GanSpec, Hyperparameters, RealSweepBuffers},
    prelude::*,
};

/// File read by the trainer when no other is given.
pub const DEFAULT_CONFIG_FILE: &str = "gan.cfg";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(alias = "batch_sz")]
    pub batch_size: usize,
    /// Only samples with this label are trained on. Every label when absent.
    pub chosen_label: Option<u8>,
    /// Upper bound on the number of samples read from the dataset.
    pub num_train: usize,
    #[serde(alias = "img_sz")]
    pub img_size: usize,
    /// Layer count of each network, input layer included.
    pub nb_layers: usize,
    /// Noise width.
    #[serde(alias = "in_layer_sz_g")]
    pub in_layer_size_g: usize,
    #[serde(alias = "hd_layer_sz_g")]
    pub hidden_layer_size_g: usize,
    #[serde(alias = "hd_layer_sz_d")]
    pub hidden_layer_size_d: usize,
    pub learning_rate: f64,
    pub decay_rate: f64,
    pub epochs: usize,
    /// Activation names for the generator layers, first to last.
    pub act_fn_g: Option<Vec<String>>,
    pub act_fn_d: Option<Vec<String>>,
    pub lrelu_alpha_g: f64,
    pub lrelu_alpha_d: f64,
    pub report_every: usize,
    pub seed: Option<u64>,
    pub real_sweep_buffers: RealSweepBuffers,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 64,
            chosen_label: None,
            num_train: 60_000,
            img_size: 784,
            nb_layers: 3,
            in_layer_size_g: 100,
            hidden_layer_size_g: 128,
            hidden_layer_size_d: 128,
            learning_rate: 0.0002,
            decay_rate: 0.0001,
            epochs: 100,
            act_fn_g: None,
            act_fn_d: None,
            lrelu_alpha_g: 0.0,
            lrelu_alpha_d: 0.01,
            report_every: 5,
            seed: None,
            real_sweep_buffers: RealSweepBuffers::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text)?;
        debug!(path = %path.display(), ?config, "read configuration");
        Ok(config)
    }

    /// Parses and validates a configuration.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("num_train", self.num_train),
            ("img_size", self.img_size),
            ("in_layer_size_g", self.in_layer_size_g),
            ("hidden_layer_size_g", self.hidden_layer_size_g),
            ("hidden_layer_size_d", self.hidden_layer_size_d),
            ("report_every", self.report_every),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("`{name}` must be positive")));
        }
        if self.nb_layers < 2 {
            return Err(Error::Config(format!(
                "`nb_layers` must be at least 2, got {}",
                self.nb_layers
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::Config(format!(
                "`learning_rate` must be positive, got {}",
                self.learning_rate
            )));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(Error::Config(format!(
                "`decay_rate` must not be negative, got {}",
                self.decay_rate
            )));
        }

        self.generator_activations()?;
        self.discriminator_activations()?;
        Ok(())
    }

    /// `[noise, hidden.., image]`
    pub fn generator_sizes(&self) -> Vec<usize> {
        self.layer_sizes(self.in_layer_size_g, self.hidden_layer_size_g, self.img_size)
    }

    /// `[image, hidden.., 1]`
    pub fn discriminator_sizes(&self) -> Vec<usize> {
        self.layer_sizes(self.img_size, self.hidden_layer_size_d, 1)
    }

    fn layer_sizes(&self, input: usize, hidden: usize, output: usize) -> Vec<usize> {
        let mut sizes = vec![input];
        sizes.extend(std::iter::repeat(hidden).take(self.nb_layers.saturating_sub(2)));
        sizes.push(output);
        sizes
    }

    /// Leaky ReLU on hidden layers and Tanh on the output unless configured.
    pub fn generator_activations(&self) -> Result<Vec<Activations>> {
        self.activations(
            "act_fn_g",
            self.act_fn_g.as_deref(),
            self.lrelu_alpha_g,
            Activations::Tanh,
        )
    }

    /// Leaky ReLU on hidden layers and Sigmoid on the output unless configured.
    pub fn discriminator_activations(&self) -> Result<Vec<Activations>> {
        self.activations(
            "act_fn_d",
            self.act_fn_d.as_deref(),
            self.lrelu_alpha_d,
            Activations::Sigmoid,
        )
    }

    fn activations(
        &self,
        key: &str,
        names: Option<&[String]>,
        alpha: f64,
        output: Activations,
    ) -> Result<Vec<Activations>> {
        let layers = self.nb_layers.saturating_sub(1);
        match names {
            Some(names) => {
                if names.len() != layers {
                    return Err(Error::Config(format!(
                        "`{key}` lists {} activations for {layers} layers",
                        names.len()
                    )));
                }
                names
                    .iter()
                    .map(|name| Activations::parse(name, alpha))
                    .collect()
            }
            None => {
                let mut acts = vec![Activations::LeakyReLU(alpha); layers.saturating_sub(1)];
                acts.push(output);
                Ok(acts)
            }
        }
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            learning_rate: self.learning_rate,
            decay_rate: self.decay_rate,
            epochs: self.epochs,
            batch_size: self.batch_size,
        }
    }

    pub fn gan_spec(&self) -> Result<GanSpec> {
        Ok(GanSpec {
            generator_sizes: self.generator_sizes(),
            generator_activations: self.generator_activations()?,
            discriminator_sizes: self.discriminator_sizes(),
            discriminator_activations: self.discriminator_activations()?,
            hyperparameters: self.hyperparameters(),
            real_sweep: self.real_sweep_buffers,
        })
    }
}
