use std::{path::PathBuf, sync::mpsc};

use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use tracing::{info, warn};

use super::{utils, Gan, Losses};
use crate::{
    matrix::Matrix2,
    mnist::{self, TrainingSet},
    prelude::*,
    viz::Visualizer,
};

/// Snapshot taken on each reported epoch of training
#[derive(Debug, Clone, PartialEq)]
pub struct EpochState {
    pub epoch: usize,
    pub learning_rate: f64,
    pub losses: Losses,
    /// First generated sample of the epoch's last batch
    pub sample: Vec<f64>,
    /// `(width, height)` of `sample` as an image
    pub sample_shape: (usize, usize),
}

/// Drives epochs and batches over a [`Gan`], reporting on a fixed cadence.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    epochs_per_log: Option<usize>,
    progress: bool,
    sample_dir: Option<PathBuf>,
    sample_shape: Option<(usize, usize)>,
}

impl Trainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every `epochs_per_log` epochs, starting with the first one.
    /// `Some(0)` reports nothing, like `None`.
    pub fn with_log(mut self, epochs_per_log: Option<usize>) -> Self {
        self.epochs_per_log = epochs_per_log.filter(|&n| n > 0);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Save the reported samples as `epoch_<NNNNN>.pgm` under `dir`.
    pub fn with_samples<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.sample_dir = Some(dir.into());
        self
    }

    pub fn with_sample_shape(mut self, width: usize, height: usize) -> Self {
        self.sample_shape = Some((width, height));
        self
    }

    /// Trains for the epochs configured in `gan`, logging losses and saving
    /// samples on each reported epoch.
    pub fn train<R: Rng>(&self, gan: &mut Gan, set: &TrainingSet, rng: &mut R) -> Result<()> {
        self.run(gan, set, rng, |state| self.save_sample(state))
    }

    /// Like [`Trainer::train`], with training on a separate thread streaming
    /// its reports to a `Gui` window.
    pub fn train_gui<Gui: Visualizer, R: Rng + Send>(
        &self,
        gan: &mut Gan,
        set: &TrainingSet,
        rng: &mut R,
    ) -> Result<()> {
        std::thread::scope(|scope| -> Result<()> {
            let (tx, rx) = mpsc::channel();
            let handle = scope.spawn(move || -> Result<()> {
                self.run(gan, set, rng, |state| {
                    self.save_sample(state)?;
                    tx.send(state.clone()).map_err(|_| Error::ThreadErr)
                })
            });

            if let Err(err) = eframe::run_native(
                "RustGAN",
                eframe::NativeOptions::default(),
                Box::new(|cc| Box::new(Gui::new(cc, rx))),
            ) {
                warn!(%err, "could not open the training window");
            }

            handle.join().map_err(|_| Error::ThreadErr)??;
            Ok(())
        })
    }

    /// The training loop. `on_report` sees the state of every reported epoch
    /// before the learning rate decays.
    pub fn run<R, F>(
        &self,
        gan: &mut Gan,
        set: &TrainingSet,
        rng: &mut R,
        mut on_report: F,
    ) -> Result<()>
    where
        R: Rng,
        F: FnMut(&EpochState) -> Result<()>,
    {
        let batch_size = gan.hyperparameters().batch_size;
        if set.batch_size() != batch_size || set.sample_width() != gan.sample_width() {
            return dimension_err(
                "training set",
                (set.batch_size(), set.sample_width()),
                (batch_size, gan.sample_width()),
            );
        }

        let epochs = gan.hyperparameters().epochs;
        let sample_shape = self.sample_shape_for(gan.sample_width());
        let mut noise = Matrix2::new(batch_size, gan.noise_width());
        let mut real = Matrix2::new(batch_size, gan.sample_width());

        info!(
            epochs,
            batches = set.num_batches(),
            batch_size,
            learning_rate = gan.learning_rate(),
            "training"
        );
        let pb = self.progress_bar(epochs);

        for epoch in 0..epochs {
            for batch in 0..set.num_batches() {
                utils::fill_noise(&mut noise, rng);
                set.batch_into(&mut real, batch)?;
                gan.train_step(&noise, &real)?;
            }
            pb.inc(1);

            if self.epochs_per_log.is_some_and(|epl| epoch % epl == 0) {
                let state = EpochState {
                    epoch,
                    learning_rate: gan.learning_rate(),
                    losses: gan.losses()?,
                    sample: gan.sample().to_vec(),
                    sample_shape,
                };
                pb.suspend(|| {
                    info!(
                        "epoch {epoch}: lr {:.6}, loss_g {:.3}, loss_d {:.3}",
                        state.learning_rate, state.losses.generator, state.losses.discriminator
                    )
                });
                on_report(&state)?;
            }

            gan.decay_learning_rate(epoch);
        }

        pb.finish_and_clear();
        Ok(())
    }

    fn save_sample(&self, state: &EpochState) -> Result<()> {
        let Some(dir) = &self.sample_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;

        let (width, height) = state.sample_shape;
        let path = dir.join(format!("epoch_{:05}.pgm", state.epoch));
        mnist::save_sample(&state.sample, width as u32, height as u32, path)
    }

    /// The configured shape, else a square when the width allows one, else a single row.
    fn sample_shape_for(&self, width: usize) -> (usize, usize) {
        self.sample_shape.unwrap_or_else(|| {
            let side = (width as f64).sqrt().round() as usize;
            if side * side == width {
                (side, side)
            } else {
                (width, 1)
            }
        })
    }

    fn progress_bar(&self, epochs: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(epochs as u64);
        match ProgressStyle::with_template("[{elapsed_precise}] [{bar:40}] {pos}/{len} epochs ({eta})") {
            Ok(style) => pb.set_style(style.progress_chars("#>-")),
            Err(err) => warn!(%err, "invalid progress bar template"),
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gan::{tests::tiny_spec, GanSpec};
    use rand::{rngs::StdRng, SeedableRng};

    fn spec(epochs: usize) -> GanSpec {
        let mut spec = tiny_spec();
        spec.hyperparameters.epochs = epochs;
        spec
    }

    fn training_set() -> TrainingSet {
        let images = Matrix2::from_vec(
            (0..9)
                .map(|r| (0..5).map(|c| ((r * 5 + c) as f64 / 22.0) - 1.0).collect())
                .collect(),
        )
        .unwrap();
        TrainingSet::from_samples(&images, &[0, 1, 0, 1, 0, 1, 0, 1, 0], None, 4).unwrap()
    }

    #[test]
    fn reports_on_cadence_before_decay() {
        let mut gan = Gan::new(&spec(7), &mut StdRng::seed_from_u64(0)).unwrap();
        let mut reports = Vec::new();

        Trainer::new()
            .with_log(Some(3))
            .run(&mut gan, &training_set(), &mut StdRng::seed_from_u64(1), |state| {
                reports.push(state.clone());
                Ok(())
            })
            .unwrap();

        let epochs: Vec<_> = reports.iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, [0, 3, 6]);

        // nothing has decayed yet when epoch 0 reports
        assert_eq!(reports[0].learning_rate, 0.01);
        assert!(reports.windows(2).all(|w| w[1].learning_rate < w[0].learning_rate));
        assert!(gan.learning_rate() < reports[2].learning_rate);

        for state in &reports {
            assert_eq!(state.sample.len(), 5);
            assert_eq!(state.sample_shape, (5, 1));
            assert!(state.losses.generator.is_finite() && state.losses.discriminator.is_finite());
        }
    }

    #[test]
    fn silent_without_log() {
        for log in [None, Some(0)] {
            let mut gan = Gan::new(&spec(2), &mut StdRng::seed_from_u64(0)).unwrap();
            let mut calls = 0;

            Trainer::new()
                .with_log(log)
                .run(&mut gan, &training_set(), &mut StdRng::seed_from_u64(1), |_| {
                    calls += 1;
                    Ok(())
                })
                .unwrap();
            assert_eq!(calls, 0);
        }
    }

    #[test]
    fn training_is_reproducible_for_a_seed() {
        let run = || {
            let mut gan = Gan::new(&spec(3), &mut StdRng::seed_from_u64(21)).unwrap();
            Trainer::new()
                .train(&mut gan, &training_set(), &mut StdRng::seed_from_u64(22))
                .unwrap();
            gan
        };

        let (a, b) = (run(), run());
        for (x, y) in a.generator().layers().iter().zip(b.generator().layers()) {
            assert_eq!(x.weights(), y.weights());
        }
        for (x, y) in a.discriminator().layers().iter().zip(b.discriminator().layers()) {
            assert_eq!(x.weights(), y.weights());
        }
    }

    #[test]
    fn saves_reported_samples() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("samples");
        let mut gan = Gan::new(&spec(4), &mut StdRng::seed_from_u64(3)).unwrap();

        Trainer::new()
            .with_log(Some(2))
            .with_samples(&samples)
            .train(&mut gan, &training_set(), &mut StdRng::seed_from_u64(4))
            .unwrap();

        assert!(samples.join("epoch_00000.pgm").exists());
        assert!(samples.join("epoch_00002.pgm").exists());
        assert!(!samples.join("epoch_00001.pgm").exists());

        let img = image::open(samples.join("epoch_00002.pgm")).unwrap();
        assert_eq!((img.width(), img.height()), (5, 1));
    }

    #[test]
    fn rejects_mismatched_training_set() {
        let mut gan = Gan::new(&spec(1), &mut StdRng::seed_from_u64(0)).unwrap();
        let images = Matrix2::new(8, 3);
        let set = TrainingSet::from_samples(&images, &[0; 8], None, 4).unwrap();

        let res = Trainer::new().train(&mut gan, &set, &mut StdRng::seed_from_u64(0));
        assert!(matches!(res, Err(Error::DimensionErr { .. })));
    }

    #[test]
    fn sample_shape_defaults_to_square() {
        let trainer = Trainer::new();
        assert_eq!(trainer.sample_shape_for(784), (28, 28));
        assert_eq!(trainer.sample_shape_for(5), (5, 1));
        assert_eq!(trainer.with_sample_shape(2, 3).sample_shape_for(6), (2, 3));
    }
}
