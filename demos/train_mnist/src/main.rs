use std::path::PathBuf;

use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use rust_gan::{
    config::{Config, DEFAULT_CONFIG_FILE},
    gan::{trainer::Trainer, Gan},
    mnist::{Mnist, TrainingSet},
    prelude::*,
    viz::GanGui,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Train a GAN on the MNIST training set
#[derive(Parser, Debug)]
#[command(name = "train_mnist")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory holding train-images.idx3-ubyte and train-labels.idx1-ubyte
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Save a generated sample here on every reported epoch
    #[arg(short, long)]
    samples: Option<PathBuf>,

    /// Overrides the seed of the configuration file
    #[arg(long)]
    seed: Option<u64>,

    /// Plot the losses in a window while training
    #[arg(long)]
    gui: bool,

    #[arg(long)]
    no_progress: bool,

    /// trace, debug, info, warn or error
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    let level = cli.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not install the logger: {err}");
    }

    if let Err(err) = run(cli) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_file(&cli.config)?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mnist = Mnist::load(&cli.data_dir, config.num_train)?;
    if mnist.sample_size() != config.img_size {
        return Err(Error::Config(format!(
            "`img_size` is {} but the dataset holds {}x{} images",
            config.img_size, mnist.width, mnist.height
        )));
    }

    let set = TrainingSet::from_samples(
        &mnist.images,
        &mnist.labels,
        config.chosen_label,
        config.batch_size,
    )?;
    info!(
        samples = set.samples().rows(),
        batches = set.num_batches(),
        label = ?config.chosen_label,
        "training set ready"
    );

    let mut gan = Gan::new(&config.gan_spec()?, &mut rng)?;

    let mut trainer = Trainer::new()
        .with_log(Some(config.report_every))
        .with_progress(!cli.no_progress)
        .with_sample_shape(mnist.width, mnist.height);
    if let Some(dir) = cli.samples {
        trainer = trainer.with_samples(dir);
    }

    if cli.gui {
        trainer.train_gui::<GanGui, _>(&mut gan, &set, &mut rng)?;
    } else {
        trainer.train(&mut gan, &set, &mut rng)?;
    }

    let losses = gan.losses()?;
    info!(
        "finished: lr {:.6}, loss_g {:.3}, loss_d {:.3}",
        gan.learning_rate(),
        losses.generator,
        losses.discriminator
    );
    Ok(())
}
