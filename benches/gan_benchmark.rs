use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use rust_gan::{
    gan::{
        activations::Activations, utils, Gan, GanSpec, Hyperparameters, RealSweepBuffers,
    },
    matrix::{
        ops::{self, Transposition},
        Matrix2,
    },
};

fn spec(noise: usize, hidden: usize, sample: usize, batch_size: usize) -> GanSpec {
    GanSpec {
        generator_sizes: vec![noise, hidden, sample],
        generator_activations: vec![Activations::LeakyReLU(0.0), Activations::Tanh],
        discriminator_sizes: vec![sample, hidden, 1],
        discriminator_activations: vec![Activations::LeakyReLU(0.01), Activations::Sigmoid],
        hyperparameters: Hyperparameters {
            learning_rate: 0.0002,
            decay_rate: 0.0001,
            epochs: 1,
            batch_size,
        },
        real_sweep: RealSweepBuffers::FakeHidden,
    }
}

fn random(rows: usize, cols: usize, rng: &mut StdRng) -> Matrix2<f64> {
    let mut m = Matrix2::new(rows, cols);
    utils::fill_noise(&mut m, rng);
    m
}

fn bench_dot(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let a = random(64, 784, &mut rng);
    let w = random(784, 128, &mut rng);
    let dz = random(64, 128, &mut rng);

    let mut out = Matrix2::new(64, 128);
    c.bench_function("dot 64x784 . 784x128", |b| {
        b.iter(|| ops::dot_into(&mut out, black_box(&a), black_box(&w), Transposition::Neither))
    });

    let mut dw = Matrix2::new(784, 128);
    c.bench_function("dot left transposed 784x64 . 64x128", |b| {
        b.iter(|| ops::dot_into(&mut dw, black_box(&a), black_box(&dz), Transposition::Left))
    });

    let mut da = Matrix2::new(64, 784);
    c.bench_function("dot right transposed 64x128 . 128x784", |b| {
        b.iter(|| ops::dot_into(&mut da, black_box(&dz), black_box(&w), Transposition::Right))
    });
}

fn bench_step(c: &mut Criterion, name: &str, spec: GanSpec) {
    let mut rng = StdRng::seed_from_u64(1);
    let mut gan = Gan::new(&spec, &mut rng).unwrap();
    let batch = spec.hyperparameters.batch_size;
    let mut noise = Matrix2::new(batch, gan.noise_width());
    let real = random(batch, gan.sample_width(), &mut rng);

    c.bench_function(name, |b| {
        b.iter(|| {
            utils::fill_noise(&mut noise, &mut rng);
            gan.train_step(black_box(&noise), black_box(&real)).unwrap()
        })
    });
}

fn bench_small(c: &mut Criterion) {
    bench_step(c, "train step small (2-3-5, batch 4)", spec(2, 3, 5, 4));
}

fn bench_mnist(c: &mut Criterion) {
    bench_step(c, "train step mnist (100-128-784, batch 64)", spec(100, 128, 784, 64));
}

criterion_group!(benches, bench_dot, bench_small, bench_mnist);
criterion_main!(benches);
