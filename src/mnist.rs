//! MNIST training data in the IDX format and export of generated samples.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use image::{GrayImage, Luma};
use tracing::{debug, info};

use crate::{
    matrix::{ops, Matrix2},
    prelude::*,
};

pub const IMAGES_FILE: &str = "train-images.idx3-ubyte";
pub const LABELS_FILE: &str = "train-labels.idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// Maps a pixel into `[-1, 1]`, the range of a Tanh output layer.
pub fn normalize_pixel(p: u8) -> f64 {
    (f64::from(p) - 127.5) / 127.5
}

/// Inverse of [`normalize_pixel`], clamped to a valid pixel.
pub fn to_pixel(v: f64) -> u8 {
    (v * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(truncated)?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads exactly `len` bytes, growing the buffer only as data arrives.
fn read_announced<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() < len {
        return Err(Error::Dataset("file ends before the announced data".into()));
    }
    Ok(bytes)
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Dataset("file ends before the announced data".into())
    } else {
        Error::Io(err)
    }
}

fn check_magic<R: Read>(reader: &mut R, expected: u32) -> Result<()> {
    let magic = read_u32(reader)?;
    if magic != expected {
        return Err(Error::Dataset(format!(
            "bad magic number {magic}, expected {expected}"
        )));
    }
    Ok(())
}

/// Reads at most `limit` images, one normalized sample per row.
/// Returns the samples with the image `(width, height)`.
pub fn read_images<R: Read>(mut reader: R, limit: usize) -> Result<(Matrix2<f64>, (usize, usize))> {
    check_magic(&mut reader, IMAGES_MAGIC)?;
    let count = read_u32(&mut reader)? as usize;
    let height = read_u32(&mut reader)? as usize;
    let width = read_u32(&mut reader)? as usize;

    let n = count.min(limit);
    let sample_size = width
        .checked_mul(height)
        .ok_or_else(|| Error::Dataset(format!("image size {width}x{height} overflows")))?;
    let len = n
        .checked_mul(sample_size)
        .ok_or_else(|| Error::Dataset(format!("{n} images of {width}x{height} overflow")))?;
    let bytes = read_announced(&mut reader, len)?;

    let samples = Matrix2::from_flat(n, sample_size, bytes.into_iter().map(normalize_pixel).collect())?;
    Ok((samples, (width, height)))
}

/// Reads at most `limit` labels.
pub fn read_labels<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    check_magic(&mut reader, LABELS_MAGIC)?;
    let count = read_u32(&mut reader)? as usize;

    read_announced(&mut reader, count.min(limit))
}

/// Normalized images with their labels.
#[derive(Debug, Clone)]
pub struct Mnist {
    pub images: Matrix2<f64>,
    pub labels: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Mnist {
    /// Loads the training images and labels found in `dir`, at most `limit` of each.
    pub fn load<P: AsRef<Path>>(dir: P, limit: usize) -> Result<Self> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), limit, "loading MNIST");

        let images = BufReader::new(File::open(dir.join(IMAGES_FILE))?);
        let labels = BufReader::new(File::open(dir.join(LABELS_FILE))?);
        Self::from_readers(images, labels, limit)
    }

    pub fn from_readers<I: Read, L: Read>(images: I, labels: L, limit: usize) -> Result<Self> {
        let (images, (width, height)) = read_images(images, limit)?;
        let labels = read_labels(labels, limit)?;

        if images.rows() != labels.len() {
            return Err(Error::Dataset(format!(
                "{} images but {} labels",
                images.rows(),
                labels.len()
            )));
        }
        debug!(samples = labels.len(), width, height, "read IDX files");

        Ok(Self {
            images,
            labels,
            width,
            height,
        })
    }

    pub fn sample_size(&self) -> usize {
        self.width * self.height
    }
}

/// Samples kept for training: optionally filtered on one label and cut down
/// to whole batches, in their original order.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    samples: Matrix2<f64>,
    labels: Vec<u8>,
    batch_size: usize,
    num_batches: usize,
}

impl TrainingSet {
    pub fn from_samples(
        images: &Matrix2<f64>,
        labels: &[u8],
        chosen_label: Option<u8>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch size must be positive".into()));
        }
        if images.rows() != labels.len() {
            return dimension_err("training set", images.dim(), (labels.len(), 1));
        }

        let kept: Vec<usize> = (0..labels.len())
            .filter(|&i| chosen_label.map_or(true, |l| labels[i] == l))
            .collect();

        let num_batches = kept.len() / batch_size;
        if num_batches == 0 {
            return Err(Error::Dataset(format!(
                "{} matching samples, fewer than one batch of {batch_size}",
                kept.len()
            )));
        }
        let kept = &kept[..num_batches * batch_size];

        let mut data = Vec::with_capacity(kept.len() * images.cols());
        for &i in kept {
            data.extend_from_slice(images.row(i));
        }

        Ok(Self {
            samples: Matrix2::from_flat(kept.len(), images.cols(), data)?,
            labels: kept.iter().map(|&i| labels[i]).collect(),
            batch_size,
            num_batches,
        })
    }

    /// Copies batch `batch_index` into `dst`, which holds `batch_size` rows.
    pub fn batch_into(&self, dst: &mut Matrix2<f64>, batch_index: usize) -> Result<()> {
        if dst.rows() != self.batch_size {
            return dimension_err("batch", dst.dim(), (self.batch_size, self.samples.cols()));
        }
        ops::copy_batch(dst, &self.samples, batch_index * self.batch_size)
    }

    pub fn samples(&self) -> &Matrix2<f64> {
        &self.samples
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    pub fn sample_width(&self) -> usize {
        self.samples.cols()
    }
}

/// Writes one generated sample as a grayscale image, format picked from the
/// extension of `path`.
pub fn save_sample<P: AsRef<Path>>(sample: &[f64], width: u32, height: u32, path: P) -> Result<()> {
    let (w, h) = (width as usize, height as usize);
    if sample.len() != w * h {
        return dimension_err("save_sample", (1, sample.len()), (h, w));
    }

    let img = GrayImage::from_fn(width, height, |x, y| {
        Luma([to_pixel(sample[y as usize * w + x as usize])])
    });
    img.save(path.as_ref())?;
    debug!(path = %path.as_ref().display(), "saved sample");
    Ok(())
}
