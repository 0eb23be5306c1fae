use std::{
    collections::VecDeque,
    sync::{mpsc::Receiver, Arc, Mutex},
    thread,
};

use eframe::CreationContext;
use egui::{
    plot::{Legend, Line, Plot},
    Color32, ColorImage, TextureHandle, TextureOptions,
};

use crate::{gan::trainer::EpochState, mnist};

/// Screen pixels per sample pixel
const SAMPLE_SCALE: f32 = 8.0;

/// Any type that can be rendered and updated during training
pub trait Visualizer: eframe::App + 'static {
    const DATA_LIMIT: usize = 20_000;
    fn new(cc: &CreationContext, rx: Receiver<EpochState>) -> Self;
}

/// Default gui that plots both losses and shows the latest generated sample
pub struct GanGui {
    data: Arc<Mutex<VecDeque<EpochState>>>,
    /// Epoch of the sample currently uploaded, with its texture
    texture: Option<(usize, TextureHandle)>,
}

impl Visualizer for GanGui {
    /// Initialize GanGui, but also start a thread that listens to a receiver and updates the state
    fn new(cc: &CreationContext, rx: Receiver<EpochState>) -> Self {
        let data = Arc::new(Mutex::new(VecDeque::new()));
        let data_clone = data.clone();

        let ctx = cc.egui_ctx.clone();
        thread::spawn(move || {
            while let Ok(state) = rx.recv() {
                let Ok(mut data) = data_clone.lock() else {
                    break;
                };

                if data.len() == Self::DATA_LIMIT {
                    data.pop_front();
                }

                data.push_back(state);
                ctx.request_repaint()
            }
        });

        Self {
            data,
            texture: None,
        }
    }
}

impl eframe::App for GanGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let data = self.get_data();

        if let Some(last) = data.last() {
            if self.texture.as_ref().map(|(epoch, _)| *epoch) != Some(last.epoch) {
                let texture = ctx.load_texture("sample", sample_image(last), TextureOptions::NEAREST);
                self.texture = Some((last.epoch, texture));
            }
        }

        let generator: Vec<_> = data
            .iter()
            .map(|s| [s.epoch as f64, s.losses.generator])
            .collect();
        let discriminator: Vec<_> = data
            .iter()
            .map(|s| [s.epoch as f64, s.losses.discriminator])
            .collect();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical(|ui| {
                match data.last() {
                    Some(s) => ui.heading(format!(
                        "Epoch {} lr: {:.6} loss_g: {:.3} loss_d: {:.3}",
                        s.epoch, s.learning_rate, s.losses.generator, s.losses.discriminator
                    )),
                    None => ui.heading("Waiting for the first report"),
                };

                if let Some((_, texture)) = &self.texture {
                    ui.image(texture.id(), texture.size_vec2() * SAMPLE_SCALE);
                }

                Plot::new("Losses")
                    .legend(Legend::default())
                    .show(ui, |plot_ui| {
                        plot_ui.line(Line::new(generator).name("generator"));
                        plot_ui.line(Line::new(discriminator).name("discriminator"));
                    });
            });
        });
    }
}

impl GanGui {
    /// Returns a clone of the data as a vec
    /// Blocks until it can get a lock on its state data
    pub fn get_data(&self) -> Vec<EpochState> {
        self.data
            .lock()
            .map(|data| data.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Grayscale image of a reported sample. Missing pixels are black.
pub fn sample_image(state: &EpochState) -> ColorImage {
    let (width, height) = state.sample_shape;
    let pixels = state
        .sample
        .iter()
        .map(|&v| Color32::from_gray(mnist::to_pixel(v)))
        .chain(std::iter::repeat(Color32::BLACK))
        .take(width * height)
        .collect();

    ColorImage {
        size: [width, height],
        pixels,
    }
}
