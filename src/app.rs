use std::path::{Path, PathBuf};
use std::sync::Arc;

use eframe::egui;
use tracing::{debug, error, info, warn};

use crate::arrow::{draw_marker, Surface};
use crate::composite::BaseImage;
use crate::geometry::{
    fit_rect, fit_within, map_to_display, map_to_image, DisplayRect, NativeSize, Point,
};
use crate::marks::MarkState;
use crate::orchestrator::{AppState, Command, Event, Orchestrator};
use crate::service::{GeneratedImage, GenerationOutcome, ImageGenerator};
use crate::worker::GenerationWorker;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

struct ResultView {
    uri: String,
    bytes: egui::load::Bytes,
}

/// The generated image as egui sees it. Each result gets its own `bytes://` URI.
#[derive(Default)]
struct ResultViews {
    current: Option<ResultView>,
    serial: u64,
}

impl ResultViews {
    /// Follow the orchestrator's result. Returns the URI of a view that was
    /// replaced or dropped, which the caller must evict from egui's loaders.
    fn sync(&mut self, result: Option<&GeneratedImage>) -> Option<String> {
        let Some(result) = result else {
            return self.current.take().map(|view| view.uri);
        };
        let fresh = self
            .current
            .as_ref()
            .is_some_and(|view| *view.bytes == *result.bytes);
        if fresh {
            return None;
        }
        self.serial += 1;
        let view = ResultView {
            uri: format!("bytes://result-{}.{}", self.serial, result.extension()),
            bytes: egui::load::Bytes::from(result.bytes.clone()),
        };
        self.current.replace(view).map(|old| old.uri)
    }
}

pub struct VantageApp {
    ctx: egui::Context,
    orchestrator: Orchestrator,
    worker: Option<GenerationWorker>,
    texture: Option<egui::TextureHandle>,
    results: ResultViews,
    status: Option<String>,
}

impl VantageApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        orchestrator: Orchestrator,
        generator: Arc<dyn ImageGenerator>,
        initial: Option<PathBuf>,
    ) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);

        let ctx = cc.egui_ctx.clone();
        let waker = Arc::new(move || ctx.request_repaint());
        let worker = match GenerationWorker::new(generator, waker) {
            Ok(worker) => Some(worker),
            Err(e) => {
                error!(error = %e, "app: cannot start generation runtime");
                None
            }
        };

        let mut app = Self {
            ctx: cc.egui_ctx.clone(),
            orchestrator,
            worker,
            texture: None,
            results: ResultViews::default(),
            status: None,
        };
        if let Some(path) = initial {
            app.load_path(&path);
        }
        app
    }

    fn dispatch(&mut self, event: Event) {
        if let Some(command) = self.orchestrator.dispatch(event) {
            self.execute(command);
        }
        self.sync_views();
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Generate(request) => {
                if let Some(worker) = &self.worker {
                    worker.submit(request);
                    return;
                }
                self.dispatch(Event::GenerationFinished(GenerationOutcome::Failed(
                    "generation runtime is not available".to_string(),
                )));
            }
        }
    }

    /// Drop caches that no longer match the orchestrator.
    fn sync_views(&mut self) {
        if self.orchestrator.session().is_none() {
            self.texture = None;
        }
        if let Some(uri) = self.results.sync(self.orchestrator.result()) {
            self.ctx.forget_image(&uri);
        }
    }

    fn load_path(&mut self, path: &Path) {
        if self.orchestrator.state() == AppState::Generating {
            return;
        }
        match BaseImage::open(path) {
            Ok(image) => {
                let size = image.size();
                info!(
                    path = %path.display(),
                    width = size.width,
                    height = size.height,
                    "app: image loaded"
                );
                if self.orchestrator.state() != AppState::Upload {
                    self.dispatch(Event::UploadNew);
                }
                self.dispatch(Event::ImageLoaded(image));
            }
            Err(e) => self.dispatch(Event::LoadFailed(e.to_string())),
        }
    }

    fn pick_image(&mut self) {
        let file = rfd::FileDialog::new()
            .set_title("Choose a map")
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file();
        if let Some(path) = file {
            self.load_path(&path);
        }
    }

    fn save_result(&mut self) {
        let Some(result) = self.orchestrator.result() else {
            return;
        };
        let ext = result.extension();
        let file = rfd::FileDialog::new()
            .set_title("Save generated view")
            .set_file_name(format!("view.{ext}"))
            .add_filter(ext, &[ext])
            .save_file();
        let Some(path) = file else {
            return;
        };
        self.status = Some(match std::fs::write(&path, &result.bytes) {
            Ok(()) => format!("Saved to {}", path.display()),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "app: save failed");
                format!("Cannot save {}: {e}", path.display())
            }
        });
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.texture.is_some() {
            return;
        }
        let Some(session) = self.orchestrator.session() else {
            return;
        };
        // The GPU caps texture sides; the preview is downscaled, export stays native.
        let max_side = ctx.input(|i| i.max_texture_side);
        let native = session.image.size();
        let shown = fit_within(native, u32::try_from(max_side).unwrap_or(u32::MAX));
        let color_image = if shown == native {
            let rgba = session.image.rgba();
            let size = [rgba.width() as usize, rgba.height() as usize];
            egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw())
        } else {
            debug!(?native, ?shown, "app: downscaling map preview");
            let small = image::imageops::thumbnail(session.image.rgba(), shown.width, shown.height);
            let size = [small.width() as usize, small.height() as usize];
            egui::ColorImage::from_rgba_unmultiplied(size, small.as_raw())
        };
        self.texture = Some(ctx.load_texture("map", color_image, egui::TextureOptions::LINEAR));
    }

    fn hint(&self) -> &'static str {
        match self.orchestrator.state() {
            AppState::Upload => "Open or drop a map image",
            AppState::Marking => match self.orchestrator.mark_state() {
                MarkState::Empty => "Tap where you are standing",
                MarkState::OnePoint => "Tap where you are looking",
                MarkState::TwoPoints => "Ready to generate",
            },
            AppState::Generating => "Generating the view…",
            AppState::Result => "Generated view",
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let state = self.orchestrator.state();
            let idle = state != AppState::Generating;

            if ui.add_enabled(idle, egui::Button::new("Open map…")).clicked() {
                self.pick_image();
            }
            ui.separator();

            match state {
                AppState::Marking => {
                    let has_points = self.orchestrator.mark_state() != MarkState::Empty;
                    if ui.add_enabled(has_points, egui::Button::new("Undo")).clicked() {
                        self.dispatch(Event::Undo);
                    }
                    if ui.add_enabled(has_points, egui::Button::new("Clear")).clicked() {
                        self.dispatch(Event::ClearPoints);
                    }
                    ui.separator();
                    let generate = egui::Button::new("Generate view");
                    if ui.add_enabled(self.orchestrator.can_export(), generate).clicked() {
                        self.dispatch(Event::Export);
                    }
                }
                AppState::Result => {
                    let regenerate = egui::Button::new("Regenerate");
                    if ui.add_enabled(self.orchestrator.can_regenerate(), regenerate).clicked() {
                        self.dispatch(Event::Regenerate);
                    }
                    if ui.button("Mark again").clicked() {
                        self.dispatch(Event::Restart);
                    }
                    if ui.button("Save…").clicked() {
                        self.save_result();
                    }
                    if let Some(artifact) = self.orchestrator.artifact() {
                        if ui.button("Copy marked map").clicked() {
                            ui.ctx().copy_text(artifact.to_data_uri());
                            self.status = Some("Marked map copied as a data URI".to_string());
                        }
                    }
                    ui.separator();
                    if ui.button("New map").clicked() {
                        self.dispatch(Event::UploadNew);
                    }
                }
                AppState::Upload | AppState::Generating => {}
            }

            ui.separator();
            ui.label(self.hint());
        });
    }

    fn banners(&mut self, ui: &mut egui::Ui) {
        if let Some(message) = self.orchestrator.error().map(str::to_owned) {
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::from_rgb(230, 80, 80), message);
                if ui.small_button("Dismiss").clicked() {
                    self.orchestrator.dismiss_error();
                }
            });
        }
        if let Some(status) = self.status.clone() {
            ui.horizontal(|ui| {
                ui.label(status);
                if ui.small_button("OK").clicked() {
                    self.status = None;
                }
            });
        }
    }

    fn upload_screen(&mut self, ui: &mut egui::Ui) {
        ui.centered_and_justified(|ui| {
            if ui.button("Open a map image, or drop one here").clicked() {
                self.pick_image();
            }
        });
    }

    /// Paints the map and the preview marker; returns a tap in native pixels.
    fn map_canvas(&self, ui: &mut egui::Ui) -> Option<Point> {
        let interactive = self.orchestrator.state() == AppState::Marking
            && self
                .orchestrator
                .session()
                .is_some_and(|s| s.points.is_enabled());
        let sense = if interactive {
            egui::Sense::click()
        } else {
            egui::Sense::hover()
        };
        let (response, painter) = ui.allocate_painter(ui.available_size(), sense);
        let canvas_rect = response.rect;
        painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(40));

        let (session, texture) = (self.orchestrator.session()?, self.texture.as_ref()?);
        let native = session.image.size();
        let img_rect = fit_rect(canvas_rect, native);
        painter.image(
            texture.id(),
            img_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );

        let display = DisplayRect::from(img_rect);
        let mut surface = PainterSurface {
            painter: &painter,
            display,
            native,
        };
        draw_marker(&mut surface, self.orchestrator.preview(), self.orchestrator.style());

        if !interactive || !response.clicked() {
            return None;
        }
        let pos = response.interact_pointer_pos()?;
        if !img_rect.contains(pos) {
            return None;
        }
        map_to_image((pos.x, pos.y), display, native)
    }

    fn result_screen(&self, ui: &mut egui::Ui) {
        let Some(view) = &self.results.current else {
            return;
        };
        let available = ui.available_size();
        ui.centered_and_justified(|ui| {
            ui.add(
                egui::Image::from_bytes(view.uri.clone(), view.bytes.clone())
                    .max_size(available)
                    .maintain_aspect_ratio(true),
            );
        });
    }
}

/// Preview target: native-pixel geometry scaled onto the displayed image.
struct PainterSurface<'a> {
    painter: &'a egui::Painter,
    display: DisplayRect,
    native: NativeSize,
}

impl PainterSurface<'_> {
    fn to_screen(&self, p: Point) -> egui::Pos2 {
        let (x, y) = map_to_display(p, self.display, self.native);
        egui::pos2(x, y)
    }

    fn scale(&self) -> f32 {
        if self.native.width == 0 {
            return 1.0;
        }
        self.display.width / self.native.width as f32
    }
}

fn color32(c: [u8; 4]) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(c[0], c[1], c[2], c[3])
}

impl Surface for PainterSurface<'_> {
    fn line(&mut self, from: Point, to: Point, width: f32, color: [u8; 4]) {
        let stroke = egui::Stroke::new((width * self.scale()).max(1.0), color32(color));
        self.painter
            .line_segment([self.to_screen(from), self.to_screen(to)], stroke);
    }

    fn disc(&mut self, center: Point, radius: f32, color: [u8; 4]) {
        self.painter.circle_filled(
            self.to_screen(center),
            (radius * self.scale()).max(2.0),
            color32(color),
        );
    }
}

impl eframe::App for VantageApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Outcomes from the worker
        let finished: Vec<GenerationOutcome> = self
            .worker
            .as_ref()
            .map(|w| std::iter::from_fn(|| w.try_recv()).collect())
            .unwrap_or_default();
        for outcome in finished {
            self.dispatch(Event::GenerationFinished(outcome));
        }

        // Dropped files
        let dropped = ctx.input(|i| i.raw.dropped_files.iter().find_map(|f| f.path.clone()));
        if let Some(path) = dropped {
            self.load_path(&path);
        }

        // Keyboard shortcuts
        let undo = ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::Z));
        if undo && self.orchestrator.state() == AppState::Marking {
            self.dispatch(Event::Undo);
        }

        self.ensure_texture(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui);
            self.banners(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.orchestrator.state() {
            AppState::Upload => self.upload_screen(ui),
            AppState::Marking => {
                if let Some(point) = self.map_canvas(ui) {
                    self.dispatch(Event::AddPoint(point));
                }
            }
            AppState::Generating => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Waiting for the generation service…");
                });
                self.map_canvas(ui);
            }
            AppState::Result => self.result_screen(ui),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(tag: u8) -> GeneratedImage {
        GeneratedImage {
            mime: "image/png".into(),
            bytes: vec![tag; 8],
        }
    }

    #[test]
    fn same_result_keeps_its_view() {
        let mut views = ResultViews::default();
        assert_eq!(views.sync(Some(&generated(1))), None);
        assert_eq!(views.sync(Some(&generated(1))), None);
        assert_eq!(views.serial, 1);
    }

    #[test]
    fn replaced_result_evicts_the_old_uri() {
        let mut views = ResultViews::default();
        views.sync(Some(&generated(1)));
        let first = views.current.as_ref().map(|v| v.uri.clone());

        let evicted = views.sync(Some(&generated(2)));
        assert_eq!(evicted, first);
        assert_eq!(
            views.current.as_ref().map(|v| v.uri.as_str()),
            Some("bytes://result-2.png")
        );
    }

    #[test]
    fn cleared_result_evicts_the_view() {
        let mut views = ResultViews::default();
        views.sync(Some(&generated(1)));

        assert_eq!(views.sync(None).as_deref(), Some("bytes://result-1.png"));
        assert!(views.current.is_none());
        assert_eq!(views.sync(None), None);
    }
}
