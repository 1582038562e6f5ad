/// A position in the base image's native pixel space.
///
/// Sub-pixel precision is kept; nothing here rounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Where the scaled image currently sits on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub fn is_laid_out(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

impl From<egui::Rect> for DisplayRect {
    fn from(rect: egui::Rect) -> Self {
        Self {
            left: rect.min.x,
            top: rect.min.y,
            width: rect.width(),
            height: rect.height(),
        }
    }
}

/// Native dimensions of the decoded image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeSize {
    pub width: u32,
    pub height: u32,
}

/// Convert a pointer position in screen space to native image pixels.
///
/// Returns `None` while the image has no layout yet (zero displayed size).
pub fn map_to_image(event: (f32, f32), rect: DisplayRect, native: NativeSize) -> Option<Point> {
    if !rect.is_laid_out() {
        return None;
    }
    let scale_x = native.width as f32 / rect.width;
    let scale_y = native.height as f32 / rect.height;
    Some(Point {
        x: (event.0 - rect.left) * scale_x,
        y: (event.1 - rect.top) * scale_y,
    })
}

/// Inverse of [`map_to_image`], used to paint the preview over the scaled image.
pub fn map_to_display(point: Point, rect: DisplayRect, native: NativeSize) -> (f32, f32) {
    if native.width == 0 || native.height == 0 {
        return (rect.left, rect.top);
    }
    let scale_x = rect.width / native.width as f32;
    let scale_y = rect.height / native.height as f32;
    (rect.left + point.x * scale_x, rect.top + point.y * scale_y)
}

/// Largest rect with the image's aspect ratio that fits inside `available`, centred.
pub fn fit_rect(available: egui::Rect, native: NativeSize) -> egui::Rect {
    if native.width == 0 || native.height == 0 {
        return egui::Rect::from_min_size(available.min, egui::Vec2::ZERO);
    }
    let scale = (available.width() / native.width as f32)
        .min(available.height() / native.height as f32)
        .max(0.0);
    let size = egui::vec2(native.width as f32 * scale, native.height as f32 * scale);
    egui::Rect::from_center_size(available.center(), size)
}

/// Largest size with the same aspect ratio whose longer side fits `max_side`.
/// Sizes that already fit come back unchanged.
pub fn fit_within(native: NativeSize, max_side: u32) -> NativeSize {
    let longest = native.width.max(native.height);
    if longest <= max_side || max_side == 0 {
        return native;
    }
    let scale = max_side as f64 / longest as f64;
    let shrink = |v: u32| ((v as f64 * scale).round() as u32).clamp(1, max_side);
    NativeSize {
        width: shrink(native.width),
        height: shrink(native.height),
    }
}
