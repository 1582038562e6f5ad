use std::io::Cursor;
use std::path::Path;

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use tiny_skia::{
    FillRule, LineCap, Paint, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8, Stroke,
    Transform,
};
use tracing::{debug, info};

use crate::arrow::{draw_marker, ArrowStyle, Marker, Surface};
use crate::error::{ExportError, LoadError};
use crate::geometry::{NativeSize, Point};
use crate::marks::PointSet;

/// The base image with the marker burned in, ready for the generation service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositedArtifact {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl CompositedArtifact {
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Jpeg { quality: u8 },
    Png,
}

impl ExportFormat {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::Jpeg { quality: 90 }
    }
}

/// A decoded base image, kept as RGBA at native resolution.
pub struct BaseImage {
    rgba: RgbaImage,
}

impl BaseImage {
    pub fn new(image: DynamicImage) -> Result<Self, LoadError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(LoadError::Empty);
        }
        Ok(Self {
            rgba: image.to_rgba8(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| LoadError::Undecodable(e.to_string()))?;
        Self::new(image)
    }

    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path).map_err(|e| LoadError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn size(&self) -> NativeSize {
        NativeSize {
            width: self.rgba.width(),
            height: self.rgba.height(),
        }
    }

    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }
}

/// Redraw base image and marker onto a fresh native-size surface and encode it.
///
/// Needs both anchors. The output depends only on the inputs.
pub fn export(
    base: &BaseImage,
    points: &PointSet,
    style: &ArrowStyle,
    format: ExportFormat,
) -> Result<CompositedArtifact, ExportError> {
    if points.pair().is_none() {
        return Err(ExportError::IncompletePoints);
    }

    let size = base.size();
    let mut canvas = fresh_canvas(base)?;
    draw_marker(
        &mut PixmapSurface(&mut canvas),
        &Marker::for_points(points, style),
        style,
    );

    let bytes = encode(&canvas, format)?;
    info!(
        width = size.width,
        height = size.height,
        mime = format.mime(),
        bytes = bytes.len(),
        "composite: exported"
    );
    Ok(CompositedArtifact {
        mime: format.mime().to_string(),
        bytes,
    })
}

/// Opaque white backdrop with the base image drawn at the origin, so
/// transparent maps flatten the same way on every run.
fn fresh_canvas(base: &BaseImage) -> Result<Pixmap, ExportError> {
    let NativeSize { width, height } = base.size();
    let surface_err = || ExportError::Surface { width, height };

    let mut source = Pixmap::new(width, height).ok_or_else(surface_err)?;
    for (dst, src) in source.pixels_mut().iter_mut().zip(base.rgba.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = premultiply(r, g, b, a);
    }

    let mut canvas = Pixmap::new(width, height).ok_or_else(surface_err)?;
    canvas.fill(tiny_skia::Color::WHITE);
    canvas.draw_pixmap(
        0,
        0,
        source.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    debug!(width, height, "composite: base drawn");
    Ok(canvas)
}

fn premultiply(r: u8, g: u8, b: u8, a: u8) -> PremultipliedColorU8 {
    let mul = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
    PremultipliedColorU8::from_rgba(mul(r), mul(g), mul(b), a)
        .unwrap_or(PremultipliedColorU8::TRANSPARENT)
}

fn encode(canvas: &Pixmap, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    // The canvas is opaque, so premultiplied channels equal straight ones.
    let mut rgb = RgbImage::new(canvas.width(), canvas.height());
    for (dst, src) in rgb.pixels_mut().zip(canvas.pixels()) {
        let c = src.demultiply();
        *dst = image::Rgb([c.red(), c.green(), c.blue()]);
    }

    let mut out = Cursor::new(Vec::new());
    match format {
        ExportFormat::Jpeg { quality } => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)
                .map_err(|e| ExportError::Encode(e.to_string()))?;
        }
        ExportFormat::Png => {
            rgb.write_to(&mut out, ImageFormat::Png)
                .map_err(|e| ExportError::Encode(e.to_string()))?;
        }
    }
    Ok(out.into_inner())
}

struct PixmapSurface<'a>(&'a mut Pixmap);

fn paint_for(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

impl Surface for PixmapSurface<'_> {
    fn line(&mut self, from: Point, to: Point, width: f32, color: [u8; 4]) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.x, from.y);
        pb.line_to(to.x, to.y);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            ..Default::default()
        };
        self.0
            .stroke_path(&path, &paint_for(color), &stroke, Transform::identity(), None);
    }

    fn disc(&mut self, center: Point, radius: f32, color: [u8; 4]) {
        let Some(path) = PathBuilder::from_circle(center.x, center.y, radius) else {
            return;
        };
        self.0.fill_path(
            &path,
            &paint_for(color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn map(width: u32, height: u32) -> BaseImage {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90, 255])
        });
        BaseImage::new(DynamicImage::ImageRgba8(img)).unwrap()
    }

    fn marked(a: Point, b: Point) -> PointSet {
        let mut set = PointSet::default();
        set.add(a);
        set.add(b);
        set
    }

    #[test]
    fn export_requires_two_points() {
        let base = map(64, 64);
        let mut set = PointSet::default();
        set.add(Point::new(5.0, 5.0));
        let err = export(&base, &set, &ArrowStyle::default(), ExportFormat::default());
        assert!(matches!(err, Err(ExportError::IncompletePoints)));
    }

    #[test]
    fn export_is_deterministic() {
        let base = map(160, 120);
        let set = marked(Point::new(20.5, 30.25), Point::new(120.0, 80.0));
        let style = ArrowStyle::default();
        let first = export(&base, &set, &style, ExportFormat::default()).unwrap();
        let second = export(&base, &set, &style, ExportFormat::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.mime, "image/jpeg");
    }

    #[test]
    fn export_keeps_native_size_and_burns_marker() {
        let base = map(200, 100);
        let set = marked(Point::new(60.0, 50.0), Point::new(160.0, 50.0));
        let artifact =
            export(&base, &set, &ArrowStyle::default(), ExportFormat::Png).unwrap();
        assert_eq!(artifact.mime, "image/png");

        let decoded = image::load_from_memory(&artifact.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (200, 100));
        // On the shaft, well clear of the shadow.
        let px = decoded.get_pixel(100, 49).0;
        assert_eq!(px, [255, 32, 32]);
        // Far corner untouched.
        assert_eq!(decoded.get_pixel(199, 0).0, base.rgba().get_pixel(199, 0).0[..3]);
    }

    #[test]
    fn zero_length_export_is_the_plain_base() {
        let base = map(40, 40);
        let same = Point::new(20.0, 20.0);
        let artifact =
            export(&base, &marked(same, same), &ArrowStyle::default(), ExportFormat::Png).unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap().to_rgb8();
        for (x, y, px) in decoded.enumerate_pixels() {
            assert_eq!(px.0, base.rgba().get_pixel(x, y).0[..3]);
        }
    }

    #[test]
    fn transparent_pixels_flatten_onto_white() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let base = BaseImage::new(DynamicImage::ImageRgba8(img)).unwrap();
        let canvas = fresh_canvas(&base).unwrap();
        let px = canvas.pixel(3, 3).unwrap();
        assert_eq!((px.red(), px.green(), px.blue(), px.alpha()), (255, 255, 255, 255));
    }

    #[test]
    fn data_uri_carries_mime_and_payload() {
        let artifact = CompositedArtifact {
            mime: "image/jpeg".into(),
            bytes: vec![0xff, 0xd8, 0xff],
        };
        assert_eq!(artifact.to_data_uri(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        let err = BaseImage::from_bytes(b"definitely not a map");
        assert!(matches!(err, Err(LoadError::Undecodable(_))));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = BaseImage::open(Path::new("/nonexistent/vantage/map.png"));
        assert!(matches!(err, Err(LoadError::Unreadable { .. })));
    }
}
