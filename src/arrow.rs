use std::f32::consts::PI;

use crate::geometry::Point;
use crate::marks::PointSet;

/// Drawing parameters for the direction marker, in native pixel units.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrowStyle {
    pub color: [u8; 4],
    pub shadow: [u8; 4],
    pub shadow_offset: f32,
    pub width: f32,
    /// Cosmetic extension behind the tail so short gestures stay visible.
    pub tail_extension: f32,
    pub head_length: f32,
    /// Angle between each head stroke and the reversed shaft.
    pub head_angle: f32,
    pub dot_radius: f32,
}

impl Default for ArrowStyle {
    fn default() -> Self {
        Self {
            color: [255, 32, 32, 255],
            shadow: [0, 0, 0, 140],
            shadow_offset: 2.0,
            width: 6.0,
            tail_extension: 50.0,
            head_length: 25.0,
            head_angle: PI / 6.0,
            dot_radius: 10.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArrowGeometry {
    /// Start of the drawn shaft, `tail_extension` behind `from`.
    pub tail: Point,
    pub to: Point,
    pub head_left: Point,
    pub head_right: Point,
}

impl ArrowGeometry {
    /// `None` when both anchors coincide: a zero-length direction has no angle.
    pub fn new(from: Point, to: Point, style: &ArrowStyle) -> Option<Self> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            return None;
        }
        let angle = dy.atan2(dx);
        let (ux, uy) = (dx / length, dy / length);

        let tail = Point::new(
            from.x - ux * style.tail_extension,
            from.y - uy * style.tail_extension,
        );
        let barb = |offset: f32| {
            Point::new(
                to.x - style.head_length * (angle + offset).cos(),
                to.y - style.head_length * (angle + offset).sin(),
            )
        };

        Some(Self {
            tail,
            to,
            head_left: barb(-style.head_angle),
            head_right: barb(style.head_angle),
        })
    }

    fn segments(&self) -> [(Point, Point); 3] {
        [
            (self.tail, self.to),
            (self.to, self.head_left),
            (self.to, self.head_right),
        ]
    }
}

/// What the current anchors look like on screen or in the export.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Marker {
    None,
    /// Origin set, direction pending.
    Dot(Point),
    Arrow(ArrowGeometry),
}

impl Marker {
    pub fn for_points(points: &PointSet, style: &ArrowStyle) -> Self {
        if let Some((from, to)) = points.pair() {
            return ArrowGeometry::new(from, to, style).map_or(Marker::None, Marker::Arrow);
        }
        match points.points().first() {
            Some(&origin) => Marker::Dot(origin),
            None => Marker::None,
        }
    }
}

/// Anything the marker can be drawn onto: the export pixmap or the preview painter.
pub trait Surface {
    fn line(&mut self, from: Point, to: Point, width: f32, color: [u8; 4]);
    fn disc(&mut self, center: Point, radius: f32, color: [u8; 4]);
}

pub fn draw_marker(surface: &mut dyn Surface, marker: &Marker, style: &ArrowStyle) {
    let shift = |p: Point| Point::new(p.x + style.shadow_offset, p.y + style.shadow_offset);

    match marker {
        Marker::None => {}
        Marker::Dot(center) => {
            surface.disc(shift(*center), style.dot_radius, style.shadow);
            surface.disc(*center, style.dot_radius, style.color);
        }
        Marker::Arrow(arrow) => {
            for (a, b) in arrow.segments() {
                surface.line(shift(a), shift(b), style.width, style.shadow);
            }
            for (a, b) in arrow.segments() {
                surface.line(a, b, style.width, style.color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Call {
        Line(Point, Point, [u8; 4]),
        Disc(Point, f32, [u8; 4]),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
    }

    impl Surface for Recorder {
        fn line(&mut self, from: Point, to: Point, _width: f32, color: [u8; 4]) {
            self.calls.push(Call::Line(from, to, color));
        }

        fn disc(&mut self, center: Point, radius: f32, color: [u8; 4]) {
            self.calls.push(Call::Disc(center, radius, color));
        }
    }

    fn render(points: &[Point]) -> Vec<Call> {
        let style = ArrowStyle::default();
        let mut set = PointSet::default();
        for p in points {
            set.add(*p);
        }
        let mut recorder = Recorder::default();
        draw_marker(&mut recorder, &Marker::for_points(&set, &style), &style);
        recorder.calls
    }

    fn colored_lines(calls: &[Call]) -> Vec<(Point, Point)> {
        let color = ArrowStyle::default().color;
        calls
            .iter()
            .filter_map(|c| match c {
                Call::Line(a, b, c) if *c == color => Some((*a, *b)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn nothing_drawn_without_points() {
        assert!(render(&[]).is_empty());
    }

    #[test]
    fn single_point_draws_dot() {
        let calls = render(&[Point::new(40.0, 50.0)]);
        let style = ArrowStyle::default();
        assert!(calls.contains(&Call::Disc(Point::new(40.0, 50.0), 10.0, style.color)));
        assert!(colored_lines(&calls).is_empty());
    }

    #[test]
    fn head_strokes_are_thirty_degrees_off_reverse() {
        let calls = render(&[Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);
        let lines = colored_lines(&calls);
        assert_eq!(lines.len(), 3);

        for (start, end) in &lines[1..] {
            assert_eq!(*start, Point::new(100.0, 0.0));
            let (vx, vy) = (end.x - start.x, end.y - start.y);
            // Angle against (-1, 0).
            let cos = -vx / (vx * vx + vy * vy).sqrt();
            let degrees = cos.acos().to_degrees();
            assert!((degrees - 30.0).abs() < 1e-3, "got {degrees}");
            assert!(((vx * vx + vy * vy).sqrt() - 25.0).abs() < 1e-3);
        }
        let (left, right) = (lines[1].1, lines[2].1);
        assert!(left.y * right.y < 0.0, "barbs sit on both sides of the shaft");
    }

    #[test]
    fn shaft_extends_behind_tail() {
        let calls = render(&[Point::new(200.0, 100.0), Point::new(200.0, 110.0)]);
        let lines = colored_lines(&calls);
        let (tail, tip) = lines[0];
        assert_eq!(tail, Point::new(200.0, 50.0));
        assert_eq!(tip, Point::new(200.0, 110.0));
    }

    #[test]
    fn extension_leaves_stored_points_alone() {
        let style = ArrowStyle::default();
        let mut set = PointSet::default();
        set.add(Point::new(10.0, 10.0));
        set.add(Point::new(20.0, 10.0));
        let Marker::Arrow(arrow) = Marker::for_points(&set, &style) else {
            panic!("expected arrow");
        };
        assert_eq!(arrow.tail, Point::new(-40.0, 10.0));
        assert_eq!(set.pair(), Some((Point::new(10.0, 10.0), Point::new(20.0, 10.0))));
    }

    #[test]
    fn zero_length_issues_no_draw_calls() {
        let same = Point::new(64.0, 64.0);
        assert!(render(&[same, same]).is_empty());
    }

    #[test]
    fn shadow_is_drawn_under_marker() {
        let calls = render(&[Point::new(0.0, 0.0), Point::new(50.0, 50.0)]);
        let style = ArrowStyle::default();
        assert_eq!(calls.len(), 6);
        assert!(matches!(calls[0], Call::Line(_, _, c) if c == style.shadow));
        assert!(matches!(calls[5], Call::Line(_, _, c) if c == style.color));
    }
}
