use crate::geometry::Point;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkState {
    Empty,
    OnePoint,
    TwoPoints,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Anchors {
    Empty,
    One(Point),
    Two(Point, Point),
}

/// The viewpoint (tail) and look-at (head) anchors, in capture order.
///
/// Holding at most two points is a property of the representation, so there
/// is no length to check.
#[derive(Clone, Debug, PartialEq)]
pub struct PointSet {
    anchors: Anchors,
    enabled: bool,
}

impl Default for PointSet {
    fn default() -> Self {
        Self {
            anchors: Anchors::Empty,
            enabled: true,
        }
    }
}

impl PointSet {
    pub fn state(&self) -> MarkState {
        match self.anchors {
            Anchors::Empty => MarkState::Empty,
            Anchors::One(_) => MarkState::OnePoint,
            Anchors::Two(..) => MarkState::TwoPoints,
        }
    }

    pub fn len(&self) -> usize {
        match self.anchors {
            Anchors::Empty => 0,
            Anchors::One(_) => 1,
            Anchors::Two(..) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchors == Anchors::Empty
    }

    pub fn points(&self) -> Vec<Point> {
        match self.anchors {
            Anchors::Empty => Vec::new(),
            Anchors::One(a) => vec![a],
            Anchors::Two(a, b) => vec![a, b],
        }
    }

    /// `(tail, head)` once both anchors are set.
    pub fn pair(&self) -> Option<(Point, Point)> {
        match self.anchors {
            Anchors::Two(a, b) => Some((a, b)),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// While disabled every `add` is ignored; undo and reset still apply.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns whether the point was accepted.
    pub fn add(&mut self, point: Point) -> bool {
        if !self.enabled {
            return false;
        }
        self.anchors = match self.anchors {
            Anchors::Empty => Anchors::One(point),
            Anchors::One(a) => Anchors::Two(a, point),
            Anchors::Two(..) => return false,
        };
        true
    }

    /// Drops the most recent point. Returns whether anything changed.
    pub fn undo(&mut self) -> bool {
        self.anchors = match self.anchors {
            Anchors::Empty => return false,
            Anchors::One(_) => Anchors::Empty,
            Anchors::Two(a, _) => Anchors::One(a),
        };
        true
    }

    pub fn reset(&mut self) {
        self.anchors = Anchors::Empty;
        self.enabled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn fills_in_capture_order() {
        let mut set = PointSet::default();
        assert_eq!(set.state(), MarkState::Empty);
        assert!(set.add(p(1.0, 2.0)));
        assert_eq!(set.state(), MarkState::OnePoint);
        assert!(set.add(p(3.0, 4.0)));
        assert_eq!(set.state(), MarkState::TwoPoints);
        assert_eq!(set.pair(), Some((p(1.0, 2.0), p(3.0, 4.0))));
    }

    #[test]
    fn third_point_is_ignored() {
        let mut set = PointSet::default();
        set.add(p(0.0, 0.0));
        set.add(p(1.0, 1.0));
        let before = set.clone();
        for i in 0..5 {
            assert!(!set.add(p(i as f32, 9.0)));
        }
        assert_eq!(set, before);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn length_tracks_adds_minus_undos() {
        // Each case: number of adds, then number of undos.
        for adds in 0..5usize {
            for undos in 0..=adds.min(2) {
                let mut set = PointSet::default();
                for i in 0..adds {
                    set.add(p(i as f32, 0.0));
                }
                for _ in 0..undos {
                    set.undo();
                }
                assert_eq!(set.len(), adds.min(2) - undos, "adds={adds} undos={undos}");
                assert!(set.len() <= 2);
            }
        }
    }

    #[test]
    fn undo_on_empty_is_noop() {
        let mut set = PointSet::default();
        assert!(!set.undo());
        assert_eq!(set, PointSet::default());
    }

    #[test]
    fn undo_removes_head_first() {
        let mut set = PointSet::default();
        set.add(p(1.0, 1.0));
        set.add(p(2.0, 2.0));
        assert!(set.undo());
        assert_eq!(set.points(), vec![p(1.0, 1.0)]);
    }

    #[test]
    fn disabled_set_rejects_points() {
        let mut set = PointSet::default();
        set.set_enabled(false);
        assert!(!set.add(p(1.0, 1.0)));
        assert!(set.is_empty());
        set.set_enabled(true);
        assert!(set.add(p(1.0, 1.0)));
    }

    #[test]
    fn reset_clears_and_reenables() {
        let mut set = PointSet::default();
        set.add(p(1.0, 1.0));
        set.set_enabled(false);
        set.reset();
        assert!(set.is_empty());
        assert!(set.is_enabled());
    }

    #[test]
    fn identical_points_are_recorded() {
        let mut set = PointSet::default();
        set.add(p(5.0, 5.0));
        assert!(set.add(p(5.0, 5.0)));
        assert_eq!(set.pair(), Some((p(5.0, 5.0), p(5.0, 5.0))));
    }
}
