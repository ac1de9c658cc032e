use std::fmt;

use kurbo::{BezPath, Size};

use crate::error::{WallprinterError, WallprinterResult};

pub const MIN_POINTS: usize = 3;
pub const PERCENT_MAX: f64 = 100.0;

/// A polygon corner in percent of the scene (0..=100 on each axis).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, PERCENT_MAX),
            y: self.y.clamp(0.0, PERCENT_MAX),
        }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }

    pub fn to_pixels(self, width: f64, height: f64) -> kurbo::Point {
        kurbo::Point::new(self.x / PERCENT_MAX * width, self.y / PERCENT_MAX * height)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Viewport pixels to clamped percent. `None` for non-finite input or an empty viewport.
    pub fn from_pixels(p: kurbo::Point, viewport: Size) -> Option<Self> {
        if !(viewport.width > 0.0 && viewport.height > 0.0) {
            return None;
        }
        let pt = Point::new(
            p.x / viewport.width * PERCENT_MAX,
            p.y / viewport.height * PERCENT_MAX,
        );
        pt.is_finite().then(|| pt.clamped())
    }
}

/// Integer pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBounds {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// The user-drawn placement polygon. Always closed, always at least three corners.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct PlacementArea {
    points: Vec<Point>,
}

impl Default for PlacementArea {
    fn default() -> Self {
        Self {
            points: vec![
                Point::new(25.0, 25.0),
                Point::new(75.0, 25.0),
                Point::new(75.0, 75.0),
                Point::new(25.0, 75.0),
            ],
        }
    }
}

impl TryFrom<Vec<Point>> for PlacementArea {
    type Error = WallprinterError;

    fn try_from(points: Vec<Point>) -> WallprinterResult<Self> {
        Self::new(points)
    }
}

impl From<PlacementArea> for Vec<Point> {
    fn from(area: PlacementArea) -> Self {
        area.points
    }
}

impl PlacementArea {
    pub fn new(points: Vec<Point>) -> WallprinterResult<Self> {
        if points.len() < MIN_POINTS {
            return Err(WallprinterError::validation(format!(
                "placement area needs at least {MIN_POINTS} points, got {}",
                points.len()
            )));
        }
        if !points.iter().all(|p| p.is_finite()) {
            return Err(WallprinterError::validation(
                "placement area points must be finite",
            ));
        }
        Ok(Self {
            points: points.into_iter().map(Point::clamped).collect(),
        })
    }

    /// Parses the `"x,y x,y ..."` text form.
    pub fn parse(s: &str) -> WallprinterResult<Self> {
        let mut points = Vec::new();
        for pair in s.split_whitespace() {
            let (x, y) = pair.split_once(',').ok_or_else(|| {
                WallprinterError::validation(format!("expected 'x,y', got '{pair}'"))
            })?;
            let x: f64 = x
                .trim()
                .parse()
                .map_err(|_| WallprinterError::validation(format!("bad x coordinate '{x}'")))?;
            let y: f64 = y
                .trim()
                .parse()
                .map_err(|_| WallprinterError::validation(format!("bad y coordinate '{y}'")))?;
            points.push(Point::new(x, y));
        }
        Self::new(points)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn move_point(&mut self, index: usize, to: Point) -> WallprinterResult<()> {
        if !to.is_finite() {
            return Err(WallprinterError::validation(
                "placement area points must be finite",
            ));
        }
        let n = self.points.len();
        let slot = self.points.get_mut(index).ok_or_else(|| {
            WallprinterError::validation(format!("point index {index} out of range (len {n})"))
        })?;
        *slot = to.clamped();
        Ok(())
    }

    /// Splits edge `edge` at its midpoint. Returns the index of the new point.
    pub fn insert_midpoint(&mut self, edge: usize) -> WallprinterResult<usize> {
        let n = self.points.len();
        if edge >= n {
            return Err(WallprinterError::validation(format!(
                "edge index {edge} out of range (len {n})"
            )));
        }
        let mid = self.points[edge].midpoint(self.points[(edge + 1) % n]);
        self.points.insert(edge + 1, mid);
        Ok(edge + 1)
    }

    pub fn remove_point(&mut self, index: usize) -> WallprinterResult<Point> {
        let n = self.points.len();
        if index >= n {
            return Err(WallprinterError::validation(format!(
                "point index {index} out of range (len {n})"
            )));
        }
        if n <= MIN_POINTS {
            return Err(WallprinterError::validation(format!(
                "placement area cannot have fewer than {MIN_POINTS} points"
            )));
        }
        Ok(self.points.remove(index))
    }

    /// Midpoint of every edge, in edge order.
    pub fn midpoints(&self) -> Vec<Point> {
        let n = self.points.len();
        (0..n)
            .map(|i| self.points[i].midpoint(self.points[(i + 1) % n]))
            .collect()
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> Vec<kurbo::Point> {
        self.points
            .iter()
            .map(|p| p.to_pixels(f64::from(width), f64::from(height)))
            .collect()
    }

    pub fn to_path(&self, width: u32, height: u32) -> BezPath {
        let mut path = BezPath::new();
        let mut it = self.to_pixels(width, height).into_iter();
        if let Some(first) = it.next() {
            path.move_to(first);
            for p in it {
                path.line_to(p);
            }
            path.close_path();
        }
        path
    }

    /// Bounding box of the polygon in pixel space, clipped to the image.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> Option<PixelBounds> {
        let px = self.to_pixels(width, height);
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &px {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        let x0 = min_x.floor().clamp(0.0, f64::from(width)) as u32;
        let y0 = min_y.floor().clamp(0.0, f64::from(height)) as u32;
        let x1 = max_x.ceil().clamp(0.0, f64::from(width)) as u32;
        let y1 = max_y.ceil().clamp(0.0, f64::from(height)) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelBounds { x0, y0, x1, y1 })
    }

    /// Shoelace area in percent² units.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        let mut acc = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            acc += a.x * b.y - b.x * a.y;
        }
        acc.abs() * 0.5
    }

    pub(crate) fn map_points(&self, f: impl Fn(Point) -> Point) -> Self {
        Self {
            points: self.points.iter().copied().map(f).map(Point::clamped).collect(),
        }
    }
}

impl fmt::Display for PlacementArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.points.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{},{}", p.x, p.y)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hit {
    Vertex(usize),
    /// A midpoint handle was grabbed; the edge was split and the new vertex is being dragged.
    Midpoint { edge: usize, inserted: usize },
    Miss,
}

#[derive(Clone, Debug)]
struct Drag {
    index: usize,
    before: PlacementArea,
}

/// Pointer gesture handling over a [`PlacementArea`] drawn in a viewport.
///
/// Positions are viewport pixels; the viewport is the on-screen size of the scene.
#[derive(Clone, Debug)]
pub struct PolygonEditor {
    area: PlacementArea,
    handle_radius_px: f64,
    drag: Option<Drag>,
}

impl Default for PolygonEditor {
    fn default() -> Self {
        Self::new(PlacementArea::default())
    }
}

impl PolygonEditor {
    pub const DEFAULT_HANDLE_RADIUS_PX: f64 = 12.0;

    pub fn new(area: PlacementArea) -> Self {
        Self {
            area,
            handle_radius_px: Self::DEFAULT_HANDLE_RADIUS_PX,
            drag: None,
        }
    }

    pub fn with_handle_radius(mut self, radius_px: f64) -> Self {
        self.handle_radius_px = radius_px.max(0.0);
        self
    }

    pub fn area(&self) -> &PlacementArea {
        &self.area
    }

    pub fn set_area(&mut self, area: PlacementArea) {
        self.area = area;
        self.drag = None;
    }

    pub fn dragging(&self) -> Option<usize> {
        self.drag.as_ref().map(|d| d.index)
    }

    pub fn hit_test(&self, pos: kurbo::Point, viewport: Size) -> Hit {
        let r2 = self.handle_radius_px * self.handle_radius_px;
        let to_px = |p: Point| p.to_pixels(viewport.width, viewport.height);

        let nearest = |candidates: Vec<Point>| {
            candidates
                .into_iter()
                .enumerate()
                .map(|(i, p)| (i, to_px(p).distance_squared(pos)))
                .filter(|(_, d2)| *d2 <= r2)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
        };

        if let Some(i) = nearest(self.area.points.clone()) {
            return Hit::Vertex(i);
        }
        if let Some(edge) = nearest(self.area.midpoints()) {
            return Hit::Midpoint {
                edge,
                inserted: edge + 1,
            };
        }
        Hit::Miss
    }

    pub fn pointer_down(&mut self, pos: kurbo::Point, viewport: Size) -> WallprinterResult<Hit> {
        let before = self.area.clone();
        let hit = self.hit_test(pos, viewport);
        let index = match hit {
            Hit::Vertex(i) => i,
            Hit::Midpoint { edge, .. } => self.area.insert_midpoint(edge)?,
            Hit::Miss => {
                self.drag = None;
                return Ok(hit);
            }
        };
        tracing::debug!(?hit, "placement area drag started");
        self.drag = Some(Drag { index, before });
        Ok(hit)
    }

    pub fn pointer_move(&mut self, pos: kurbo::Point, viewport: Size) -> WallprinterResult<()> {
        let Some(drag) = &self.drag else {
            return Ok(());
        };
        let index = drag.index;
        match Point::from_pixels(pos, viewport) {
            Some(to) => self.area.move_point(index, to),
            None => Ok(()),
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    pub fn cancel(&mut self) {
        if let Some(drag) = self.drag.take() {
            self.area = drag.before;
        }
    }

    /// Deletes the vertex under `pos`. Returns the removed index, if any.
    pub fn remove_at(
        &mut self,
        pos: kurbo::Point,
        viewport: Size,
    ) -> WallprinterResult<Option<usize>> {
        match self.hit_test(pos, viewport) {
            Hit::Vertex(i) => {
                self.area.remove_point(i)?;
                self.drag = None;
                Ok(Some(i))
            }
            _ => Ok(None),
        }
    }
}
