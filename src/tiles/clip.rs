use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon, Rect,
};

use super::coord::{LonLatBounds, TileCoord, lonlat_to_mercator, mercator_to_tile};

type TilePoint = (f64, f64);

pub fn clip_to_tile(
    geometry: &Geometry<f64>,
    coord: &TileCoord,
    extent: u32,
    simplify: Option<f32>,
) -> Option<Geometry<f32>> {
    let clipper = TileClipper {
        edges: coord.tile_edges(),
        bounds: coord.mercator_bounds(),
        extent,
        simplify: simplify.filter(|tolerance| *tolerance > 0.0),
    };
    clipper.clip(geometry)
}

struct TileClipper {
    edges: LonLatBounds,
    bounds: Rect<f64>,
    extent: u32,
    simplify: Option<f32>,
}

impl TileClipper {
    fn clip(&self, geometry: &Geometry<f64>) -> Option<Geometry<f32>> {
        match geometry {
            Geometry::Point(point) => self.clip_points(std::slice::from_ref(point)),
            Geometry::MultiPoint(MultiPoint(points)) => self.clip_points(points),
            Geometry::Line(line) => self.clip_lines(&[LineString::from(vec![line.start, line.end])]),
            Geometry::LineString(line) => self.clip_lines(std::slice::from_ref(line)),
            Geometry::MultiLineString(MultiLineString(lines)) => self.clip_lines(lines),
            Geometry::Polygon(polygon) => self.clip_polygons(std::slice::from_ref(polygon)),
            Geometry::MultiPolygon(MultiPolygon(polygons)) => self.clip_polygons(polygons),
            Geometry::Rect(rect) => self.clip_polygons(&[rect.to_polygon()]),
            Geometry::Triangle(triangle) => self.clip_polygons(&[triangle.to_polygon()]),
            // Mixed collections cannot be expressed as a single MVT feature.
            Geometry::GeometryCollection(_) => None,
        }
    }

    fn project(&self, coord: Coord<f64>) -> TilePoint {
        let projected = mercator_to_tile(lonlat_to_mercator(coord.x, coord.y), &self.bounds, self.extent);
        (projected.x, projected.y)
    }

    fn limit(&self) -> f64 {
        self.extent as f64
    }

    // Half-open on the east and south edges, so a point on a shared edge
    // belongs to exactly one tile. Neighbours compute the shared edge with the
    // same formula, hence the comparison in degrees.
    fn owns_point(&self, point: &Point<f64>) -> bool {
        let edges = &self.edges;
        (edges.west..edges.east).contains(&point.x())
            && point.y() > edges.south
            && point.y() <= edges.north
    }

    fn clip_points(&self, points: &[Point<f64>]) -> Option<Geometry<f32>> {
        let mut kept: Vec<Coord<f32>> = Vec::new();
        for point in points.iter().filter(|point| self.owns_point(point)) {
            let quantized = quantize(self.project(point.0));
            if !kept.contains(&quantized) {
                kept.push(quantized);
            }
        }
        match kept.len() {
            0 => None,
            1 => Some(Geometry::Point(Point(kept[0]))),
            _ => Some(Geometry::MultiPoint(
                kept.into_iter().map(Point).collect::<MultiPoint<f32>>(),
            )),
        }
    }

    fn clip_lines(&self, lines: &[LineString<f64>]) -> Option<Geometry<f32>> {
        let mut pieces: Vec<LineString<f32>> = Vec::new();
        for line in lines {
            let projected: Vec<TilePoint> = line.0.iter().map(|c| self.project(*c)).collect();
            for piece in clip_polyline(&projected, self.limit()) {
                let mut coords = dedupe(piece.into_iter().map(quantize).collect());
                if let Some(tolerance) = self.simplify {
                    coords = simplify_line(&coords, tolerance);
                }
                if coords.len() >= 2 {
                    pieces.push(LineString::from(coords));
                }
            }
        }
        match pieces.len() {
            0 => None,
            1 => pieces.pop().map(Geometry::LineString),
            _ => Some(Geometry::MultiLineString(MultiLineString(pieces))),
        }
    }

    fn clip_polygons(&self, polygons: &[Polygon<f64>]) -> Option<Geometry<f32>> {
        let mut kept: Vec<Polygon<f32>> = Vec::new();
        for polygon in polygons {
            let Some(exterior) = self.clip_ring(polygon.exterior(), true) else {
                continue;
            };
            let interiors = polygon
                .interiors()
                .iter()
                .filter_map(|ring| self.clip_ring(ring, false))
                .collect::<Vec<_>>();
            kept.push(Polygon::new(exterior, interiors));
        }
        match kept.len() {
            0 => None,
            1 => kept.pop().map(Geometry::Polygon),
            _ => Some(Geometry::MultiPolygon(MultiPolygon(kept))),
        }
    }

    fn clip_ring(&self, ring: &LineString<f64>, exterior: bool) -> Option<LineString<f32>> {
        let mut projected: Vec<TilePoint> = ring.0.iter().map(|c| self.project(*c)).collect();
        if projected.len() > 1 && projected.first() == projected.last() {
            projected.pop();
        }
        let clipped = clip_ring_to_extent(&projected, self.limit());
        let mut coords = dedupe(clipped.into_iter().map(quantize).collect());
        if coords.len() > 1 && coords.first() == coords.last() {
            coords.pop();
        }
        if let Some(tolerance) = self.simplify {
            coords = simplify_ring(&coords, tolerance);
        }
        if coords.len() < 3 {
            return None;
        }
        let area = signed_area(&coords);
        if area == 0.0 {
            return None;
        }
        if (area > 0.0) != exterior {
            coords.reverse();
        }
        coords.push(coords[0]);
        Some(LineString::from(coords))
    }
}

fn quantize(point: TilePoint) -> Coord<f32> {
    Coord {
        x: point.0.round() as f32,
        y: point.1.round() as f32,
    }
}

fn dedupe(coords: Vec<Coord<f32>>) -> Vec<Coord<f32>> {
    let mut out: Vec<Coord<f32>> = Vec::with_capacity(coords.len());
    for coord in coords {
        if out.last() != Some(&coord) {
            out.push(coord);
        }
    }
    out
}

// Twice the shoelace area; positive for clockwise rings in y-down space.
fn signed_area(ring: &[Coord<f32>]) -> f64 {
    let mut area = 0.0f64;
    for (i, current) in ring.iter().enumerate() {
        let next = ring[(i + 1) % ring.len()];
        area += current.x as f64 * next.y as f64 - next.x as f64 * current.y as f64;
    }
    area
}

// Liang-Barsky segment clipping. A polyline leaving and re-entering the
// tile produces several pieces.
fn clip_polyline(points: &[TilePoint], limit: f64) -> Vec<Vec<TilePoint>> {
    let mut pieces: Vec<Vec<TilePoint>> = Vec::new();
    let mut current: Vec<TilePoint> = Vec::new();
    for pair in points.windows(2) {
        match clip_segment(pair[0], pair[1], limit) {
            Some((start, end)) => {
                if current.last() != Some(&start) {
                    if current.len() >= 2 {
                        pieces.push(std::mem::take(&mut current));
                    }
                    current.clear();
                    current.push(start);
                }
                current.push(end);
                // The segment left the tile; the next one starts a new piece.
                if end != pair[1] {
                    pieces.push(std::mem::take(&mut current));
                }
            }
            None => {
                if current.len() >= 2 {
                    pieces.push(std::mem::take(&mut current));
                }
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        pieces.push(current);
    }
    pieces
}

fn clip_segment(a: TilePoint, b: TilePoint, limit: f64) -> Option<(TilePoint, TilePoint)> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, a.0),
        (dx, limit - a.0),
        (-dy, a.1),
        (dy, limit - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    let at = |t: f64| (a.0 + t * dx, a.1 + t * dy);
    let start = if t0 > 0.0 { at(t0) } else { a };
    let end = if t1 < 1.0 { at(t1) } else { b };
    Some((start, end))
}

// Sutherland-Hodgman against the four tile edges with a zero buffer.
fn clip_ring_to_extent(ring: &[TilePoint], limit: f64) -> Vec<TilePoint> {
    let mut output = ring.to_vec();
    output = clip_against_edge(&output, |p| p.0 >= 0.0, |p1, p2| {
        let t = (0.0 - p1.0) / (p2.0 - p1.0);
        (0.0, p1.1 + t * (p2.1 - p1.1))
    });
    output = clip_against_edge(&output, |p| p.0 <= limit, |p1, p2| {
        let t = (limit - p1.0) / (p2.0 - p1.0);
        (limit, p1.1 + t * (p2.1 - p1.1))
    });
    output = clip_against_edge(&output, |p| p.1 >= 0.0, |p1, p2| {
        let t = (0.0 - p1.1) / (p2.1 - p1.1);
        (p1.0 + t * (p2.0 - p1.0), 0.0)
    });
    clip_against_edge(&output, |p| p.1 <= limit, |p1, p2| {
        let t = (limit - p1.1) / (p2.1 - p1.1);
        (p1.0 + t * (p2.0 - p1.0), limit)
    })
}

fn clip_against_edge<F, I>(polygon: &[TilePoint], inside: F, intersect: I) -> Vec<TilePoint>
where
    F: Fn(&TilePoint) -> bool,
    I: Fn(&TilePoint, &TilePoint) -> TilePoint,
{
    let mut output = Vec::with_capacity(polygon.len());
    let n = polygon.len();
    for i in 0..n {
        let current = &polygon[i];
        let next = &polygon[(i + 1) % n];
        match (inside(current), inside(next)) {
            (true, true) => output.push(*next),
            (true, false) => output.push(intersect(current, next)),
            (false, true) => {
                output.push(intersect(current, next));
                output.push(*next);
            }
            (false, false) => {}
        }
    }
    output
}

pub fn simplify_ring(points: &[Coord<f32>], tolerance: f32) -> Vec<Coord<f32>> {
    if points.len() <= 4 {
        return points.to_vec();
    }
    let simplified = simplify_line(points, tolerance);
    if simplified.len() < 3 {
        return points.to_vec();
    }
    simplified
}

pub fn simplify_line(points: &[Coord<f32>], tolerance: f32) -> Vec<Coord<f32>> {
    if points.len() <= 2 || tolerance <= 0.0 {
        return points.to_vec();
    }
    let sq_tolerance = tolerance * tolerance;
    let reduced = simplify_radial_dist(points, sq_tolerance);
    if reduced.len() <= 2 {
        return reduced;
    }
    simplify_douglas_peucker(&reduced, sq_tolerance)
}

fn simplify_radial_dist(points: &[Coord<f32>], sq_tolerance: f32) -> Vec<Coord<f32>> {
    let Some((&first, rest)) = points.split_first() else {
        return Vec::new();
    };
    let mut prev = first;
    let mut out = vec![prev];
    for point in rest {
        if get_sq_dist(*point, prev) > sq_tolerance {
            out.push(*point);
            prev = *point;
        }
    }
    if let Some(&last) = points.last() {
        if prev != last {
            out.push(last);
        }
    }
    out
}

fn simplify_douglas_peucker(points: &[Coord<f32>], sq_tolerance: f32) -> Vec<Coord<f32>> {
    let last = points.len() - 1;
    let mut simplified = vec![points[0]];
    simplify_dp_step(points, 0, last, sq_tolerance, &mut simplified);
    simplified.push(points[last]);
    simplified
}

fn simplify_dp_step(
    points: &[Coord<f32>],
    first: usize,
    last: usize,
    sq_tolerance: f32,
    simplified: &mut Vec<Coord<f32>>,
) {
    let mut max_sq_dist = sq_tolerance;
    let mut index = None;

    for i in (first + 1)..last {
        let sq_dist = get_sq_seg_dist(points[i], points[first], points[last]);
        if sq_dist > max_sq_dist {
            index = Some(i);
            max_sq_dist = sq_dist;
        }
    }

    if let Some(idx) = index {
        if idx - first > 1 {
            simplify_dp_step(points, first, idx, sq_tolerance, simplified);
        }
        simplified.push(points[idx]);
        if last - idx > 1 {
            simplify_dp_step(points, idx, last, sq_tolerance, simplified);
        }
    }
}

fn get_sq_dist(p1: Coord<f32>, p2: Coord<f32>) -> f32 {
    let dx = p1.x - p2.x;
    let dy = p1.y - p2.y;
    dx * dx + dy * dy
}

fn get_sq_seg_dist(p: Coord<f32>, p1: Coord<f32>, p2: Coord<f32>) -> f32 {
    let mut x = p1.x;
    let mut y = p1.y;
    let dx = p2.x - x;
    let dy = p2.y - y;

    if dx != 0.0 || dy != 0.0 {
        let t = ((p.x - x) * dx + (p.y - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = p2.x;
            y = p2.y;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    let dx = p.x - x;
    let dy = p.y - y;
    dx * dx + dy * dy
}
