//! Kite frame geometry.
//!
//! Local frame: Y up along the spine, X along the span, +Z in front of the
//! sail where the bridles meet. The body origin is the bottom of the spine.

use na::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Vec3;
use crate::config::GeometryParams;

/// Height of the center point and the spreader, as a fraction of the kite height.
const CENTER_HEIGHT_RATIO: f64 = 0.25;
/// Height of the whisker tips, as a fraction of the kite height.
const WHISKER_HEIGHT_RATIO: f64 = 0.15;

const TRILATERATION_EPS: f64 = 1e-9;

/// Named structural points of the kite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointId {
    Nose,
    SpineBottom,
    LeftEdge,
    RightEdge,
    LeftInter,
    RightInter,
    Center,
    LeftWhisker,
    RightWhisker,
    LeftCtrl,
    RightCtrl,
}

impl PointId {
    pub const COUNT: usize = 11;

    pub const ALL: [PointId; PointId::COUNT] = [
        PointId::Nose,
        PointId::SpineBottom,
        PointId::LeftEdge,
        PointId::RightEdge,
        PointId::LeftInter,
        PointId::RightInter,
        PointId::Center,
        PointId::LeftWhisker,
        PointId::RightWhisker,
        PointId::LeftCtrl,
        PointId::RightCtrl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PointId::Nose => "NOSE",
            PointId::SpineBottom => "SPINE_BOTTOM",
            PointId::LeftEdge => "LEFT_EDGE",
            PointId::RightEdge => "RIGHT_EDGE",
            PointId::LeftInter => "LEFT_INTER",
            PointId::RightInter => "RIGHT_INTER",
            PointId::Center => "CENTER",
            PointId::LeftWhisker => "LEFT_WHISKER",
            PointId::RightWhisker => "RIGHT_WHISKER",
            PointId::LeftCtrl => "LEFT_CTRL",
            PointId::RightCtrl => "RIGHT_CTRL",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Frame triangles of the sail, before subdivision. Winding gives the
/// outward normal `(b - a) × (c - a)`, which points to the front of the kite.
const FACETS: [[PointId; 3]; 4] = [
    [PointId::Nose, PointId::LeftEdge, PointId::LeftWhisker],
    [PointId::Nose, PointId::LeftWhisker, PointId::SpineBottom],
    [PointId::Nose, PointId::RightWhisker, PointId::RightEdge],
    [PointId::Nose, PointId::SpineBottom, PointId::RightWhisker],
];

/// A triangular sail patch in the local frame, wound like the facet it was
/// cut from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub vertices: [Vec3; 3],
    /// Index of the frame triangle this patch belongs to.
    pub facet: usize,
}

impl Panel {
    pub fn centroid(&self) -> Vec3 {
        let [a, b, c] = self.vertices;
        (a + b + c) / 3.0
    }

    /// Unnormalized local normal; its length is twice the panel area.
    pub fn cross(&self) -> Vec3 {
        let [a, b, c] = self.vertices;
        (b - a).cross(&(c - a))
    }

    pub fn area(&self) -> f64 {
        0.5 * self.cross().norm()
    }
}

/// Split a triangle into four at its edge midpoints, `levels` times over.
fn subdivide(vertices: [Vec3; 3], levels: u32, facet: usize, out: &mut Vec<Panel>) {
    if levels == 0 {
        out.push(Panel { vertices, facet });
        return;
    }
    let [a, b, c] = vertices;
    let ab = (a + b) / 2.0;
    let bc = (b + c) / 2.0;
    let ca = (c + a) / 2.0;
    for child in [[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]] {
        subdivide(child, levels - 1, facet, out);
    }
}

/// Immutable point cloud, rods and panels for one set of [`GeometryParams`].
#[derive(Debug, Clone, PartialEq)]
pub struct KiteGeometry {
    params: GeometryParams,
    points: [Vec3; PointId::COUNT],
    connections: Vec<(PointId, PointId)>,
    panels: Vec<Panel>,
    center_of_mass: Vec3,
}

impl KiteGeometry {
    /// Build the frame from its parameters. Deterministic, closed form.
    pub fn build(params: &GeometryParams) -> Self {
        use PointId::*;

        let params = params.clamped();
        let half_span = params.wingspan / 2.0;
        let center_y = params.height * CENTER_HEIGHT_RATIO;
        // The spreader meets the leading edge at the center height.
        let inter_ratio = (params.height - center_y) / params.height;

        let mut points = [Vec3::zeros(); PointId::COUNT];
        let mut set = |id: PointId, p: Vec3| points[id.index()] = p;
        let nose = Vector3::new(0.0, params.height, 0.0);
        let left_inter = Vector3::new(-half_span * inter_ratio, center_y, 0.0);
        let right_inter = Vector3::new(half_span * inter_ratio, center_y, 0.0);
        let center = Vector3::new(0.0, center_y, 0.0);
        set(Nose, nose);
        set(SpineBottom, Vec3::zeros());
        set(LeftEdge, Vector3::new(-half_span, 0.0, 0.0));
        set(RightEdge, Vector3::new(half_span, 0.0, 0.0));
        set(LeftInter, left_inter);
        set(RightInter, right_inter);
        set(Center, center);
        let whisker_y = params.height * WHISKER_HEIGHT_RATIO;
        set(LeftWhisker, Vector3::new(-half_span / 2.0, whisker_y, -params.depth));
        set(RightWhisker, Vector3::new(half_span / 2.0, whisker_y, -params.depth));

        let bridle = params.bridle;
        let radii = [bridle.nose, bridle.intermediate, bridle.center];
        set(LeftCtrl, trilaterate([nose, left_inter, center], radii));
        set(RightCtrl, trilaterate([nose, right_inter, center], radii));

        let connections = vec![
            // Frame
            (Nose, SpineBottom),
            (Nose, LeftEdge),
            (Nose, RightEdge),
            (LeftInter, RightInter),
            (LeftWhisker, Center),
            (RightWhisker, Center),
            // Bridles
            (LeftCtrl, Nose),
            (LeftCtrl, LeftInter),
            (LeftCtrl, Center),
            (RightCtrl, Nose),
            (RightCtrl, RightInter),
            (RightCtrl, Center),
        ];

        let mut panels = Vec::with_capacity(FACETS.len() << (2 * params.subdivisions));
        for (facet, ids) in FACETS.into_iter().enumerate() {
            let vertices = ids.map(|id| points[id.index()]);
            subdivide(vertices, params.subdivisions, facet, &mut panels);
        }
        // Sail mass is spread evenly over the panels.
        let center_of_mass = panels.iter().map(Panel::centroid).sum::<Vec3>() / panels.len() as f64;

        Self {
            params,
            points,
            connections,
            panels,
            center_of_mass,
        }
    }

    pub fn params(&self) -> &GeometryParams {
        &self.params
    }

    /// Local-frame position of a point.
    pub fn point(&self, id: PointId) -> Vec3 {
        self.points[id.index()]
    }

    pub fn points(&self) -> impl Iterator<Item = (PointId, Vec3)> + '_ {
        PointId::ALL.iter().map(|&id| (id, self.point(id)))
    }

    pub fn connections(&self) -> &[(PointId, PointId)] {
        &self.connections
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Local-frame centre of mass: the mean of the panel centroids.
    pub fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    pub fn total_area(&self) -> f64 {
        self.panels.iter().map(Panel::area).sum()
    }

    /// World position of a point for a body at `position` with `orientation`.
    pub fn world_point(&self, id: PointId, position: &Vec3, orientation: &UnitQuaternion<f64>) -> Vec3 {
        position + orientation * self.point(id)
    }
}

/// Closed-form 3D trilateration.
///
/// Finds the point at distances `radii` from the three `anchors`, choosing of
/// the two mirror solutions the one furthest along +Z. If the distances cannot
/// be met the out-of-plane coordinate is clamped to zero, which leaves the
/// point on the anchor plane.
pub fn trilaterate(anchors: [Vec3; 3], radii: [f64; 3]) -> Vec3 {
    let [p1, p2, p3] = anchors;
    let [r1, r2, r3] = radii;

    let d_vec = p2 - p1;
    let d = d_vec.norm();
    if d < TRILATERATION_EPS {
        warn!("trilateration anchors coincide");
        return p1 + Vec3::z() * r1;
    }
    let ex = d_vec / d;
    let p13 = p3 - p1;
    let i = ex.dot(&p13);
    let ey_raw = p13 - ex * i;
    let j = ey_raw.norm();
    let x = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);

    let (ey, y) = if j < TRILATERATION_EPS {
        warn!("trilateration anchors are collinear");
        // Any perpendicular works; prefer one towards +Z.
        let ey = (Vec3::z() - ex * ex.z)
            .try_normalize(TRILATERATION_EPS)
            .unwrap_or_else(|| ex.cross(&Vec3::x()).normalize());
        (ey, 0.0)
    } else {
        let y = (r1 * r1 - r3 * r3 + i * i + j * j) / (2.0 * j) - (i / j) * x;
        (ey_raw / j, y)
    };
    let ez = ex.cross(&ey);

    let radicand = r1 * r1 - x * x - y * y;
    let z = if radicand < 0.0 {
        warn!(radicand, "infeasible bridle lengths, clamping to the anchor plane");
        0.0
    } else {
        radicand.sqrt()
    };

    let base = p1 + ex * x + ey * y;
    let front = base + ez * z;
    let back = base - ez * z;
    if front.z >= back.z { front } else { back }
}
