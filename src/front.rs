//! Crack front construction and per-point local coordinate frames.

pub mod query;
pub mod topology;

pub use query::PolarCoordinates;

use std::collections::BTreeSet;

use eyre::eyre;
use log::{debug, warn};
use nalgebra::{Matrix3, Point3, Rotation3, Scalar, Unit, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

use crate::front::topology::{collapse_2d, roughly_equal, FrontTopology};
use crate::mesh::CrackMesh;
use crate::Real;

/// A coordinate axis of the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit_vector<T: Real>(&self) -> Unit<Vector3<T>> {
        match self {
            Axis::X => Vector3::x_axis(),
            Axis::Y => Vector3::y_axis(),
            Axis::Z => Vector3::z_axis(),
        }
    }
}

/// How the in-plane crack extension direction is obtained at each front point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub enum DirectionStrategy<T: Scalar> {
    /// A single user-provided vector, shared by every front point.
    FixedVector(Vector3<T>),
    /// Directions point from the crack mouth towards each front point,
    /// projected perpendicular to the local tangent.
    CrackMouth,
    /// Directions are inferred from the front curve itself: a shared crack
    /// plane normal is estimated from three representative points and each
    /// direction is the tangent crossed with that normal.
    CurvedFront,
}

/// Optional direction overrides for the two ends of an open front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub enum EndDirectionStrategy<T: Scalar> {
    /// End directions follow the global strategy.
    NoSpecialTreatment,
    /// Explicit direction vectors for the first and last front point.
    FixedVectors {
        start: Vector3<T>,
        end: Vector3<T>,
    },
}

impl<T: Scalar> Default for EndDirectionStrategy<T> {
    fn default() -> Self {
        Self::NoSpecialTreatment
    }
}

/// Configuration for building a [`CrackFront`] from mesh node sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct CrackFrontConfig<T: Scalar> {
    /// Name of the node set that traces the crack front.
    pub front_node_set: String,
    pub direction: DirectionStrategy<T>,
    pub end_direction: EndDirectionStrategy<T>,
    /// Node set whose average position defines the crack mouth, used by the
    /// crack mouth direction strategy and for angle parameterization.
    pub mouth_node_set: Option<String>,
    /// Node sets of boundaries the crack front intersects. Front points on
    /// these boundaries are flagged in the constructed front.
    pub intersecting_node_sets: Vec<String>,
    /// Collapse the front to a single point for a two-dimensional analysis.
    pub treat_as_2d: bool,
    /// Axis along which front nodes are collapsed in a 2D analysis, and the
    /// tangent of the collapsed point.
    pub out_of_plane_axis: Axis,
    /// When the model only contains one symmetric half of the crack,
    /// finalized integral values are doubled.
    pub symmetry_plane: Option<Axis>,
}

impl<T: Scalar> CrackFrontConfig<T> {
    pub fn new(front_node_set: impl Into<String>, direction: DirectionStrategy<T>) -> Self {
        Self {
            front_node_set: front_node_set.into(),
            direction,
            end_direction: EndDirectionStrategy::NoSpecialTreatment,
            mouth_node_set: None,
            intersecting_node_sets: Vec::new(),
            treat_as_2d: false,
            out_of_plane_axis: Axis::Z,
            symmetry_plane: None,
        }
    }
}

/// Configuration for building a [`CrackFront`] directly from points, without
/// a mesh. Such fronts cannot use the topological q function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct PointFrontConfig<T: Scalar> {
    pub direction: DirectionStrategy<T>,
    pub end_direction: EndDirectionStrategy<T>,
    /// Explicit crack mouth position.
    pub mouth: Option<Point3<T>>,
    pub closed_loop: bool,
    pub treat_as_2d: bool,
    pub out_of_plane_axis: Axis,
    pub symmetry_plane: Option<Axis>,
}

impl<T: Scalar> PointFrontConfig<T> {
    pub fn new(direction: DirectionStrategy<T>) -> Self {
        Self {
            direction,
            end_direction: EndDirectionStrategy::NoSpecialTreatment,
            mouth: None,
            closed_loop: false,
            treat_as_2d: false,
            out_of_plane_axis: Axis::Z,
            symmetry_plane: None,
        }
    }
}

/// A crack front point together with its local coordinate frame.
#[derive(Debug, Clone)]
pub struct FrontPoint<T: Scalar> {
    pub position: Point3<T>,
    /// Unit tangent along the front, central-difference averaged over the
    /// adjacent segments.
    pub tangent: Unit<Vector3<T>>,
    /// Unit in-plane crack extension direction, orthogonal to the tangent.
    pub direction: Unit<Vector3<T>>,
    pub backward_segment_length: T,
    pub forward_segment_length: T,
    /// Cumulative arc length from the first front point.
    pub distance_along_front: T,
    /// Position along the front as an angle in degrees around the crack
    /// mouth, when a mouth is configured.
    pub angle_along_front: Option<T>,
    /// Rotation from global coordinates into the local frame. The rows are
    /// the extension direction, the crack plane normal and the tangent.
    pub rotation: Rotation3<T>,
}

/// A fully constructed crack front: ordered points, local frames and the
/// shared crack plane normal.
///
/// All quantities are computed once at construction and are immutable
/// afterwards, so a front can be shared freely between worker threads.
#[derive(Debug, Clone)]
pub struct CrackFront<T: Scalar> {
    points: Vec<FrontPoint<T>>,
    /// For mesh-defined fronts, the mesh nodes that seed topological rings
    /// for each front point.
    seed_nodes: Option<Vec<Vec<usize>>>,
    closed_loop: bool,
    treat_as_2d: bool,
    plane_normal: Unit<Vector3<T>>,
    symmetry_plane: Option<Axis>,
    mouth: Option<Point3<T>>,
    on_intersecting_boundary: Vec<bool>,
}

impl<T: Real> CrackFront<T> {
    /// Builds a crack front from the node sets of a mesh.
    pub fn from_mesh<M>(mesh: &M, config: &CrackFrontConfig<T>) -> eyre::Result<Self>
    where
        M: CrackMesh<T>,
    {
        let front_nodes = mesh.node_set(&config.front_node_set).ok_or_else(|| {
            eyre!("mesh has no node set named '{}'", config.front_node_set)
        })?;
        if front_nodes.is_empty() {
            return Err(eyre!(
                "crack front node set '{}' is empty",
                config.front_node_set
            ));
        }

        let mouth = match &config.mouth_node_set {
            Some(name) => {
                let nodes = mesh
                    .node_set(name)
                    .ok_or_else(|| eyre!("mesh has no node set named '{}'", name))?;
                if nodes.is_empty() {
                    return Err(eyre!("crack mouth node set '{}' is empty", name));
                }
                Some(average_position(mesh, nodes))
            }
            None => None,
        };

        let (point_nodes, seed_nodes, closed_loop) = if config.treat_as_2d {
            let (logical, seeds) = collapse_2d(mesh, front_nodes, config.out_of_plane_axis)?;
            (vec![logical], vec![seeds], false)
        } else if front_nodes.len() == 1 {
            return Err(eyre!(
                "a crack front with a single node requires the analysis to be two-dimensional (treat_as_2d)"
            ));
        } else {
            let topology = FrontTopology::order_nodes(mesh, front_nodes)?;
            let seeds = topology.nodes().iter().map(|&node| vec![node]).collect();
            (topology.nodes().to_vec(), seeds, topology.closed_loop())
        };

        let mut intersecting_nodes = BTreeSet::new();
        for name in &config.intersecting_node_sets {
            let set = mesh
                .node_set(name)
                .ok_or_else(|| eyre!("mesh has no node set named '{}'", name))?;
            intersecting_nodes.extend(set.iter().copied());
        }
        let on_intersecting_boundary: Vec<bool> = point_nodes
            .iter()
            .map(|node| intersecting_nodes.contains(node))
            .collect();
        if !closed_loop && !config.treat_as_2d && !intersecting_nodes.is_empty() {
            for end_index in [0, point_nodes.len() - 1] {
                if !on_intersecting_boundary[end_index] {
                    warn!(
                        "crack front end node {} does not lie on any of the configured intersecting boundaries",
                        point_nodes[end_index]
                    );
                }
            }
        }

        let positions = point_nodes
            .iter()
            .map(|&node| mesh.node_position(node))
            .collect();
        Self::build(
            positions,
            Some(seed_nodes),
            on_intersecting_boundary,
            closed_loop,
            mouth,
            &config.direction,
            &config.end_direction,
            config.treat_as_2d,
            config.out_of_plane_axis,
            config.symmetry_plane,
        )
    }

    /// Builds a crack front from explicitly ordered points.
    pub fn from_points(
        points: Vec<Point3<T>>,
        config: &PointFrontConfig<T>,
    ) -> eyre::Result<Self> {
        if points.is_empty() {
            return Err(eyre!("a crack front must contain at least one point"));
        }
        if config.treat_as_2d && points.len() != 1 {
            return Err(eyre!(
                "a two-dimensional crack front must consist of exactly one point, got {}",
                points.len()
            ));
        }
        if !config.treat_as_2d && points.len() == 1 {
            return Err(eyre!(
                "a crack front with a single point requires the analysis to be two-dimensional (treat_as_2d)"
            ));
        }
        if config.closed_loop && points.len() < 3 {
            return Err(eyre!(
                "a closed loop crack front requires at least three points, got {}",
                points.len()
            ));
        }
        let num_points = points.len();
        Self::build(
            points,
            None,
            vec![false; num_points],
            config.closed_loop,
            config.mouth,
            &config.direction,
            &config.end_direction,
            config.treat_as_2d,
            config.out_of_plane_axis,
            config.symmetry_plane,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        positions: Vec<Point3<T>>,
        seed_nodes: Option<Vec<Vec<usize>>>,
        on_intersecting_boundary: Vec<bool>,
        closed_loop: bool,
        mouth: Option<Point3<T>>,
        direction: &DirectionStrategy<T>,
        end_direction: &EndDirectionStrategy<T>,
        treat_as_2d: bool,
        out_of_plane_axis: Axis,
        symmetry_plane: Option<Axis>,
    ) -> eyre::Result<Self> {
        let n = positions.len();

        let (backward_segments, forward_segments) = if treat_as_2d {
            (vec![Vector3::zeros(); n], vec![Vector3::zeros(); n])
        } else {
            compute_segments(&positions, closed_loop)?
        };

        let tangents = if treat_as_2d {
            vec![out_of_plane_axis.unit_vector(); n]
        } else {
            compute_tangents(&backward_segments, &forward_segments)?
        };

        // Raw extension directions before any orthogonalization. The curved
        // front strategy also determines the crack plane normal directly.
        let (mut raw_directions, curved_normal) = match direction {
            DirectionStrategy::FixedVector(vector) => {
                if !(vector.norm() > T::zero()) {
                    return Err(eyre!("the crack direction vector must be nonzero"));
                }
                (vec![*vector; n], None)
            }
            DirectionStrategy::CrackMouth => {
                let mouth_point = mouth.as_ref().ok_or_else(|| {
                    eyre!("the crack mouth direction strategy requires a crack mouth to be configured")
                })?;
                let mut raw = Vec::with_capacity(n);
                for (index, position) in positions.iter().enumerate() {
                    let to_point = position - mouth_point;
                    if !(to_point.norm() > T::zero()) {
                        return Err(eyre!(
                            "crack front point {} coincides with the crack mouth",
                            index
                        ));
                    }
                    raw.push(to_point);
                }
                (raw, None)
            }
            DirectionStrategy::CurvedFront => {
                let normal = curved_front_normal(&positions, closed_loop)?;
                let raw = tangents
                    .iter()
                    .map(|tangent| tangent.cross(&normal))
                    .collect();
                (raw, Some(normal))
            }
        };

        if let EndDirectionStrategy::FixedVectors { start, end } = end_direction {
            if closed_loop {
                return Err(eyre!(
                    "end direction overrides apply only to open crack fronts"
                ));
            }
            if !(start.norm() > T::zero()) || !(end.norm() > T::zero()) {
                return Err(eyre!("end direction override vectors must be nonzero"));
            }
            raw_directions[0] = *start;
            raw_directions[n - 1] = *end;
        }

        let mut directions = Vec::with_capacity(n);
        for (index, raw) in raw_directions.iter().enumerate() {
            let tangent = &tangents[index];
            let in_plane = raw - tangent.into_inner() * raw.dot(tangent);
            let unit = Unit::try_new(in_plane, T::zero()).ok_or_else(|| {
                eyre!(
                    "crack direction is parallel to the front tangent at point {}",
                    index
                )
            })?;
            directions.push(unit);
        }

        // The crack plane normal is shared by all points. The curved front
        // strategy provides it directly; otherwise it comes from the middle
        // point's tangent and extension direction.
        let plane_normal = match curved_normal {
            Some(normal) => normal,
            None => {
                let middle = n / 2;
                Unit::try_new(tangents[middle].cross(&directions[middle]), T::zero())
                    .ok_or_else(|| eyre!("the crack plane normal evaluates to a near-zero vector"))?
            }
        };

        let angles = match &mouth {
            Some(mouth_point) => Some(compute_angles(
                &positions,
                mouth_point,
                &plane_normal,
                closed_loop,
            )?),
            None => None,
        };

        let mut points = Vec::with_capacity(n);
        let mut distance = T::zero();
        for index in 0..n {
            let backward_segment_length = backward_segments[index].norm();
            if index > 0 {
                distance += backward_segment_length;
            }
            let tangent = tangents[index];
            let extension = directions[index];
            let rotation_matrix = Matrix3::from_rows(&[
                extension.transpose(),
                plane_normal.transpose(),
                tangent.transpose(),
            ]);
            points.push(FrontPoint {
                position: positions[index],
                tangent,
                direction: extension,
                backward_segment_length,
                forward_segment_length: forward_segments[index].norm(),
                distance_along_front: distance,
                angle_along_front: angles.as_ref().map(|angles| angles[index]),
                rotation: Rotation3::from_matrix_unchecked(rotation_matrix),
            });
        }

        debug!(
            "constructed crack front with {} points (closed loop: {}, 2D: {})",
            n, closed_loop, treat_as_2d
        );
        Ok(Self {
            points,
            seed_nodes,
            closed_loop,
            treat_as_2d,
            plane_normal,
            symmetry_plane,
            mouth,
            on_intersecting_boundary,
        })
    }

    pub fn points(&self) -> &[FrontPoint<T>] {
        &self.points
    }

    pub fn point(&self, index: usize) -> &FrontPoint<T> {
        &self.points[index]
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn closed_loop(&self) -> bool {
        self.closed_loop
    }

    pub fn treat_as_2d(&self) -> bool {
        self.treat_as_2d
    }

    pub fn plane_normal(&self) -> &Unit<Vector3<T>> {
        &self.plane_normal
    }

    pub fn symmetry_plane(&self) -> Option<Axis> {
        self.symmetry_plane
    }

    pub fn mouth(&self) -> Option<&Point3<T>> {
        self.mouth.as_ref()
    }

    /// The mesh nodes seeding topological rings for each front point, when
    /// the front was built from a mesh.
    pub fn seed_nodes(&self) -> Option<&[Vec<usize>]> {
        self.seed_nodes.as_deref()
    }

    pub fn is_point_on_intersecting_boundary(&self, point_index: usize) -> bool {
        self.on_intersecting_boundary[point_index]
    }

    /// Whether every front point carries an angle-along-front label.
    pub fn has_angles(&self) -> bool {
        self.points
            .first()
            .map(|point| point.angle_along_front.is_some())
            .unwrap_or(false)
    }
}

fn compute_segments<T: Real>(
    positions: &[Point3<T>],
    closed_loop: bool,
) -> eyre::Result<(Vec<Vector3<T>>, Vec<Vector3<T>>)> {
    let n = positions.len();
    let mut forward = vec![Vector3::zeros(); n];
    for index in 0..n {
        let next = if index + 1 < n {
            index + 1
        } else if closed_loop {
            0
        } else {
            continue;
        };
        let segment = positions[next] - positions[index];
        if !(segment.norm() > T::zero()) {
            return Err(eyre!(
                "adjacent crack front points {} and {} coincide",
                index,
                next
            ));
        }
        forward[index] = segment;
    }
    let mut backward = vec![Vector3::zeros(); n];
    for index in 0..n {
        if index > 0 {
            backward[index] = forward[index - 1];
        } else if closed_loop {
            backward[index] = forward[n - 1];
        }
    }
    Ok((backward, forward))
}

fn compute_tangents<T: Real>(
    backward_segments: &[Vector3<T>],
    forward_segments: &[Vector3<T>],
) -> eyre::Result<Vec<Unit<Vector3<T>>>> {
    let mut tangents = Vec::with_capacity(backward_segments.len());
    for (index, (backward, forward)) in backward_segments
        .iter()
        .zip(forward_segments)
        .enumerate()
    {
        let tangent = Unit::try_new(backward + forward, T::zero()).ok_or_else(|| {
            eyre!(
                "crack front tangent vanishes at point {}; the adjacent segments cancel",
                index
            )
        })?;
        tangents.push(tangent);
    }
    Ok(tangents)
}

/// Estimates the crack plane normal of a curved front from three
/// representative points via a cross product of chords.
fn curved_front_normal<T: Real>(
    positions: &[Point3<T>],
    closed_loop: bool,
) -> eyre::Result<Unit<Vector3<T>>> {
    let n = positions.len();
    if n < 3 {
        return Err(eyre!(
            "the curved front direction strategy requires at least three crack front points, got {}",
            n
        ));
    }
    let (first, middle, last) = if closed_loop {
        (0, n / 3, 2 * n / 3)
    } else {
        (0, n / 2, n - 1)
    };
    let chord_a = positions[middle] - positions[first];
    let chord_b = positions[last] - positions[first];
    Unit::try_new(chord_a.cross(&chord_b), T::zero()).ok_or_else(|| {
        eyre!(
            "crack front points {}, {} and {} are collinear; the crack plane of a curved front cannot be inferred",
            first,
            middle,
            last
        )
    })
}

/// Computes the angle-along-front labels in degrees, measured around the
/// crack mouth relative to the first front point, in [0, 360).
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn compute_angles<T: Real>(
    positions: &[Point3<T>],
    mouth: &Point3<T>,
    plane_normal: &Unit<Vector3<T>>,
    closed_loop: bool,
) -> eyre::Result<Vec<T>> {
    let project = |position: &Point3<T>| {
        let offset = position - mouth;
        offset - plane_normal.into_inner() * offset.dot(plane_normal)
    };
    let first_leg = Unit::try_new(project(&positions[0]), T::zero()).ok_or_else(|| {
        eyre!("crack front point 0 projects onto the crack mouth; angles along the front are undefined")
    })?;
    let quarter_leg = plane_normal.cross(&first_leg);

    let mut angles = Vec::with_capacity(positions.len());
    for (index, position) in positions.iter().enumerate() {
        let leg = project(position);
        if !(leg.norm() > T::zero()) {
            return Err(eyre!(
                "crack front point {} projects onto the crack mouth; angles along the front are undefined",
                index
            ));
        }
        let radians = leg.dot(&quarter_leg).atan2(leg.dot(&first_leg));
        let mut degrees = radians * 180.0 / T::pi();
        if degrees < 0.0 {
            degrees += 360.0;
        }
        angles.push(degrees);
    }

    // End angles that land exactly on the 0/360 wrap are moved to the side
    // their neighbor is on, so the parameterization stays continuous.
    if !closed_loop && angles.len() > 1 {
        let last = angles.len() - 1;
        nudge_end_angle(&mut angles, 0, 1);
        nudge_end_angle(&mut angles, last, last - 1);
    }
    Ok(angles)
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn nudge_end_angle<T: Real>(angles: &mut [T], end: usize, neighbor: usize) {
    if roughly_equal(angles[end], 0.0) || roughly_equal(angles[end], 360.0) {
        angles[end] = if angles[neighbor] > 180.0 { 360.0 } else { 0.0 };
    }
}

fn average_position<T, M>(mesh: &M, nodes: &BTreeSet<usize>) -> Point3<T>
where
    T: Real,
    M: CrackMesh<T>,
{
    let mut sum = Vector3::zeros();
    for &node in nodes {
        sum += mesh.node_position(node).coords;
    }
    let count = T::from_usize(nodes.len()).expect("Must be able to fit usize in T");
    Point3::from(sum / count)
}
