//! Crack front geometry and domain-integral fracture mechanics.
//!
//! `griffith` reconstructs an ordered crack front curve from an unordered set
//! of mesh boundary nodes, attaches a local orthonormal frame to every front
//! point (crack extension direction, crack plane normal, front tangent) and
//! evaluates domain-integral fracture parameters along the front:
//! the J-integral, stress intensity factors obtained through the
//! interaction integral, and the T-stress.
//!
//! The finite element machinery itself is deliberately out of scope. Meshes,
//! shape functions, quadrature rules and constitutive fields enter through
//! the traits in [`mesh`] and [`integral`], so the crate can be driven by any
//! assembly loop that can answer per-element queries.
//!
//! The typical flow is:
//!
//! 1. build a [`CrackFront`] from a mesh node set (or an explicit point list),
//! 2. pick a weight function from [`qfunction`],
//! 3. assemble a [`FractureIntegralEvaluator`](integral::evaluator::FractureIntegralEvaluator)
//!    and evaluate it serially or in parallel.

use nalgebra::RealField;

pub mod front;
pub mod integral;
pub mod mesh;
pub mod qfunction;

pub(crate) mod workspace;

pub use front::topology::FrontTopology;
pub use front::{
    Axis, CrackFront, CrackFrontConfig, DirectionStrategy, EndDirectionStrategy, FrontPoint,
    PointFrontConfig, PolarCoordinates,
};
pub use integral::evaluator::{FractureIntegralEvaluator, FractureIntegralEvaluatorBuilder};
pub use integral::{
    ElasticModuli, FractureIntegralKind, FractureReport, FrontParameterization, SifMode,
};
pub use qfunction::{GeometricQFunction, QFunction, TopologicalQFunction};

pub extern crate nalgebra;

/// A scalar real number type.
///
/// Trait alias for the scalar traits required throughout this crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
