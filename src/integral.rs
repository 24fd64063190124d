//! Fracture integrals accumulated over a domain around the crack front.
//!
//! The J integral and the interaction integral are both computed with the
//! equivalent domain integral method: a contour integral around the front is
//! converted into a volume integral weighted by a q function from
//! [`crate::qfunction`].

pub mod auxiliary;
pub mod evaluator;

use nalgebra::{Matrix3, Point3, Scalar, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

use crate::Real;

/// Isotropic elastic moduli of the material at the crack front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ElasticModuli<T: Scalar> {
    pub young: T,
    pub poisson: T,
}

impl<T: Real> ElasticModuli<T> {
    pub fn new(young: T, poisson: T) -> Self {
        Self { young, poisson }
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn shear_modulus(&self) -> T {
        0.5 * self.young / (1.0 + self.poisson)
    }

    /// Kolosov's constant for plane strain, `kappa = 3 - 4 nu`.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn plane_strain_kappa(&self) -> T {
        3.0 - 4.0 * self.poisson
    }

    /// The effective modulus in plane strain, `E' = E / (1 - nu^2)`.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn plane_strain_modulus(&self) -> T {
        self.young / (1.0 - self.poisson * self.poisson)
    }
}

/// Which auxiliary field the interaction integral pairs with the actual
/// solution fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SifMode {
    KI,
    KII,
    KIII,
    TStress,
}

/// The fracture integral to accumulate along the front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub enum FractureIntegralKind<T: Scalar> {
    /// The J integral, optionally converted to a stress intensity factor
    /// via `K = sign(J) * sqrt(|J| * E / (1 - nu^2))`.
    J { convert_to_k: bool },
    /// The interaction integral with the auxiliary field of the given mode.
    /// The raw integral is multiplied by `k_factor` to yield a stress
    /// intensity factor (typically `E' / 2` for modes I and II, the shear
    /// modulus for mode III) or the T-stress.
    Interaction { mode: SifMode, k_factor: T },
}

/// Element-wise quadrature view of the integration domain around the crack
/// front.
///
/// Implementors adapt a finite element space: per element they expose the
/// node indices, the quadrature points with their Jacobian weights, and the
/// shape function values and gradients used to interpolate nodal q weights.
pub trait IntegrationDomain<T: Real> {
    fn num_elements(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    /// Populates `output` with the indices of the nodes of the given
    /// element. `output` must have length equal to
    /// [`element_node_count`](Self::element_node_count).
    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);

    fn node_position(&self, node_index: usize) -> Point3<T>;

    fn num_quadrature_points(&self, element_index: usize) -> usize;

    fn quadrature_point(&self, element_index: usize, quadrature_index: usize) -> Point3<T>;

    /// Quadrature weight times the Jacobian determinant.
    fn jacobian_weight(&self, element_index: usize, quadrature_index: usize) -> T;

    /// Additional volume factor, e.g. the radius in axisymmetric analyses.
    fn coordinate_factor(&self, _element_index: usize, _quadrature_index: usize) -> T {
        T::one()
    }

    /// Value of the shape function of a local node at a quadrature point.
    fn shape_value(&self, element_index: usize, local_node: usize, quadrature_index: usize) -> T;

    /// Gradient of the shape function of a local node at a quadrature
    /// point, in global coordinates.
    fn shape_gradient(
        &self,
        element_index: usize,
        local_node: usize,
        quadrature_index: usize,
    ) -> Vector3<T>;
}

/// Values of the actual solution fields at quadrature points.
pub trait QuadratureFields<T: Real> {
    fn stress(&self, element_index: usize, quadrature_index: usize) -> Matrix3<T>;

    fn strain(&self, element_index: usize, quadrature_index: usize) -> Matrix3<T>;

    fn displacement_gradient(&self, element_index: usize, quadrature_index: usize) -> Matrix3<T>;

    /// Temperature gradient for the thermal contribution to the J integral,
    /// when the analysis is thermo-mechanical.
    fn temperature_gradient(
        &self,
        _element_index: usize,
        _quadrature_index: usize,
    ) -> Option<Vector3<T>> {
        None
    }

    /// Derivative of the thermal eigenstrain with respect to temperature.
    fn eigenstrain_temperature_derivative(
        &self,
        _element_index: usize,
        _quadrature_index: usize,
    ) -> Option<Matrix3<T>> {
        None
    }
}

/// How report entries are labeled along the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrontParameterization {
    /// Cumulative distance from the first front point.
    ArcLength,
    /// Angle in degrees around the crack mouth.
    Angle,
}

/// Finalized fracture parameter values along the crack front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct FractureReport<T: Scalar> {
    /// One value per crack front point.
    pub values: Vec<T>,
    /// Front point positions, parallel to `values`.
    pub positions: Vec<Point3<T>>,
    /// Arc length or angle label of each front point, parallel to `values`.
    pub along_front: Vec<T>,
    pub parameterization: FrontParameterization,
}
