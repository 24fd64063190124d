//! Closed-form auxiliary fields for the interaction integral.
//!
//! These are the leading terms of the Williams expansion around a crack tip
//! under plane strain, evaluated for a unit load factor of a single mode,
//! plus the point-force field used to extract the T-stress. All quantities
//! are expressed in the local crack front frame (x along the extension
//! direction, y along the crack plane normal, z along the tangent).

use nalgebra::{Matrix3, Vector3};
use numeric_literals::replace_float_literals;

use crate::front::PolarCoordinates;
use crate::integral::{ElasticModuli, SifMode};
use crate::Real;

/// Auxiliary stress and displacement-gradient values at one quadrature
/// point, in the local crack front frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryField<T> {
    pub stress: Matrix3<T>,
    /// Derivative of the auxiliary displacement vector with respect to the
    /// local crack extension coordinate.
    pub displacement_gradient_x1: Vector3<T>,
}

/// Evaluates the auxiliary field of the given mode at local polar
/// coordinates around the crack front.
///
/// The fields are singular at the front itself; the caller must not request
/// a radius of zero.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn auxiliary_field<T: Real>(
    mode: SifMode,
    polar: &PolarCoordinates<T>,
    moduli: &ElasticModuli<T>,
) -> AuxiliaryField<T> {
    let r = polar.radius;
    let theta = polar.angle;
    let poisson = moduli.poisson;
    let kappa = moduli.plane_strain_kappa();
    let shear_modulus = moduli.shear_modulus();
    let cos_theta = theta.cos();
    let sin_theta = theta.sin();

    let mut stress = Matrix3::zeros();
    let mut displacement_gradient_x1 = Vector3::zeros();

    match mode {
        SifMode::KI | SifMode::KII | SifMode::KIII => {
            let (k1, k2, k3) = match mode {
                SifMode::KI => (1.0, 0.0, 0.0),
                SifMode::KII => (0.0, 1.0, 0.0),
                _ => (0.0, 0.0, 1.0),
            };
            let s = 1.0 / (2.0 * T::pi() * r).sqrt();
            let cos_half = (theta / 2.0).cos();
            let sin_half = (theta / 2.0).sin();
            let cos_three_half = (3.0 * theta / 2.0).cos();
            let sin_three_half = (3.0 * theta / 2.0).sin();
            let sin_sq = sin_theta * sin_theta;

            stress[(0, 0)] = s
                * (k1 * cos_half * (1.0 - sin_half * sin_three_half)
                    - k2 * sin_half * (2.0 + cos_half * cos_three_half));
            stress[(1, 1)] = s
                * (k1 * cos_half * (1.0 + sin_half * sin_three_half)
                    + k2 * sin_half * cos_half * cos_three_half);
            stress[(0, 1)] = s
                * (k1 * cos_half * sin_half * cos_three_half
                    + k2 * cos_half * (1.0 - sin_half * sin_three_half));
            stress[(1, 0)] = stress[(0, 1)];
            stress[(0, 2)] = -s * k3 * sin_half;
            stress[(2, 0)] = stress[(0, 2)];
            stress[(1, 2)] = s * k3 * cos_half;
            stress[(2, 1)] = stress[(1, 2)];
            stress[(2, 2)] = poisson * (stress[(0, 0)] + stress[(1, 1)]);

            let factor = s / (4.0 * shear_modulus);
            displacement_gradient_x1[0] = factor
                * (k1 * cos_half * (kappa - cos_theta - 2.0 * sin_sq)
                    - k2 * sin_half * (kappa + 2.0 + cos_theta - 2.0 * sin_sq));
            displacement_gradient_x1[1] = factor
                * (-k1 * sin_half * (kappa - cos_theta + 2.0 * sin_sq)
                    - k2 * cos_half * (kappa - 2.0 + cos_theta + 2.0 * sin_sq));
            displacement_gradient_x1[2] = -k3 * s * sin_half / shear_modulus;
        }
        SifMode::TStress => {
            // Point force at the crack tip along the extension direction.
            let s = 1.0 / (T::pi() * r);
            let cos_sq = cos_theta * cos_theta;
            let sin_sq = sin_theta * sin_theta;

            stress[(0, 0)] = -s * cos_theta * cos_sq;
            stress[(0, 1)] = -s * sin_theta * cos_sq;
            stress[(1, 0)] = stress[(0, 1)];
            stress[(1, 1)] = -s * cos_theta * sin_sq;
            stress[(2, 2)] = -s * poisson * cos_theta;

            let factor = s / (8.0 * shear_modulus);
            displacement_gradient_x1[0] = factor * cos_theta * (4.0 * sin_sq - kappa - 1.0);
            displacement_gradient_x1[1] = factor * sin_theta * (4.0 * sin_sq + kappa - 3.0);
        }
    }

    AuxiliaryField {
        stress,
        displacement_gradient_x1,
    }
}
