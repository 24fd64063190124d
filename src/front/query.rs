//! Queries against a constructed crack front: local-frame rotations and
//! polar coordinates around the front.

use std::cmp::Ordering;

use itertools::Itertools;
use nalgebra::{Matrix3, Point3, Scalar, Vector3};
use serde::{Deserialize, Serialize};

use crate::front::CrackFront;
use crate::Real;

/// Polar coordinates of a query point in the plane orthogonal to the front
/// tangent at a front point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct PolarCoordinates<T: Scalar> {
    /// Distance from the tangent line through the front point.
    pub radius: T,
    /// Angle in (-pi, pi], zero along the extension direction and +pi/2
    /// along the crack plane normal.
    pub angle: T,
}

impl<T: Real> CrackFront<T> {
    /// Rotates a vector from global coordinates into the local frame of the
    /// given front point.
    pub fn rotate_to_local(&self, vector: &Vector3<T>, point_index: usize) -> Vector3<T> {
        self.point(point_index).rotation * vector
    }

    /// Rotates a vector from the local frame of the given front point back
    /// to global coordinates.
    pub fn rotate_from_local(&self, vector: &Vector3<T>, point_index: usize) -> Vector3<T> {
        self.point(point_index).rotation.inverse() * vector
    }

    /// Rotates a rank-2 tensor into the local frame: `R * M * R^T`.
    pub fn rotate_tensor_to_local(&self, tensor: &Matrix3<T>, point_index: usize) -> Matrix3<T> {
        let rotation = self.point(point_index).rotation.matrix();
        rotation * tensor * rotation.transpose()
    }

    /// Rotates a rank-2 tensor from the local frame back to global
    /// coordinates: `R^T * M * R`.
    pub fn rotate_tensor_from_local(&self, tensor: &Matrix3<T>, point_index: usize) -> Matrix3<T> {
        let rotation = self.point(point_index).rotation.matrix();
        rotation.transpose() * tensor * rotation
    }

    /// Index of the front point nearest to the query point. Ties are broken
    /// by the first occurrence in front order.
    pub fn nearest_point_index(&self, query: &Point3<T>) -> usize {
        self.points()
            .iter()
            .map(|point| (query - point.position).norm_squared())
            .position_min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .unwrap_or(0)
    }

    /// Polar coordinates of the query point around the given front point.
    ///
    /// The radius is the distance from the query point to its perpendicular
    /// foot on the tangent line. The angle is zero along the extension
    /// direction, +pi/2 along the crack plane normal and pi on the crack
    /// plane behind the front; a radius of zero maps to an angle of zero.
    pub fn polar_coordinates(
        &self,
        query: &Point3<T>,
        point_index: usize,
    ) -> PolarCoordinates<T> {
        let point = self.point(point_index);
        let offset = query - point.position;
        let along_tangent = offset.dot(&point.tangent);
        let radius = (offset - point.tangent.into_inner() * along_tangent).norm();
        if !(radius > T::zero()) {
            return PolarCoordinates {
                radius: T::zero(),
                angle: T::zero(),
            };
        }
        let ahead = offset.dot(&point.direction);
        let mut out_of_plane = offset.dot(self.plane_normal());
        // atan2 distinguishes -0.0 from 0.0, which would map points exactly
        // on the crack plane behind the front to -pi instead of pi.
        if out_of_plane == T::zero() {
            out_of_plane = T::zero();
        }
        PolarCoordinates {
            radius,
            angle: out_of_plane.atan2(ahead),
        }
    }

    /// Resolves the nearest front point, then computes polar coordinates
    /// around it.
    pub fn polar_coordinates_nearest(&self, query: &Point3<T>) -> (usize, PolarCoordinates<T>) {
        let point_index = self.nearest_point_index(query);
        (point_index, self.polar_coordinates(query, point_index))
    }
}
