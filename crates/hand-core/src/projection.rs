//! Stereographic projection between unit directions and plane coordinates.
//!
//! The keypoint network emits 2D coordinates in a stereographic image of
//! the view sphere rather than a pinhole image plane: the mapping stays
//! continuous and invertible across very wide angles, where a pinhole
//! model degenerates. Camera forward is +Z; the forward hemisphere maps
//! into the unit disk.
//!
//! Both directions are closed-form and mutually inverse away from the
//! antipode `(0, 0, −1)`, which callers must not feed in.

use nalgebra::{RealField, Vector2, Vector3};

/// Project a unit direction onto the stereographic plane.
///
/// `(x, y, z) ↦ (x, y) / (1 + z)`. Well-defined for every unit direction
/// except the exact backward axis.
pub fn project<T: RealField>(dir: &Vector3<T>) -> Vector2<T> {
    let denom = T::one() + dir.z.clone();
    Vector2::new(dir.x.clone() / denom.clone(), dir.y.clone() / denom)
}

/// Invert the stereographic projection back to a unit direction.
///
/// `(u, v) ↦ (2u, 2v, 1 − r²) / (1 + r²)` with `r² = u² + v²`. Total:
/// every finite plane coordinate maps to a unit direction.
pub fn unproject<T: RealField>(p: &Vector2<T>) -> Vector3<T> {
    let r_sq = p.norm_squared();
    let denom = T::one() + r_sq.clone();
    let two = T::from_f64(2.0).unwrap();
    Vector3::new(
        two.clone() * p.x.clone() / denom.clone(),
        two * p.y.clone() / denom.clone(),
        (T::one() - r_sq) / denom,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Vec2, Vec3};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn optical_axis_projects_to_origin() {
        let p = project(&Vec3::z());
        assert_relative_eq!(p.norm(), 0.0, epsilon = 1e-15);
        let d = unproject(&Vec2::zeros());
        assert_relative_eq!((d - Vec3::z()).norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn ninety_degrees_lands_on_unit_circle() {
        let p = project(&Vec3::x());
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-15);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn round_trip_random_directions() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let max_angle = 80.0_f64.to_radians();
        for _ in 0..1000 {
            let angle = rng.random_range(0.0..max_angle);
            let azimuth = rng.random_range(0.0..std::f64::consts::TAU);
            let d = Vec3::new(
                angle.sin() * azimuth.cos(),
                angle.sin() * azimuth.sin(),
                angle.cos(),
            );
            let back = unproject(&project(&d));
            assert_relative_eq!((back - d).norm(), 0.0, epsilon = 1e-10);
            assert_relative_eq!(back.norm(), 1.0, epsilon = 1e-12);
        }
    }
}
