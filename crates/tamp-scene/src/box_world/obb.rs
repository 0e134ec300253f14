//! 有向包围盒与分离轴测试

use nalgebra::{Matrix3, Point3, Vector3};
use tamp_types::Pose;

/// 判定相交所需的最小穿透深度
///
/// 面与面恰好接触（深度为 0）不算相交。
pub const PENETRATION_TOLERANCE: f64 = 1e-6;

/// 世界坐标系中的有向盒
#[derive(Debug, Clone, Copy)]
pub struct Obb {
    pub center: Point3<f64>,
    /// 列向量为盒子的三个局部轴
    pub axes: Matrix3<f64>,
    pub half_extents: Vector3<f64>,
}

impl Obb {
    /// 由连杆世界位姿与连杆坐标系下的轴对齐盒构造
    pub fn new(link_pose: &Pose, center: &Point3<f64>, half_extents: &Vector3<f64>) -> Self {
        Self {
            center: link_pose.transform_point(center),
            axes: *link_pose.rotation.to_rotation_matrix().matrix(),
            half_extents: *half_extents,
        }
    }

    pub fn corners(&self) -> [Point3<f64>; 8] {
        let mut out = [self.center; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let mut offset = Vector3::zeros();
            for k in 0..3 {
                let sign = if (i >> k) & 1 == 0 { -1.0 } else { 1.0 };
                offset += self.axes.column(k) * (sign * self.half_extents[k]);
            }
            *corner = self.center + offset;
        }
        out
    }

    pub fn contains_point(&self, p: &Point3<f64>, tolerance: f64) -> bool {
        let d = p - self.center;
        (0..3).all(|k| self.axes.column(k).dot(&d).abs() <= self.half_extents[k] + tolerance)
    }

    fn radius_along(&self, axis: &Vector3<f64>) -> f64 {
        (0..3)
            .map(|k| self.half_extents[k] * self.axes.column(k).dot(axis).abs())
            .sum()
    }
}

/// 分离轴测试
///
/// 返回有符号穿透深度：正值为最小穿透深度，负值为分离距离的下界。
pub fn penetration(a: &Obb, b: &Obb) -> f64 {
    let mut candidates: Vec<Vector3<f64>> = Vec::with_capacity(15);
    for k in 0..3 {
        candidates.push(a.axes.column(k).into_owned());
        candidates.push(b.axes.column(k).into_owned());
    }
    for i in 0..3 {
        for j in 0..3 {
            let cross = a.axes.column(i).cross(&b.axes.column(j));
            let norm = cross.norm();
            // 平行边的叉积退化，已被面法线覆盖
            if norm > 1e-9 {
                candidates.push(cross / norm);
            }
        }
    }

    let delta = b.center - a.center;
    candidates
        .iter()
        .map(|axis| a.radius_along(axis) + b.radius_along(axis) - delta.dot(axis).abs())
        .fold(f64::INFINITY, f64::min)
}

pub fn intersects(a: &Obb, b: &Obb) -> bool {
    penetration(a, b) > PENETRATION_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    fn cube(pose: Pose, h: f64) -> Obb {
        Obb::new(&pose, &Point3::origin(), &Vector3::new(h, h, h))
    }

    #[test]
    fn test_touching_is_not_intersecting() {
        let a = cube(Pose::identity(), 0.5);
        let b = cube(Pose::from_xyz(1.0, 0.0, 0.0), 0.5);
        assert!(penetration(&a, &b).abs() < 1e-12);
        assert!(!intersects(&a, &b));
    }

    #[test]
    fn test_overlap_depth() {
        let a = cube(Pose::identity(), 0.5);
        let b = cube(Pose::from_xyz(0.9, 0.0, 0.0), 0.5);
        assert!((penetration(&a, &b) - 0.1).abs() < 1e-12);
        assert!(intersects(&a, &b));
    }

    #[test]
    fn test_separated_rotated() {
        let a = cube(Pose::identity(), 0.5);
        let b = cube(Pose::from_xyz_rpy(1.6, 0.0, 0.0, 0.0, 0.0, FRAC_PI_4), 0.5);
        // 旋转 45° 后半对角线约 0.707，0.5 + 0.707 < 1.6
        assert!(penetration(&a, &b) < 0.0);
        let c = cube(Pose::from_xyz_rpy(1.1, 0.0, 0.0, 0.0, 0.0, FRAC_PI_4), 0.5);
        assert!(intersects(&a, &c));
    }

    #[test]
    fn test_corners_inside() {
        let a = cube(Pose::identity(), 0.5);
        for c in a.corners() {
            assert!(a.contains_point(&c, 1e-12));
            assert!((c.coords.amax() - 0.5).abs() < 1e-12);
        }
    }
}
