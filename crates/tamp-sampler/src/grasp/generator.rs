//! 抓取族生成器
//!
//! 由拟合包围盒枚举候选：6 个面 × 4 个腕部角度。
//!
//! # 候选顺序
//!
//! ```text
//! 面：+x, -x, +y, -y, +z, -z
//! 腕部：0, π/2, π, -π/2（两组 180° 对称的重抓取对）
//! ```
//!
//! 夹爪坐标系的 +z（接近方向）对准面的内法线，手掌中心位于
//! `center + normal * (half_extent + grasp_depth)`。生成器没有副作用，`reset()` 后可重新迭代。

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use std::f64::consts::{FRAC_PI_2, PI};
use tamp_types::{FittedBox, Pose};

/// 腕部角度表
pub const WRIST_ANGLES: [f64; 4] = [0.0, FRAC_PI_2, PI, -FRAC_PI_2];

/// 包围盒的一个面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Face {
    /// 法线所在的轴（0 = x, 1 = y, 2 = z）
    pub axis: usize,
    /// 法线为正方向
    pub positive: bool,
}

impl Face {
    /// 按生成顺序排列的 6 个面
    pub const ALL: [Face; 6] = [
        Face { axis: 0, positive: true },
        Face { axis: 0, positive: false },
        Face { axis: 1, positive: true },
        Face { axis: 1, positive: false },
        Face { axis: 2, positive: true },
        Face { axis: 2, positive: false },
    ];

    /// 外法线（物体坐标系）
    pub fn normal(&self) -> Vector3<f64> {
        let mut n = Vector3::zeros();
        n[self.axis] = if self.positive { 1.0 } else { -1.0 };
        n
    }
}

/// 未验证的抓取候选
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraspCandidate {
    /// 物体 → 夹爪
    pub value: Pose,
    pub face: Face,
    /// `WRIST_ANGLES` 中的下标
    pub wrist: usize,
    /// 面是否沿最长维度展开（法线不在最长轴上）
    pub spans_longest: bool,
}

/// 接近方向为 `-normal`、腕部旋转 `wrist` 的夹爪姿态
fn face_rotation(face: &Face, wrist: f64) -> UnitQuaternion<f64> {
    let z = -face.normal();
    let mut y = Vector3::zeros();
    y[(face.axis + 1) % 3] = 1.0;
    let x = y.cross(&z);
    let base = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]));
    UnitQuaternion::from_rotation_matrix(&base) * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), wrist)
}

/// 抓取族生成器
#[derive(Debug, Clone)]
pub struct GraspFamilyGenerator {
    fitted: FittedBox,
    grasp_depth: f64,
    handle_filter: bool,
    longest_axis: usize,
    current_index: usize,
}

impl GraspFamilyGenerator {
    pub fn new(fitted: FittedBox, grasp_depth: f64, handle_filter: bool) -> Self {
        Self {
            longest_axis: fitted.longest_axis(),
            fitted,
            grasp_depth,
            handle_filter,
            current_index: 0,
        }
    }

    /// 从头开始
    pub fn reset(&mut self) {
        self.current_index = 0;
    }

    /// 候选总数（不考虑已迭代的部分）
    pub fn total(&self) -> usize {
        Face::ALL.iter().filter(|f| !self.skips(f)).count() * WRIST_ANGLES.len()
    }

    pub fn longest_axis(&self) -> usize {
        self.longest_axis
    }

    fn skips(&self, face: &Face) -> bool {
        self.handle_filter && face.axis == self.longest_axis
    }

    fn candidate(&self, face: Face, wrist: usize) -> GraspCandidate {
        let distance = self.fitted.half_extents[face.axis] + self.grasp_depth;
        let position = self.fitted.center + face.normal() * distance;
        GraspCandidate {
            value: Pose::new(position, face_rotation(&face, WRIST_ANGLES[wrist])),
            face,
            wrist,
            spans_longest: face.axis != self.longest_axis,
        }
    }

    /// 沿最长维度滑移 ±(最长尺寸 / 3) 的两个变体
    pub fn length_variants(&self, candidate: &GraspCandidate) -> [Pose; 2] {
        let offset = self.fitted.max_extent() / 3.0;
        let mut axis = Vector3::zeros();
        axis[self.longest_axis] = 1.0;
        let slide = |sign: f64| {
            candidate
                .value
                .with_position(candidate.value.position + axis * (sign * offset))
        };
        [slide(1.0), slide(-1.0)]
    }
}

impl Iterator for GraspFamilyGenerator {
    type Item = GraspCandidate;

    fn next(&mut self) -> Option<GraspCandidate> {
        let per_face = WRIST_ANGLES.len();
        while self.current_index < Face::ALL.len() * per_face {
            let face = Face::ALL[self.current_index / per_face];
            let wrist = self.current_index % per_face;
            self.current_index += 1;
            if self.skips(&face) {
                continue;
            }
            return Some(self.candidate(face, wrist));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn cube() -> FittedBox {
        FittedBox::centered(Vector3::new(0.025, 0.025, 0.025))
    }

    #[test]
    fn test_cube_family() {
        let candidates: Vec<_> = GraspFamilyGenerator::new(cube(), 0.03, false).collect();
        assert_eq!(candidates.len(), 24);
        for c in &candidates {
            // 接近轴指向物体中心
            let approach = c.value.transform_vector(&Vector3::z());
            let to_center = (Point3::origin() - c.value.position).normalize();
            assert_relative_eq!(approach.dot(&to_center), 1.0, epsilon = 1e-12);
            assert_relative_eq!(c.value.position.coords.norm(), 0.055, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_wrist_pairs_are_symmetric() {
        let candidates: Vec<_> = GraspFamilyGenerator::new(cube(), 0.03, false).take(4).collect();
        // 0 与 π 的闭合轴反向
        let y0 = candidates[0].value.transform_vector(&Vector3::y());
        let y2 = candidates[2].value.transform_vector(&Vector3::y());
        assert_relative_eq!(y0.dot(&y2), -1.0, epsilon = 1e-12);
        let y1 = candidates[1].value.transform_vector(&Vector3::y());
        assert_relative_eq!(y0.dot(&y1), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deterministic_and_reset() {
        let mut generator = GraspFamilyGenerator::new(cube(), 0.03, false);
        let first: Vec<_> = generator.by_ref().collect();
        assert!(generator.next().is_none());
        generator.reset();
        let second: Vec<_> = generator.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_handle_filter_skips_long_axis_faces() {
        let handle = FittedBox::centered(Vector3::new(0.01, 0.01, 0.1));
        let generator = GraspFamilyGenerator::new(handle, 0.03, true);
        assert_eq!(generator.total(), 16);
        let candidates: Vec<_> = generator.collect();
        assert_eq!(candidates.len(), 16);
        assert!(candidates.iter().all(|c| c.face.axis != 2 && c.spans_longest));
    }

    #[test]
    fn test_handle_filter_tie_uses_first_axis() {
        let generator = GraspFamilyGenerator::new(cube(), 0.03, true);
        assert_eq!(generator.longest_axis(), 0);
        assert!(generator.clone().all(|c| c.face.axis != 0));
    }

    #[test]
    fn test_length_variants() {
        let bar = FittedBox::centered(Vector3::new(0.1, 0.02, 0.02));
        let generator = GraspFamilyGenerator::new(bar, 0.03, false);
        let top = generator
            .clone()
            .find(|c| c.face == Face { axis: 2, positive: true })
            .unwrap();
        assert!(top.spans_longest);
        let [a, b] = generator.length_variants(&top);
        assert_relative_eq!(a.position.x, 0.2 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(b.position.x, -0.2 / 3.0, epsilon = 1e-12);
        assert_eq!(a.rotation, top.value.rotation);
    }
}
