//! 包围盒
//!
//! - `Aabb`: 世界坐标系下的轴对齐包围盒，构造时自动排序角点，保证 `lower <= upper`
//! - `FittedBox`: 物体（或连杆）自身坐标系下的拟合包围盒，抓取族生成的输入

use crate::Pose;
use nalgebra::{Point3, Vector3};

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub lower: Point3<f64>,
    pub upper: Point3<f64>,
}

impl Aabb {
    /// 由任意两个角点构造（逐分量排序）
    #[must_use]
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            lower: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            upper: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    #[must_use]
    pub fn from_center_half_extents(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        let h = half_extents.abs();
        Self {
            lower: center - h,
            upper: center + h,
        }
    }

    /// 点集的包围盒，空集返回 `None`
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Self {
            lower: first,
            upper: first,
        };
        for p in iter {
            aabb.expand_to_include(&p);
        }
        Some(aabb)
    }

    /// 局部盒（中心 + 半尺寸）经位姿变换后的世界包围盒
    #[must_use]
    pub fn from_oriented(pose: &Pose, center: &Point3<f64>, half_extents: &Vector3<f64>) -> Self {
        let world_center = pose.transform_point(center);
        let rot = pose.rotation.to_rotation_matrix();
        let abs = rot.matrix().abs();
        let world_half = abs * half_extents.abs();
        Self::from_center_half_extents(world_center, world_half)
    }

    pub fn expand_to_include(&mut self, p: &Point3<f64>) {
        self.lower = self.lower.inf(p);
        self.upper = self.upper.sup(p);
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lower: self.lower.inf(&other.lower),
            upper: self.upper.sup(&other.upper),
        }
    }

    /// 尺寸 `upper - lower`
    #[must_use]
    pub fn extent(&self) -> Vector3<f64> {
        self.upper - self.lower
    }

    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        self.extent() * 0.5
    }

    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.lower, &self.upper)
    }

    #[must_use]
    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    /// xy 平面投影的面积
    #[must_use]
    pub fn area_2d(&self) -> f64 {
        let e = self.extent();
        e.x * e.y
    }

    /// 平移
    #[must_use]
    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Self {
            lower: self.lower + offset,
            upper: self.upper + offset,
        }
    }

    /// 每个方向向内收缩 `margin`
    ///
    /// 收缩后任一方向为负尺寸时返回 `None`。
    #[must_use]
    pub fn inset(&self, margin: &Vector3<f64>) -> Option<Self> {
        let lower = self.lower + margin;
        let upper = self.upper - margin;
        if lower.x > upper.x || lower.y > upper.y || lower.z > upper.z {
            return None;
        }
        Some(Self { lower, upper })
    }

    #[must_use]
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| self.lower[i] <= p[i] && p[i] <= self.upper[i])
    }

    /// `other` 完全位于 `self` 之内（三维，含边界）
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        (0..3).all(|i| self.lower[i] <= other.lower[i] && other.upper[i] <= self.upper[i])
    }

    /// `other` 在 xy 投影上完全位于 `self` 之内
    #[must_use]
    pub fn contains_2d(&self, other: &Self) -> bool {
        (0..2).all(|i| self.lower[i] <= other.lower[i] && other.upper[i] <= self.upper[i])
    }

    /// 两个包围盒是否有正体积的重叠（仅接触不算重叠）
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        (0..3).all(|i| self.lower[i] < other.upper[i] && other.lower[i] < self.upper[i])
    }

    /// 与另一个包围盒在 xy 投影上是否重叠
    #[must_use]
    pub fn overlaps_2d(&self, other: &Self) -> bool {
        (0..2).all(|i| self.lower[i] < other.upper[i] && other.lower[i] < self.upper[i])
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lower.coords.iter().chain(self.upper.coords.iter()).all(|v| v.is_finite())
    }
}

/// 拟合包围盒（物体自身坐标系）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FittedBox {
    /// 中心（物体坐标系）
    pub center: Point3<f64>,
    /// 半尺寸（非负）
    pub half_extents: Vector3<f64>,
}

impl FittedBox {
    #[must_use]
    pub fn new(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
        }
    }

    /// 以原点为中心的盒子
    #[must_use]
    pub fn centered(half_extents: Vector3<f64>) -> Self {
        Self::new(Point3::origin(), half_extents)
    }

    #[must_use]
    pub fn extent(&self) -> Vector3<f64> {
        self.half_extents * 2.0
    }

    /// 最长维度所在的轴（并列时取第一个）
    #[must_use]
    pub fn longest_axis(&self) -> usize {
        let e = &self.half_extents;
        let mut best = 0;
        for i in 1..3 {
            if e[i] > e[best] {
                best = i;
            }
        }
        best
    }

    #[must_use]
    pub fn max_extent(&self) -> f64 {
        self.extent().max()
    }

    /// 是否存在非有限值或零尺寸
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !self.center.coords.iter().all(|v| v.is_finite())
            || !self.half_extents.iter().all(|v| v.is_finite() && *v > 0.0)
    }

    /// 局部坐标系下的 AABB
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center, self.half_extents)
    }

    /// 物体位于 `pose` 时的世界 AABB
    #[must_use]
    pub fn world_aabb(&self, pose: &Pose) -> Aabb {
        Aabb::from_oriented(pose, &self.center, &self.half_extents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_4;

    fn unit_box() -> Aabb {
        Aabb::new(Point3::new(1.0, 1.0, 1.0), Point3::new(-1.0, -1.0, -1.0))
    }

    #[test]
    fn test_new_sorts_corners() {
        let b = unit_box();
        assert_eq!(b.lower, Point3::new(-1.0, -1.0, -1.0));
        assert_eq!(b.upper, Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(b.volume(), 8.0);
        assert_relative_eq!(b.area_2d(), 4.0);
    }

    #[test]
    fn test_contains_and_overlap() {
        let outer = unit_box();
        let inner = Aabb::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.overlaps(&inner));

        let touching = outer.translated(&Vector3::new(2.0, 0.0, 0.0));
        assert!(!outer.overlaps(&touching));

        let tall = Aabb::new(Point3::new(-0.5, -0.5, -5.0), Point3::new(0.5, 0.5, 5.0));
        assert!(!outer.contains(&tall));
        assert!(outer.contains_2d(&tall));
    }

    #[test]
    fn test_inset() {
        let b = unit_box();
        let inset = b.inset(&Vector3::new(0.5, 0.25, 0.0)).unwrap();
        assert_relative_eq!(inset.lower.x, -0.5);
        assert_relative_eq!(inset.upper.y, 0.75);
        assert!(b.inset(&Vector3::new(1.5, 0.0, 0.0)).is_none());
        // 恰好收缩为零宽度仍然合法
        assert!(b.inset(&Vector3::new(1.0, 0.0, 0.0)).is_some());
    }

    #[test]
    fn test_from_oriented_rotated() {
        let pose = Pose::from_xyz_rpy(1.0, 0.0, 0.0, 0.0, 0.0, FRAC_PI_4);
        let aabb = Aabb::from_oriented(&pose, &Point3::origin(), &Vector3::new(1.0, 1.0, 1.0));
        let s = 2f64.sqrt();
        assert_relative_eq!(aabb.upper.x, 1.0 + s, epsilon = 1e-12);
        assert_relative_eq!(aabb.upper.y, s, epsilon = 1e-12);
        assert_relative_eq!(aabb.upper.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(Vec::new()).is_none());
        let b = Aabb::from_points(vec![
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(1.0, -1.0, 3.0),
        ])
        .unwrap();
        assert_eq!(b.lower, Point3::new(0.0, -1.0, 0.0));
        assert_eq!(b.upper, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_fitted_box_longest_axis_tie() {
        let b = FittedBox::centered(Vector3::new(0.1, 0.3, 0.3));
        assert_eq!(b.longest_axis(), 1);
        let c = FittedBox::centered(Vector3::new(0.2, 0.2, 0.2));
        assert_eq!(c.longest_axis(), 0);
        assert_relative_eq!(b.max_extent(), 0.6);
    }

    #[test]
    fn test_fitted_box_degenerate() {
        assert!(FittedBox::centered(Vector3::new(0.1, 0.0, 0.1)).is_degenerate());
        assert!(FittedBox::centered(Vector3::new(0.1, f64::NAN, 0.1)).is_degenerate());
        assert!(!FittedBox::centered(Vector3::new(0.1, 0.1, 0.1)).is_degenerate());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn point() -> impl Strategy<Value = Point3<f64>> {
            (-2.0f64..2.0, -2.0f64..2.0, -2.0f64..2.0).prop_map(|(x, y, z)| Point3::new(x, y, z))
        }

        proptest! {
            /// 中心落在内缩区域内的物体包围盒一定被原区域包含
            #[test]
            fn inset_center_is_contained(
                a in point(),
                b in point(),
                half in (0.0f64..0.5, 0.0f64..0.5, 0.0f64..0.5),
                t in (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0),
            ) {
                let region = Aabb::new(a, b);
                let half = Vector3::new(half.0, half.1, half.2);
                if let Some(inner) = region.inset(&half) {
                    let c = inner.lower + (inner.upper - inner.lower).component_mul(&Vector3::new(t.0, t.1, t.2));
                    let object = Aabb::new(c - half, c + half);
                    let eps = Vector3::repeat(1e-12);
                    let loose = Aabb::new(region.lower - eps, region.upper + eps);
                    prop_assert!(loose.contains(&object));
                    prop_assert!(loose.contains_2d(&object));
                    prop_assert!(region.contains(&inner));
                } else {
                    // 至少有一个轴放不下
                    prop_assert!((0..3).any(|i| 2.0 * half[i] > region.extent()[i]));
                }
            }

            #[test]
            fn union_contains_both(a in point(), b in point(), c in point(), d in point()) {
                let x = Aabb::new(a, b);
                let y = Aabb::new(c, d);
                let u = x.union(&y);
                prop_assert!(u.contains(&x) && u.contains(&y));
            }
        }
    }
}
