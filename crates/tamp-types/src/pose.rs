//! 刚体位姿
//!
//! `Pose` 由位置与单位四元数组成，四元数的归一化由 `UnitQuaternion` 在类型层面保证。
//!
//! # 元组表示
//!
//! - 6 元组：`[x, y, z, roll, pitch, yaw]`
//! - 7 元组：`[x, y, z, qx, qy, qz, qw]`（抓取数据库的写出格式）

use nalgebra::{Isometry3, Point3, Quaternion, UnitQuaternion, Vector3};
use std::ops::Mul;

/// 位置 + 姿态
///
/// # 示例
///
/// ```
/// use tamp_types::Pose;
///
/// let a = Pose::from_xyz(1.0, 0.0, 0.0);
/// let b = Pose::from_xyz_rpy(0.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2);
/// let c = a * b;
/// assert!((c.position.x - 1.0).abs() < 1e-12);
/// assert!(c.inverse().compose(&c).approx_eq(&Pose::identity(), 1e-12));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    /// 位置（父坐标系）
    pub position: Point3<f64>,
    /// 姿态
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// 单位位姿
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    #[must_use]
    pub const fn new(position: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    /// 纯平移
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    #[must_use]
    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self::from_position(Point3::new(x, y, z))
    }

    /// 纯旋转
    #[must_use]
    pub fn from_rotation(rotation: UnitQuaternion<f64>) -> Self {
        Self {
            position: Point3::origin(),
            rotation,
        }
    }

    /// 由位置和固定轴 roll-pitch-yaw 构造
    #[must_use]
    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
            rotation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        }
    }

    #[must_use]
    pub fn from_isometry(iso: Isometry3<f64>) -> Self {
        Self {
            position: Point3::from(iso.translation.vector),
            rotation: iso.rotation,
        }
    }

    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.rotation)
    }

    /// 局部点 → 父坐标系
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// 局部向量 → 父坐标系（仅旋转）
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// 父坐标系点 → 局部
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// 逆位姿
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            position: Point3::from(-(inv_rotation * self.position.coords)),
            rotation: inv_rotation,
        }
    }

    /// 位姿复合：`self * other`
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// 在局部坐标系中平移
    #[must_use]
    pub fn translated_local(&self, offset: &Vector3<f64>) -> Self {
        self.compose(&Self::from_position(Point3::from(*offset)))
    }

    /// 替换位置，保留姿态
    #[must_use]
    pub fn with_position(&self, position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: self.rotation,
        }
    }

    /// 位置按比例缩放，姿态不变
    ///
    /// 用于抓取数据库的尺度换算。
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            position: Point3::from(self.position.coords * factor),
            rotation: self.rotation,
        }
    }

    /// 位置线性插值 + 姿态球面插值
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            position: Point3::from(self.position.coords.lerp(&other.position.coords, t)),
            rotation: self.rotation.slerp(&other.rotation, t),
        }
    }

    /// 检查是否含 `NaN` / `Inf`
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }

    /// 近似相等（位置分量与四元数夹角均在 `epsilon` 内）
    ///
    /// `q` 与 `-q` 视为同一姿态。
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self.position - other.position).amax() <= epsilon
            && self.angle_to(other) <= epsilon
    }

    /// 两个姿态之间的夹角（弧度）
    ///
    /// 使用 `atan2` 形式，在夹角接近 0 时仍然数值稳定。
    #[must_use]
    pub fn angle_to(&self, other: &Self) -> f64 {
        let delta = self.rotation.inverse() * other.rotation;
        let q = delta.quaternion();
        2.0 * q.vector().norm().atan2(q.w.abs())
    }

    /// 固定轴 `(roll, pitch, yaw)`
    #[must_use]
    pub fn euler(&self) -> (f64, f64, f64) {
        self.rotation.euler_angles()
    }

    /// `[x, y, z, roll, pitch, yaw]`
    #[must_use]
    pub fn to_tuple6(&self) -> [f64; 6] {
        let (r, p, y) = self.euler();
        [self.position.x, self.position.y, self.position.z, r, p, y]
    }

    /// `[x, y, z, qx, qy, qz, qw]`
    #[must_use]
    pub fn to_tuple7(&self) -> [f64; 7] {
        let q = self.rotation.quaternion();
        [
            self.position.x,
            self.position.y,
            self.position.z,
            q.i,
            q.j,
            q.k,
            q.w,
        ]
    }

    #[must_use]
    pub fn from_tuple6(t: &[f64; 6]) -> Self {
        Self::from_xyz_rpy(t[0], t[1], t[2], t[3], t[4], t[5])
    }

    /// 由 7 元组构造，四元数会被归一化
    ///
    /// 四元数为零或含非有限值时返回 `None`。
    #[must_use]
    pub fn from_tuple7(t: &[f64; 7]) -> Option<Self> {
        if t.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let q = Quaternion::new(t[6], t[3], t[4], t[5]);
        let rotation = UnitQuaternion::try_new(q, 1e-12)?;
        Some(Self {
            position: Point3::new(t[0], t[1], t[2]),
            rotation,
        })
    }

    /// 位置与四元数按小数位数量化
    ///
    /// 量化后的四元数重新归一化。
    #[must_use]
    pub fn quantized(&self, decimals: u32) -> Self {
        let t = self.to_tuple7().map(|v| crate::round_to(v, decimals));
        Self::from_tuple7(&t).unwrap_or(*self)
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        self.compose(&rhs)
    }
}

impl<'a> Mul<&'a Pose> for &'a Pose {
    type Output = Pose;

    fn mul(self, rhs: &'a Pose) -> Pose {
        self.compose(rhs)
    }
}
