//! 末端执行器几何参数与朝向标签
//!
//! 夹爪坐标系约定：
//!
//! ```text
//!            +z（接近方向）
//!             ↑
//!   finger ┃  ┃  ┃ finger      手指沿 ±y 张开 / 闭合
//!          ┗━━┻━━┛             手掌位于原点
//! ```

use crate::Pose;
use nalgebra::Vector3;
use std::fmt;

/// 两指夹爪的几何参数
///
/// 代替按机器人型号硬编码的手指连杆编号与"朝上"阈值。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GripperSpec {
    /// 手掌半尺寸 `[x, y, z]`（米）
    pub palm_half_extents: [f64; 3],
    /// 手指长度（沿 +z）
    pub finger_length: f64,
    /// 手指厚度（沿 y）
    pub finger_thickness: f64,
    /// 手指宽度（沿 x）
    pub finger_width: f64,
    /// 最大张开宽度（两指内侧间距）
    pub max_aperture: f64,
    /// 手掌连杆
    pub palm_link: usize,
    /// 手指连杆（判定"朝上"时取它们包围盒并集的中心）
    pub finger_links: Vec<usize>,
    /// 手指中心高于手掌中心超过该值即视为"朝上"
    pub pointing_up_epsilon: f64,
}

impl Default for GripperSpec {
    fn default() -> Self {
        Self {
            palm_half_extents: [0.01, 0.05, 0.01],
            finger_length: 0.05,
            finger_thickness: 0.01,
            finger_width: 0.02,
            max_aperture: 0.08,
            palm_link: 0,
            finger_links: vec![1, 2],
            pointing_up_epsilon: 0.01,
        }
    }
}

impl GripperSpec {
    #[must_use]
    pub fn palm_half_extents(&self) -> Vector3<f64> {
        Vector3::from(self.palm_half_extents)
    }

    /// 单根手指的半尺寸
    #[must_use]
    pub fn finger_half_extents(&self) -> Vector3<f64> {
        Vector3::new(
            self.finger_width * 0.5,
            self.finger_thickness * 0.5,
            self.finger_length * 0.5,
        )
    }

    /// 手指中心沿 +z 的偏移
    #[must_use]
    pub fn finger_center_offset(&self) -> f64 {
        self.palm_half_extents[2] + self.finger_length * 0.5
    }

    /// 指尖沿 +z 的偏移
    #[must_use]
    pub fn tip_offset(&self) -> f64 {
        self.palm_half_extents[2] + self.finger_length
    }

    /// 参数是否合法（正尺寸、手指连杆非空）
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.palm_half_extents.iter().all(|v| v.is_finite() && *v > 0.0)
            && [
                self.finger_length,
                self.finger_thickness,
                self.finger_width,
                self.max_aperture,
            ]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
            && !self.finger_links.is_empty()
            && !self.finger_links.contains(&self.palm_link)
            && self.pointing_up_epsilon >= 0.0
    }
}

/// 世界坐标轴方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisDirection {
    Front,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl AxisDirection {
    fn of(v: &Vector3<f64>, epsilon: f64) -> Option<Self> {
        const TABLE: [(AxisDirection, [f64; 3]); 6] = [
            (AxisDirection::Front, [1.0, 0.0, 0.0]),
            (AxisDirection::Back, [-1.0, 0.0, 0.0]),
            (AxisDirection::Left, [0.0, 1.0, 0.0]),
            (AxisDirection::Right, [0.0, -1.0, 0.0]),
            (AxisDirection::Up, [0.0, 0.0, 1.0]),
            (AxisDirection::Down, [0.0, 0.0, -1.0]),
        ];
        TABLE
            .iter()
            .find(|(_, axis)| (v - Vector3::from(*axis)).amax() <= epsilon)
            .map(|(d, _)| *d)
    }

    fn label(&self) -> &'static str {
        match self {
            AxisDirection::Front => "front",
            AxisDirection::Back => "back",
            AxisDirection::Left => "left",
            AxisDirection::Right => "right",
            AxisDirection::Up => "up",
            AxisDirection::Down => "down",
        }
    }
}

/// 手指闭合方向所在的平面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacePlane {
    /// 沿世界 y 闭合
    Sideways,
    /// 沿世界 x 闭合
    Frontal,
    /// 沿世界 z 闭合
    Horizontal,
}

/// 抓取姿态的模糊方向标签，仅用于调试输出
///
/// 格式：`point {接近方向}, face {闭合平面}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GripperDirection {
    pub point: AxisDirection,
    pub face: FacePlane,
}

impl GripperDirection {
    /// 夹爪位姿的方向标签；任一轴不在某个世界轴 `epsilon` 之内时返回 `None`
    #[must_use]
    pub fn classify(gripper_pose: &Pose, epsilon: f64) -> Option<Self> {
        let approach = gripper_pose.transform_vector(&Vector3::z());
        let closing = gripper_pose.transform_vector(&Vector3::y());
        let point = AxisDirection::of(&approach, epsilon)?;
        let face = match AxisDirection::of(&closing, epsilon)? {
            AxisDirection::Left | AxisDirection::Right => FacePlane::Sideways,
            AxisDirection::Front | AxisDirection::Back => FacePlane::Frontal,
            AxisDirection::Up | AxisDirection::Down => FacePlane::Horizontal,
        };
        Some(Self { point, face })
    }
}

impl fmt::Display for GripperDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let face = match self.face {
            FacePlane::Sideways => "sideways",
            FacePlane::Frontal => "frontal",
            FacePlane::Horizontal => "horizontal",
        };
        write!(f, "point {}, face {}", self.point.label(), face)
    }
}
