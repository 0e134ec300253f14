//! 抓取
//!
//! `Grasp::value` 是"物体 → 夹爪"的相对变换：夹爪世界位姿 = 物体位姿 × value。
//! 宽度只能通过 [`Grasp::set_width`] 设置，保证 `0 <= width <= max_aperture`。

use crate::{BodyId, JointId, LinkId, Pose};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// 抓取相关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraspError {
    #[error("Grasp width must be finite, got {0}")]
    NonFiniteWidth(f64),

    #[error("Grasp width must be non-negative, got {0}")]
    NegativeWidth(f64),

    #[error("Grasp width {width} exceeds gripper aperture {max_aperture}")]
    ExceedsAperture { width: f64, max_aperture: f64 },
}

/// 抓取类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GraspKind {
    /// 从上方抓取
    Top,
    /// 从侧面抓取
    Side,
    /// 抓取把手（门、抽屉）
    Handle,
    /// 手部包围盒抓取族（六个面 × 四个腕部角度）
    Hand,
}

impl fmt::Display for GraspKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GraspKind::Top => "top",
            GraspKind::Side => "side",
            GraspKind::Handle => "handle",
            GraspKind::Hand => "hand",
        };
        f.write_str(s)
    }
}

/// 抓取目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GraspTarget {
    /// 可移动物体
    Body(BodyId),
    /// 铰接物体上某个关节的把手连杆
    Joint {
        body: BodyId,
        joint: JointId,
        link: LinkId,
    },
}

impl GraspTarget {
    /// 目标所属的物体
    #[must_use]
    pub fn body(&self) -> BodyId {
        match self {
            GraspTarget::Body(body) => *body,
            GraspTarget::Joint { body, .. } => *body,
        }
    }

    /// 碰撞与包围盒查询使用的连杆（整体物体为 `None`）
    #[must_use]
    pub fn link(&self) -> Option<LinkId> {
        match self {
            GraspTarget::Body(_) => None,
            GraspTarget::Joint { link, .. } => Some(*link),
        }
    }
}

static NEXT_GRASP_INDEX: AtomicU64 = AtomicU64::new(0);

/// 抓取
#[derive(Debug, Clone, PartialEq)]
pub struct Grasp {
    pub kind: GraspKind,
    pub target: GraspTarget,
    /// 物体 → 夹爪
    pub value: Pose,
    /// 接近位姿（同样相对于物体）
    pub approach: Pose,
    /// 夹爪 → 物体（抓住后搬运时使用，通常为 `value` 的逆）
    pub carry: Pose,
    width: Option<f64>,
    /// 验证时保留下来的夹爪代理
    proxy: Option<BodyId>,
    index: u64,
}

impl Grasp {
    /// 新建抓取，宽度未知，分配下一个调试编号
    #[must_use]
    pub fn new(kind: GraspKind, target: GraspTarget, value: Pose, approach: Pose, carry: Pose) -> Self {
        Self {
            kind,
            target,
            value,
            approach,
            carry,
            width: None,
            proxy: None,
            index: NEXT_GRASP_INDEX.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// 闭合宽度，`None` 表示没有有效闭合
    #[must_use]
    pub fn width(&self) -> Option<f64> {
        self.width
    }

    /// 设置闭合宽度
    ///
    /// # 错误
    ///
    /// 宽度为负、非有限或超过 `max_aperture` 时返回错误，原值保持不变。
    pub fn set_width(&mut self, width: f64, max_aperture: f64) -> Result<(), GraspError> {
        if !width.is_finite() {
            return Err(GraspError::NonFiniteWidth(width));
        }
        if width < 0.0 {
            return Err(GraspError::NegativeWidth(width));
        }
        if width > max_aperture {
            return Err(GraspError::ExceedsAperture {
                width,
                max_aperture,
            });
        }
        self.width = Some(width);
        Ok(())
    }

    /// 保留的夹爪代理；调用方负责移除
    #[must_use]
    pub fn proxy(&self) -> Option<BodyId> {
        self.proxy
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: BodyId) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// 调试编号（单调递增）
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// 给定物体位姿时夹爪的世界位姿
    #[must_use]
    pub fn gripper_pose(&self, object_pose: &Pose) -> Pose {
        object_pose.compose(&self.value)
    }

    /// 给定物体位姿时接近位姿的世界位姿
    #[must_use]
    pub fn approach_pose(&self, object_pose: &Pose) -> Pose {
        object_pose.compose(&self.approach)
    }
}

impl fmt::Display for Grasp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.value.position;
        write!(
            f,
            "g{}[{} ({:.3}, {:.3}, {:.3})]",
            self.index, self.kind, p.x, p.y, p.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grasp {
        Grasp::new(
            GraspKind::Hand,
            GraspTarget::Body(BodyId(2)),
            Pose::from_xyz(0.0, 0.0, 0.1),
            Pose::from_xyz(0.0, 0.0, 0.15),
            Pose::identity(),
        )
    }

    #[test]
    fn test_width_setter() {
        let mut g = sample();
        assert_eq!(g.width(), None);
        assert!(g.set_width(0.05, 0.08).is_ok());
        assert_eq!(g.width(), Some(0.05));

        assert_eq!(g.set_width(-0.01, 0.08), Err(GraspError::NegativeWidth(-0.01)));
        assert!(matches!(
            g.set_width(0.1, 0.08),
            Err(GraspError::ExceedsAperture { .. })
        ));
        assert!(matches!(
            g.set_width(f64::NAN, 0.08),
            Err(GraspError::NonFiniteWidth(_))
        ));
        // 失败的设置不改变原值
        assert_eq!(g.width(), Some(0.05));
        // 边界值合法
        assert!(g.set_width(0.0, 0.08).is_ok());
        assert!(g.set_width(0.08, 0.08).is_ok());
    }

    #[test]
    fn test_index_is_monotonic() {
        let a = sample();
        let b = sample();
        assert!(b.index() > a.index());
    }

    #[test]
    fn test_target_accessors() {
        let t = GraspTarget::Joint {
            body: BodyId(4),
            joint: JointId(1),
            link: LinkId(3),
        };
        assert_eq!(t.body(), BodyId(4));
        assert_eq!(t.link(), Some(LinkId(3)));
        assert_eq!(GraspTarget::Body(BodyId(1)).link(), None);
    }

    #[test]
    fn test_gripper_pose() {
        let g = sample();
        let obj = Pose::from_xyz(1.0, 2.0, 3.0);
        let gp = g.gripper_pose(&obj);
        assert!((gp.position.z - 3.1).abs() < 1e-12);
    }
}
