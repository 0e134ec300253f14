//! 关节类型、限位与关节位置
//!
//! `JointPosition` 是开门 / 拉抽屉动作的离散化参数：关节值始终被钳制在限位之内，
//! 并按照与限位的距离分类为 `Min` / `Max` / `Middle`。

use crate::{BodyId, JointId};
use rand::Rng;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_8};
use std::sync::atomic::{AtomicU64, Ordering};

/// 关节值判定为"位于限位"时的容差
pub const EXTENT_TOLERANCE: f64 = 1e-3;

/// 门类关节打开时使用的开度比例
pub const DOOR_OPEN_FRACTION: f64 = 0.95;

/// 关节类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JointKind {
    /// 旋转关节（门、旋钮）
    Revolute,
    /// 移动关节（抽屉、手指）
    Prismatic,
    /// 固定关节
    Fixed,
}

/// 关节限位 `[lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

impl JointLimits {
    /// 构造限位，自动排序上下界
    #[must_use]
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    #[must_use]
    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// 关节值相对于限位的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JointExtent {
    Min,
    Max,
    Middle,
}

impl JointExtent {
    /// 根据值与限位分类
    #[must_use]
    pub fn classify(value: f64, limits: &JointLimits) -> Self {
        if (value - limits.lower).abs() <= EXTENT_TOLERANCE {
            JointExtent::Min
        } else if (value - limits.upper).abs() <= EXTENT_TOLERANCE {
            JointExtent::Max
        } else {
            JointExtent::Middle
        }
    }
}

/// 可动关节的语义分类
///
/// - 旋钮：限位关于零点对称的旋转关节
/// - 门：其余旋转关节，按打开方向分为 `DoorMax`（正向打开）与 `DoorMin`（反向打开）
/// - 抽屉：移动关节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JointCategory {
    Knob,
    DoorMax,
    DoorMin,
    Drawer,
    Fixed,
}

impl JointCategory {
    #[must_use]
    pub fn classify(kind: JointKind, limits: &JointLimits) -> Self {
        match kind {
            JointKind::Fixed => JointCategory::Fixed,
            JointKind::Prismatic => JointCategory::Drawer,
            JointKind::Revolute => {
                if (limits.lower + limits.upper).abs() < EXTENT_TOLERANCE && limits.span() > 0.0 {
                    JointCategory::Knob
                } else if limits.upper.abs() >= limits.lower.abs() {
                    JointCategory::DoorMax
                } else {
                    JointCategory::DoorMin
                }
            },
        }
    }

    /// 打开状态的关节值
    ///
    /// 门打开到 95% 开度，抽屉拉到上限；旋钮与固定关节无打开状态。
    #[must_use]
    pub fn open_value(&self, limits: &JointLimits) -> Option<f64> {
        match self {
            JointCategory::DoorMax => Some(limits.upper * DOOR_OPEN_FRACTION),
            JointCategory::DoorMin => Some(limits.lower * DOOR_OPEN_FRACTION),
            JointCategory::Drawer => Some(limits.upper),
            JointCategory::Knob | JointCategory::Fixed => None,
        }
    }

    /// 关闭状态的关节值
    #[must_use]
    pub fn closed_value(&self, limits: &JointLimits) -> Option<f64> {
        match self {
            JointCategory::DoorMax | JointCategory::Drawer => Some(limits.lower),
            JointCategory::DoorMin => Some(limits.upper),
            JointCategory::Knob | JointCategory::Fixed => None,
        }
    }
}

static NEXT_JOINT_POSITION_INDEX: AtomicU64 = AtomicU64::new(0);

/// 关节位置
///
/// 创建后不可变；`index` 单调递增，仅用于调试输出。
#[derive(Debug, Clone, PartialEq)]
pub struct JointPosition {
    pub body: BodyId,
    pub joint: JointId,
    value: f64,
    limits: JointLimits,
    index: u64,
}

impl JointPosition {
    /// 构造关节位置，值被钳制到限位内
    #[must_use]
    pub fn new(body: BodyId, joint: JointId, value: f64, limits: JointLimits) -> Self {
        Self {
            body,
            joint,
            value: limits.clamp(value),
            limits,
            index: NEXT_JOINT_POSITION_INDEX.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// 位于某个限位的关节位置（`Middle` 取限位中点）
    #[must_use]
    pub fn at_extent(body: BodyId, joint: JointId, limits: JointLimits, extent: JointExtent) -> Self {
        let value = match extent {
            JointExtent::Min => limits.lower,
            JointExtent::Max => limits.upper,
            JointExtent::Middle => 0.5 * (limits.lower + limits.upper),
        };
        Self::new(body, joint, value, limits)
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub fn limits(&self) -> JointLimits {
        self.limits
    }

    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[must_use]
    pub fn extent(&self) -> JointExtent {
        JointExtent::classify(self.value, &self.limits)
    }

    /// 同一关节的另一侧限位（`Min` ↔ `Max`）
    ///
    /// 位于中间时返回距离更远的那一侧。
    #[must_use]
    pub fn opposite(&self) -> Self {
        let extent = match self.extent() {
            JointExtent::Min => JointExtent::Max,
            JointExtent::Max => JointExtent::Min,
            JointExtent::Middle => {
                if self.value - self.limits.lower < self.limits.upper - self.value {
                    JointExtent::Max
                } else {
                    JointExtent::Min
                }
            },
        };
        Self::at_extent(self.body, self.joint, self.limits, extent)
    }

    /// 同一关节、另一个值（钳制到限位）
    #[must_use]
    pub fn with_value(&self, value: f64) -> Self {
        Self::new(self.body, self.joint, value, self.limits)
    }

    /// 采样打开目标
    ///
    /// 旋转范围超过 π/2 的关节在 `[lower + π/2, lower + π/2 + π/8]` 内均匀采样 `n` 个值
    /// （开门无需开满）；其余关节返回另一侧限位。
    pub fn sample_open_positions<R: Rng + ?Sized>(
        &self,
        kind: JointKind,
        n: usize,
        rng: &mut R,
    ) -> Vec<Self> {
        if kind == JointKind::Revolute && self.limits.span() > FRAC_PI_2 {
            let lo = self.limits.lower + FRAC_PI_2;
            let hi = self.limits.clamp(lo + FRAC_PI_8);
            (0..n)
                .map(|_| {
                    let v = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
                    self.with_value(v)
                })
                .collect()
        } else {
            vec![self.opposite()]
        }
    }
}
