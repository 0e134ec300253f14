//! # TAMP Scene
//!
//! 场景抽象层：采样器通过这里的 trait 访问物理引擎，从不直接依赖具体实现。
//!
//! ## 模块
//!
//! - `box_world`: 内存中的有向盒世界（运动学树 + SAT 碰撞 + 夹爪代理）
//! - `robot`: 飞行夹爪机器人与解析逆解
//!
//! ## 在架构中的位置
//!
//! ```text
//! tamp-sampler（抓取 / 放置 / 容纳 / 拉动映射）
//!     ↓ SceneModel / CollisionOracle / GripperProxies / InverseKinematics
//! tamp-scene（此 crate）
//!     ↓ BoxWorld 或外部物理引擎
//! ```

pub mod box_world;
pub mod robot;

pub use box_world::{BodyBuilder, BoxShape, BoxWorld};
pub use robot::{ConfigurationSource, FlyingGripper};

use nalgebra::Point3;
use tamp_types::{
    Aabb, BodyId, Budget, FittedBox, GripperSpec, JointId, JointKind, JointLimits, LinkId, Pose,
};
use thiserror::Error;

/// 场景层统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Unknown body {0}")]
    UnknownBody(BodyId),
    #[error("Unknown {link} on {body}")]
    UnknownLink { body: BodyId, link: LinkId },
    #[error("Unknown {joint} on {body}")]
    UnknownJoint { body: BodyId, joint: JointId },
    #[error("{body} has no collision shape (link: {link:?})")]
    MissingShape { body: BodyId, link: Option<LinkId> },
    #[error("Non-finite pose for {0}")]
    NonFinitePose(BodyId),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Failed to spawn gripper proxy: {0}")]
    ProxySpawnFailed(String),
    #[error("Inconsistent scene state: {0}")]
    Inconsistent(String),
}

impl SceneError {
    /// 是否由调用方传入的数据引起（而不是引擎故障）
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            SceneError::UnknownBody(_)
                | SceneError::UnknownLink { .. }
                | SceneError::UnknownJoint { .. }
                | SceneError::MissingShape { .. }
                | SceneError::NonFinitePose(_)
        )
    }
}

/// 碰撞形状类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// 基本体盒子
    Box,
    /// 网格（盒世界中以包围盒近似）
    Mesh,
    /// 多连杆组合体
    Composite,
}

/// 接触点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// 位于物体 A 上的点（世界坐标）
    pub point: Point3<f64>,
    /// 有符号距离，负值表示穿透
    pub distance: f64,
}

/// 场景几何与运动学查询
pub trait SceneModel {
    fn body_count(&self) -> usize;
    fn body_name(&self, body: BodyId) -> Result<String, SceneError>;
    fn pose(&self, body: BodyId) -> Result<Pose, SceneError>;
    fn set_pose(&mut self, body: BodyId, pose: &Pose) -> Result<(), SceneError>;
    fn link_count(&self, body: BodyId) -> Result<usize, SceneError>;
    fn link_pose(&self, body: BodyId, link: LinkId) -> Result<Pose, SceneError>;
    /// 世界 AABB；`link` 为 `None` 时取整个物体
    fn aabb(&self, body: BodyId, link: Option<LinkId>) -> Result<Aabb, SceneError>;
    /// 自身坐标系下的拟合盒；`link` 为 `None` 时取物体坐标系
    fn fitted_box(&self, body: BodyId, link: Option<LinkId>) -> Result<FittedBox, SceneError>;
    fn shape_kind(&self, body: BodyId, link: Option<LinkId>) -> Result<ShapeKind, SceneError>;
    fn joint_kind(&self, body: BodyId, joint: JointId) -> Result<JointKind, SceneError>;
    fn joint_limits(&self, body: BodyId, joint: JointId) -> Result<JointLimits, SceneError>;
    /// 关节驱动的子连杆
    fn joint_child_link(&self, body: BodyId, joint: JointId) -> Result<LinkId, SceneError>;
    fn joint_position(&self, body: BodyId, joint: JointId) -> Result<f64, SceneError>;
    fn set_joint_position(&mut self, body: BodyId, joint: JointId, value: f64) -> Result<(), SceneError>;
}

/// 碰撞查询
pub trait CollisionOracle {
    /// 两个物体是否相交（仅接触不算）
    fn pairwise_collision(&self, a: BodyId, b: BodyId) -> Result<bool, SceneError>;

    /// A（可限定连杆）与 B 之间距离不超过 `max_distance` 的接触点
    fn closest_points(
        &self,
        a: BodyId,
        b: BodyId,
        link_a: Option<LinkId>,
        max_distance: f64,
    ) -> Result<Vec<Contact>, SceneError>;

    /// 与任一障碍物相交
    fn collides_with_any(&self, body: BodyId, obstacles: &[BodyId]) -> Result<bool, SceneError> {
        for &obstacle in obstacles {
            if obstacle != body && self.pairwise_collision(body, obstacle)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// 临时夹爪代理工厂
///
/// 代理是非物理的几何体，仅用于碰撞测试，调用方负责销毁。
pub trait GripperProxies {
    fn spawn_gripper(&mut self, pose: &Pose, spec: &GripperSpec) -> Result<BodyId, SceneError>;
    /// 设置两指内侧间距（钳制到 `[0, max_aperture]`）
    fn set_gripper_opening(&mut self, gripper: BodyId, opening: f64) -> Result<(), SceneError>;
    fn remove_body(&mut self, body: BodyId) -> Result<(), SceneError>;
}

/// 采样器所需的全部场景能力
pub trait Scene: SceneModel + CollisionOracle + GripperProxies {}

impl<T: SceneModel + CollisionOracle + GripperProxies + ?Sized> Scene for T {}

/// 逆运动学求解器
pub trait InverseKinematics {
    /// 求解使工具连杆到达 `target` 的构型；无解返回 `Ok(None)`
    fn solve(
        &mut self,
        target: &Pose,
        seed: &[f64],
        budget: &Budget,
    ) -> Result<Option<Vec<f64>>, SceneError>;
}

/// 可设置构型的机器人
pub trait ArticulatedRobot {
    fn body(&self) -> BodyId;
    fn tool_link(&self) -> LinkId;
    fn configuration(&self, scene: &dyn SceneModel) -> Result<Vec<f64>, SceneError>;
    fn set_configuration(&self, scene: &mut dyn SceneModel, conf: &[f64]) -> Result<(), SceneError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_malformed() {
        assert!(SceneError::UnknownBody(BodyId(1)).is_malformed());
        assert!(
            SceneError::MissingShape {
                body: BodyId(1),
                link: None
            }
            .is_malformed()
        );
        assert!(!SceneError::ProxySpawnFailed("x".into()).is_malformed());
        assert!(!SceneError::Inconsistent("x".into()).is_malformed());
    }

    #[test]
    fn test_error_display() {
        let e = SceneError::UnknownLink {
            body: BodyId(2),
            link: LinkId(5),
        };
        assert_eq!(e.to_string(), "Unknown link#5 on body#2");
    }
}
