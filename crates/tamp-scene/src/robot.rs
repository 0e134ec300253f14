//! 飞行夹爪机器人
//!
//! 构型为基座位姿 `[x, y, z, roll, pitch, yaw]`，逆运动学是解析的：
//! `base = target × tool_from_base⁻¹`。用于拉门 / 拉抽屉的映射构建与测试。

use crate::{ArticulatedRobot, BodyBuilder, BoxWorld, InverseKinematics, SceneError, SceneModel};
use std::f64::consts::{PI, TAU};
use tamp_types::{Aabb, BodyId, Budget, GripperSpec, JointId, LinkId, Pose};
use tracing::trace;

/// 读取 / 写入机器人构型的方式
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationSource {
    /// 基座位姿 `[x, y, z, roll, pitch, yaw]`
    BasePose,
    /// 一组关节值
    Joints(Vec<JointId>),
}

impl ConfigurationSource {
    pub fn read(&self, scene: &dyn SceneModel, body: BodyId) -> Result<Vec<f64>, SceneError> {
        match self {
            ConfigurationSource::BasePose => Ok(scene.pose(body)?.to_tuple6().to_vec()),
            ConfigurationSource::Joints(joints) => joints
                .iter()
                .map(|j| scene.joint_position(body, *j))
                .collect(),
        }
    }

    pub fn write(&self, scene: &mut dyn SceneModel, body: BodyId, conf: &[f64]) -> Result<(), SceneError> {
        match self {
            ConfigurationSource::BasePose => {
                let t: [f64; 6] = conf.try_into().map_err(|_| {
                    SceneError::Inconsistent(format!(
                        "base pose configuration needs 6 values, got {}",
                        conf.len()
                    ))
                })?;
                scene.set_pose(body, &Pose::from_tuple6(&t))
            },
            ConfigurationSource::Joints(joints) => {
                if joints.len() != conf.len() {
                    return Err(SceneError::Inconsistent(format!(
                        "expected {} joint values, got {}",
                        joints.len(),
                        conf.len()
                    )));
                }
                for (j, v) in joints.iter().zip(conf) {
                    scene.set_joint_position(body, *j, *v)?;
                }
                Ok(())
            },
        }
    }

    /// 构型维度
    pub fn dimension(&self) -> usize {
        match self {
            ConfigurationSource::BasePose => 6,
            ConfigurationSource::Joints(joints) => joints.len(),
        }
    }
}

/// 将角度展开到离参考值最近的 2π 周期
///
/// 任一输入非有限时原样返回 `angle`。
fn unwrap_angle(angle: f64, reference: f64) -> f64 {
    if !angle.is_finite() || !reference.is_finite() {
        return angle;
    }
    reference + (angle - reference + PI).rem_euclid(TAU) - PI
}

/// 飞行夹爪：基座即夹爪手掌，可在空间中自由移动
#[derive(Debug, Clone)]
pub struct FlyingGripper {
    body: BodyId,
    /// 工具坐标系在基座坐标系中的位姿
    tool_from_base: Pose,
    /// 基座可达范围，`None` 表示不限
    workspace: Option<Aabb>,
}

impl FlyingGripper {
    /// 在盒世界中创建夹爪机器人
    pub fn spawn(world: &mut BoxWorld, pose: Pose, spec: &GripperSpec) -> Result<Self, SceneError> {
        let body = world.add_body(BodyBuilder::gripper("flying_gripper", pose, spec))?;
        Ok(Self {
            body,
            tool_from_base: Pose::identity(),
            workspace: None,
        })
    }

    /// 包装已有物体
    pub fn new(body: BodyId) -> Self {
        Self {
            body,
            tool_from_base: Pose::identity(),
            workspace: None,
        }
    }

    pub fn with_tool_offset(mut self, tool_from_base: Pose) -> Self {
        self.tool_from_base = tool_from_base;
        self
    }

    pub fn with_workspace(mut self, workspace: Aabb) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// 工具位姿对应的基座位姿
    pub fn base_for_tool(&self, tool: &Pose) -> Pose {
        tool.compose(&self.tool_from_base.inverse())
    }
}

impl ArticulatedRobot for FlyingGripper {
    fn body(&self) -> BodyId {
        self.body
    }

    fn tool_link(&self) -> LinkId {
        LinkId::BASE
    }

    fn configuration(&self, scene: &dyn SceneModel) -> Result<Vec<f64>, SceneError> {
        ConfigurationSource::BasePose.read(scene, self.body)
    }

    fn set_configuration(&self, scene: &mut dyn SceneModel, conf: &[f64]) -> Result<(), SceneError> {
        ConfigurationSource::BasePose.write(scene, self.body, conf)
    }
}

impl InverseKinematics for FlyingGripper {
    fn solve(
        &mut self,
        target: &Pose,
        seed: &[f64],
        budget: &Budget,
    ) -> Result<Option<Vec<f64>>, SceneError> {
        if budget.max_iterations == 0 || !target.is_finite() {
            return Ok(None);
        }
        let base = self.base_for_tool(target);
        if let Some(ws) = &self.workspace {
            if !ws.contains_point(&base.position) {
                trace!("flying gripper: target outside workspace");
                return Ok(None);
            }
        }
        let mut conf = base.to_tuple6().to_vec();
        // 角度与种子保持连续
        if seed.len() == 6 {
            for i in 3..6 {
                conf[i] = unwrap_angle(conf[i], seed[i]);
            }
        }
        Ok(Some(conf))
    }
}
