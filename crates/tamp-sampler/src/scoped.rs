//! 作用域守卫
//!
//! - `ScopedScene`: 记录物体位姿与关节值，离开作用域时按相反顺序恢复
//! - `GripperProxy`: 临时夹爪代理，离开作用域时销毁（除非显式保留）
//!
//! 两者都在 `Drop` 中执行清理，任何退出路径（包括 `?` 提前返回）都会触发。

use std::ops::{Deref, DerefMut};
use tamp_scene::{GripperProxies, SceneError, SceneModel};
use tamp_types::{BodyId, GripperSpec, JointId, Pose};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy)]
enum Saved {
    Pose(BodyId, Pose),
    Joint(BodyId, JointId, f64),
}

/// 场景状态保存 / 恢复守卫
pub struct ScopedScene<'a, S: SceneModel + ?Sized> {
    scene: &'a mut S,
    saved: Vec<Saved>,
}

impl<'a, S: SceneModel + ?Sized> ScopedScene<'a, S> {
    pub fn new(scene: &'a mut S) -> Self {
        Self {
            scene,
            saved: Vec::new(),
        }
    }

    /// 记录物体当前位姿
    pub fn save_pose(&mut self, body: BodyId) -> Result<(), SceneError> {
        let pose = self.scene.pose(body)?;
        self.saved.push(Saved::Pose(body, pose));
        Ok(())
    }

    /// 记录关节当前值
    pub fn save_joint(&mut self, body: BodyId, joint: JointId) -> Result<(), SceneError> {
        let value = self.scene.joint_position(body, joint)?;
        self.saved.push(Saved::Joint(body, joint, value));
        Ok(())
    }

    /// 记录物体位姿及其全部关节值
    pub fn save_body(&mut self, body: BodyId) -> Result<(), SceneError> {
        self.save_pose(body)?;
        // 连杆 i ≥ 1 由关节 i - 1 驱动
        let joints = self.scene.link_count(body)?.saturating_sub(1);
        for j in 0..joints {
            self.save_joint(body, JointId(j))?;
        }
        Ok(())
    }

    /// 记录物体位姿后设置新位姿
    pub fn set_pose_scoped(&mut self, body: BodyId, pose: &Pose) -> Result<(), SceneError> {
        self.save_pose(body)?;
        self.scene.set_pose(body, pose)
    }

    /// 记录关节值后设置新值
    pub fn set_joint_scoped(&mut self, body: BodyId, joint: JointId, value: f64) -> Result<(), SceneError> {
        self.save_joint(body, joint)?;
        self.scene.set_joint_position(body, joint, value)
    }
}

impl<S: SceneModel + ?Sized> Deref for ScopedScene<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.scene
    }
}

impl<S: SceneModel + ?Sized> DerefMut for ScopedScene<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.scene
    }
}

impl<S: SceneModel + ?Sized> Drop for ScopedScene<'_, S> {
    fn drop(&mut self) {
        for saved in self.saved.drain(..).rev() {
            let result = match saved {
                Saved::Pose(body, pose) => self.scene.set_pose(body, &pose),
                Saved::Joint(body, joint, value) => self.scene.set_joint_position(body, joint, value),
            };
            if let Err(e) = result {
                warn!("Failed to restore scene state {:?}: {}", saved, e);
            }
        }
    }
}

/// 临时夹爪代理
pub struct GripperProxy<'a, S: GripperProxies + ?Sized> {
    scene: &'a mut S,
    body: BodyId,
    retained: bool,
}

impl<'a, S: GripperProxies + ?Sized> GripperProxy<'a, S> {
    /// 在 `pose` 处生成代理
    pub fn spawn(scene: &'a mut S, pose: &Pose, spec: &GripperSpec) -> Result<Self, SceneError> {
        let body = scene.spawn_gripper(pose, spec)?;
        trace!("spawned gripper proxy {}", body);
        Ok(Self {
            scene,
            body,
            retained: false,
        })
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    /// 保留代理（不在 drop 时销毁），返回其编号
    pub fn retain(mut self) -> BodyId {
        self.retained = true;
        self.body
    }
}

impl<S: GripperProxies + ?Sized> Deref for GripperProxy<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.scene
    }
}

impl<S: GripperProxies + ?Sized> DerefMut for GripperProxy<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.scene
    }
}

impl<S: GripperProxies + ?Sized> Drop for GripperProxy<'_, S> {
    fn drop(&mut self) {
        if self.retained {
            return;
        }
        match self.scene.remove_body(self.body) {
            Ok(()) => trace!("removed gripper proxy {}", self.body),
            Err(e) => warn!("Failed to remove gripper proxy {}: {}", self.body, e),
        }
    }
}
