//! 抓取验证器
//!
//! 对单个候选执行三项检查：
//!
//! 1. **无碰撞**：手指张开时代理不与任何障碍物相交（接触点数超过阈值才算碰撞）
//! 2. **可闭合**：虚拟闭合时手指接触目标；基本体盒子目标还接受"闭合后手指包围盒位于目标包围盒内"
//! 3. **不朝上**：手指中心不得高于手掌中心超过 `pointing_up_epsilon`
//!
//! 代理由 [`GripperProxy`] 守卫管理，除非请求保留，否则在任何退出路径上都会被销毁。
//! 对同一场景状态与候选，结果是确定的。

use crate::error::SamplerError;
use crate::scoped::GripperProxy;
use tamp_scene::{Scene, SceneError, ShapeKind};
use tamp_types::{Aabb, BodyId, GraspTarget, GripperSpec, LinkId, Pose};
use tracing::debug;

/// 有符号距离小于 `-CONTACT_DEPTH` 才算穿透
const CONTACT_DEPTH: f64 = 1e-6;

/// 各项检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriterionReport {
    pub collision_free: bool,
    pub closes_on_target: bool,
    pub not_pointing_up: bool,
}

impl CriterionReport {
    pub fn all_passed(&self) -> bool {
        self.collision_free && self.closes_on_target && self.not_pointing_up
    }
}

/// 验证结论
#[derive(Debug, Clone, PartialEq)]
pub struct GraspVerdict {
    pub accepted: bool,
    pub report: CriterionReport,
    /// 首次接触时的开度；张开到最大仍接触或闭合后无接触时为 `None`
    pub width: Option<f64>,
    /// 请求保留时的代理编号
    pub retained_proxy: Option<BodyId>,
}

/// 单次验证的输入
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    /// 参考坐标系 → 夹爪
    pub candidate: &'a Pose,
    /// 参考坐标系（物体或把手连杆）的世界位姿
    pub object_pose: &'a Pose,
    pub target: GraspTarget,
    pub obstacles: &'a [BodyId],
    pub retain: bool,
}

/// 三项检查的验证器
#[derive(Debug, Clone)]
pub struct GraspValidator {
    spec: GripperSpec,
    min_contact_points: usize,
    closure_steps: usize,
}

impl GraspValidator {
    pub fn new(spec: GripperSpec, min_contact_points: usize, closure_steps: usize) -> Self {
        Self {
            spec,
            min_contact_points,
            closure_steps: closure_steps.max(1),
        }
    }

    pub fn spec(&self) -> &GripperSpec {
        &self.spec
    }

    /// 验证一个候选
    ///
    /// # 错误
    ///
    /// - 非有限位姿：`MalformedInput`
    /// - 代理无法生成或场景查询失败：`Scene`
    pub fn validate<S: Scene + ?Sized>(
        &self,
        scene: &mut S,
        request: &ValidationRequest<'_>,
    ) -> Result<GraspVerdict, SamplerError> {
        if !request.candidate.is_finite() || !request.object_pose.is_finite() {
            return Err(SamplerError::MalformedInput(
                "non-finite grasp candidate or object pose".to_string(),
            ));
        }

        let gripper_pose = request.object_pose.compose(request.candidate);
        let mut proxy = GripperProxy::spawn(scene, &gripper_pose, &self.spec)?;
        let gripper = proxy.body();
        let target = request.target.body();

        proxy.set_gripper_opening(gripper, self.spec.max_aperture)?;
        let collision_free = self.collision_free(&*proxy, gripper, target, request.obstacles)?;

        let width = self.closure_width(&mut *proxy, gripper, target)?;
        let closes_on_target = match width {
            Some(_) => true,
            None => self.box_fallback(&mut *proxy, gripper, &request.target)?,
        };

        proxy.set_gripper_opening(gripper, self.spec.max_aperture)?;
        let not_pointing_up = !self.pointing_up(&*proxy, gripper)?;

        let report = CriterionReport {
            collision_free,
            closes_on_target,
            not_pointing_up,
        };
        let accepted = report.all_passed();
        debug!(
            "grasp candidate at ({:.3}, {:.3}, {:.3}): {:?} width={:?}",
            gripper_pose.position.x, gripper_pose.position.y, gripper_pose.position.z, report, width
        );

        // 只保留通过验证的代理，被拒绝的一律销毁
        let retained_proxy = if request.retain && accepted {
            Some(proxy.retain())
        } else {
            drop(proxy);
            None
        };
        Ok(GraspVerdict {
            accepted,
            report,
            width: if closes_on_target { width.or(Some(0.0)) } else { None },
            retained_proxy,
        })
    }

    /// 检查一：与障碍物的穿透接触点数不超过阈值
    fn collision_free<S: Scene + ?Sized>(
        &self,
        scene: &S,
        gripper: BodyId,
        target: BodyId,
        obstacles: &[BodyId],
    ) -> Result<bool, SceneError> {
        for &obstacle in obstacles {
            if obstacle == gripper || obstacle == target {
                continue;
            }
            let count = scene
                .closest_points(gripper, obstacle, None, 0.0)?
                .iter()
                .filter(|c| c.distance < -CONTACT_DEPTH)
                .count();
            if count > self.min_contact_points {
                debug!("criterion 1 failed: {} contacts with {}", count, obstacle);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn fingers_touch<S: Scene + ?Sized>(&self, scene: &S, gripper: BodyId, target: BodyId) -> Result<bool, SceneError> {
        for &link in &self.spec.finger_links {
            if !scene.closest_points(gripper, target, Some(LinkId(link)), 0.0)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 检查二：从最大开度逐步闭合，返回首次接触时的开度
    fn closure_width<S: Scene + ?Sized>(
        &self,
        scene: &mut S,
        gripper: BodyId,
        target: BodyId,
    ) -> Result<Option<f64>, SceneError> {
        let max = self.spec.max_aperture;
        for step in 0..=self.closure_steps {
            let opening = max * (1.0 - step as f64 / self.closure_steps as f64);
            scene.set_gripper_opening(gripper, opening)?;
            if self.fingers_touch(scene, gripper, target)? {
                if step == 0 {
                    // 张开到最大仍接触：面宽超过开度
                    debug!("criterion 2: target wider than aperture");
                    return Ok(None);
                }
                return Ok(Some(opening.clamp(0.0, max)));
            }
        }
        Ok(None)
    }

    /// 基本体盒子：闭合后手指包围盒落在目标包围盒内也算抓住
    fn box_fallback<S: Scene + ?Sized>(
        &self,
        scene: &mut S,
        gripper: BodyId,
        target: &GraspTarget,
    ) -> Result<bool, SceneError> {
        let body = target.body();
        let link = target.link();
        if scene.shape_kind(body, link)? != ShapeKind::Box {
            return Ok(false);
        }
        scene.set_gripper_opening(gripper, 0.0)?;
        let fingers = self.finger_aabb(scene, gripper)?;
        let target_aabb = scene.aabb(body, link)?;
        Ok(target_aabb.contains(&fingers))
    }

    fn finger_aabb<S: Scene + ?Sized>(&self, scene: &S, gripper: BodyId) -> Result<Aabb, SceneError> {
        let mut union: Option<Aabb> = None;
        for &link in &self.spec.finger_links {
            let aabb = scene.aabb(gripper, Some(LinkId(link)))?;
            union = Some(match union {
                Some(u) => u.union(&aabb),
                None => aabb,
            });
        }
        union.ok_or_else(|| SceneError::Inconsistent("gripper spec has no finger links".to_string()))
    }

    /// 检查三：手指中心高于手掌中心
    fn pointing_up<S: Scene + ?Sized>(&self, scene: &S, gripper: BodyId) -> Result<bool, SceneError> {
        let fingers = self.finger_aabb(scene, gripper)?;
        let palm = scene.aabb(gripper, Some(LinkId(self.spec.palm_link)))?;
        let up = fingers.center().z - palm.center().z > self.spec.pointing_up_epsilon;
        if up {
            debug!("criterion 3 failed: fingers pointing up");
        }
        Ok(up)
    }
}
