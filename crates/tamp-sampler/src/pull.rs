//! 拉门 / 拉抽屉映射
//!
//! 把关节从起点逐步转到终点，每一步用手柄抓取反解机器人构型，
//! 得到"机器人构型 → 关节值"的离散对应表。之后机器人运动时，
//! [`AttachmentManager`](crate::AttachmentManager) 按最近构型查表驱动关节。
//!
//! 第一次逆解失败或碰撞即停止扩展，保留已接受的前缀；
//! 接受步数少于 `ceil(completeness * num_steps)` 时返回 `NotFound`。

use crate::cancel::CancellationToken;
use crate::error::{Sampled, SamplerError};
use crate::scoped::ScopedScene;
use tamp_scene::{ArticulatedRobot, InverseKinematics, Scene};
use tamp_tools::PullSettings;
use tamp_types::{BodyId, Budget, Grasp, GraspTarget, JointPosition, round_to};
use tracing::{debug, info};

/// 起止值相同的判定阈值
const SAME_VALUE_EPSILON: f64 = 1e-9;

/// 一个采样点
#[derive(Debug, Clone, PartialEq)]
pub struct PullSample {
    /// 机器人构型（已取整）
    pub conf: Vec<f64>,
    pub value: f64,
}

/// 构型 → 关节值对应表
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PullMapping {
    samples: Vec<PullSample>,
}

impl PullMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conf: Vec<f64>, value: f64) {
        self.samples.push(PullSample { conf, value });
    }

    pub fn samples(&self) -> &[PullSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 关节值序列
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// 最后一个采样点的关节值（实际能拉到的位置）
    pub fn reached(&self) -> Option<f64> {
        self.samples.last().map(|s| s.value)
    }

    /// 按 L∞ 距离查找最近的采样点，超出 `tolerance` 或维度不符时返回 `None`
    ///
    /// 距离相同时取先记录的点。
    pub fn lookup(&self, conf: &[f64], tolerance: f64) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for sample in &self.samples {
            if sample.conf.len() != conf.len() {
                continue;
            }
            let distance = sample
                .conf
                .iter()
                .zip(conf)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            if distance > tolerance {
                continue;
            }
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, sample.value));
            }
        }
        best.map(|(_, value)| value)
    }
}

/// 映射构建请求
#[derive(Debug, Clone, Copy)]
pub struct PullRequest<'a> {
    pub start: &'a JointPosition,
    pub end: &'a JointPosition,
    /// 手柄抓取（目标必须是关节）
    pub grasp: &'a Grasp,
    /// 静态障碍物（不含被拉的物体本身）
    pub obstacles: &'a [BodyId],
}

/// 映射构建器
#[derive(Debug, Clone)]
pub struct PullMappingBuilder<'a> {
    settings: &'a PullSettings,
    ik_budget: Budget,
    cancel: CancellationToken,
}

impl<'a> PullMappingBuilder<'a> {
    pub fn new(settings: &'a PullSettings) -> Self {
        Self {
            settings,
            ik_budget: Budget::iterations(100),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_ik_budget(mut self, budget: Budget) -> Self {
        self.ik_budget = budget;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 需要接受的最少步数
    pub fn required_steps(&self) -> usize {
        (self.settings.completeness * self.settings.num_steps as f64).ceil() as usize
    }

    /// 构建映射（场景中的关节值与机器人状态在返回前恢复）
    pub fn build<S, R>(
        &self,
        scene: &mut S,
        robot: &mut R,
        request: &PullRequest<'_>,
    ) -> Result<Sampled<PullMapping>, SamplerError>
    where
        S: Scene,
        R: ArticulatedRobot + InverseKinematics + ?Sized,
    {
        let (start, end) = (request.start, request.end);
        if start.body != end.body || start.joint != end.joint {
            return Err(SamplerError::MalformedInput(format!(
                "pull endpoints refer to different joints: {}/{} vs {}/{}",
                start.body, start.joint, end.body, end.joint
            )));
        }
        let GraspTarget::Joint { body, joint, link } = request.grasp.target else {
            return Err(SamplerError::MalformedInput(
                "pull mapping requires a handle grasp".to_string(),
            ));
        };
        if body != start.body || joint != start.joint {
            return Err(SamplerError::MalformedInput(format!(
                "handle grasp targets {body}/{joint}, pull moves {}/{}",
                start.body, start.joint
            )));
        }
        if (start.value() - end.value()).abs() < SAME_VALUE_EPSILON {
            debug!("pull {}/{}: start equals end", body, joint);
            return Ok(Sampled::NotFound);
        }

        let obstacles: Vec<BodyId> = request
            .obstacles
            .iter()
            .copied()
            .filter(|&o| o != body && o != robot.body())
            .collect();
        let decimals = self.settings.round_decimals;
        let steps = self.settings.num_steps.max(1);

        let mut scoped = ScopedScene::new(scene);
        scoped.save_body(robot.body())?;
        scoped.save_joint(body, joint)?;

        let mut mapping = PullMapping::new();
        let mut seed = robot.configuration(&*scoped)?;
        let mut accepted = 0usize;

        for step in 0..=steps {
            if self.cancel.is_cancelled() {
                return Err(SamplerError::Cancelled);
            }
            let t = step as f64 / steps as f64;
            let value = start.value() + (end.value() - start.value()) * t;
            scoped.set_joint_position(body, joint, value)?;

            let handle = scoped.link_pose(body, link)?;
            let target = request.grasp.gripper_pose(&handle);
            let Some(conf) = robot.solve(&target, &seed, &self.ik_budget)? else {
                debug!("pull step {}: no IK solution", step);
                break;
            };
            robot.set_configuration(&mut *scoped, &conf)?;
            if scoped.collides_with_any(robot.body(), &obstacles)? {
                debug!("pull step {}: robot in collision", step);
                break;
            }

            mapping.push(conf.iter().map(|v| round_to(*v, decimals)).collect(), value);
            if step > 0 {
                accepted += 1;
            }
            seed = conf;
        }

        let required = self.required_steps();
        info!(
            "pull mapping for {}/{}: {} of {} steps accepted (need {})",
            body, joint, accepted, steps, required
        );
        if mapping.is_empty() || accepted < required {
            return Ok(Sampled::NotFound);
        }
        Ok(Sampled::Found(mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};
    use std::f64::consts::{FRAC_PI_2, PI};
    use tamp_scene::{BodyBuilder, BoxShape, BoxWorld, FlyingGripper, SceneModel};
    use tamp_types::{Aabb, GraspKind, GripperSpec, JointExtent, JointId, JointLimits, LinkId, Pose};

    /// 柜体 + 门（铰链在 x = 0.21, y = -0.2）+ 把手
    fn cabinet(world: &mut BoxWorld) -> BodyId {
        let builder = BodyBuilder::new("cabinet")
            .pose(Pose::from_xyz(0.0, 0.0, 0.5))
            .base_shape(BoxShape::cuboid(Vector3::new(0.2, 0.2, 0.3)))
            .joint_link(
                LinkId::BASE,
                Pose::from_xyz(0.21, -0.2, 0.0),
                tamp_types::JointKind::Revolute,
                Vector3::z(),
                JointLimits::new(0.0, FRAC_PI_2),
                Some(BoxShape::cuboid(Vector3::new(0.01, 0.2, 0.3)).offset(Point3::new(0.0, 0.2, 0.0))),
            )
            .fixed_link(
                LinkId(1),
                Pose::from_xyz(0.04, 0.35, 0.0),
                Some(BoxShape::cuboid(Vector3::new(0.01, 0.01, 0.08))),
            );
        world.add_body(builder).unwrap()
    }

    /// 从把手 +x 一侧接近，闭合方向竖直
    fn handle_grasp(body: BodyId) -> Grasp {
        let value = Pose::from_xyz_rpy(0.06, 0.0, 0.0, FRAC_PI_2, 0.0, -FRAC_PI_2);
        Grasp::new(
            GraspKind::Handle,
            GraspTarget::Joint {
                body,
                joint: JointId(0),
                link: LinkId(2),
            },
            value,
            value,
            value.inverse(),
        )
    }

    fn endpoints(body: BodyId) -> (JointPosition, JointPosition) {
        let limits = JointLimits::new(0.0, FRAC_PI_2);
        (
            JointPosition::at_extent(body, JointId(0), limits, JointExtent::Min),
            JointPosition::new(body, JointId(0), FRAC_PI_2 * 0.9, limits),
        )
    }

    #[test]
    fn test_door_mapping_is_monotonic() {
        let mut world = BoxWorld::new();
        let cabinet = cabinet(&mut world);
        let mut robot = FlyingGripper::spawn(&mut world, Pose::from_xyz(1.0, 1.0, 1.0), &GripperSpec::default()).unwrap();
        let grasp = handle_grasp(cabinet);
        let (start, end) = endpoints(cabinet);
        let settings = PullSettings::default();

        let mapping = PullMappingBuilder::new(&settings)
            .build(
                &mut world,
                &mut robot,
                &PullRequest {
                    start: &start,
                    end: &end,
                    grasp: &grasp,
                    obstacles: &[],
                },
            )
            .unwrap()
            .found()
            .unwrap();

        assert_eq!(mapping.len(), settings.num_steps + 1);
        let values: Vec<f64> = mapping.values().collect();
        assert!(values.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(values[0], 0.0);
        // 所有构型都已取整到 3 位小数
        for s in mapping.samples() {
            assert!(s.conf.iter().all(|v| (v * 1000.0 - (v * 1000.0).round()).abs() < 1e-6));
        }

        // 场景已恢复
        assert_eq!(world.joint_position(cabinet, JointId(0)).unwrap(), 0.0);
        assert_eq!(world.pose(robot.body()).unwrap(), Pose::from_xyz(1.0, 1.0, 1.0));

        // 每个采样点都能查回自身的关节值
        for s in mapping.samples() {
            assert_eq!(mapping.lookup(&s.conf, settings.lookup_tolerance), Some(s.value));
        }
    }

    #[test]
    fn test_workspace_limit_truncates_mapping() {
        let mut world = BoxWorld::new();
        let cabinet = cabinet(&mut world);
        // 只允许基座在 x ≥ 0.2 的范围内：门转过一定角度后把手离开可达范围
        let mut robot = FlyingGripper::spawn(&mut world, Pose::from_xyz(1.0, 1.0, 1.0), &GripperSpec::default())
            .unwrap()
            .with_workspace(Aabb::new(Point3::new(0.2, -2.0, -2.0), Point3::new(2.0, 2.0, 2.0)));
        let grasp = handle_grasp(cabinet);
        let (start, end) = endpoints(cabinet);
        let request = PullRequest {
            start: &start,
            end: &end,
            grasp: &grasp,
            obstacles: &[],
        };

        let strict = PullSettings::default();
        let result = PullMappingBuilder::new(&strict).build(&mut world, &mut robot, &request).unwrap();
        assert_eq!(result, Sampled::NotFound);

        let lenient = PullSettings {
            completeness: 0.1,
            ..PullSettings::default()
        };
        let mapping = PullMappingBuilder::new(&lenient)
            .build(&mut world, &mut robot, &request)
            .unwrap()
            .found()
            .unwrap();
        assert!(mapping.len() > 1 && mapping.len() < lenient.num_steps + 1);
        assert!(mapping.reached().unwrap() < end.value());
    }

    #[test]
    fn test_closing_mapping_is_decreasing() {
        let mut world = BoxWorld::new();
        let cabinet = cabinet(&mut world);
        world.set_joint_position(cabinet, JointId(0), FRAC_PI_2 * 0.9).unwrap();
        let mut robot = FlyingGripper::spawn(&mut world, Pose::from_xyz(1.0, 1.0, 1.0), &GripperSpec::default()).unwrap();
        let grasp = handle_grasp(cabinet);
        let (closed, open) = endpoints(cabinet);
        let settings = PullSettings::default();

        let mapping = PullMappingBuilder::new(&settings)
            .build(
                &mut world,
                &mut robot,
                &PullRequest {
                    start: &open,
                    end: &closed,
                    grasp: &grasp,
                    obstacles: &[],
                },
            )
            .unwrap()
            .found()
            .unwrap();

        let values: Vec<f64> = mapping.values().collect();
        assert_eq!(values.len(), settings.num_steps + 1);
        assert!(values.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(mapping.reached(), Some(0.0));
        assert_eq!(world.joint_position(cabinet, JointId(0)).unwrap(), FRAC_PI_2 * 0.9);
    }

    #[test]
    fn test_same_endpoints_not_found() {
        let mut world = BoxWorld::new();
        let cabinet = cabinet(&mut world);
        let mut robot = FlyingGripper::spawn(&mut world, Pose::identity(), &GripperSpec::default()).unwrap();
        let grasp = handle_grasp(cabinet);
        let (start, _) = endpoints(cabinet);
        let settings = PullSettings::default();
        let result = PullMappingBuilder::new(&settings)
            .build(
                &mut world,
                &mut robot,
                &PullRequest {
                    start: &start,
                    end: &start,
                    grasp: &grasp,
                    obstacles: &[],
                },
            )
            .unwrap();
        assert_eq!(result, Sampled::NotFound);
    }

    #[test]
    fn test_body_grasp_is_malformed() {
        let mut world = BoxWorld::new();
        let cabinet = cabinet(&mut world);
        let mut robot = FlyingGripper::spawn(&mut world, Pose::identity(), &GripperSpec::default()).unwrap();
        let mut grasp = handle_grasp(cabinet);
        grasp.target = GraspTarget::Body(cabinet);
        let (start, end) = endpoints(cabinet);
        let settings = PullSettings::default();
        let err = PullMappingBuilder::new(&settings)
            .build(
                &mut world,
                &mut robot,
                &PullRequest {
                    start: &start,
                    end: &end,
                    grasp: &grasp,
                    obstacles: &[],
                },
            )
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_lookup() {
        let mut mapping = PullMapping::new();
        mapping.push(vec![0.0, 0.0], 0.0);
        mapping.push(vec![0.1, 0.0], 0.5);
        mapping.push(vec![0.2, 0.0], 1.0);
        assert_eq!(mapping.lookup(&[0.099, 0.001], 3e-3), Some(0.5));
        assert_eq!(mapping.lookup(&[0.15, 0.0], 3e-3), None);
        assert_eq!(mapping.lookup(&[0.1], 3e-3), None);
        assert_eq!(mapping.lookup(&[0.15, 0.0], 0.1), Some(0.5));
        assert_eq!(mapping.lookup(&[PI, 0.0], 0.1), None);
    }
}
