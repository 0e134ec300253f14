//! 空间容纳采样
//!
//! 在区域 AABB（按物体半尺寸内缩，再抬高 `lift`）内均匀采样；
//! 物体 AABB 完全落在区域内且与区域物体、障碍物都无碰撞时接受，
//! 随后按 `settle_intervals` 逐级下沉，直到再下沉一步就会越界或碰撞。

use crate::cancel::CancellationToken;
use crate::error::{Sampled, SamplerError};
use crate::placement::{oriented_extents, sample_yaw};
use crate::scoped::ScopedScene;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;
use tamp_scene::{Scene, SceneError, SceneModel};
use tamp_tools::{ContainmentSettings, PlacementSettings};
use tamp_types::{Aabb, BodyId, LinkId, Pose};
use std::f64::consts::PI;
use tracing::{debug, info};

/// 预检时尝试的 yaw 个数
const YAW_GRID: usize = 36;

/// 容纳请求
#[derive(Debug, Clone, PartialEq)]
pub struct ContainmentRequest {
    pub body: BodyId,
    pub region: BodyId,
    pub region_link: Option<LinkId>,
    pub obstacles: Vec<BodyId>,
}

impl ContainmentRequest {
    pub fn new(body: BodyId, region: BodyId) -> Self {
        Self {
            body,
            region,
            region_link: None,
            obstacles: Vec::new(),
        }
    }

    pub fn in_link(mut self, link: LinkId) -> Self {
        self.region_link = Some(link);
        self
    }

    pub fn with_obstacles(mut self, obstacles: Vec<BodyId>) -> Self {
        self.obstacles = obstacles;
        self
    }
}

/// 容纳采样器
#[derive(Debug, Clone)]
pub struct ContainmentSampler<'a> {
    settings: &'a ContainmentSettings,
    /// 朝向规则与表面放置共用
    placement: &'a PlacementSettings,
    cancel: CancellationToken,
}

impl<'a> ContainmentSampler<'a> {
    pub fn new(settings: &'a ContainmentSettings, placement: &'a PlacementSettings) -> Self {
        Self {
            settings,
            placement,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 采样一个容纳位姿（场景在返回前恢复）
    pub fn sample<S: Scene + ?Sized, R: Rng + ?Sized>(
        &self,
        scene: &mut S,
        request: &ContainmentRequest,
        rng: &mut R,
    ) -> Result<Sampled<Pose>, SamplerError> {
        let region = scene.aabb(request.region, request.region_link)?;
        if !region.is_finite() {
            return Err(SamplerError::MalformedInput(format!(
                "non-finite region bounds for {}",
                request.region
            )));
        }
        let mut scoped = ScopedScene::new(scene);

        if !self.fits_some_yaw(&mut scoped, request.body, &region)? {
            info!(
                "containment of {} in {}: object larger than region",
                request.body, request.region
            );
            return Ok(Sampled::NotFound);
        }

        for attempt in 0..self.settings.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(SamplerError::Cancelled);
            }

            let yaw = sample_yaw(&*scoped, request.body, self.placement, rng)?;
            let (half, bottom_offset) = oriented_extents(&mut scoped, request.body, yaw)?;
            let Some(inner) = region.inset(&half) else {
                debug!("containment attempt {}: yaw {:.3} does not fit", attempt, yaw);
                continue;
            };

            // 采样的是 AABB 中心，位姿原点相对中心的高度偏移为 bottom_offset - half.z
            let x = rng.gen_range(inner.lower.x..=inner.upper.x);
            let y = rng.gen_range(inner.lower.y..=inner.upper.y);
            let z = rng.gen_range(inner.lower.z..=inner.upper.z) + self.settings.lift + bottom_offset - half.z;
            let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, yaw);
            let mut pose = Pose::new(Point3::new(x, y, z), rotation);

            if !self.fits(&mut scoped, request, &region, &pose)? {
                debug!("containment attempt {}: rejected", attempt);
                continue;
            }

            for &interval in &self.settings.settle_intervals {
                loop {
                    let lowered = pose.with_position(pose.position - Vector3::new(0.0, 0.0, interval));
                    if !self.fits(&mut scoped, request, &region, &lowered)? {
                        break;
                    }
                    pose = lowered;
                }
            }

            info!(
                "containment of {} in {} found after {} attempts",
                request.body,
                request.region,
                attempt + 1
            );
            return Ok(Sampled::Found(pose));
        }

        info!(
            "containment of {} in {}: no pose within {} attempts",
            request.body, request.region, self.settings.max_attempts
        );
        Ok(Sampled::NotFound)
    }

    /// 在 [0, π) 的 yaw 网格上检查物体包围盒是否有可能放进区域
    fn fits_some_yaw<S: Scene + ?Sized>(
        &self,
        scene: &mut ScopedScene<'_, S>,
        body: BodyId,
        region: &Aabb,
    ) -> Result<bool, SceneError> {
        for i in 0..YAW_GRID {
            let yaw = PI * i as f64 / YAW_GRID as f64;
            let (half, _) = oriented_extents(scene, body, yaw)?;
            if region.inset(&half).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 在 `pose` 处：被区域包含，且不与区域物体或障碍物碰撞
    fn fits<S: Scene + ?Sized>(
        &self,
        scene: &mut ScopedScene<'_, S>,
        request: &ContainmentRequest,
        region: &Aabb,
        pose: &Pose,
    ) -> Result<bool, SceneError> {
        scene.set_pose_scoped(request.body, pose)?;
        if !region.contains(&scene.aabb(request.body, None)?) {
            return Ok(false);
        }
        if scene.pairwise_collision(request.region, request.body)? {
            return Ok(false);
        }
        Ok(!scene.collides_with_any(request.body, &request.obstacles)?)
    }
}

/// 物体 AABB 是否完全位于区域 AABB 内
pub fn is_contained<S: SceneModel + ?Sized>(
    scene: &S,
    body: BodyId,
    region: BodyId,
    region_link: Option<LinkId>,
) -> Result<bool, SceneError> {
    let object = scene.aabb(body, None)?;
    Ok(scene.aabb(region, region_link)?.contains(&object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tamp_scene::{BodyBuilder, BoxShape, BoxWorld, CollisionOracle};

    /// 无顶盖的箱子：底板 + 四面墙，内部 (2ix) × (2iy) × 0.3
    fn open_box(world: &mut BoxWorld, name: &str, ix: f64, iy: f64) -> BodyId {
        let wall = 0.01;
        let builder = BodyBuilder::new(name)
            .base_shape(BoxShape::cuboid(Vector3::new(ix + wall, iy + wall, wall / 2.0)))
            .fixed_link(
                LinkId::BASE,
                Pose::from_xyz(ix + wall / 2.0, 0.0, 0.155),
                Some(BoxShape::cuboid(Vector3::new(wall / 2.0, iy + wall, 0.15))),
            )
            .fixed_link(
                LinkId::BASE,
                Pose::from_xyz(-(ix + wall / 2.0), 0.0, 0.155),
                Some(BoxShape::cuboid(Vector3::new(wall / 2.0, iy + wall, 0.15))),
            )
            .fixed_link(
                LinkId::BASE,
                Pose::from_xyz(0.0, iy + wall / 2.0, 0.155),
                Some(BoxShape::cuboid(Vector3::new(ix + wall, wall / 2.0, 0.15))),
            )
            .fixed_link(
                LinkId::BASE,
                Pose::from_xyz(0.0, -(iy + wall / 2.0), 0.155),
                Some(BoxShape::cuboid(Vector3::new(ix + wall, wall / 2.0, 0.15))),
            );
        world.add_body(builder).unwrap()
    }

    /// 内部 0.4 × 0.4 × 0.3
    fn bin(world: &mut BoxWorld) -> BodyId {
        open_box(world, "bin", 0.2, 0.2)
    }

    #[test]
    fn test_contained_and_settled() {
        let mut world = BoxWorld::new();
        let region = bin(&mut world);
        let apple = world.add_box("apple", Vector3::new(0.04, 0.04, 0.04), Pose::from_xyz(3.0, 0.0, 0.0));
        let containment = ContainmentSettings::default();
        let placement = PlacementSettings::default();
        let mut rng = StdRng::seed_from_u64(42);

        let pose = ContainmentSampler::new(&containment, &placement)
            .sample(&mut world, &ContainmentRequest::new(apple, region), &mut rng)
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(world.pose(apple).unwrap(), Pose::from_xyz(3.0, 0.0, 0.0));

        world.set_pose(apple, &pose).unwrap();
        assert!(is_contained(&world, apple, region, None).unwrap());
        assert!(!world.pairwise_collision(region, apple).unwrap());
        // 下沉到底板附近（最后一级步长 0.01）
        let bottom = world.aabb(apple, None).unwrap().lower.z;
        assert!((0.005 - 1e-5..0.015 + 1e-5).contains(&bottom), "bottom = {bottom}");
    }

    #[test]
    fn test_too_small_region() {
        let mut world = BoxWorld::new();
        let region = bin(&mut world);
        let crate_box = world.add_box("crate", Vector3::new(0.3, 0.3, 0.1), Pose::from_xyz(3.0, 0.0, 0.0));
        let containment = ContainmentSettings::default();
        let placement = PlacementSettings::default();
        let mut rng = StdRng::seed_from_u64(0);
        let result = ContainmentSampler::new(&containment, &placement)
            .sample(&mut world, &ContainmentRequest::new(crate_box, region), &mut rng)
            .unwrap();
        assert_eq!(result, Sampled::NotFound);
    }

    #[test]
    fn test_obstacle_filling_region() {
        let mut world = BoxWorld::new();
        let region = bin(&mut world);
        let filler = world.add_box("filler", Vector3::new(0.2, 0.2, 0.15), Pose::from_xyz(0.0, 0.0, 0.16));
        let apple = world.add_box("apple", Vector3::new(0.04, 0.04, 0.04), Pose::from_xyz(3.0, 0.0, 0.0));
        let containment = ContainmentSettings::default();
        let placement = PlacementSettings::default();
        let mut rng = StdRng::seed_from_u64(9);
        let result = ContainmentSampler::new(&containment, &placement)
            .sample(
                &mut world,
                &ContainmentRequest::new(apple, region).with_obstacles(vec![filler]),
                &mut rng,
            )
            .unwrap();
        assert_eq!(result, Sampled::NotFound);
    }

    #[test]
    fn test_elongated_object_uses_attempt_budget() {
        // 0.4 × 0.1 的槽只在 yaw 接近 0 或 π 时放得下 0.3 长的棍子
        let mut world = BoxWorld::new();
        let trough = open_box(&mut world, "trough", 0.2, 0.05);
        let stick = world.add_box("stick", Vector3::new(0.15, 0.02, 0.02), Pose::from_xyz(3.0, 0.0, 0.0));
        let containment = ContainmentSettings {
            max_attempts: 300,
            ..ContainmentSettings::default()
        };
        let placement = PlacementSettings::default();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let pose = ContainmentSampler::new(&containment, &placement)
                .sample(&mut world, &ContainmentRequest::new(stick, trough), &mut rng)
                .unwrap()
                .found()
                .unwrap_or_else(|| panic!("seed {seed}: no pose"));
            world.set_pose(stick, &pose).unwrap();
            assert!(is_contained(&world, stick, trough, None).unwrap());
            assert!(!world.pairwise_collision(trough, stick).unwrap());
            world.set_pose(stick, &Pose::from_xyz(3.0, 0.0, 0.0)).unwrap();
        }
    }

    #[test]
    fn test_obstacle_next_to_free_space() {
        // 障碍物占据左半边，结果必须落在右半边且不与其碰撞
        let mut world = BoxWorld::new();
        let region = bin(&mut world);
        let block = world.add_box("block", Vector3::new(0.1, 0.2, 0.15), Pose::from_xyz(-0.1, 0.0, 0.155));
        let apple = world.add_box("apple", Vector3::new(0.04, 0.04, 0.04), Pose::from_xyz(3.0, 0.0, 0.0));
        let containment = ContainmentSettings {
            max_attempts: 200,
            ..ContainmentSettings::default()
        };
        let placement = PlacementSettings::default();
        let mut rng = StdRng::seed_from_u64(5);

        let pose = ContainmentSampler::new(&containment, &placement)
            .sample(
                &mut world,
                &ContainmentRequest::new(apple, region).with_obstacles(vec![block]),
                &mut rng,
            )
            .unwrap()
            .found()
            .unwrap();
        world.set_pose(apple, &pose).unwrap();
        assert!(pose.position.x > 0.0);
        assert!(!world.pairwise_collision(block, apple).unwrap());
        assert!(is_contained(&world, apple, region, None).unwrap());
    }
}
