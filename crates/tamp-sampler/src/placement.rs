//! 表面放置采样
//!
//! 在支撑面 AABB（按物体半尺寸内缩）内均匀采样 (x, y)，
//! 物体底面贴合参考高度。拒绝条件：二维投影超出支撑面，或与障碍物碰撞。
//!
//! 高表面（高度超过物体高度的 `tall_surface_ratio` 倍或超过 `tall_surface_height`）
//! 的参考高度在 `[lower + h/4, lower + h/3]` 内采样，用于柜子、书架等内部隔板。

use crate::cancel::CancellationToken;
use crate::error::{Sampled, SamplerError};
use crate::scoped::ScopedScene;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;
use std::f64::consts::PI;
use tamp_scene::{Scene, SceneError, SceneModel};
use tamp_tools::PlacementSettings;
use tamp_types::{Aabb, BodyId, LinkId, Pose};
use tracing::{debug, info};

/// 物体底面与支撑面顶部的允许高度差
pub const RESTING_EPSILON: f64 = 1e-2;

/// 放置请求
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub body: BodyId,
    pub surface: BodyId,
    pub surface_link: Option<LinkId>,
    pub obstacles: Vec<BodyId>,
}

impl PlacementRequest {
    pub fn new(body: BodyId, surface: BodyId) -> Self {
        Self {
            body,
            surface,
            surface_link: None,
            obstacles: Vec::new(),
        }
    }

    pub fn on_link(mut self, link: LinkId) -> Self {
        self.surface_link = Some(link);
        self
    }

    pub fn with_obstacles(mut self, obstacles: Vec<BodyId>) -> Self {
        self.obstacles = obstacles;
        self
    }
}

/// 按名称匹配固定朝向，否则在 [0, π) 内均匀采样
pub(crate) fn sample_yaw<S: SceneModel + ?Sized, R: Rng + ?Sized>(
    scene: &S,
    body: BodyId,
    settings: &PlacementSettings,
    rng: &mut R,
) -> Result<f64, SceneError> {
    let name = scene.body_name(body)?.to_lowercase();
    let fixed = settings
        .category_yaws
        .iter()
        .find(|(category, _)| name.contains(category.to_lowercase().as_str()))
        .map(|(_, yaw)| *yaw);
    Ok(fixed.unwrap_or_else(|| rng.gen_range(0.0..PI)))
}

/// 以 `yaw` 摆放时物体的 AABB 半尺寸与"原点到底面"的高度
pub(crate) fn oriented_extents<S: SceneModel + ?Sized>(
    scene: &mut ScopedScene<'_, S>,
    body: BodyId,
    yaw: f64,
) -> Result<(Vector3<f64>, f64), SceneError> {
    let current = scene.pose(body)?;
    let oriented = Pose::new(current.position, UnitQuaternion::from_euler_angles(0.0, 0.0, yaw));
    scene.set_pose_scoped(body, &oriented)?;
    let aabb = scene.aabb(body, None)?;
    Ok((aabb.half_extents(), oriented.position.z - aabb.lower.z))
}

/// 表面放置采样器
#[derive(Debug, Clone)]
pub struct PlacementSampler<'a> {
    settings: &'a PlacementSettings,
    cancel: CancellationToken,
}

impl<'a> PlacementSampler<'a> {
    pub fn new(settings: &'a PlacementSettings) -> Self {
        Self {
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_tall(&self, surface_height: f64, object_height: f64) -> bool {
        surface_height > self.settings.tall_surface_ratio * object_height
            || surface_height > self.settings.tall_surface_height
    }

    /// 采样一个放置位姿
    ///
    /// 场景在返回前恢复原状，调用方自行决定是否 `set_pose`。
    pub fn sample<S: Scene + ?Sized, R: Rng + ?Sized>(
        &self,
        scene: &mut S,
        request: &PlacementRequest,
        rng: &mut R,
    ) -> Result<Sampled<Pose>, SamplerError> {
        let surface = scene.aabb(request.surface, request.surface_link)?;
        if !surface.is_finite() {
            return Err(SamplerError::MalformedInput(format!(
                "non-finite surface bounds for {}",
                request.surface
            )));
        }
        let mut scoped = ScopedScene::new(scene);

        for trial in 0..self.settings.num_trials {
            if self.cancel.is_cancelled() {
                return Err(SamplerError::Cancelled);
            }

            let yaw = sample_yaw(&*scoped, request.body, self.settings, rng)?;
            let (half, bottom_offset) = oriented_extents(&mut scoped, request.body, yaw)?;
            let object_height = half.z * 2.0;
            let surface_height = surface.extent().z;

            let reference_z = if self.is_tall(surface_height, object_height) {
                let low = surface.lower.z + surface_height / 4.0;
                let high = surface.lower.z + surface_height / 3.0;
                rng.gen_range(low..=high)
            } else {
                surface.upper.z
            };
            let z = reference_z + bottom_offset;
            let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, yaw);

            // 物体比支撑面大：居中放置，只尝试一次
            let oversized = surface.area_2d() < half.x * half.y * 4.0;
            let region = surface.inset(&Vector3::new(half.x, half.y, 0.0));
            let Some(region) = region.filter(|_| !oversized) else {
                let center = surface.center();
                let pose = Pose::new(Point3::new(center.x, center.y, z), rotation);
                scoped.set_pose_scoped(request.body, &pose)?;
                if scoped.collides_with_any(request.body, &request.obstacles)? {
                    info!("placement of {} on {}: centered pose collides", request.body, request.surface);
                    return Ok(Sampled::NotFound);
                }
                info!("placement of {} on {}: object larger than surface, centered", request.body, request.surface);
                return Ok(Sampled::Found(pose));
            };

            let x = sample_between(rng, region.lower.x, region.upper.x);
            let y = sample_between(rng, region.lower.y, region.upper.y);
            let pose = Pose::new(Point3::new(x, y, z), rotation);
            scoped.set_pose_scoped(request.body, &pose)?;

            let footprint = scoped.aabb(request.body, None)?;
            if !surface.contains_2d(&footprint) {
                debug!("placement trial {}: footprint outside surface", trial);
                continue;
            }
            if scoped.collides_with_any(request.body, &request.obstacles)? {
                debug!("placement trial {}: collision", trial);
                continue;
            }
            info!(
                "placement of {} on {} found after {} trials",
                request.body,
                request.surface,
                trial + 1
            );
            return Ok(Sampled::Found(pose));
        }

        info!(
            "placement of {} on {}: no pose within {} trials",
            request.body, request.surface, self.settings.num_trials
        );
        Ok(Sampled::NotFound)
    }
}

fn sample_between<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high > low { rng.gen_range(low..=high) } else { low }
}

/// 物体是否放在支撑面上：二维投影被包含，且底面与顶面高度差不超过 `RESTING_EPSILON`
pub fn is_placed_on<S: SceneModel + ?Sized>(
    scene: &S,
    body: BodyId,
    surface: BodyId,
    surface_link: Option<LinkId>,
) -> Result<bool, SceneError> {
    let object = scene.aabb(body, None)?;
    let support = scene.aabb(surface, surface_link)?;
    Ok(resting_on(&object, &support))
}

fn resting_on(object: &Aabb, support: &Aabb) -> bool {
    support.contains_2d(object) && (object.lower.z - support.upper.z).abs() <= RESTING_EPSILON
}
