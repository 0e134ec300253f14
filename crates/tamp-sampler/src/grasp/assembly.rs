//! 抓取组装与重试循环
//!
//! 1. 抓取数据库中有 (实例, 尺度) 的非空记录 → 直接返回缓存
//! 2. 否则逐个验证生成器的候选（可选地加上沿最长维度的滑移变体）
//! 3. 通过的抓取按顺序累积（不去重），最后量化写回数据库
//!
//! 每个顶层候选之前检查一次取消标记，并消耗一次预算。

use super::generator::GraspFamilyGenerator;
use super::validator::{GraspValidator, ValidationRequest};
use crate::cancel::CancellationToken;
use crate::error::{Sampled, SamplerError};
use nalgebra::Vector3;
use tamp_scene::Scene;
use tamp_tools::{GraspDatabase, GraspSettings};
use tamp_types::{
    BodyId, Budget, Grasp, GraspKind, GraspTarget, GripperDirection, GripperSpec, JointId, LinkId, Pose,
};
use tracing::{debug, info, warn};

/// 抓取请求
#[derive(Debug, Clone, PartialEq)]
pub struct GraspRequest {
    pub target: GraspTarget,
    pub kind: GraspKind,
    /// 数据库键；为空时不读写数据库
    pub instance_id: Option<String>,
    pub name: Option<String>,
    pub scale: Option<f64>,
    pub obstacles: Vec<BodyId>,
    pub handle_filter: bool,
    pub length_variants: bool,
    pub retain: bool,
}

impl GraspRequest {
    /// 抓取整个物体
    pub fn body(body: BodyId) -> Self {
        Self {
            target: GraspTarget::Body(body),
            kind: GraspKind::Hand,
            instance_id: None,
            name: None,
            scale: None,
            obstacles: Vec::new(),
            handle_filter: false,
            length_variants: false,
            retain: false,
        }
    }

    /// 抓取关节的把手连杆（启用把手过滤）
    pub fn handle(body: BodyId, joint: JointId, link: LinkId) -> Self {
        Self {
            target: GraspTarget::Joint { body, joint, link },
            kind: GraspKind::Handle,
            handle_filter: true,
            ..Self::body(body)
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>, scale: Option<f64>) -> Self {
        self.instance_id = Some(instance_id.into());
        self.scale = scale;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_obstacles(mut self, obstacles: Vec<BodyId>) -> Self {
        self.obstacles = obstacles;
        self
    }

    pub fn with_length_variants(mut self, enabled: bool) -> Self {
        self.length_variants = enabled;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// 抓取组装器
pub struct GraspAssembler<'a> {
    settings: &'a GraspSettings,
    validator: GraspValidator,
    budget: Budget,
    cancel: CancellationToken,
    database: Option<&'a mut GraspDatabase>,
}

impl<'a> GraspAssembler<'a> {
    pub fn new(settings: &'a GraspSettings, spec: &GripperSpec) -> Self {
        Self {
            settings,
            validator: GraspValidator::new(spec.clone(), settings.min_contact_points, settings.closure_steps),
            budget: Budget::default(),
            cancel: CancellationToken::new(),
            database: None,
        }
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_database(mut self, database: &'a mut GraspDatabase) -> Self {
        self.database = Some(database);
        self
    }

    fn make_grasp(&self, request: &GraspRequest, value: Pose, width: Option<f64>) -> Result<Grasp, SamplerError> {
        let approach = value.translated_local(&Vector3::new(0.0, 0.0, -self.settings.approach_distance));
        let mut grasp = Grasp::new(request.kind, request.target, value, approach, value.inverse());
        if let Some(width) = width {
            grasp.set_width(width, self.validator.spec().max_aperture)?;
        }
        Ok(grasp)
    }

    /// 采样抓取
    ///
    /// 预算内没有任何候选通过时返回 `NotFound`。
    pub fn sample<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        request: &GraspRequest,
    ) -> Result<Sampled<Vec<Grasp>>, SamplerError> {
        let length_variants = request.length_variants || self.settings.length_variants;
        let handle_filter = request.handle_filter || self.settings.handle_filter;
        let use_database = self.settings.use_database && request.instance_id.is_some();

        if use_database {
            if let (Some(db), Some(id)) = (self.database.as_deref(), request.instance_id.as_deref()) {
                if let Some(cached) = db.get(id, request.scale, length_variants) {
                    info!("grasp database hit for {}: {} grasps", id, cached.len());
                    let grasps = cached
                        .into_iter()
                        .map(|value| self.make_grasp(request, value, None))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Sampled::Found(grasps));
                }
            }
        }

        let body = request.target.body();
        let (frame_pose, fitted) = match request.target.link() {
            Some(link) => (scene.link_pose(body, link)?, scene.fitted_box(body, Some(link))?),
            None => (scene.pose(body)?, scene.fitted_box(body, None)?),
        };
        if fitted.is_degenerate() || !frame_pose.is_finite() {
            return Err(SamplerError::MalformedInput(format!(
                "degenerate bounding box or pose for {body}"
            )));
        }

        let generator = GraspFamilyGenerator::new(fitted, self.settings.grasp_depth, handle_filter);
        let shape = generator.clone();
        let mut tracker = self.budget.start();
        let mut accepted: Vec<Grasp> = Vec::new();
        let mut tested = 0usize;

        let failure = 'search: {
            for candidate in generator {
                if self.cancel.is_cancelled() {
                    info!("grasp sampling for {} cancelled after {} candidates", body, tested);
                    break 'search Some(SamplerError::Cancelled);
                }
                if !tracker.tick() {
                    info!("grasp sampling budget exhausted after {} candidates", tested);
                    break;
                }

                let mut variants = vec![candidate.value];
                if length_variants && candidate.spans_longest {
                    variants.extend(shape.length_variants(&candidate));
                }

                for variant in variants {
                    tested += 1;
                    let validation = ValidationRequest {
                        candidate: &variant,
                        object_pose: &frame_pose,
                        target: request.target,
                        obstacles: &request.obstacles,
                        retain: request.retain,
                    };
                    match self.validator.validate(scene, &validation) {
                        Ok(verdict) if verdict.accepted => {
                            if let Some(direction) = GripperDirection::classify(&frame_pose.compose(&variant), 0.01) {
                                debug!("candidate accepted: {}", direction);
                            }
                            let grasp = match self.make_grasp(request, variant, verdict.width) {
                                Ok(grasp) => grasp,
                                Err(e) => {
                                    if let Some(proxy) = verdict.retained_proxy {
                                        release_proxy(scene, proxy);
                                    }
                                    break 'search Some(e);
                                },
                            };
                            accepted.push(match verdict.retained_proxy {
                                Some(proxy) => grasp.with_proxy(proxy),
                                None => grasp,
                            });
                        },
                        Ok(verdict) => debug!("candidate rejected: {:?}", verdict.report),
                        Err(e) if e.is_malformed() => warn!("skipping malformed grasp candidate: {}", e),
                        Err(e) => break 'search Some(e),
                    }
                }
            }
            None
        };

        if let Some(e) = failure {
            release_proxies(scene, &accepted);
            return Err(e);
        }

        info!(
            "grasp sampling for {}: {} of {} candidates accepted in {:?}",
            body,
            accepted.len(),
            tested,
            tracker.elapsed()
        );

        if accepted.is_empty() {
            return Ok(Sampled::NotFound);
        }

        if use_database {
            if let (Some(db), Some(id)) = (self.database.as_deref_mut(), request.instance_id.as_deref()) {
                let values: Vec<Pose> = accepted.iter().map(|g| g.value).collect();
                match db.put(id, request.scale, &values, request.name.as_deref(), length_variants) {
                    Ok(outcome) => debug!("grasp database write for {}: {:?}", id, outcome),
                    Err(e) => {
                        release_proxies(scene, &accepted);
                        return Err(e.into());
                    },
                }
            }
        }

        Ok(Sampled::Found(accepted))
    }
}

fn release_proxy<S: Scene + ?Sized>(scene: &mut S, proxy: BodyId) {
    if let Err(e) = scene.remove_body(proxy) {
        warn!("Failed to remove retained gripper proxy {}: {}", proxy, e);
    }
}

/// 调用失败时移除已保留的代理，调用方拿不到它们
fn release_proxies<S: Scene + ?Sized>(scene: &mut S, grasps: &[Grasp]) {
    for proxy in grasps.iter().filter_map(Grasp::proxy) {
        release_proxy(scene, proxy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamp_scene::{BoxWorld, GripperProxies, SceneModel};
    use tamp_tools::SamplerConfig;

    fn cube_world() -> (BoxWorld, BodyId) {
        let mut world = BoxWorld::new();
        let cube = world.add_box("cube", Vector3::new(0.025, 0.025, 0.025), Pose::identity());
        (world, cube)
    }

    #[test]
    fn test_cube_grasps() {
        let (mut world, cube) = cube_world();
        let config = SamplerConfig::default();
        let mut assembler = GraspAssembler::new(&config.grasp, &config.gripper);
        let grasps = assembler
            .sample(&mut world, &GraspRequest::body(cube))
            .unwrap()
            .found()
            .unwrap();
        // 从下方接近的 4 个候选被"朝上"检查拒绝
        assert_eq!(grasps.len(), 20);
        assert!(grasps.iter().all(|g| g.width().is_some()));
        assert!(grasps.iter().all(|g| g.value.position.z > -0.05));
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_database_roundtrip_skips_generation() {
        let (mut world, cube) = cube_world();
        let config = SamplerConfig::default();
        let mut db = GraspDatabase::in_memory();
        let request = GraspRequest::body(cube).with_instance("cube_1", Some(1.0)).with_name("cube");
        let first = GraspAssembler::new(&config.grasp, &config.gripper)
            .with_database(&mut db)
            .sample(&mut world, &request)
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(db.get("cube_1", Some(1.0), false).unwrap().len(), first.len());

        // 即使物体已被移除，缓存命中也不访问场景
        let empty = &mut BoxWorld::new();
        let cached = GraspAssembler::new(&config.grasp, &config.gripper)
            .with_database(&mut db)
            .sample(empty, &request)
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(cached.len(), first.len());
        assert!(cached.iter().all(|g| g.width().is_none()));
    }

    #[test]
    fn test_cancelled() {
        let (mut world, cube) = cube_world();
        let config = SamplerConfig::default();
        let token = CancellationToken::new();
        token.cancel();
        let err = GraspAssembler::new(&config.grasp, &config.gripper)
            .with_cancellation(token)
            .sample(&mut world, &GraspRequest::body(cube))
            .unwrap_err();
        assert!(matches!(err, SamplerError::Cancelled));
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_budget_limits_candidates() {
        let (mut world, cube) = cube_world();
        let config = SamplerConfig::default();
        let grasps = GraspAssembler::new(&config.grasp, &config.gripper)
            .with_budget(Budget::iterations(4))
            .sample(&mut world, &GraspRequest::body(cube))
            .unwrap()
            .found()
            .unwrap();
        // 只检查了 +x 面的 4 个腕部角度
        assert_eq!(grasps.len(), 4);

        let none = GraspAssembler::new(&config.grasp, &config.gripper)
            .with_budget(Budget::iterations(0))
            .sample(&mut world, &GraspRequest::body(cube))
            .unwrap();
        assert_eq!(none, Sampled::NotFound);
    }

    #[test]
    fn test_length_variants_slide() {
        let mut world = BoxWorld::new();
        let bar = world.add_box("bar", Vector3::new(0.1, 0.02, 0.02), Pose::identity());
        let config = SamplerConfig::default();
        let nominal = GraspAssembler::new(&config.grasp, &config.gripper)
            .sample(&mut world, &GraspRequest::body(bar))
            .unwrap()
            .found()
            .unwrap();
        let with_variants = GraspAssembler::new(&config.grasp, &config.gripper)
            .sample(&mut world, &GraspRequest::body(bar).with_length_variants(true))
            .unwrap()
            .found()
            .unwrap();
        assert!(with_variants.len() > nominal.len());
        assert!(with_variants.iter().any(|g| (g.value.position.x - 0.2 / 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_retained_proxies_returned_with_grasps() {
        let (mut world, cube) = cube_world();
        let config = SamplerConfig::default();
        let grasps = GraspAssembler::new(&config.grasp, &config.gripper)
            .sample(&mut world, &GraspRequest::body(cube).with_retain(true))
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(grasps.len(), 20);
        // 被拒绝的 4 个候选不留代理
        assert_eq!(world.body_count(), 1 + grasps.len());
        for g in &grasps {
            world.remove_body(g.proxy().unwrap()).unwrap();
        }
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_missing_body_is_malformed() {
        let (mut world, _) = cube_world();
        let config = SamplerConfig::default();
        let err = GraspAssembler::new(&config.grasp, &config.gripper)
            .sample(&mut world, &GraspRequest::body(BodyId(42)))
            .unwrap_err();
        assert!(err.is_malformed());
    }
}
