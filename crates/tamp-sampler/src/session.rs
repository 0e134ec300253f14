//! 采样会话
//!
//! 持有配置、抓取数据库、取消标记与附着管理器，是大多数调用方的入口。
//!
//! # 示例
//!
//! ```rust
//! use nalgebra::Vector3;
//! use tamp_sampler::{GraspRequest, SamplingSession};
//! use tamp_scene::BoxWorld;
//! use tamp_tools::SamplerConfig;
//! use tamp_types::Pose;
//!
//! let mut world = BoxWorld::new();
//! let cube = world.add_box("cube", Vector3::new(0.025, 0.025, 0.025), Pose::identity());
//!
//! let mut session = SamplingSession::new(SamplerConfig::default()).unwrap();
//! let grasps = session.sample_grasps(&mut world, &GraspRequest::body(cube)).unwrap();
//! assert!(grasps.is_found());
//! ```

use crate::attachment::AttachmentManager;
use crate::cancel::CancellationToken;
use crate::containment::{ContainmentRequest, ContainmentSampler};
use crate::error::{Sampled, SamplerError};
use crate::grasp::{GraspAssembler, GraspRequest};
use crate::placement::{PlacementRequest, PlacementSampler};
use crate::pull::{PullMapping, PullMappingBuilder, PullRequest};
use rand::Rng;
use tamp_scene::{ArticulatedRobot, InverseKinematics, Scene, SceneModel};
use tamp_tools::{GraspDatabase, SamplerConfig};
use tamp_types::{BodyId, Grasp, JointId, JointPosition, Pose};
use tracing::info;

/// 采样会话
#[derive(Debug)]
pub struct SamplingSession {
    config: SamplerConfig,
    database: GraspDatabase,
    cancel: CancellationToken,
    attachments: AttachmentManager,
}

impl SamplingSession {
    /// 校验配置并打开抓取数据库（配置了路径时从文件加载）
    pub fn new(config: SamplerConfig) -> Result<Self, SamplerError> {
        config.validate()?;
        let database = match &config.grasp_db_path {
            Some(path) => {
                let db = GraspDatabase::open(path)?;
                info!("opened grasp database {} with {} entries", path.display(), db.len());
                db
            },
            None => GraspDatabase::in_memory(),
        };
        Ok(Self {
            config,
            database,
            cancel: CancellationToken::new(),
            attachments: AttachmentManager::new(),
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn database(&self) -> &GraspDatabase {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut GraspDatabase {
        &mut self.database
    }

    /// 取消标记的克隆；对其调用 `cancel()` 会中止进行中的采样
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn attachments(&self) -> &AttachmentManager {
        &self.attachments
    }

    pub fn attachments_mut(&mut self) -> &mut AttachmentManager {
        &mut self.attachments
    }

    /// 把抓取数据库写回文件
    pub fn flush(&self) -> Result<(), SamplerError> {
        self.database.flush()?;
        Ok(())
    }

    /// 抓取采样（先查数据库）
    pub fn sample_grasps<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        request: &GraspRequest,
    ) -> Result<Sampled<Vec<Grasp>>, SamplerError> {
        GraspAssembler::new(&self.config.grasp, &self.config.gripper)
            .with_budget(self.config.budget.sampling())
            .with_cancellation(self.cancel.clone())
            .with_database(&mut self.database)
            .sample(scene, request)
    }

    /// 表面放置采样
    pub fn sample_placement<S: Scene + ?Sized, R: Rng + ?Sized>(
        &self,
        scene: &mut S,
        request: &PlacementRequest,
        rng: &mut R,
    ) -> Result<Sampled<Pose>, SamplerError> {
        PlacementSampler::new(&self.config.placement)
            .with_cancellation(self.cancel.clone())
            .sample(scene, request, rng)
    }

    /// 空间容纳采样
    pub fn sample_containment<S: Scene + ?Sized, R: Rng + ?Sized>(
        &self,
        scene: &mut S,
        request: &ContainmentRequest,
        rng: &mut R,
    ) -> Result<Sampled<Pose>, SamplerError> {
        ContainmentSampler::new(&self.config.containment, &self.config.placement)
            .with_cancellation(self.cancel.clone())
            .sample(scene, request, rng)
    }

    /// 构建拉门 / 拉抽屉映射
    pub fn build_pull_mapping<S, R>(
        &self,
        scene: &mut S,
        robot: &mut R,
        request: &PullRequest<'_>,
    ) -> Result<Sampled<PullMapping>, SamplerError>
    where
        S: Scene,
        R: ArticulatedRobot + InverseKinematics + ?Sized,
    {
        PullMappingBuilder::new(&self.config.pull)
            .with_ik_budget(self.config.budget.ik())
            .with_cancellation(self.cancel.clone())
            .build(scene, robot, request)
    }

    /// 关节当前位置
    pub fn joint_position<S: SceneModel + ?Sized>(
        &self,
        scene: &S,
        body: BodyId,
        joint: JointId,
    ) -> Result<JointPosition, SamplerError> {
        let value = scene.joint_position(body, joint)?;
        let limits = scene.joint_limits(body, joint)?;
        Ok(JointPosition::new(body, joint, value, limits))
    }

    /// 打开关节的目标位置
    pub fn open_positions<S: SceneModel + ?Sized, R: Rng + ?Sized>(
        &self,
        scene: &S,
        body: BodyId,
        joint: JointId,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<JointPosition>, SamplerError> {
        let current = self.joint_position(scene, body, joint)?;
        let kind = scene.joint_kind(body, joint)?;
        Ok(current.sample_open_positions(kind, n, rng))
    }
}
