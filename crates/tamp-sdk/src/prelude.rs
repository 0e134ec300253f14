//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use tamp_sdk::prelude::*;
//! ```

// 几何（nalgebra 类型也一并导出，免去调用方的直接依赖）
pub use tamp_types::nalgebra::{Point3, UnitQuaternion, Vector3};
pub use tamp_types::{
    Aabb, BodyId, Budget, FittedBox, Grasp, GraspKind, GraspTarget, GripperSpec, JointCategory,
    JointExtent, JointId, JointKind, JointLimits, JointPosition, LinkId, Pose,
};

// 场景接口
pub use tamp_scene::{
    ArticulatedRobot, BodyBuilder, BoxShape, BoxWorld, CollisionOracle, ConfigurationSource,
    FlyingGripper, GripperProxies, InverseKinematics, Scene, SceneError, SceneModel,
};

// 配置与数据库
pub use tamp_tools::{GraspDatabase, SamplerConfig};

// 采样器
pub use tamp_sampler::{
    AttachmentChild, AttachmentManager, CancellationToken, ContainmentRequest, Coupling,
    GraspRequest, PlacementRequest, PullMapping, PullRequest, Sampled, SamplerError,
    SamplingSession, is_contained, is_placed_on,
};
