//! 几何可行性采样
//!
//! 为符号规划产生的抽象动作（抓取、放置、开门）提供连续的几何见证：
//! - 抓取变换（生成 → 三项验证 → 数据库缓存）
//! - 表面放置与空间容纳位姿
//! - 附着关系（刚性 / 关节耦合）
//! - 拉门 / 拉抽屉的构型映射
//!
//! 所有采样都是有界的：在预算内找到见证返回 `Sampled::Found`，否则返回 `Sampled::NotFound`。
//! 场景上的临时修改由作用域守卫在任何退出路径上恢复。
//!
//! # 入口
//!
//! 大多数调用方只需要 [`SamplingSession`]；各采样器也可以单独构造。

pub mod attachment;
pub mod cancel;
pub mod containment;
pub mod error;
pub mod grasp;
pub mod placement;
pub mod pull;
pub mod scoped;
pub mod session;

pub use attachment::{Attachment, AttachmentChild, AttachmentKind, AttachmentManager, Coupling};
pub use cancel::CancellationToken;
pub use containment::{ContainmentRequest, ContainmentSampler, is_contained};
pub use error::{Sampled, SamplerError};
pub use grasp::{
    CriterionReport, Face, GraspAssembler, GraspCandidate, GraspFamilyGenerator, GraspRequest,
    GraspValidator, GraspVerdict, ValidationRequest, WRIST_ANGLES,
};
pub use placement::{PlacementRequest, PlacementSampler, RESTING_EPSILON, is_placed_on};
pub use pull::{PullMapping, PullMappingBuilder, PullRequest, PullSample};
pub use scoped::{GripperProxy, ScopedScene};
pub use session::SamplingSession;
