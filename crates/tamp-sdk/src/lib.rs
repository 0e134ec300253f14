//! TAMP 几何可行性采样 SDK
//!
//! 为任务与运动规划提供连续几何见证：抓取变换、稳定放置位姿、容纳位姿、
//! 附着映射与拉门映射。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **数据层** (`types`): 位姿、包围盒、抓取、关节位置，无 I/O
//! - **场景层** (`scene`): 外部物理引擎的 trait 接口与内存盒世界实现
//! - **工具层** (`tools`): 抓取数据库持久化、TOML 配置
//! - **采样层** (`sampler`): 生成器、验证器、放置 / 容纳采样器、附着、拉门映射
//!
//! # 快速开始
//!
//! ```rust
//! use tamp_sdk::prelude::*;
//!
//! let mut world = BoxWorld::new();
//! let cube = world.add_box("cube", Vector3::new(0.025, 0.025, 0.025), Pose::identity());
//!
//! let mut session = SamplingSession::new(SamplerConfig::default()).unwrap();
//! match session.sample_grasps(&mut world, &GraspRequest::body(cube)).unwrap() {
//!     Sampled::Found(grasps) => println!("{} grasps", grasps.len()),
//!     Sampled::NotFound => println!("no grasp within budget"),
//! }
//! ```

pub use tamp_sampler as sampler;
pub use tamp_scene as scene;
pub use tamp_tools as tools;
pub use tamp_types as types;

pub mod prelude;

// 最常用的入口类型
pub use tamp_sampler::{Sampled, SamplerError, SamplingSession};
pub use tamp_scene::{Scene, SceneError};
pub use tamp_tools::{GraspDatabase, SamplerConfig};

use std::sync::Once;

/// 默认日志过滤指令（未设置 `RUST_LOG` 时生效）
pub const DEFAULT_LOG_DIRECTIVE: &str = "tamp=info";

static INIT_LOGGER: Once = Once::new();

/// 初始化日志
///
/// 安装 `tracing-subscriber` 的 fmt 输出，并把 `log` 记录转发到 `tracing`。
/// 可以重复调用，只有第一次生效；若其他代码已安装全局订阅器则保持不变。
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
        let _ = tracing_log::LogTracer::builder()
            .with_max_level(log::LevelFilter::Trace)
            .init();
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
