//! # TAMP Tools - 持久化与配置
//!
//! **依赖原则**: 只依赖 `tamp-types`，避免依赖 `tamp-sampler`
//!
//! ## 包含模块
//!
//! - `grasp_db` - 抓取数据库（JSON 文件格式 + 尺度换算规则）
//! - `config` - 采样器配置（TOML）

pub mod config;
pub mod grasp_db;

// 重新导出常用类型
pub use config::{
    BudgetSettings, ConfigError, ContainmentSettings, GraspSettings, PlacementSettings,
    PullSettings, SamplerConfig,
};
pub use grasp_db::{GraspDatabase, GraspDatabaseEntry, PutOutcome, scale_key};
