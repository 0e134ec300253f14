//! 抓取采样
//!
//! - `generator`: 由拟合包围盒枚举候选
//! - `validator`: 三项检查
//! - `assembly`: 数据库查询 → 生成 → 验证 → 回写

pub mod assembly;
pub mod generator;
pub mod validator;

pub use assembly::{GraspAssembler, GraspRequest};
pub use generator::{Face, GraspCandidate, GraspFamilyGenerator, WRIST_ANGLES};
pub use validator::{CriterionReport, GraspValidator, GraspVerdict, ValidationRequest};
