//! # 采样器配置
//!
//! 所有重试上限、几何阈值与夹爪参数都集中在 `SamplerConfig` 中，
//! 可以从 TOML 文件加载；缺失的字段使用默认值。
//!
//! ```toml
//! grasp_db_path = "grasps.json"
//!
//! [grasp]
//! grasp_depth = 0.03
//!
//! [placement]
//! num_trials = 20
//!
//! [placement.category_yaws]
//! microwave = 3.141592653589793
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tamp_types::{Budget, GripperSpec};
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 采样器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// 抓取数据库文件；为空时数据库只存在于内存
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grasp_db_path: Option<PathBuf>,

    pub grasp: GraspSettings,
    pub placement: PlacementSettings,
    pub containment: ContainmentSettings,
    pub pull: PullSettings,
    pub budget: BudgetSettings,
    pub gripper: GripperSpec,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            grasp_db_path: None,
            grasp: GraspSettings::default(),
            placement: PlacementSettings::default(),
            containment: ContainmentSettings::default(),
            pull: PullSettings::default(),
            budget: BudgetSettings::default(),
            gripper: GripperSpec::default(),
        }
    }
}

impl SamplerConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SamplerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 检查数值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn ensure(ok: bool, message: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(message.to_string()))
            }
        }

        ensure(self.gripper.is_valid(), "gripper geometry must be positive and finite")?;
        ensure(
            self.grasp.grasp_depth.is_finite() && self.grasp.grasp_depth >= 0.0,
            "grasp.grasp_depth must be non-negative",
        )?;
        ensure(
            self.grasp.approach_distance.is_finite() && self.grasp.approach_distance >= 0.0,
            "grasp.approach_distance must be non-negative",
        )?;
        ensure(self.grasp.closure_steps > 0, "grasp.closure_steps must be positive")?;
        ensure(self.placement.num_trials > 0, "placement.num_trials must be positive")?;
        ensure(
            self.placement.tall_surface_ratio > 0.0 && self.placement.tall_surface_height > 0.0,
            "placement tall-surface thresholds must be positive",
        )?;
        ensure(
            self.containment.max_attempts > 0,
            "containment.max_attempts must be positive",
        )?;
        ensure(
            self.containment.settle_intervals.iter().all(|v| v.is_finite() && *v > 0.0),
            "containment.settle_intervals must be positive",
        )?;
        ensure(self.pull.num_steps > 0, "pull.num_steps must be positive")?;
        ensure(
            (0.0..=1.0).contains(&self.pull.completeness),
            "pull.completeness must be within [0, 1]",
        )?;
        ensure(
            self.pull.lookup_tolerance.is_finite() && self.pull.lookup_tolerance >= 0.0,
            "pull.lookup_tolerance must be non-negative",
        )?;
        Ok(())
    }
}

/// 抓取生成与验证
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspSettings {
    /// 手掌中心相对物体表面的外移距离（米）
    pub grasp_depth: f64,
    /// 接近位姿沿接近轴的后退距离（米）
    pub approach_distance: f64,
    /// 接触点数超过该值才算碰撞（过滤数值噪声）
    pub min_contact_points: usize,
    /// 虚拟闭合的离散步数
    pub closure_steps: usize,
    /// 跳过法线沿最长维度的面（把手两端）
    pub handle_filter: bool,
    /// 沿最长维度额外探测 ±1/3 的滑移抓取
    pub length_variants: bool,
    /// 是否读写抓取数据库
    pub use_database: bool,
}

impl Default for GraspSettings {
    fn default() -> Self {
        Self {
            grasp_depth: 0.03,
            approach_distance: 0.05,
            min_contact_points: 0,
            closure_steps: 40,
            handle_filter: false,
            length_variants: false,
            use_database: true,
        }
    }
}

/// 表面放置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSettings {
    pub num_trials: usize,
    /// 表面高度超过物体高度的该倍数即视为"高表面"
    pub tall_surface_ratio: f64,
    /// 表面高度超过该值（米）即视为"高表面"
    pub tall_surface_height: f64,
    /// 按名称匹配的固定朝向（小写子串 → yaw）
    pub category_yaws: BTreeMap<String, f64>,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        let mut category_yaws = BTreeMap::new();
        category_yaws.insert("microwave".to_string(), PI);
        category_yaws.insert("toaster".to_string(), FRAC_PI_2);
        Self {
            num_trials: 20,
            tall_surface_ratio: 5.0,
            tall_surface_height: 1.0,
            category_yaws,
        }
    }
}

/// 空间容纳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentSettings {
    pub max_attempts: usize,
    /// 采样高度的额外抬升（米）
    pub lift: f64,
    /// 下沉步长，依次尝试
    pub settle_intervals: Vec<f64>,
}

impl Default for ContainmentSettings {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            lift: 0.01,
            settle_intervals: vec![0.1, 0.05, 0.01],
        }
    }
}

/// 拉门 / 拉抽屉映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullSettings {
    pub num_steps: usize,
    /// 接受的步数至少为 `ceil(completeness * num_steps)`
    pub completeness: f64,
    /// 查表时构型的 L∞ 容差
    pub lookup_tolerance: f64,
    /// 构型键的小数位数
    pub round_decimals: u32,
}

impl Default for PullSettings {
    fn default() -> Self {
        Self {
            num_steps: 30,
            completeness: 1.0,
            lookup_tolerance: 3e-3,
            round_decimals: 3,
        }
    }
}

/// 单次调用预算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub max_iterations: usize,
    pub timeout_ms: u64,
    pub ik_max_iterations: usize,
    pub ik_timeout_ms: u64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            timeout_ms: 30_000,
            ik_max_iterations: 100,
            ik_timeout_ms: 1_000,
        }
    }
}

impl BudgetSettings {
    /// 采样调用预算
    pub fn sampling(&self) -> Budget {
        Budget::new(self.max_iterations, Duration::from_millis(self.timeout_ms))
    }

    /// 单次逆解预算
    pub fn ik(&self) -> Budget {
        Budget::new(self.ik_max_iterations, Duration::from_millis(self.ik_timeout_ms))
    }
}
