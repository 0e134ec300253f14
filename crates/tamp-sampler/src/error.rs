//! 错误类型体系
//!
//! 采样结果分两层：
//!
//! - **找不到见证**是正常数据：`Ok(Sampled::NotFound)`
//! - **其余情况**是错误：`Err(SamplerError)`
//!
//! # 示例
//!
//! ```rust
//! use tamp_sampler::{Sampled, SamplerError};
//!
//! fn report(result: Result<Sampled<u32>, SamplerError>) {
//!     match result {
//!         Ok(Sampled::Found(v)) => println!("found {v}"),
//!         Ok(Sampled::NotFound) => println!("no witness within budget"),
//!         Err(e) if e.is_malformed() => eprintln!("bad request: {e}"),
//!         Err(e) => eprintln!("fatal: {e}"),
//!     }
//! }
//! ```

use tamp_scene::SceneError;
use tamp_tools::ConfigError;
use tamp_types::GraspError;
use thiserror::Error;

/// 采样器错误类型
#[derive(Debug, Error)]
pub enum SamplerError {
    // ==================== 输入错误 ====================
    /// 非有限位姿、退化包围盒、缺少碰撞形状等
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// 抓取宽度越界
    #[error("Invalid grasp: {0}")]
    Grasp(#[from] GraspError),

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // ==================== 外部引擎错误（致命） ====================
    /// 场景后端失败
    #[error("Scene backend failure: {0}")]
    Scene(#[from] SceneError),

    // ==================== 控制流 ====================
    /// 调用被取消
    #[error("Sampling cancelled")]
    Cancelled,

    // ==================== 持久化 ====================
    /// 抓取数据库读写失败
    #[error("Grasp database error: {0:#}")]
    Database(anyhow::Error),
}

impl From<anyhow::Error> for SamplerError {
    fn from(e: anyhow::Error) -> Self {
        SamplerError::Database(e)
    }
}

impl SamplerError {
    /// 是否由调用方输入引起
    pub fn is_malformed(&self) -> bool {
        match self {
            SamplerError::MalformedInput(_) | SamplerError::Grasp(_) | SamplerError::Config(_) => {
                true
            },
            SamplerError::Scene(e) => e.is_malformed(),
            _ => false,
        }
    }

    /// 是否为外部引擎故障（必须向上传播）
    pub fn is_fatal(&self) -> bool {
        match self {
            SamplerError::Scene(e) => !e.is_malformed(),
            SamplerError::Database(_) => true,
            _ => false,
        }
    }
}

/// 有界搜索的结果
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Sampled<T> {
    /// 找到见证
    Found(T),
    /// 预算内未找到
    NotFound,
}

impl<T> Sampled<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Sampled::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Sampled::Found(v) => Some(v),
            Sampled::NotFound => None,
        }
    }

    pub fn as_ref(&self) -> Sampled<&T> {
        match self {
            Sampled::Found(v) => Sampled::Found(v),
            Sampled::NotFound => Sampled::NotFound,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Sampled<U> {
        match self {
            Sampled::Found(v) => Sampled::Found(f(v)),
            Sampled::NotFound => Sampled::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Sampled<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Sampled::Found(v),
            None => Sampled::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamp_types::BodyId;

    #[test]
    fn test_classification() {
        assert!(SamplerError::MalformedInput("x".into()).is_malformed());
        assert!(SamplerError::Scene(SceneError::UnknownBody(BodyId(1))).is_malformed());
        let fatal = SamplerError::Scene(SceneError::ProxySpawnFailed("x".into()));
        assert!(!fatal.is_malformed());
        assert!(fatal.is_fatal());
        assert!(!SamplerError::Cancelled.is_fatal());
        assert!(SamplerError::from(anyhow::anyhow!("disk full")).is_fatal());
    }

    #[test]
    fn test_sampled() {
        let s: Sampled<i32> = Some(3).into();
        assert!(s.is_found());
        assert_eq!(s.clone().map(|v| v * 2), Sampled::Found(6));
        assert_eq!(s.found(), Some(3));
        let n: Sampled<i32> = None.into();
        assert_eq!(n.as_ref(), Sampled::NotFound);
        assert_eq!(n.found(), None);
    }
}
