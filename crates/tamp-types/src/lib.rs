//! # TAMP Types
//!
//! 几何可行性采样器的纯数据层（无 I/O、无场景依赖）
//!
//! ## 模块
//!
//! - `budget`: 迭代次数 + 墙钟时间的双重预算
//! - `ids`: 物体 / 连杆 / 关节标识符
//! - `pose`: 刚体位姿（位置 + 单位四元数）及 6 元 / 7 元组转换
//! - `aabb`: 轴对齐包围盒与物体自身坐标系下的拟合包围盒
//! - `grasp`: 抓取候选与已验证抓取
//! - `joint`: 关节类型、限位、分类与关节位置
//! - `gripper`: 末端执行器几何参数
//!
//! ## 约定
//!
//! - 长度单位为米，角度单位为弧度
//! - 四元数元组顺序为 `(qx, qy, qz, qw)`
//! - 欧拉角为固定轴 roll-pitch-yaw

pub mod aabb;
pub mod budget;
pub mod grasp;
pub mod gripper;
pub mod ids;
pub mod joint;
pub mod pose;

pub use aabb::*;
pub use budget::*;
pub use grasp::*;
pub use gripper::*;
pub use ids::*;
pub use joint::*;
pub use pose::*;

// 公共 API 中出现的几何类型来自 nalgebra
pub use nalgebra;

/// 将数值四舍五入到指定小数位数
///
/// 抓取数据库量化（4 位）与拉动映射键（3 位）共用此函数。
#[inline]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
