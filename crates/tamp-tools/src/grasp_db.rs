//! # 抓取数据库
//!
//! 以 (实例编号, 尺度) 为键缓存已验证的抓取，避免重复的碰撞测试。
//!
//! ## 文件格式
//!
//! 顶层为 JSON 对象，键为实例编号，按创建时间（最早在前，相同时按编号）排序写出：
//!
//! ```json
//! {
//!   "11": {
//!     "name": "cube",
//!     "grasps": [[0.0, 0.0, 0.055, 1.0, 0.0, 0.0, 0.0]],
//!     "grasps_length_variants": [],
//!     "datetime": "240101_12:30",
//!     "scale": 1.0,
//!     "other_scales": { "0.5": [[0.0, 0.0, 0.03, 1.0, 0.0, 0.0, 0.0]] }
//!   }
//! }
//! ```
//!
//! 读取时兼容的位姿写法：
//! - `[x, y, z, roll, pitch, yaw]`
//! - `[x, y, z, qx, qy, qz, qw]`（写出格式）
//! - `[[x, y, z], [roll, pitch, yaw]]`
//! - `[[x, y, z], [qx, qy, qz, qw]]`
//!
//! ## 尺度规则
//!
//! 1. 请求尺度等于规范尺度（或任一尺度未知）→ 规范列表
//! 2. 请求尺度存在于 `other_scales` → 对应列表
//! 3. 否则按 `请求 / 规范` 缩放位置，姿态不变
//!
//! 单写者，不做内部加锁。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tamp_types::Pose;

/// 创建时间格式（与历史数据库文件一致）
pub const DATETIME_FORMAT: &str = "%y%m%d_%H:%M";

/// 写入时位姿量化的小数位数
pub const GRASP_DECIMALS: u32 = 4;

/// 两个尺度视为相同的容差
const SCALE_EPSILON: f64 = 1e-9;

/// 尺度的字符串键：`1.0`、`0.05`
pub fn scale_key(scale: f64) -> String {
    format!("{scale:?}")
}

fn same_scale(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= SCALE_EPSILON,
        _ => true,
    }
}

/// 文件中的位姿写法
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PoseRepr {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl PoseRepr {
    fn from_pose(pose: &Pose) -> Self {
        PoseRepr::Flat(pose.quantized(GRASP_DECIMALS).to_tuple7().to_vec())
    }

    fn to_pose(&self) -> Result<Pose> {
        let flat: Vec<f64> = match self {
            PoseRepr::Flat(v) => v.clone(),
            PoseRepr::Nested(parts) => {
                if parts.len() != 2 || parts[0].len() != 3 {
                    anyhow::bail!("嵌套位姿应为 [[x, y, z], [...]]，实际为 {:?}", parts);
                }
                parts.concat()
            },
        };
        match flat.len() {
            6 => {
                let mut t = [0.0; 6];
                t.copy_from_slice(&flat);
                if t.iter().any(|v| !v.is_finite()) {
                    anyhow::bail!("位姿包含非有限值: {:?}", flat);
                }
                Ok(Pose::from_tuple6(&t))
            },
            7 => {
                let mut t = [0.0; 7];
                t.copy_from_slice(&flat);
                Pose::from_tuple7(&t).with_context(|| format!("无效的四元数: {:?}", flat))
            },
            n => anyhow::bail!("位姿应有 6 或 7 个元素，实际为 {}", n),
        }
    }
}

fn poses_from_reprs(reprs: &[PoseRepr]) -> Result<Vec<Pose>> {
    reprs.iter().map(PoseRepr::to_pose).collect()
}

fn reprs_from_poses(poses: &[Pose]) -> Vec<PoseRepr> {
    poses.iter().map(PoseRepr::from_pose).collect()
}

/// 文件中的单条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    grasps: Vec<PoseRepr>,
    #[serde(default, alias = "grasps_l")]
    grasps_length_variants: Vec<PoseRepr>,
    #[serde(default)]
    datetime: String,
    #[serde(default)]
    scale: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    other_scales: BTreeMap<String, Vec<PoseRepr>>,
}

/// 一个实例的缓存抓取
#[derive(Debug, Clone, PartialEq)]
pub struct GraspDatabaseEntry {
    pub name: String,
    /// 规范尺度，`None` 表示未知
    pub scale: Option<f64>,
    pub grasps: Vec<Pose>,
    pub grasps_length_variants: Vec<Pose>,
    /// 创建时间，格式见 [`DATETIME_FORMAT`]
    pub datetime: String,
    /// 其他尺度下单独验证过的抓取
    pub other_scales: BTreeMap<String, Vec<Pose>>,
}

impl GraspDatabaseEntry {
    fn from_raw(raw: &RawEntry) -> Result<Self> {
        let other_scales = raw
            .other_scales
            .iter()
            .map(|(k, v)| Ok((k.clone(), poses_from_reprs(v)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            name: raw.name.clone(),
            scale: raw.scale,
            grasps: poses_from_reprs(&raw.grasps)?,
            grasps_length_variants: poses_from_reprs(&raw.grasps_length_variants)?,
            datetime: raw.datetime.clone(),
            other_scales,
        })
    }

    fn to_raw(&self) -> RawEntry {
        RawEntry {
            name: self.name.clone(),
            grasps: reprs_from_poses(&self.grasps),
            grasps_length_variants: reprs_from_poses(&self.grasps_length_variants),
            datetime: self.datetime.clone(),
            scale: self.scale,
            other_scales: self
                .other_scales
                .iter()
                .map(|(k, v)| (k.clone(), reprs_from_poses(v)))
                .collect(),
        }
    }

    fn list(&self, length_variants: bool) -> &Vec<Pose> {
        if length_variants {
            &self.grasps_length_variants
        } else {
            &self.grasps
        }
    }

    fn list_mut(&mut self, length_variants: bool) -> &mut Vec<Pose> {
        if length_variants {
            &mut self.grasps_length_variants
        } else {
            &mut self.grasps
        }
    }
}

/// `put` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// 新建记录
    Created,
    /// 替换规范尺度下的列表
    Replaced,
    /// 写入其他尺度列表
    AlternateScale,
    /// 抓取为空，未写入
    Skipped,
}

/// 按创建时间排序写出
struct SortedEntries<'a>(Vec<(&'a String, RawEntry)>);

impl Serialize for SortedEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (*k, v)))
    }
}

/// 抓取数据库
#[derive(Debug, Clone, Default)]
pub struct GraspDatabase {
    path: Option<PathBuf>,
    entries: BTreeMap<String, GraspDatabaseEntry>,
}

impl GraspDatabase {
    /// 仅存在于内存的数据库
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 打开文件数据库；文件不存在时从空数据库开始
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut db = Self {
            path: Some(path.as_ref().to_path_buf()),
            entries: BTreeMap::new(),
        };
        db.load()?;
        Ok(db)
    }

    /// 从文件重新加载（丢弃内存中的内容）
    pub fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            self.entries.clear();
            return Ok(());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取抓取数据库失败: {}", path.display()))?;
        self.entries = Self::parse(&content)
            .with_context(|| format!("解析抓取数据库失败: {}", path.display()))?;
        Ok(())
    }

    /// 写回文件（内存数据库不做任何事）
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("创建数据库目录失败")?;
        }
        let content = self.to_json_string()?;
        fs::write(path, content)
            .with_context(|| format!("写入抓取数据库失败: {}", path.display()))?;
        Ok(())
    }

    /// 解析 JSON 文本
    pub fn parse(content: &str) -> Result<BTreeMap<String, GraspDatabaseEntry>> {
        let raw: BTreeMap<String, RawEntry> =
            serde_json::from_str(content).context("反序列化抓取数据库失败")?;
        raw.iter()
            .map(|(id, entry)| {
                let parsed = GraspDatabaseEntry::from_raw(entry)
                    .with_context(|| format!("实例 {id} 的抓取记录无效"))?;
                Ok((id.clone(), parsed))
            })
            .collect()
    }

    /// 序列化为 JSON 文本（按创建时间排序）
    pub fn to_json_string(&self) -> Result<String> {
        let mut sorted: Vec<(&String, &GraspDatabaseEntry)> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.1.datetime.cmp(&b.1.datetime).then_with(|| a.0.cmp(b.0)));
        let sorted = SortedEntries(sorted.into_iter().map(|(k, v)| (k, v.to_raw())).collect());
        serde_json::to_string_pretty(&sorted).context("序列化抓取数据库失败")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, instance_id: &str) -> Option<&GraspDatabaseEntry> {
        self.entries.get(instance_id)
    }

    /// 查询抓取；没有非空记录时返回 `None`
    pub fn get(&self, instance_id: &str, scale: Option<f64>, length_variants: bool) -> Option<Vec<Pose>> {
        let entry = self.entries.get(instance_id)?;

        if same_scale(scale, entry.scale) {
            let list = entry.list(length_variants);
            return (!list.is_empty()).then(|| list.clone());
        }

        // 两个尺度都已知且不同
        let requested = scale?;
        if !length_variants {
            if let Some(list) = entry.other_scales.get(&scale_key(requested)) {
                if !list.is_empty() {
                    return Some(list.clone());
                }
            }
        }

        let stored = entry.scale?;
        let list = entry.list(length_variants);
        if list.is_empty() || stored == 0.0 {
            return None;
        }
        let factor = requested / stored;
        Some(list.iter().map(|p| p.scaled(factor)).collect())
    }

    /// 写入抓取（量化到 4 位小数），文件数据库会立即写回
    ///
    /// - 新实例：创建记录，记录创建时间
    /// - 相同尺度：替换对应列表
    /// - 不同尺度：写入 `other_scales`（滑移抓取只保存在规范尺度下）
    pub fn put(
        &mut self,
        instance_id: &str,
        scale: Option<f64>,
        grasps: &[Pose],
        name: Option<&str>,
        length_variants: bool,
    ) -> Result<PutOutcome> {
        if grasps.is_empty() {
            return Ok(PutOutcome::Skipped);
        }
        let quantized: Vec<Pose> = grasps.iter().map(|g| g.quantized(GRASP_DECIMALS)).collect();

        let outcome = match self.entries.get_mut(instance_id) {
            None => {
                let mut entry = GraspDatabaseEntry {
                    name: name.unwrap_or("None").to_string(),
                    scale,
                    grasps: Vec::new(),
                    grasps_length_variants: Vec::new(),
                    datetime: chrono::Local::now().format(DATETIME_FORMAT).to_string(),
                    other_scales: BTreeMap::new(),
                };
                *entry.list_mut(length_variants) = quantized;
                self.entries.insert(instance_id.to_string(), entry);
                PutOutcome::Created
            },
            Some(entry) if same_scale(scale, entry.scale) => {
                if entry.scale.is_none() {
                    entry.scale = scale;
                }
                *entry.list_mut(length_variants) = quantized;
                PutOutcome::Replaced
            },
            Some(entry) => {
                if length_variants {
                    return Ok(PutOutcome::Skipped);
                }
                // 不同尺度一定都已知
                let key = scale.map(scale_key).unwrap_or_default();
                entry.other_scales.insert(key, quantized);
                PutOutcome::AlternateScale
            },
        };

        self.flush()?;
        Ok(outcome)
    }
}
