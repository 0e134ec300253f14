//! 附着关系管理
//!
//! 每个子物体（或子关节）至多一个附着，重复附着时后写覆盖。
//! `assign()` 按父子依赖顺序重新计算所有子物体：
//!
//! - `Rigid`: 子物体位姿 = 父连杆位姿 × `parent_from_child`
//! - `CoupledJoint`: 读取父机器人构型，在 [`PullMapping`] 中查最近采样点，直接设置子关节
//!
//! 附着只按编号引用父子物体，不拥有它们。

use crate::error::SamplerError;
use crate::pull::PullMapping;
use std::collections::BTreeMap;
use tamp_scene::{ArticulatedRobot, ConfigurationSource, SceneError, SceneModel};
use tamp_types::{BodyId, Grasp, GraspTarget, JointId, LinkId, Pose};
use tracing::{debug, trace};

/// 附着的子端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentChild {
    /// 整个物体随父连杆运动
    Body(BodyId),
    /// 关节值由父构型驱动（门、抽屉）
    Joint { body: BodyId, joint: JointId },
}

impl AttachmentChild {
    pub fn body(&self) -> BodyId {
        match self {
            AttachmentChild::Body(body) | AttachmentChild::Joint { body, .. } => *body,
        }
    }

    fn renamed(&self, map: &BTreeMap<BodyId, BodyId>) -> Self {
        let rename = |b: &BodyId| map.get(b).copied().unwrap_or(*b);
        match self {
            AttachmentChild::Body(body) => AttachmentChild::Body(rename(body)),
            AttachmentChild::Joint { body, joint } => AttachmentChild::Joint {
                body: rename(body),
                joint: *joint,
            },
        }
    }
}

/// 父构型与子关节值的耦合
#[derive(Debug, Clone, PartialEq)]
pub struct Coupling {
    pub mapping: PullMapping,
    /// 查表容差（L∞）
    pub tolerance: f64,
    /// 父构型的读取方式
    pub source: ConfigurationSource,
}

/// 附着类型
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentKind {
    Rigid,
    CoupledJoint(Coupling),
}

/// 一条附着
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub parent: BodyId,
    pub parent_link: LinkId,
    pub child: AttachmentChild,
    /// 创建时固定的父连杆 → 子物体变换
    pub parent_from_child: Pose,
    pub kind: AttachmentKind,
}

impl Attachment {
    /// 按当前场景状态创建刚性附着
    pub fn rigid<S: SceneModel + ?Sized>(
        scene: &S,
        parent: BodyId,
        parent_link: LinkId,
        child: BodyId,
    ) -> Result<Self, SceneError> {
        let link_pose = scene.link_pose(parent, parent_link)?;
        let child_pose = scene.pose(child)?;
        Ok(Self {
            parent,
            parent_link,
            child: AttachmentChild::Body(child),
            parent_from_child: link_pose.inverse().compose(&child_pose),
            kind: AttachmentKind::Rigid,
        })
    }

    /// 把当前父状态写到子物体上
    ///
    /// 耦合关节查表失败时保持原值，返回 `false`。
    pub fn assign(&self, scene: &mut dyn SceneModel) -> Result<bool, SceneError> {
        match (&self.kind, self.child) {
            (AttachmentKind::Rigid, AttachmentChild::Body(child)) => {
                let link_pose = scene.link_pose(self.parent, self.parent_link)?;
                scene.set_pose(child, &link_pose.compose(&self.parent_from_child))?;
                Ok(true)
            },
            (AttachmentKind::CoupledJoint(coupling), AttachmentChild::Joint { body, joint }) => {
                let conf = coupling.source.read(&*scene, self.parent)?;
                match coupling.mapping.lookup(&conf, coupling.tolerance) {
                    Some(value) => {
                        scene.set_joint_position(body, joint, value)?;
                        Ok(true)
                    },
                    None => {
                        debug!("no pull sample near configuration of {}", self.parent);
                        Ok(false)
                    },
                }
            },
            (kind, child) => Err(SceneError::Inconsistent(format!(
                "attachment kind {kind:?} cannot drive {child:?}"
            ))),
        }
    }
}

/// 附着管理器
#[derive(Debug, Clone, Default)]
pub struct AttachmentManager {
    attachments: BTreeMap<AttachmentChild, Attachment>,
}

impl AttachmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加附着，返回被覆盖的旧附着
    pub fn attach(&mut self, attachment: Attachment) -> Option<Attachment> {
        trace!("attach {:?} to {}", attachment.child, attachment.parent);
        self.attachments.insert(attachment.child, attachment)
    }

    /// 解除附着；子端未附着时什么也不做
    pub fn detach(&mut self, child: &AttachmentChild) -> Option<Attachment> {
        self.attachments.remove(child)
    }

    /// 抓住目标后建立附着
    ///
    /// - 物体目标：刚性附着到机器人工具连杆，相对变换取 `grasp.carry`
    /// - 关节目标：需要 `coupling`，否则视为输入错误
    pub fn attach_grasp<R: ArticulatedRobot + ?Sized>(
        &mut self,
        robot: &R,
        grasp: &Grasp,
        coupling: Option<Coupling>,
    ) -> Result<Option<Attachment>, SamplerError> {
        let (child, kind) = match (grasp.target, coupling) {
            (GraspTarget::Body(body), _) => (AttachmentChild::Body(body), AttachmentKind::Rigid),
            (GraspTarget::Joint { body, joint, .. }, Some(coupling)) => (
                AttachmentChild::Joint { body, joint },
                AttachmentKind::CoupledJoint(coupling),
            ),
            (GraspTarget::Joint { .. }, None) => {
                return Err(SamplerError::MalformedInput(
                    "handle grasp attachment requires a pull mapping".to_string(),
                ));
            },
        };
        Ok(self.attach(Attachment {
            parent: robot.body(),
            parent_link: robot.tool_link(),
            child,
            parent_from_child: grasp.carry,
            kind,
        }))
    }

    pub fn get(&self, child: &AttachmentChild) -> Option<&Attachment> {
        self.attachments.get(child)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> + '_ {
        self.attachments.values()
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// 父物体本身被附着的链长
    fn depth(&self, attachment: &Attachment) -> usize {
        let mut depth = 0;
        let mut parent = attachment.parent;
        while let Some(next) = self.attachments.get(&AttachmentChild::Body(parent)) {
            depth += 1;
            if depth > self.attachments.len() {
                break;
            }
            parent = next.parent;
        }
        depth
    }

    /// 重新计算所有子物体（父先于子），返回查表失败的耦合关节数
    pub fn assign(&self, scene: &mut dyn SceneModel) -> Result<usize, SceneError> {
        let mut ordered: Vec<(usize, &Attachment)> = self.iter().map(|a| (self.depth(a), a)).collect();
        ordered.sort_by_key(|(depth, _)| *depth);
        let mut missed = 0;
        for (_, attachment) in ordered {
            if !attachment.assign(scene)? {
                missed += 1;
            }
        }
        Ok(missed)
    }

    /// 物体重新加载后按新编号重命名
    pub fn apply_mapping(&mut self, map: &BTreeMap<BodyId, BodyId>) {
        let attachments = std::mem::take(&mut self.attachments);
        for (_, mut attachment) in attachments {
            attachment.parent = map.get(&attachment.parent).copied().unwrap_or(attachment.parent);
            attachment.child = attachment.child.renamed(map);
            self.attachments.insert(attachment.child, attachment);
        }
    }
}
