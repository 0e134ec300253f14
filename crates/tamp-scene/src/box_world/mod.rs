//! 盒世界后端
//!
//! 每个物体是一棵连杆树：根连杆位于物体位姿处，其余连杆各由一个关节
//! （旋转 / 移动 / 固定）连接到父连杆。连杆的碰撞形状是连杆坐标系下的轴对齐盒，
//! 碰撞检测使用有向盒的分离轴测试。
//!
//! # 示例
//!
//! ```
//! use nalgebra::Vector3;
//! use tamp_scene::{BoxWorld, CollisionOracle, SceneModel};
//! use tamp_types::Pose;
//!
//! let mut world = BoxWorld::new();
//! let table = world.add_box("table", Vector3::new(0.5, 0.5, 0.05), Pose::from_xyz(0.0, 0.0, 0.85));
//! let cube = world.add_box("cube", Vector3::new(0.05, 0.05, 0.05), Pose::from_xyz(0.0, 0.0, 0.95));
//! // 放在桌面上：接触但不相交
//! assert!(!world.pairwise_collision(cube, table).unwrap());
//! assert_eq!(world.body_count(), 2);
//! ```

mod obb;

pub use obb::{Obb, PENETRATION_TOLERANCE, intersects, penetration};

use crate::{CollisionOracle, Contact, GripperProxies, SceneError, SceneModel, ShapeKind};
use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use std::collections::BTreeMap;
use tamp_types::{
    Aabb, BodyId, FittedBox, GripperSpec, JointId, JointKind, JointLimits, LinkId, Pose,
};
use tracing::{debug, trace};

/// 连杆坐标系下的轴对齐碰撞盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxShape {
    pub center: Point3<f64>,
    pub half_extents: Vector3<f64>,
    pub kind: ShapeKind,
}

impl BoxShape {
    /// 以连杆原点为中心的基本体盒
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        Self {
            center: Point3::origin(),
            half_extents,
            kind: ShapeKind::Box,
        }
    }

    /// 以包围盒近似的网格
    pub fn mesh(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            center,
            half_extents,
            kind: ShapeKind::Mesh,
        }
    }

    pub fn offset(mut self, center: Point3<f64>) -> Self {
        self.center = center;
        self
    }
}

#[derive(Debug, Clone)]
struct Link {
    parent: Option<usize>,
    origin: Pose,
    shape: Option<BoxShape>,
}

#[derive(Debug, Clone)]
struct Joint {
    kind: JointKind,
    axis: Unit<Vector3<f64>>,
    limits: JointLimits,
    position: f64,
}

impl Joint {
    fn motion(&self) -> Pose {
        match self.kind {
            JointKind::Revolute => {
                Pose::from_rotation(UnitQuaternion::from_axis_angle(&self.axis, self.position))
            },
            JointKind::Prismatic => {
                Pose::from_position(Point3::from(self.axis.into_inner() * self.position))
            },
            JointKind::Fixed => Pose::identity(),
        }
    }
}

/// 两指夹爪的关节编号（左、右手指）
#[derive(Debug, Clone, Copy)]
struct GripperJoints {
    max_aperture: f64,
}

#[derive(Debug, Clone)]
struct Body {
    name: String,
    pose: Pose,
    /// `links[0]` 为根连杆；`links[i]`（i ≥ 1）由 `joints[i - 1]` 驱动
    links: Vec<Link>,
    joints: Vec<Joint>,
    gripper: Option<GripperJoints>,
}

impl Body {
    fn link_poses(&self) -> Vec<Pose> {
        let mut poses: Vec<Pose> = Vec::with_capacity(self.links.len());
        for (i, link) in self.links.iter().enumerate() {
            let pose = match link.parent {
                None => self.pose.compose(&link.origin),
                Some(parent) => {
                    let motion = self.joints[i - 1].motion();
                    poses[parent].compose(&link.origin).compose(&motion)
                },
            };
            poses.push(pose);
        }
        poses
    }

    /// 带形状连杆的世界有向盒
    fn obbs(&self, only: Option<usize>) -> Vec<(usize, Obb)> {
        let poses = self.link_poses();
        self.links
            .iter()
            .enumerate()
            .filter(|(i, _)| only.is_none_or(|o| o == *i))
            .filter_map(|(i, link)| {
                link.shape
                    .map(|s| (i, Obb::new(&poses[i], &s.center, &s.half_extents)))
            })
            .collect()
    }
}

/// 物体构造器
///
/// 连杆按添加顺序编号（根连杆为 0），第 `i` 个连杆由第 `i - 1` 个关节驱动。
#[derive(Debug, Clone)]
pub struct BodyBuilder {
    name: String,
    pose: Pose,
    links: Vec<Link>,
    joints: Vec<Joint>,
    gripper: Option<GripperJoints>,
    error: Option<String>,
}

impl BodyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pose: Pose::identity(),
            links: vec![Link {
                parent: None,
                origin: Pose::identity(),
                shape: None,
            }],
            joints: Vec::new(),
            gripper: None,
            error: None,
        }
    }

    pub fn pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// 设置根连杆形状
    pub fn base_shape(mut self, shape: BoxShape) -> Self {
        self.links[0].shape = Some(shape);
        self
    }

    /// 通过固定关节连接的子连杆
    pub fn fixed_link(self, parent: LinkId, origin: Pose, shape: Option<BoxShape>) -> Self {
        self.joint_link(
            parent,
            origin,
            JointKind::Fixed,
            Vector3::z(),
            JointLimits::new(0.0, 0.0),
            shape,
        )
    }

    /// 通过可动关节连接的子连杆，关节初值为下限
    pub fn joint_link(
        mut self,
        parent: LinkId,
        origin: Pose,
        kind: JointKind,
        axis: Vector3<f64>,
        limits: JointLimits,
        shape: Option<BoxShape>,
    ) -> Self {
        if parent.0 >= self.links.len() {
            self.error
                .get_or_insert_with(|| format!("parent {parent} does not exist yet"));
            return self;
        }
        let Some(axis) = Unit::try_new(axis, 1e-12) else {
            self.error.get_or_insert_with(|| "zero joint axis".to_string());
            return self;
        };
        self.links.push(Link {
            parent: Some(parent.0),
            origin,
            shape,
        });
        self.joints.push(Joint {
            kind,
            axis,
            limits,
            position: limits.lower,
        });
        self
    }

    /// 设置已添加关节的初值（钳制到限位）
    pub fn joint_position(mut self, joint: JointId, value: f64) -> Self {
        match self.joints.get_mut(joint.0) {
            Some(j) => j.position = j.limits.clamp(value),
            None => {
                self.error.get_or_insert_with(|| format!("{joint} does not exist yet"));
            },
        }
        self
    }

    /// 两指夹爪：手掌为根连杆，连杆 1 / 2 为沿 ±y 张开的手指
    pub fn gripper(name: impl Into<String>, pose: Pose, spec: &GripperSpec) -> Self {
        let palm = BoxShape::cuboid(spec.palm_half_extents());
        let finger = BoxShape::cuboid(spec.finger_half_extents());
        let half_gap = spec.max_aperture * 0.5;
        let limits = JointLimits::new(0.0, half_gap);
        let z = spec.finger_center_offset();
        let t = spec.finger_thickness * 0.5;
        let mut builder = Self::new(name)
            .pose(pose)
            .base_shape(palm)
            .joint_link(
                LinkId::BASE,
                Pose::from_xyz(0.0, t, z),
                JointKind::Prismatic,
                Vector3::y(),
                limits,
                Some(finger),
            )
            .joint_link(
                LinkId::BASE,
                Pose::from_xyz(0.0, -t, z),
                JointKind::Prismatic,
                -Vector3::y(),
                limits,
                Some(finger),
            )
            .joint_position(JointId(0), half_gap)
            .joint_position(JointId(1), half_gap);
        builder.gripper = Some(GripperJoints {
            max_aperture: spec.max_aperture,
        });
        builder
    }
}

/// 内存中的盒世界
#[derive(Debug, Clone, Default)]
pub struct BoxWorld {
    bodies: BTreeMap<BodyId, Body>,
    next_id: u32,
}

impl BoxWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加物体
    pub fn add_body(&mut self, builder: BodyBuilder) -> Result<BodyId, SceneError> {
        if let Some(error) = builder.error {
            return Err(SceneError::Inconsistent(format!(
                "invalid body '{}': {error}",
                builder.name
            )));
        }
        let id = BodyId(self.next_id);
        self.next_id += 1;
        debug!("box world: add {} '{}'", id, builder.name);
        self.bodies.insert(
            id,
            Body {
                name: builder.name,
                pose: builder.pose,
                links: builder.links,
                joints: builder.joints,
                gripper: builder.gripper,
            },
        );
        Ok(id)
    }

    /// 添加单个盒子（以原点为中心）
    pub fn add_box(&mut self, name: impl Into<String>, half_extents: Vector3<f64>, pose: Pose) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            id,
            Body {
                name: name.into(),
                pose,
                links: vec![Link {
                    parent: None,
                    origin: Pose::identity(),
                    shape: Some(BoxShape::cuboid(half_extents)),
                }],
                joints: Vec::new(),
                gripper: None,
            },
        );
        id
    }

    /// 按名称查找物体（取编号最小者）
    pub fn body_by_name(&self, name: &str) -> Option<BodyId> {
        self.bodies
            .iter()
            .find(|(_, b)| b.name == name)
            .map(|(id, _)| *id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.keys().copied()
    }

    fn body(&self, id: BodyId) -> Result<&Body, SceneError> {
        self.bodies.get(&id).ok_or(SceneError::UnknownBody(id))
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut Body, SceneError> {
        self.bodies.get_mut(&id).ok_or(SceneError::UnknownBody(id))
    }

    fn check_link(body: &Body, id: BodyId, link: LinkId) -> Result<(), SceneError> {
        if link.0 < body.links.len() {
            Ok(())
        } else {
            Err(SceneError::UnknownLink { body: id, link })
        }
    }

    fn joint(&self, id: BodyId, joint: JointId) -> Result<&Joint, SceneError> {
        self.body(id)?
            .joints
            .get(joint.0)
            .ok_or(SceneError::UnknownJoint { body: id, joint })
    }

    fn obbs(&self, id: BodyId, link: Option<LinkId>) -> Result<Vec<(usize, Obb)>, SceneError> {
        let body = self.body(id)?;
        if let Some(link) = link {
            Self::check_link(body, id, link)?;
        }
        let obbs = body.obbs(link.map(|l| l.0));
        if obbs.is_empty() {
            return Err(SceneError::MissingShape { body: id, link });
        }
        Ok(obbs)
    }
}

impl SceneModel for BoxWorld {
    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn body_name(&self, body: BodyId) -> Result<String, SceneError> {
        Ok(self.body(body)?.name.clone())
    }

    fn pose(&self, body: BodyId) -> Result<Pose, SceneError> {
        Ok(self.body(body)?.pose)
    }

    fn set_pose(&mut self, body: BodyId, pose: &Pose) -> Result<(), SceneError> {
        if !pose.is_finite() {
            return Err(SceneError::NonFinitePose(body));
        }
        self.body_mut(body)?.pose = *pose;
        Ok(())
    }

    fn link_count(&self, body: BodyId) -> Result<usize, SceneError> {
        Ok(self.body(body)?.links.len())
    }

    fn link_pose(&self, body: BodyId, link: LinkId) -> Result<Pose, SceneError> {
        let b = self.body(body)?;
        Self::check_link(b, body, link)?;
        Ok(b.link_poses()[link.0])
    }

    fn aabb(&self, body: BodyId, link: Option<LinkId>) -> Result<Aabb, SceneError> {
        let obbs = self.obbs(body, link)?;
        let corners = obbs.iter().flat_map(|(_, o)| o.corners());
        Aabb::from_points(corners).ok_or(SceneError::MissingShape { body, link })
    }

    fn fitted_box(&self, body: BodyId, link: Option<LinkId>) -> Result<FittedBox, SceneError> {
        let b = self.body(body)?;
        match link {
            Some(link) => {
                Self::check_link(b, body, link)?;
                let shape = b.links[link.0].shape.ok_or(SceneError::MissingShape {
                    body,
                    link: Some(link),
                })?;
                Ok(FittedBox::new(shape.center, shape.half_extents))
            },
            None => {
                let poses = b.link_poses();
                let to_body = b.pose.inverse();
                let local = b
                    .links
                    .iter()
                    .enumerate()
                    .filter_map(|(i, l)| {
                        l.shape.map(|s| {
                            let body_from_link = to_body.compose(&poses[i]);
                            Aabb::from_oriented(&body_from_link, &s.center, &s.half_extents)
                        })
                    })
                    .reduce(|a, b| a.union(&b))
                    .ok_or(SceneError::MissingShape { body, link: None })?;
                Ok(FittedBox::new(local.center(), local.half_extents()))
            },
        }
    }

    fn shape_kind(&self, body: BodyId, link: Option<LinkId>) -> Result<ShapeKind, SceneError> {
        let b = self.body(body)?;
        if let Some(link) = link {
            Self::check_link(b, body, link)?;
            return b.links[link.0]
                .shape
                .map(|s| s.kind)
                .ok_or(SceneError::MissingShape {
                    body,
                    link: Some(link),
                });
        }
        let mut shapes = b.links.iter().filter_map(|l| l.shape);
        match (shapes.next(), shapes.next()) {
            (Some(only), None) => Ok(only.kind),
            (Some(_), Some(_)) => Ok(ShapeKind::Composite),
            (None, _) => Err(SceneError::MissingShape { body, link: None }),
        }
    }

    fn joint_kind(&self, body: BodyId, joint: JointId) -> Result<JointKind, SceneError> {
        Ok(self.joint(body, joint)?.kind)
    }

    fn joint_limits(&self, body: BodyId, joint: JointId) -> Result<JointLimits, SceneError> {
        Ok(self.joint(body, joint)?.limits)
    }

    fn joint_child_link(&self, body: BodyId, joint: JointId) -> Result<LinkId, SceneError> {
        self.joint(body, joint)?;
        Ok(LinkId(joint.0 + 1))
    }

    fn joint_position(&self, body: BodyId, joint: JointId) -> Result<f64, SceneError> {
        Ok(self.joint(body, joint)?.position)
    }

    fn set_joint_position(&mut self, body: BodyId, joint: JointId, value: f64) -> Result<(), SceneError> {
        if !value.is_finite() {
            return Err(SceneError::Inconsistent(format!(
                "non-finite value {value} for {joint} on {body}"
            )));
        }
        let j = self
            .body_mut(body)?
            .joints
            .get_mut(joint.0)
            .ok_or(SceneError::UnknownJoint { body, joint })?;
        j.position = j.limits.clamp(value);
        Ok(())
    }
}

impl CollisionOracle for BoxWorld {
    fn pairwise_collision(&self, a: BodyId, b: BodyId) -> Result<bool, SceneError> {
        if a == b {
            return Ok(false);
        }
        let (Ok(oa), Ok(ob)) = (self.obbs(a, None), self.obbs(b, None)) else {
            // 无形状物体不参与碰撞，但未知编号仍是错误
            self.body(a)?;
            self.body(b)?;
            return Ok(false);
        };
        let hit = oa
            .iter()
            .any(|(_, x)| ob.iter().any(|(_, y)| intersects(x, y)));
        trace!("collision {} vs {}: {}", a, b, hit);
        Ok(hit)
    }

    fn closest_points(
        &self,
        a: BodyId,
        b: BodyId,
        link_a: Option<LinkId>,
        max_distance: f64,
    ) -> Result<Vec<Contact>, SceneError> {
        let oa = self.obbs(a, link_a)?;
        let ob = match self.obbs(b, None) {
            Ok(ob) => ob,
            Err(SceneError::MissingShape { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut contacts = Vec::new();
        for (_, x) in &oa {
            for (_, y) in &ob {
                let depth = penetration(x, y);
                if depth > PENETRATION_TOLERANCE {
                    let before = contacts.len();
                    // A 的角点落在 B 内、B 的角点落在 A 内都记为接触点
                    for c in x.corners() {
                        if y.contains_point(&c, PENETRATION_TOLERANCE) {
                            contacts.push(Contact {
                                point: c,
                                distance: -depth,
                            });
                        }
                    }
                    for c in y.corners() {
                        if x.contains_point(&c, PENETRATION_TOLERANCE) {
                            contacts.push(Contact {
                                point: c,
                                distance: -depth,
                            });
                        }
                    }
                    if contacts.len() == before {
                        // 仅边与边相交
                        contacts.push(Contact {
                            point: nalgebra::center(&x.center, &y.center),
                            distance: -depth,
                        });
                    }
                } else if -depth <= max_distance {
                    contacts.push(Contact {
                        point: nalgebra::center(&x.center, &y.center),
                        distance: -depth,
                    });
                }
            }
        }
        Ok(contacts)
    }
}

impl GripperProxies for BoxWorld {
    fn spawn_gripper(&mut self, pose: &Pose, spec: &GripperSpec) -> Result<BodyId, SceneError> {
        if !pose.is_finite() {
            return Err(SceneError::ProxySpawnFailed(
                "non-finite gripper pose".to_string(),
            ));
        }
        if !spec.is_valid() {
            return Err(SceneError::ProxySpawnFailed(format!(
                "invalid gripper spec: {spec:?}"
            )));
        }
        if spec.palm_link != 0 || spec.finger_links.iter().any(|l| !(1..=2).contains(l)) {
            return Err(SceneError::ProxySpawnFailed(
                "box world grippers use palm link 0 and finger links 1, 2".to_string(),
            ));
        }
        self.add_body(BodyBuilder::gripper("gripper_proxy", *pose, spec))
            .map_err(|e| SceneError::ProxySpawnFailed(e.to_string()))
    }

    fn set_gripper_opening(&mut self, gripper: BodyId, opening: f64) -> Result<(), SceneError> {
        let body = self.body_mut(gripper)?;
        let Some(g) = body.gripper else {
            return Err(SceneError::Unsupported(format!("{gripper} is not a gripper")));
        };
        let half = opening.clamp(0.0, g.max_aperture) * 0.5;
        for j in body.joints.iter_mut().take(2) {
            j.position = j.limits.clamp(half);
        }
        Ok(())
    }

    fn remove_body(&mut self, body: BodyId) -> Result<(), SceneError> {
        self.bodies
            .remove(&body)
            .map(|b| debug!("box world: remove {} '{}'", body, b.name))
            .ok_or(SceneError::UnknownBody(body))
    }
}
