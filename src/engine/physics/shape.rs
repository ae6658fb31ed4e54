// Deferred shape descriptions and the frozen, shareable shapes they produce
//
// A description is open until frozen: it can be inspected and, for static
// compounds, extended with sub-shapes. Freezing consumes it, validates the
// geometry, computes mass properties and returns an immutable shape handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glam::{DMat3, Quat, Vec3};
use rapier3d::na::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::parry::mass_properties::MassProperties;
use rapier3d::parry::transformation::try_convex_hull;
use rapier3d::prelude::SharedShape;

use crate::core::math;

/// Convex radius used by [`ShapeSettings::box_shape`]
pub const DEFAULT_CONVEX_RADIUS: f32 = 0.01;

/// Triangles with less area than this are rejected as degenerate
const MIN_TRIANGLE_AREA: f32 = 1.0e-9;

/// Reasons a description fails validation at freeze time
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeValidationError {
    #[error("{what} must be finite")]
    NonFinite { what: &'static str },

    #[error("radius must be positive, got {0}")]
    NonPositiveRadius(f32),

    #[error("half extents must be positive, got {0:?}")]
    NonPositiveHalfExtent([f32; 3]),

    #[error("convex radius {radius} must be in [0, {limit})")]
    ConvexRadiusOutOfRange { radius: f32, limit: f32 },

    #[error("density must be positive, got {0}")]
    NonPositiveDensity(f32),

    #[error("mesh has no vertices or no triangles")]
    EmptyMesh,

    #[error("triangle {triangle} references vertex {index} but mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("triangle {0} is degenerate")]
    DegenerateTriangle(usize),

    #[error("edge ({0}, {1}) is shared by more than two triangles")]
    NonManifoldEdge(u32, u32),

    #[error("convex hull needs at least 4 points, got {0}")]
    TooFewHullPoints(usize),

    #[error("convex hull could not be built from the given points")]
    HullConstructionFailed,

    #[error("convex hull encloses no volume")]
    DegenerateHull,

    #[error("static compound has no sub-shapes")]
    EmptyCompound,

    #[error("sub-shape {index} is a {kind:?}, which cannot be nested in a compound")]
    NestedComposite { index: usize, kind: ShapeKind },
}

/// Variant tag shared by descriptions and frozen shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Sphere,
    Box,
    Mesh,
    ConvexHull,
    StaticCompound,
}

impl ShapeKind {
    /// Composite shapes cannot be placed inside a static compound
    pub fn is_composite(self) -> bool {
        matches!(self, ShapeKind::Mesh | ShapeKind::StaticCompound)
    }
}

/// Open, not yet validated shape description
///
/// Deliberately not `Clone`: a description has a single owner until it is frozen
/// or absorbed into a compound.
#[derive(Debug)]
pub enum ShapeSettings {
    Sphere {
        radius: f32,
        density: f32,
    },
    Box {
        half_extents: Vec3,
        density: f32,
        convex_radius: f32,
    },
    /// Triangle mesh for static scenery; density is ignored and the shape is massless
    Mesh {
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        density: f32,
    },
    ConvexHull {
        points: Vec<Vec3>,
        convex_radius: f32,
        density: f32,
    },
    StaticCompound(StaticCompoundSettings),
}

impl ShapeSettings {
    pub fn sphere(radius: f32, density: f32) -> Self {
        ShapeSettings::Sphere { radius, density }
    }

    /// Box with the default convex radius
    pub fn box_shape(half_extents: Vec3, density: f32) -> Self {
        Self::rounded_box(half_extents, density, DEFAULT_CONVEX_RADIUS)
    }

    /// Box whose edges are rounded by `convex_radius`, kept inside the half extents
    pub fn rounded_box(half_extents: Vec3, density: f32, convex_radius: f32) -> Self {
        ShapeSettings::Box {
            half_extents,
            density,
            convex_radius,
        }
    }

    pub fn mesh(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>, density: f32) -> Self {
        ShapeSettings::Mesh {
            vertices,
            triangles,
            density,
        }
    }

    pub fn convex_hull(points: Vec<Vec3>, convex_radius: f32, density: f32) -> Self {
        ShapeSettings::ConvexHull {
            points,
            convex_radius,
            density,
        }
    }

    /// Start an empty static compound
    pub fn static_compound() -> Self {
        ShapeSettings::StaticCompound(StaticCompoundSettings::new())
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeSettings::Sphere { .. } => ShapeKind::Sphere,
            ShapeSettings::Box { .. } => ShapeKind::Box,
            ShapeSettings::Mesh { .. } => ShapeKind::Mesh,
            ShapeSettings::ConvexHull { .. } => ShapeKind::ConvexHull,
            ShapeSettings::StaticCompound(_) => ShapeKind::StaticCompound,
        }
    }

    /// Move `sub_shape` into this compound at the given local pose
    ///
    /// # Panics
    /// Adding to anything but a static compound is a contract violation. Use
    /// [`StaticCompoundSettings::add`] to have the type system rule that out.
    pub fn compound_add(&mut self, sub_shape: ShapeSettings, offset: Vec3, rotation: Quat) {
        match self {
            ShapeSettings::StaticCompound(compound) => {
                compound.add(sub_shape, offset, rotation);
            }
            other => super::contract_violation!(
                "compound_add on a {:?} description",
                other.kind()
            ),
        }
    }

    /// Validate the description and turn it into an immutable shape
    ///
    /// Takes the description by value, so it can never be frozen twice or
    /// edited afterwards:
    ///
    /// ```compile_fail
    /// use sfsim_physics::ShapeSettings;
    ///
    /// let settings = ShapeSettings::sphere(1.0, 1.0);
    /// let _first = settings.freeze();
    /// let _second = settings.freeze(); // use of moved value
    /// ```
    pub fn freeze(self) -> Result<ShapeHandle, ShapeValidationError> {
        let kind = self.kind();
        let (shape, mass_properties, sub_shapes) = match self {
            ShapeSettings::StaticCompound(compound) => {
                let sub_shapes = compound.len();
                let (shape, mass_properties) = compound.build()?;
                (shape, mass_properties, sub_shapes)
            }
            simple => {
                let (shape, mass_properties) = simple.build_simple()?;
                (shape, mass_properties, 0)
            }
        };

        log::trace!(
            "froze {:?} shape (mass {:.3}, {} sub-shapes)",
            kind,
            mass_properties.mass(),
            sub_shapes
        );

        Ok(ShapeHandle {
            inner: Arc::new(FrozenShape {
                kind,
                shape,
                mass_properties,
                sub_shapes,
            }),
        })
    }

    fn build_simple(self) -> Result<(SharedShape, MassProperties), ShapeValidationError> {
        match self {
            ShapeSettings::Sphere { radius, density } => {
                check_finite("radius", radius)?;
                if radius <= 0.0 {
                    return Err(ShapeValidationError::NonPositiveRadius(radius));
                }
                check_density(density)?;
                Ok((
                    SharedShape::ball(radius),
                    MassProperties::from_ball(density, radius),
                ))
            }

            ShapeSettings::Box {
                half_extents,
                density,
                convex_radius,
            } => {
                if !math::is_finite_vec3(half_extents) {
                    return Err(ShapeValidationError::NonFinite {
                        what: "half extents",
                    });
                }
                check_finite("convex radius", convex_radius)?;
                if half_extents.min_element() <= 0.0 {
                    return Err(ShapeValidationError::NonPositiveHalfExtent(
                        half_extents.to_array(),
                    ));
                }
                let limit = half_extents.min_element();
                if convex_radius < 0.0 || convex_radius >= limit {
                    return Err(ShapeValidationError::ConvexRadiusOutOfRange {
                        radius: convex_radius,
                        limit,
                    });
                }
                check_density(density)?;

                let shape = if convex_radius > 0.0 {
                    let inner = half_extents - Vec3::splat(convex_radius);
                    SharedShape::round_cuboid(inner.x, inner.y, inner.z, convex_radius)
                } else {
                    SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
                };
                // Mass from the outer box so rounding does not lose volume
                let mass_properties =
                    MassProperties::from_cuboid(density, math::to_na_vector(half_extents));
                Ok((shape, mass_properties))
            }

            ShapeSettings::Mesh {
                vertices,
                triangles,
                density: _,
            } => {
                validate_mesh(&vertices, &triangles)?;
                let points: Vec<Point3<f32>> = vertices.into_iter().map(math::to_na_point).collect();
                Ok((SharedShape::trimesh(points, triangles), massless()))
            }

            ShapeSettings::ConvexHull {
                points,
                convex_radius,
                density,
            } => {
                if points.len() < 4 {
                    return Err(ShapeValidationError::TooFewHullPoints(points.len()));
                }
                if !points.iter().all(|p| math::is_finite_vec3(*p)) {
                    return Err(ShapeValidationError::NonFinite { what: "hull points" });
                }
                check_finite("convex radius", convex_radius)?;
                if convex_radius < 0.0 {
                    return Err(ShapeValidationError::ConvexRadiusOutOfRange {
                        radius: convex_radius,
                        limit: f32::INFINITY,
                    });
                }
                check_density(density)?;

                let points: Vec<Point3<f32>> = points.into_iter().map(math::to_na_point).collect();
                // Coincident input makes the hull builder fail; keep that an error, not a panic
                let (vertices, faces) = try_convex_hull(&points)
                    .map_err(|_| ShapeValidationError::HullConstructionFailed)?;
                let shape = if convex_radius > 0.0 {
                    SharedShape::round_convex_mesh(vertices, &faces, convex_radius)
                } else {
                    SharedShape::convex_mesh(vertices, &faces)
                }
                .ok_or(ShapeValidationError::HullConstructionFailed)?;

                let mass_properties = shape.mass_properties(density);
                if mass_properties.mass() <= f32::EPSILON {
                    return Err(ShapeValidationError::DegenerateHull);
                }
                Ok((shape, mass_properties))
            }

            ShapeSettings::StaticCompound(compound) => compound.build(),
        }
    }
}

impl From<StaticCompoundSettings> for ShapeSettings {
    fn from(compound: StaticCompoundSettings) -> Self {
        ShapeSettings::StaticCompound(compound)
    }
}

#[derive(Debug)]
struct CompoundPart {
    settings: ShapeSettings,
    offset: Vec3,
    rotation: Quat,
}

/// Static compound under construction: an ordered list of owned sub-descriptions
#[derive(Debug, Default)]
pub struct StaticCompoundSettings {
    parts: Vec<CompoundPart>,
}

impl StaticCompoundSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a sub-description; it is frozen together with the compound
    pub fn add(&mut self, sub_shape: ShapeSettings, offset: Vec3, rotation: Quat) -> &mut Self {
        self.parts.push(CompoundPart {
            settings: sub_shape,
            offset,
            rotation,
        });
        self
    }

    /// Builder-style variant of [`StaticCompoundSettings::add`]
    pub fn with(mut self, sub_shape: ShapeSettings, offset: Vec3, rotation: Quat) -> Self {
        self.add(sub_shape, offset, rotation);
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn freeze(self) -> Result<ShapeHandle, ShapeValidationError> {
        ShapeSettings::from(self).freeze()
    }

    fn build(self) -> Result<(SharedShape, MassProperties), ShapeValidationError> {
        if self.parts.is_empty() {
            return Err(ShapeValidationError::EmptyCompound);
        }

        let mut shapes = Vec::with_capacity(self.parts.len());
        let mut mass_properties = massless();

        for (index, part) in self.parts.into_iter().enumerate() {
            let kind = part.settings.kind();
            if kind.is_composite() {
                return Err(ShapeValidationError::NestedComposite { index, kind });
            }
            if !math::is_finite_vec3(part.offset) || !part.rotation.is_finite() {
                return Err(ShapeValidationError::NonFinite {
                    what: "sub-shape pose",
                });
            }

            let (shape, sub_mass) = part.settings.build_simple()?;
            let rotation = part.rotation.normalize();
            let pose = Isometry3::from_parts(
                Translation3::from(math::to_na_vector(part.offset)),
                UnitQuaternion::new_normalize(rapier3d::na::Quaternion::new(
                    rotation.w, rotation.x, rotation.y, rotation.z,
                )),
            );

            mass_properties += sub_mass.transform_by(&pose);
            shapes.push((pose, shape));
        }

        Ok((SharedShape::compound(shapes), mass_properties))
    }
}

fn massless() -> MassProperties {
    MassProperties::new(Point3::origin(), 0.0, Vector3::zeros())
}

fn check_finite(what: &'static str, value: f32) -> Result<(), ShapeValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ShapeValidationError::NonFinite { what })
    }
}

fn check_density(density: f32) -> Result<(), ShapeValidationError> {
    check_finite("density", density)?;
    if density <= 0.0 {
        return Err(ShapeValidationError::NonPositiveDensity(density));
    }
    Ok(())
}

/// Reject empty meshes, bad indices, zero-area triangles and non-manifold edges
fn validate_mesh(vertices: &[Vec3], triangles: &[[u32; 3]]) -> Result<(), ShapeValidationError> {
    if vertices.is_empty() || triangles.is_empty() {
        return Err(ShapeValidationError::EmptyMesh);
    }
    if !vertices.iter().all(|v| math::is_finite_vec3(*v)) {
        return Err(ShapeValidationError::NonFinite {
            what: "mesh vertices",
        });
    }

    let mut edge_use: HashMap<(u32, u32), u32> = HashMap::with_capacity(triangles.len() * 3);

    for (t, tri) in triangles.iter().enumerate() {
        for &index in tri {
            if index as usize >= vertices.len() {
                return Err(ShapeValidationError::IndexOutOfRange {
                    triangle: t,
                    index,
                    vertex_count: vertices.len(),
                });
            }
        }

        let [a, b, c] = tri.map(|i| vertices[i as usize]);
        if (b - a).cross(c - a).length() * 0.5 < MIN_TRIANGLE_AREA {
            return Err(ShapeValidationError::DegenerateTriangle(t));
        }

        for (i, j) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let edge = (i.min(j), i.max(j));
            let count = edge_use.entry(edge).or_insert(0);
            *count += 1;
            if *count > 2 {
                return Err(ShapeValidationError::NonManifoldEdge(edge.0, edge.1));
            }
        }
    }

    Ok(())
}

struct FrozenShape {
    kind: ShapeKind,
    shape: SharedShape,
    mass_properties: MassProperties,
    sub_shapes: usize,
}

/// Immutable, reference-counted shape
///
/// Cloning shares the same frozen shape. Every body created from it holds one
/// reference; the shape is released when the last holder goes away.
#[derive(Clone)]
pub struct ShapeHandle {
    inner: Arc<FrozenShape>,
}

impl ShapeHandle {
    pub fn kind(&self) -> ShapeKind {
        self.inner.kind
    }

    /// Mass in kilograms; zero for massless scenery meshes
    pub fn mass(&self) -> f32 {
        self.inner.mass_properties.mass()
    }

    /// Center of mass in shape-local space
    pub fn center_of_mass(&self) -> Vec3 {
        let com = self.inner.mass_properties.local_com;
        Vec3::new(com.x, com.y, com.z)
    }

    /// Inertia tensor about the center of mass, in shape-local axes
    pub fn inertia_tensor(&self) -> DMat3 {
        math::from_na_matrix3(&self.inner.mass_properties.reconstruct_inertia_matrix())
    }

    /// Number of sub-shapes for a static compound, zero otherwise
    pub fn sub_shape_count(&self) -> usize {
        self.inner.sub_shapes
    }

    /// Number of live references to this shape (caller copies plus bodies)
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two handles refer to the same frozen shape
    pub fn ptr_eq(&self, other: &ShapeHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn shared_shape(&self) -> &SharedShape {
        &self.inner.shape
    }

    pub(crate) fn mass_properties(&self) -> MassProperties {
        self.inner.mass_properties
    }

    /// Weak references to the kernel shape and, for compounds, each sub-shape
    #[cfg(test)]
    pub(crate) fn kernel_refs(&self) -> Vec<std::sync::Weak<dyn rapier3d::parry::shape::Shape>> {
        use rapier3d::parry::shape::Compound;

        let mut refs = vec![Arc::downgrade(&self.inner.shape.0)];
        if let Some(compound) = self.inner.shape.as_shape::<Compound>() {
            refs.extend(compound.shapes().iter().map(|(_, s)| Arc::downgrade(&s.0)));
        }
        refs
    }
}

impl fmt::Debug for ShapeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeHandle")
            .field("kind", &self.inner.kind)
            .field("mass", &self.mass())
            .field("sub_shapes", &self.inner.sub_shapes)
            .finish()
    }
}
