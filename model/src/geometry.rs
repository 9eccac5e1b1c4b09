use glam::{vec2, Vec2, Vec3};

/// The UVs assigned to a legacy face without explicit UVs.
pub const DEFAULT_UVS: [Vec2; 3] = [Vec2::ZERO, Vec2::X, Vec2::Y];

/// Flips the V coordinate of a UV.
///
/// UVs are authored with V pointing up while rasterized textures have their origin in the top
/// left corner. Every UV entering a mesh is flipped exactly once, textures are uploaded
/// unflipped (see [`crate::legend::FLIP_Y`]).
#[must_use]
pub fn flip_v(uv: Vec2) -> Vec2 {
    vec2(uv.x, 1.0 - uv.y)
}

/// A contiguous range of indices drawn with the same material.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaterialGroup {
    /// The first index of the range.
    pub start: usize,
    /// The number of indices in the range.
    pub count: usize,
    /// The material used for the range.
    pub material_index: usize,
}

/// A render-ready triangle mesh with per-material draw ranges.
///
/// Vertices are never shared between triangles, so every triangle has its own UVs and a flat
/// normal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexedMesh {
    /// The vertex positions.
    pub positions: Vec<Vec3>,
    /// The vertex normals.
    pub normals: Vec<Vec3>,
    /// The vertex UVs, V pointing down.
    pub uvs: Vec<Vec2>,
    /// The triangle indices.
    pub indices: Vec<u32>,
    /// The material draw ranges, covering all indices in order.
    pub groups: Vec<MaterialGroup>,
}

impl IndexedMesh {
    /// Returns the number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Returns the axis aligned bounding box of the mesh, [`None`] if it is empty.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().copied())
    }

    /// Returns the material index used by the triangle with the given index.
    #[must_use]
    pub fn material_of_triangle(&self, triangle: usize) -> Option<usize> {
        let index = triangle * 3;

        self.groups
            .iter()
            .find(|group| (group.start..group.start + group.count).contains(&index))
            .map(|group| group.material_index)
    }

    /// Returns the distinct material indices in order of first use.
    #[must_use]
    pub fn material_indices(&self) -> Vec<usize> {
        let mut materials = Vec::new();
        for group in &self.groups {
            if !materials.contains(&group.material_index) {
                materials.push(group.material_index);
            }
        }

        materials
    }

    /// Returns the positions of the triangle with the given index.
    ///
    /// # Panics
    ///
    /// Panics if the triangle index is out of range.
    #[must_use]
    pub fn triangle(&self, triangle: usize) -> [Vec3; 3] {
        let index = triangle * 3;
        [0, 1, 2].map(|offset| self.positions[self.indices[index + offset] as usize])
    }

    /// Applies a function to all positions and recomputes the normals.
    pub fn map_positions(&mut self, function: impl Fn(Vec3) -> Vec3) {
        for position in &mut self.positions {
            *position = function(*position);
        }
        self.compute_normals();
    }

    /// Computes flat per-triangle normals.
    pub fn compute_normals(&mut self) {
        self.normals.clear();
        self.normals.resize(self.positions.len(), Vec3::ZERO);

        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|offset| triangle[offset] as usize);
            let normal = face_normal([self.positions[a], self.positions[b], self.positions[c]]);
            for index in [a, b, c] {
                self.normals[index] = normal;
            }
        }
    }
}

/// Returns the normalized normal of a counterclockwise triangle, zero if it is degenerate.
#[must_use]
pub fn face_normal([a, b, c]: [Vec3; 3]) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Incrementally assembles an [`IndexedMesh`] from triangles.
#[derive(Default)]
pub struct MeshBuilder {
    mesh: IndexedMesh,
}

impl MeshBuilder {
    /// Creates an empty mesh builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counterclockwise triangle with authored UVs using the given material.
    pub fn push_triangle(&mut self, positions: [Vec3; 3], uvs: [Vec2; 3], material_index: usize) {
        let mesh = &mut self.mesh;
        let start = mesh.indices.len();
        let first_vertex =
            u32::try_from(mesh.positions.len()).expect("vertex count should fit in u32");

        mesh.positions.extend(positions);
        mesh.uvs.extend(uvs.map(flip_v));
        mesh.indices
            .extend([first_vertex, first_vertex + 1, first_vertex + 2]);

        match mesh.groups.last_mut() {
            Some(group)
                if group.material_index == material_index && group.start + group.count == start =>
            {
                group.count += 3;
            }
            _ => mesh.groups.push(MaterialGroup {
                start,
                count: 3,
                material_index,
            }),
        }
    }

    /// Adds a counterclockwise quad as two triangles using the given material.
    pub fn push_quad(&mut self, positions: [Vec3; 4], uvs: [Vec2; 4], material_index: usize) {
        let [a, b, c, d] = positions;
        let [uv_a, uv_b, uv_c, uv_d] = uvs;

        self.push_triangle([a, b, c], [uv_a, uv_b, uv_c], material_index);
        self.push_triangle([a, c, d], [uv_a, uv_c, uv_d], material_index);
    }

    /// Appends all triangles of another mesh, keeping their materials.
    pub fn append(&mut self, other: &IndexedMesh) {
        for group in &other.groups {
            for index in (group.start..group.start + group.count).step_by(3) {
                let vertices = [0, 1, 2].map(|offset| other.indices[index + offset] as usize);
                let positions = vertices.map(|vertex| other.positions[vertex]);
                // Stored UVs are already flipped, flip back to authored UVs
                let uvs = vertices.map(|vertex| flip_v(other.uvs[vertex]));

                self.push_triangle(positions, uvs, group.material_index);
            }
        }
    }

    /// Returns the number of triangles added so far.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.mesh.triangle_count()
    }

    /// Finishes the mesh by computing its normals.
    #[must_use]
    pub fn build(mut self) -> IndexedMesh {
        self.mesh.compute_normals();
        self.mesh
    }
}

/// A face of a legacy geometry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Face {
    /// The vertex indices in counterclockwise order.
    pub vertices: [usize; 3],
    /// The material index of the face.
    pub material_index: usize,
    /// The authored UVs of the three corners.
    pub uvs: Option<[Vec2; 3]>,
}

impl Face {
    /// Creates a new face using material 0 and default UVs.
    #[must_use]
    pub fn new(a: usize, b: usize, c: usize) -> Self {
        Self {
            vertices: [a, b, c],
            material_index: 0,
            uvs: None,
        }
    }

    /// Sets the material index of the face.
    #[must_use]
    pub fn with_material(mut self, material_index: usize) -> Self {
        self.material_index = material_index;
        self
    }

    /// Sets the authored UVs of the face.
    #[must_use]
    pub fn with_uvs(mut self, uvs: [Vec2; 3]) -> Self {
        self.uvs = Some(uvs);
        self
    }
}

/// An immediate-mode geometry description made of shared vertices and indexed faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyGeometry {
    /// The vertex positions.
    pub vertices: Vec<Vec3>,
    /// The faces referencing the vertices.
    pub faces: Vec<Face>,
}

/// Compiles a legacy geometry into an indexed mesh.
///
/// Faces are emitted in their original order with unshared vertices, runs of faces using the
/// same material become one material group.
///
/// # Panics
///
/// Panics if a face references a vertex that does not exist, which indicates a bug in the
/// builder that created the geometry.
#[must_use]
pub fn compile(geometry: &LegacyGeometry) -> IndexedMesh {
    let mut builder = MeshBuilder::new();

    for (index, face) in geometry.faces.iter().enumerate() {
        let positions = face.vertices.map(|vertex| {
            *geometry.vertices.get(vertex).unwrap_or_else(|| {
                panic!(
                    "face {index} references vertex {vertex} but the geometry only has {} vertices",
                    geometry.vertices.len()
                )
            })
        });

        builder.push_triangle(
            positions,
            face.uvs.unwrap_or(DEFAULT_UVS),
            face.material_index,
        );
    }

    builder.build()
}

/// An axis aligned bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    /// The minimum corner.
    pub min: Vec3,
    /// The maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Creates the smallest bounding box containing all given points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |bounds, point| {
            Some(match bounds {
                Some(Aabb { min, max }) => Aabb {
                    min: min.min(point),
                    max: max.max(point),
                },
                None => Aabb {
                    min: point,
                    max: point,
                },
            })
        })
    }

    /// Returns the size of the bounding box.
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Returns the center of the bounding box.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) / 2.0
    }
}
