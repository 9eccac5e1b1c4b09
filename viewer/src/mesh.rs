use std::{collections::HashMap, sync::Arc};

use log::debug;
use model::{geometry::IndexedMesh, Texture, TextureKey};
use three_d::{
    vec2, vec3, Context, CpuMesh, CpuTexture, Indices, Interpolation, Positions, Texture2D,
    TextureData, Wrapping,
};

/// Splits a mesh into one CPU mesh per material group, returned with their material indices.
pub fn cpu_meshes(mesh: &IndexedMesh) -> Vec<(usize, CpuMesh)> {
    mesh.groups
        .iter()
        .map(|group| {
            let indices = &mesh.indices[group.start..group.start + group.count];
            let vertices = || indices.iter().map(|&index| index as usize);

            let cpu_mesh = CpuMesh {
                positions: Positions::F32(
                    vertices()
                        .map(|index| {
                            let position = mesh.positions[index];
                            vec3(position.x, position.y, position.z)
                        })
                        .collect(),
                ),
                indices: Indices::None,
                normals: Some(
                    vertices()
                        .map(|index| {
                            let normal = mesh.normals[index];
                            vec3(normal.x, normal.y, normal.z)
                        })
                        .collect(),
                ),
                uvs: Some(
                    vertices()
                        .map(|index| {
                            let uv = mesh.uvs[index];
                            vec2(uv.x, uv.y)
                        })
                        .collect(),
                ),
                ..Default::default()
            };

            (group.material_index, cpu_mesh)
        })
        .collect()
}

/// Converts a rasterized texture to a CPU texture.
///
/// Rows are uploaded top first, matching the V direction of mesh UVs.
pub fn cpu_texture(name: &str, texture: &Texture) -> CpuTexture {
    let pixels = texture
        .data()
        .chunks_exact(4)
        .map(|pixel| [pixel[0], pixel[1], pixel[2], pixel[3]])
        .collect();

    CpuTexture {
        name: name.to_owned(),
        data: TextureData::RgbaU8(pixels),
        width: texture.width(),
        height: texture.height(),
        min_filter: Interpolation::Linear,
        mag_filter: Interpolation::Linear,
        wrap_s: Wrapping::ClampToEdge,
        wrap_t: Wrapping::ClampToEdge,
        ..Default::default()
    }
}

/// GPU textures shared between keys with the same appearance.
#[derive(Default)]
pub struct TextureCache {
    textures: HashMap<TextureKey, Arc<Texture2D>>,
}

impl TextureCache {
    /// Returns the GPU texture for the given key, uploading it if necessary.
    pub fn get_or_upload(
        &mut self,
        context: &Context,
        key: &TextureKey,
        texture: &Texture,
    ) -> Arc<Texture2D> {
        if let Some(uploaded) = self.textures.get(key) {
            return Arc::clone(uploaded);
        }

        debug!("Uploading texture for {key:?}");
        let uploaded = Arc::new(Texture2D::new(context, &cpu_texture("key", texture)));
        self.textures.insert(key.clone(), Arc::clone(&uploaded));

        uploaded
    }

    /// Drops all textures not in use by any key.
    pub fn retain(&mut self, used: impl Fn(&TextureKey) -> bool) {
        self.textures.retain(|key, _| used(key));
    }

    /// Drops all textures.
    pub fn clear(&mut self) {
        self.textures.clear();
    }

    /// Returns the number of uploaded textures.
    pub fn len(&self) -> usize {
        self.textures.len()
    }
}
