/// One vertex: position, texture coordinate, normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    pub normal: [f32; 3],
}

/// Indexed triangle list with counter-clockwise front faces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Unit cube centered on the origin, one quad per face.
    pub fn cube() -> Self {
        let p = 0.5_f32;
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-p, -p, p], [p, -p, p], [p, p, p], [-p, p, p]]),
            ([0.0, 0.0, -1.0], [[p, -p, -p], [-p, -p, -p], [-p, p, -p], [p, p, -p]]),
            ([1.0, 0.0, 0.0], [[p, -p, p], [p, -p, -p], [p, p, -p], [p, p, p]]),
            ([-1.0, 0.0, 0.0], [[-p, -p, -p], [-p, -p, p], [-p, p, p], [-p, p, -p]]),
            ([0.0, 1.0, 0.0], [[-p, p, p], [p, p, p], [p, p, -p], [-p, p, -p]]),
            ([0.0, -1.0, 0.0], [[-p, -p, -p], [p, -p, -p], [p, -p, p], [-p, -p, p]]),
        ];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut mesh = Self::default();
        for (normal, corners) in faces {
            let base = mesh.vertices.len() as u32;
            for (position, tex_coord) in corners.into_iter().zip(uvs) {
                mesh.vertices.push(Vertex {
                    position,
                    tex_coord,
                    normal,
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        mesh
    }

    /// Square in the XZ plane spanning `[-1, 1]`, facing +Y.
    ///
    /// Texture coordinates run from `uv_min` to `uv_max`, so a range larger
    /// than one tiles a repeating texture.
    pub fn plane(uv_min: [f32; 2], uv_max: [f32; 2]) -> Self {
        let normal = [0.0, 1.0, 0.0];
        let corners = [
            ([-1.0, 0.0, 1.0], [uv_min[0], uv_min[1]]),
            ([1.0, 0.0, 1.0], [uv_max[0], uv_min[1]]),
            ([1.0, 0.0, -1.0], [uv_max[0], uv_max[1]]),
            ([-1.0, 0.0, -1.0], [uv_min[0], uv_max[1]]),
        ];
        Self {
            vertices: corners
                .into_iter()
                .map(|(position, tex_coord)| Vertex {
                    position,
                    tex_coord,
                    normal,
                })
                .collect(),
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }
}
