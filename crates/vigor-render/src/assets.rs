// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("mesh has no indices")]
    EmptyMesh,
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("texture has a zero dimension ({width}x{height})")]
    ZeroSizedTexture { width: u32, height: u32 },
    #[error("texture expects {expected} bytes of RGBA8, got {actual}")]
    PixelSizeMismatch { expected: usize, actual: usize },
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(pos: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self { pos, color, uv }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Two textured quads stacked half a unit apart on Z.
    pub fn demo_quads() -> Self {
        let quad = |z: f32| {
            [
                Vertex::new([-0.5, -0.5, z], [1.0, 0.0, 0.0], [1.0, 0.0]),
                Vertex::new([0.5, -0.5, z], [0.0, 1.0, 0.0], [0.0, 0.0]),
                Vertex::new([0.5, 0.5, z], [0.0, 0.0, 1.0], [0.0, 1.0]),
                Vertex::new([-0.5, 0.5, z], [1.0, 1.0, 1.0], [1.0, 1.0]),
            ]
        };
        let mut vertices = Vec::with_capacity(8);
        vertices.extend_from_slice(&quad(0.0));
        vertices.extend_from_slice(&quad(-0.5));

        Self {
            vertices,
            indices: vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4],
        }
    }

    pub fn validate(&self) -> Result<(), AssetError> {
        if self.indices.is_empty() {
            return Err(AssetError::EmptyMesh);
        }
        let vertex_count = self.vertices.len();
        match self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            Some(&index) => Err(AssetError::IndexOutOfRange {
                index,
                vertex_count,
            }),
            None => Ok(()),
        }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Decoded RGBA8 pixels, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, AssetError> {
        if width == 0 || height == 0 {
            return Err(AssetError::ZeroSizedTexture { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(AssetError::PixelSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Light/dark grey checkerboard with square cells of `cell` pixels.
    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let size = size.max(1);
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let v = if ((x / cell) + (y / cell)) % 2 == 0 {
                    0xE0
                } else {
                    0x30
                };
                pixels.extend_from_slice(&[v, v, v, 0xFF]);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 24);
    }

    #[test]
    fn demo_quads_are_valid() {
        let m = MeshData::demo_quads();
        assert_eq!(m.vertices.len(), 8);
        assert_eq!(m.index_count(), 12);
        assert_eq!(m.validate(), Ok(()));
        assert_eq!(m.vertex_bytes().len(), 8 * 32);
        assert_eq!(m.index_bytes().len(), 12 * 4);
        assert!(m.vertices[4..].iter().all(|v| v.pos[2] == -0.5));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut m = MeshData::demo_quads();
        m.indices.push(8);
        assert_eq!(
            m.validate(),
            Err(AssetError::IndexOutOfRange {
                index: 8,
                vertex_count: 8
            })
        );
        assert_eq!(MeshData::default().validate(), Err(AssetError::EmptyMesh));
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let t = TextureData::checkerboard(256, 32);
        assert_eq!((t.width(), t.height()), (256, 256));
        assert_eq!(t.pixels().len(), 256 * 256 * 4);
        let at = |x: usize, y: usize| t.pixels()[(y * 256 + x) * 4];
        assert_eq!(at(0, 0), 0xE0);
        assert_eq!(at(32, 0), 0x30);
        assert_eq!(at(32, 32), 0xE0);
        assert_eq!(t.pixels()[3], 0xFF);
    }

    #[test]
    fn texture_size_is_checked() {
        assert_eq!(
            TextureData::new(2, 2, vec![0; 15]),
            Err(AssetError::PixelSizeMismatch {
                expected: 16,
                actual: 15
            })
        );
        assert_eq!(
            TextureData::new(0, 2, vec![]),
            Err(AssetError::ZeroSizedTexture {
                width: 0,
                height: 2
            })
        );
        assert!(TextureData::new(1, 1, vec![1, 2, 3, 4]).is_ok());
    }
}
