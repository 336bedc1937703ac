// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use vigor_render::{read_shader_bytes, MeshData, TextureData};
use vigor_render_vk::SceneAssets;

use crate::config::AssetsCfg;

pub const CHECKER_SIZE: u32 = 256;
pub const CHECKER_CELL: u32 = 32;

const BUILTIN_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
const BUILTIN_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

fn shader_bytes(path: Option<&Path>, builtin: &[u8], stage: &str) -> Result<Vec<u8>> {
    match path {
        Some(path) => read_shader_bytes(path).with_context(|| format!("{stage} shader")),
        None => Ok(builtin.to_vec()),
    }
}

pub fn load_scene(cfg: &AssetsCfg) -> Result<SceneAssets> {
    let vertex_spirv = shader_bytes(cfg.vertex_shader.as_deref(), BUILTIN_VERT, "vertex")?;
    let fragment_spirv =
        shader_bytes(cfg.fragment_shader.as_deref(), BUILTIN_FRAG, "fragment")?;
    let texture = match &cfg.texture {
        Some(path) => load_png(path)?,
        None => TextureData::checkerboard(CHECKER_SIZE, CHECKER_CELL),
    };
    Ok(SceneAssets {
        mesh: MeshData::demo_quads(),
        texture,
        vertex_spirv,
        fragment_spirv,
    })
}

pub fn load_png(path: &Path) -> Result<TextureData> {
    let img = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    info!(path = %path.display(), width, height, "texture loaded");
    Ok(TextureData::new(width, height, img.into_raw())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_decodes_to_rgba8() {
        let path = std::env::temp_dir().join(format!("vigor-scene-{}.png", std::process::id()));
        let mut img = image::RgbaImage::new(3, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.save(&path).unwrap();

        let tex = load_png(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!((tex.width(), tex.height()), (3, 2));
        assert_eq!(tex.pixels().len(), 3 * 2 * 4);
        assert_eq!(&tex.pixels()[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn missing_shader_is_reported() {
        let cfg = AssetsCfg {
            vertex_shader: Some("nope/missing.vert.spv".into()),
            ..AssetsCfg::default()
        };
        let err = load_scene(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("vertex shader"));
    }

    #[test]
    fn builtin_shaders_are_spirv() {
        let scene = load_scene(&AssetsCfg::default()).unwrap();
        for code in [&scene.vertex_spirv, &scene.fragment_spirv] {
            assert_eq!(code.len() % 4, 0);
            assert_eq!(&code[..4], &0x0723_0203u32.to_le_bytes());
        }
        assert_eq!(scene.texture.width(), CHECKER_SIZE);
        assert_eq!(scene.mesh.index_count(), 12);
    }
}
