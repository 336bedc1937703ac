// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use vigor_render_vk::{PresentPreference, DEFAULT_CLEAR_COLOR};

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub assets: AssetsCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub count: u32,
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            count: 1,
            width: 1280,
            height: 720,
            title: "vigor".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeCfg,
    pub require_discrete_gpu: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            clear_color: DEFAULT_CLEAR_COLOR,
            present_mode: PresentModeCfg::default(),
            require_discrete_gpu: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Mailbox,
    Fifo,
}

impl From<PresentModeCfg> for PresentPreference {
    fn from(mode: PresentModeCfg) -> Self {
        match mode {
            PresentModeCfg::Mailbox => PresentPreference::Mailbox,
            PresentModeCfg::Fifo => PresentPreference::Fifo,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AssetsCfg {
    /// SPIR-V files; the shaders built into the binary when unset.
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
    /// PNG to sample; the built-in checkerboard when unset.
    pub texture: Option<PathBuf>,
}

impl AppConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config")
    }

    /// A missing file means defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                Self::parse(&text).with_context(|| format!("loading {}", path.display()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(AppConfig::parse("").unwrap(), AppConfig::default());
    }

    #[test]
    fn full_file() {
        let cfg = AppConfig::parse(
            r#"
            [window]
            count = 2
            width = 800
            height = 600
            title = "demo"

            [render]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            present_mode = "fifo"
            require_discrete_gpu = true

            [assets]
            vertex_shader = "a.vert.spv"
            fragment_shader = "a.frag.spv"
            texture = "tex.png"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.count, 2);
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(cfg.render.present_mode, PresentModeCfg::Fifo);
        assert!(cfg.render.require_discrete_gpu);
        assert_eq!(cfg.assets.vertex_shader, Some(PathBuf::from("a.vert.spv")));
        assert_eq!(cfg.assets.texture, Some(PathBuf::from("tex.png")));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = AppConfig::parse("[window]\nwidth = 640\n").unwrap();
        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.window.height, 720);
        assert_eq!(cfg.window.count, 1);
        assert_eq!(cfg.render.present_mode, PresentModeCfg::Mailbox);
        assert_eq!(cfg.assets.vertex_shader, None);
    }

    #[test]
    fn unknown_present_mode_is_rejected() {
        assert!(AppConfig::parse("[render]\npresent_mode = \"immediate\"\n").is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let cfg = AppConfig::load(Path::new("definitely/not/here/vigor.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn present_mode_maps_to_preference() {
        assert_eq!(
            PresentPreference::from(PresentModeCfg::Fifo),
            PresentPreference::Fifo
        );
        assert_eq!(
            PresentPreference::from(PresentModeCfg::default()),
            PresentPreference::Mailbox
        );
    }
}
