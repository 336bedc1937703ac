// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

pub type Result<T, E = VkError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("{op} failed: {code}")]
    Api { op: &'static str, code: vk::Result },

    #[error("buffer creation failed ({size} bytes, {usage:?}): {code}")]
    BufferCreateFailed {
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        code: vk::Result,
    },

    #[error("device memory allocation of {size} bytes failed: {code}")]
    AllocationFailed { size: vk::DeviceSize, code: vk::Result },

    #[error("no memory type in {type_bits:#034b} has {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("no physical device satisfies the renderer's requirements")]
    NoSuitableDevice,

    #[error("queue families incomplete: {0}")]
    IncompleteQueueFamilies(&'static str),

    #[error("surface can't be presented from queue family {0}")]
    SurfaceNotSupported(u32),

    #[error("zero-sized {0} requested")]
    ZeroSized(&'static str),

    #[error("upload of {len} bytes exceeds the {capacity}-byte destination")]
    UploadTooLarge {
        len: vk::DeviceSize,
        capacity: vk::DeviceSize,
    },

    #[error("no depth format supports optimal-tiling depth attachments")]
    NoDepthFormat,

    #[error("unsupported image layout transition {old:?} -> {new:?}")]
    UnsupportedTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    #[error("format {0:?} does not support linear blits")]
    UnsupportedBlitFormat(vk::Format),

    #[error("acquired image {0} has no framebuffer")]
    NoFramebuffer(u32),

    #[error("invalid SPIR-V: {0}")]
    Spirv(#[source] std::io::Error),

    #[error(transparent)]
    Asset(#[from] vigor_render::AssetError),

    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),
}

impl VkError {
    /// Raw result code for API failures, if any.
    pub fn code(&self) -> Option<vk::Result> {
        match self {
            VkError::Api { code, .. }
            | VkError::BufferCreateFailed { code, .. }
            | VkError::AllocationFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Tags a raw `vk::Result` with the call that produced it.
pub(crate) trait VkResultExt<T> {
    fn op(self, op: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn op(self, op: &'static str) -> Result<T> {
        self.map_err(|code| VkError::Api { op, code })
    }
}
