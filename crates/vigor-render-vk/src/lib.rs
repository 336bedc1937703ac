// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device setup, staged uploads, the presentable chain and
//! the per-window frame loop.
#![deny(unsafe_op_in_unsafe_fn)]

mod descriptors;
mod device;
mod error;
mod frame;
mod pipeline;
mod renderer;
mod slots;
mod surface;
mod upload;

pub use descriptors::{DescriptorBinder, TEXTURE_BINDING, UNIFORM_BINDING};
pub use device::{
    find_memory_type, pick_device, DeviceContext, DeviceProfile, DeviceRequirements,
    QueueFamilyIndices,
};
pub use error::{Result, VkError};
pub use frame::{
    viewport_for, AcquireOutcome, FrameBackend, FrameScheduler, PresentOutcome, TickOutcome,
    MAX_FRAMES_IN_FLIGHT,
};
pub use pipeline::{GraphicsPipeline, RenderPass};
pub use renderer::{
    RendererOptions, SceneAssets, VkFrameBackend, VkSurfaceRenderer, DEFAULT_CLEAR_COLOR,
};
pub use slots::{FrameSlot, FrameSlots};
pub use surface::{
    choose_composite_alpha, choose_extent, choose_image_count, choose_present_mode,
    choose_sharing, choose_surface_format, first_depth_format, pick_depth_format,
    PresentPreference, PresentSurface, SharingPlan, SurfaceChain, SurfaceSupport,
    DEPTH_CANDIDATES, PREFERRED_SURFACE_FORMAT,
};
pub use upload::{
    aspect_for, has_stencil, is_depth, mip_level_count, plan_mip_chain, supports_linear_blit,
    transition_masks, GpuBuffer, GpuImage, MipStep, ResourceUploader, Texture, TransitionMasks,
    TEXTURE_FORMAT,
};

pub use ash::vk;
