// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use ash::{khr::surface, vk};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info, warn};
use vigor_render::RenderSize;

use crate::device::{DeviceContext, InstanceHandles};
use crate::error::{Result, VkError, VkResultExt};
use crate::upload::{create_image_view, GpuImage, ResourceUploader};

/// A window's `VkSurfaceKHR`. Must be dropped before the instance it came from.
pub struct PresentSurface {
    loader: surface::Instance,
    handle: vk::SurfaceKHR,
}

impl PresentSurface {
    pub(crate) fn create(
        instance: &InstanceHandles,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        let handle = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, display, window, None)
        }
        .op("vkCreateSurfaceKHR")?;
        Ok(Self {
            loader: instance.surface_loader.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub(crate) fn supported_by(&self, physical: vk::PhysicalDevice, family: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical, family, self.handle)
        }
        .unwrap_or(false)
    }

    pub fn support(&self, ctx: &DeviceContext) -> Result<SurfaceSupport> {
        SurfaceSupport::query(ctx.surface_loader(), ctx.physical_device(), self.handle)
    }
}

impl Drop for PresentSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

/// What a surface supports on a given physical device.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        loader: &surface::Instance,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .op("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: loader
                    .get_physical_device_surface_formats(physical, surface)
                    .op("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .op("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPreference {
    #[default]
    Mailbox,
    Fifo,
}

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(PREFERRED_SURFACE_FORMAT)
}

/// FIFO is the only mode every implementation must support.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentPreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, drawable: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: drawable
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: drawable
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&a| caps.supported_composite_alpha.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharingPlan {
    pub mode: vk::SharingMode,
    pub families: Vec<u32>,
}

pub fn choose_sharing(graphics: u32, present: u32) -> SharingPlan {
    if graphics == present {
        SharingPlan {
            mode: vk::SharingMode::EXCLUSIVE,
            families: Vec::new(),
        }
    } else {
        SharingPlan {
            mode: vk::SharingMode::CONCURRENT,
            families: vec![graphics, present],
        }
    }
}

pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub fn first_depth_format(
    mut optimal_features: impl FnMut(vk::Format) -> vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    DEPTH_CANDIDATES.into_iter().find(|&f| {
        optimal_features(f).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

pub fn pick_depth_format(ctx: &DeviceContext) -> Result<vk::Format> {
    first_depth_format(|f| ctx.format_properties(f).optimal_tiling_features)
        .ok_or(VkError::NoDepthFormat)
}

struct DepthTarget {
    image: GpuImage,
    view: vk::ImageView,
}

impl DepthTarget {
    fn new(uploader: &ResourceUploader, format: vk::Format, extent: vk::Extent2D) -> Result<Self> {
        let image = uploader.create_image_2d(
            extent.width,
            extent.height,
            1,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        uploader.transition_image_layout(
            image.handle(),
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            1,
        )?;
        let view = create_image_view(
            uploader.context(),
            image.handle(),
            format,
            vk::ImageAspectFlags::DEPTH,
            1,
        )?;
        Ok(Self { image, view })
    }
}

impl Drop for DepthTarget {
    fn drop(&mut self) {
        unsafe {
            self.image
                .context()
                .device()
                .destroy_image_view(self.view, None)
        };
    }
}

/// Swapchain plus everything sized to it: image views, the depth target and
/// one framebuffer per image for a fixed render pass.
pub struct SurfaceChain {
    ctx: Rc<DeviceContext>,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Option<DepthTarget>,
    framebuffers: Vec<vk::Framebuffer>,
    depth_format: vk::Format,
    preference: PresentPreference,
}

impl SurfaceChain {
    pub fn new(
        uploader: &ResourceUploader,
        surface: &PresentSurface,
        render_pass: vk::RenderPass,
        depth_format: vk::Format,
        drawable: RenderSize,
        preference: PresentPreference,
    ) -> Result<Self> {
        let ctx = uploader.context().clone();
        let support = surface.support(&ctx)?;
        let extent = choose_extent(&support.capabilities, drawable);
        if extent.width == 0 || extent.height == 0 {
            return Err(VkError::ZeroSized("swapchain"));
        }
        let mut chain = Self {
            ctx,
            swapchain: vk::SwapchainKHR::null(),
            format: PREFERRED_SURFACE_FORMAT,
            present_mode: vk::PresentModeKHR::FIFO,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            depth: None,
            framebuffers: Vec::new(),
            depth_format,
            preference,
        };
        chain.build(
            uploader,
            surface,
            render_pass,
            &support,
            extent,
            vk::SwapchainKHR::null(),
        )?;
        Ok(chain)
    }

    /// Replaces the chain after the surface changed. Returns `false` and keeps
    /// the old chain when the surface currently has no area.
    pub fn rebuild(
        &mut self,
        uploader: &ResourceUploader,
        surface: &PresentSurface,
        render_pass: vk::RenderPass,
        drawable: RenderSize,
    ) -> Result<bool> {
        let support = surface.support(&self.ctx)?;
        let extent = choose_extent(&support.capabilities, drawable);
        if extent.width == 0 || extent.height == 0 {
            debug!("surface has no area, deferring swapchain rebuild");
            return Ok(false);
        }
        let previous_format = self.format.format;

        self.ctx.wait_idle()?;
        let old = self.release_images();
        let built = self.build(uploader, surface, render_pass, &support, extent, old);
        // Retired whether or not the replacement was created.
        unsafe { self.ctx.swapchain_loader().destroy_swapchain(old, None) };
        built?;

        if self.format.format != previous_format {
            warn!(
                old = ?previous_format,
                new = ?self.format.format,
                "surface format changed; render pass was built for the old one"
            );
        }
        Ok(true)
    }

    fn build(
        &mut self,
        uploader: &ResourceUploader,
        surface: &PresentSurface,
        render_pass: vk::RenderPass,
        support: &SurfaceSupport,
        extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<()> {
        let caps = &support.capabilities;
        let format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, self.preference);
        let image_count = choose_image_count(caps);
        let sharing = choose_sharing(self.ctx.graphics_family(), self.ctx.present_family());

        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.handle(),
            min_image_count: image_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing.mode,
            queue_family_index_count: sharing.families.len() as u32,
            p_queue_family_indices: sharing.families.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: choose_composite_alpha(caps),
            present_mode,
            clipped: vk::TRUE,
            old_swapchain,
            ..Default::default()
        };
        let loader = self.ctx.swapchain_loader();
        self.swapchain =
            unsafe { loader.create_swapchain(&ci, None) }.op("vkCreateSwapchainKHR")?;
        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.images = unsafe { loader.get_swapchain_images(self.swapchain) }
            .op("vkGetSwapchainImagesKHR")?;

        for &image in &self.images {
            let view = create_image_view(
                &self.ctx,
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            self.views.push(view);
        }

        let depth = DepthTarget::new(uploader, self.depth_format, extent)?;
        let depth_view = depth.view;
        self.depth = Some(depth);

        for &view in &self.views {
            let attachments = [view, depth_view];
            let fb_ci = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { self.ctx.device().create_framebuffer(&fb_ci, None) }
                .op("vkCreateFramebuffer")?;
            self.framebuffers.push(fb);
        }

        info!(
            format = ?format.format,
            color_space = ?format.color_space,
            present_mode = ?present_mode,
            width = extent.width,
            height = extent.height,
            images = self.images.len(),
            "swapchain ready"
        );
        Ok(())
    }

    /// Destroys everything built on the swapchain images and hands back the
    /// swapchain itself, still alive.
    fn release_images(&mut self) -> vk::SwapchainKHR {
        let device = self.ctx.device();
        unsafe {
            for fb in self.framebuffers.drain(..) {
                device.destroy_framebuffer(fb, None);
            }
            self.depth = None;
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
        }
        self.images.clear();
        std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null())
    }

    fn destroy_contents(&mut self) {
        let swapchain = self.release_images();
        if swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.ctx
                    .swapchain_loader()
                    .destroy_swapchain(swapchain, None)
            };
        }
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}

impl Drop for SurfaceChain {
    fn drop(&mut self) {
        self.destroy_contents();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn mailbox_when_available() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, PresentPreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], PresentPreference::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&modes, PresentPreference::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn never_picks_immediate() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, PresentPreference::Mailbox),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_current_when_fixed() {
        let mut c = caps(2, 0);
        c.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let e = choose_extent(&c, RenderSize::new(10, 10));
        assert_eq!((e.width, e.height), (1280, 720));
    }

    #[test]
    fn extent_clamps_drawable_when_undefined() {
        let c = caps(2, 0);
        let e = choose_extent(&c, RenderSize::new(8000, 10));
        assert_eq!((e.width, e.height), (4096, 64));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn surface_format_prefers_srgb_bgra() {
        let other = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            choose_surface_format(&[other, PREFERRED_SURFACE_FORMAT]),
            PREFERRED_SURFACE_FORMAT
        );
        assert_eq!(choose_surface_format(&[other]), other);

        let wrong_space = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        };
        assert_eq!(choose_surface_format(&[other, wrong_space]), other);
    }

    #[test]
    fn sharing_depends_on_family_split() {
        assert_eq!(choose_sharing(0, 0).mode, vk::SharingMode::EXCLUSIVE);
        assert!(choose_sharing(0, 0).families.is_empty());
        let split = choose_sharing(0, 2);
        assert_eq!(split.mode, vk::SharingMode::CONCURRENT);
        assert_eq!(split.families, vec![0, 2]);
    }

    #[test]
    fn composite_alpha_falls_back_when_opaque_missing() {
        let mut c = caps(2, 0);
        c.supported_composite_alpha =
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(
            choose_composite_alpha(&c),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
        c.supported_composite_alpha |= vk::CompositeAlphaFlagsKHR::OPAQUE;
        assert_eq!(choose_composite_alpha(&c), vk::CompositeAlphaFlagsKHR::OPAQUE);
    }

    #[test]
    fn depth_format_order() {
        let all = |_: vk::Format| vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        assert_eq!(first_depth_format(all), Some(vk::Format::D32_SFLOAT));

        let only_d24 = |f: vk::Format| {
            if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            }
        };
        assert_eq!(first_depth_format(only_d24), Some(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(first_depth_format(|_: vk::Format| vk::FormatFeatureFlags::empty()), None);
    }

    #[test]
    fn support_completeness() {
        let mut s = SurfaceSupport::default();
        assert!(!s.is_complete());
        s.formats.push(PREFERRED_SURFACE_FORMAT);
        assert!(!s.is_complete());
        s.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(s.is_complete());
    }
}
