// SPDX-License-Identifier: CEPL-1.0
//! Everything one window needs to draw the scene, on a shared device.

use std::rc::Rc;
use std::time::Instant;

use anyhow::Context;
use ash::vk;
use tracing::{debug, info};
use vigor_math::{aspect_ratio, spin_uniforms};
use vigor_render::{MeshData, RenderSize, Renderer, TextureData};

use crate::descriptors::DescriptorBinder;
use crate::device::DeviceContext;
use crate::error::{Result, VkError, VkResultExt};
use crate::frame::{
    viewport_for, AcquireOutcome, FrameBackend, FrameScheduler, PresentOutcome, TickOutcome,
    MAX_FRAMES_IN_FLIGHT,
};
use crate::pipeline::{GraphicsPipeline, RenderPass};
use crate::slots::FrameSlots;
use crate::surface::{
    choose_surface_format, pick_depth_format, PresentPreference, PresentSurface, SurfaceChain,
};
use crate::upload::{GpuBuffer, ResourceUploader, Texture};

pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

#[derive(Clone, Copy, Debug)]
pub struct RendererOptions {
    pub clear_color: [f32; 4],
    pub present: PresentPreference,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            clear_color: DEFAULT_CLEAR_COLOR,
            present: PresentPreference::default(),
        }
    }
}

/// Decoded inputs for the scene: geometry, one texture and SPIR-V for the
/// vertex and fragment stages.
pub struct SceneAssets {
    pub mesh: MeshData,
    pub texture: TextureData,
    pub vertex_spirv: Vec<u8>,
    pub fragment_spirv: Vec<u8>,
}

/// Vulkan side of the frame loop for one surface.
///
/// Fields drop top to bottom, so everything that references the chain, the
/// render pass or the texture goes first and the surface goes last.
pub struct VkFrameBackend {
    slots: FrameSlots,
    binder: DescriptorBinder,
    pipeline: GraphicsPipeline,
    chain: SurfaceChain,
    render_pass: RenderPass,
    texture: Texture,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    uploader: ResourceUploader,
    surface: PresentSurface,
    ctx: Rc<DeviceContext>,

    index_count: u32,
    drawable: RenderSize,
    clear_color: [f32; 4],
    started: Instant,
}

impl VkFrameBackend {
    pub fn new(
        ctx: Rc<DeviceContext>,
        surface: PresentSurface,
        drawable: RenderSize,
        assets: &SceneAssets,
        options: RendererOptions,
    ) -> Result<Self> {
        assets.mesh.validate()?;
        let uploader = ResourceUploader::new(ctx.clone())?;

        let support = surface.support(&ctx)?;
        let color_format = choose_surface_format(&support.formats).format;
        let depth_format = pick_depth_format(&ctx)?;
        let render_pass = RenderPass::new(ctx.clone(), color_format, depth_format)?;
        let chain = SurfaceChain::new(
            &uploader,
            &surface,
            render_pass.handle(),
            depth_format,
            drawable,
            options.present,
        )?;

        let vertex_buffer = uploader.create_device_local_buffer(
            assets.mesh.vertex_bytes(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = uploader.create_device_local_buffer(
            assets.mesh.index_bytes(),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        let texture = uploader.create_texture(&assets.texture)?;

        let binder = DescriptorBinder::new(&uploader, &texture, MAX_FRAMES_IN_FLIGHT)?;
        let pipeline = GraphicsPipeline::new(
            ctx.clone(),
            &render_pass,
            binder.layout(),
            &assets.vertex_spirv,
            &assets.fragment_spirv,
        )?;
        let slots = FrameSlots::new(ctx.clone(), MAX_FRAMES_IN_FLIGHT)?;

        info!(
            device = ctx.device_name(),
            color = ?color_format,
            depth = ?depth_format,
            indices = assets.mesh.index_count(),
            "surface renderer ready"
        );

        Ok(Self {
            slots,
            binder,
            pipeline,
            chain,
            render_pass,
            texture,
            vertex_buffer,
            index_buffer,
            uploader,
            surface,
            ctx,
            index_count: assets.mesh.index_count(),
            drawable,
            clear_color: options.clear_color,
            started: Instant::now(),
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent()
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.chain.present_mode()
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    fn record_scene(&self, cmd: vk::CommandBuffer, slot: usize, image: u32) -> Result<()> {
        let device = self.ctx.device();
        let extent = self.chain.extent();
        let framebuffer = self
            .chain
            .framebuffer(image)
            .ok_or(VkError::NoFramebuffer(image))?;

        // The slot's fence has been waited on, so its uniform buffer is free.
        let elapsed = self.started.elapsed().as_secs_f32();
        self.binder.write_uniform(
            slot,
            &spin_uniforms(elapsed, aspect_ratio(extent.width, extent.height)),
        );

        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let (viewport, scissor) = viewport_for(extent);
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.render_pass.handle(),
            framebuffer,
            render_area: scissor,
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        let set = self.binder.set(slot);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .op("vkResetCommandBuffer")?;
            device
                .begin_command_buffer(cmd, &begin)
                .op("vkBeginCommandBuffer")?;
            device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );
            device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.handle()], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.handle(), 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                std::slice::from_ref(&set),
                &[],
            );
            device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd).op("vkEndCommandBuffer")?;
        }
        Ok(())
    }
}

impl FrameBackend for VkFrameBackend {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.slots.wait(slot)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let semaphore = self.slots.get(slot).image_acquired;
        let acquired = unsafe {
            self.ctx.swapchain_loader().acquire_next_image(
                self.chain.swapchain(),
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((image, _suboptimal)) => Ok(AcquireOutcome::Ready(image)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(code) => Err(VkError::Api {
                op: "vkAcquireNextImageKHR",
                code,
            }),
        }
    }

    fn record(&mut self, slot: usize, image: u32) -> Result<()> {
        let cmd = self.slots.get(slot).command_buffer;
        self.record_scene(cmd, slot, image)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.slots.reset(slot)
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = *self.slots.get(slot);
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &frame.image_acquired,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &frame.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &frame.render_finished,
            ..Default::default()
        };
        unsafe {
            self.ctx.device().queue_submit(
                self.ctx.graphics_queue(),
                std::slice::from_ref(&submit),
                frame.in_flight,
            )
        }
        .op("vkQueueSubmit")
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentOutcome> {
        let wait = self.slots.get(slot).render_finished;
        let swapchain = self.chain.swapchain();
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image,
            ..Default::default()
        };
        let presented = unsafe {
            self.ctx
                .swapchain_loader()
                .queue_present(self.ctx.present_queue(), &present)
        };
        match presented {
            Ok(false) => Ok(PresentOutcome::Presented),
            // Suboptimal.
            Ok(true) => Ok(PresentOutcome::Stale),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(code) => Err(VkError::Api {
                op: "vkQueuePresentKHR",
                code,
            }),
        }
    }

    fn rebuild(&mut self) -> Result<bool> {
        let rebuilt = self.chain.rebuild(
            &self.uploader,
            &self.surface,
            self.render_pass.handle(),
            self.drawable,
        )?;
        if !rebuilt {
            debug!("swapchain rebuild deferred");
        }
        Ok(rebuilt)
    }
}

impl Drop for VkFrameBackend {
    fn drop(&mut self) {
        // Nothing below may go while a submission still references it.
        let _ = self.ctx.wait_idle();
    }
}

/// `Renderer` for one window. Rendering is skipped while minimized or while
/// the drawable has no area.
pub struct VkSurfaceRenderer {
    scheduler: FrameScheduler,
    backend: VkFrameBackend,
    paused: bool,
}

impl VkSurfaceRenderer {
    pub fn new(
        ctx: Rc<DeviceContext>,
        surface: PresentSurface,
        size: RenderSize,
        assets: &SceneAssets,
        options: RendererOptions,
    ) -> Result<Self> {
        Ok(Self {
            scheduler: FrameScheduler::default(),
            backend: VkFrameBackend::new(ctx, surface, size, assets, options)?,
            paused: false,
        })
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn backend(&self) -> &VkFrameBackend {
        &self.backend
    }

    pub fn is_idle(&self) -> bool {
        self.paused || self.backend.drawable.is_empty()
    }
}

impl Renderer for VkSurfaceRenderer {
    fn resize(&mut self, size: RenderSize) -> anyhow::Result<()> {
        if size == self.backend.drawable {
            return Ok(());
        }
        self.backend.drawable = size;
        if !size.is_empty() {
            self.scheduler.request_rebuild();
        }
        Ok(())
    }

    fn render(&mut self) -> anyhow::Result<()> {
        if self.is_idle() {
            return Ok(());
        }
        let outcome = self
            .scheduler
            .tick(&mut self.backend)
            .context("frame tick")?;
        if let TickOutcome::Rebuilt = outcome {
            debug!("acquire out of date, frame skipped");
        }
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.backend.clear_color = rgba;
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}
