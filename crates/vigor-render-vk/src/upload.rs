// SPDX-License-Identifier: CEPL-1.0
//! Device memory owners and blocking transfers into device-local memory.

use std::rc::Rc;

use ash::vk;
use tracing::debug;
use vigor_render::TextureData;

use crate::device::DeviceContext;
use crate::error::{Result, VkError, VkResultExt};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

pub(crate) fn host_coherent() -> vk::MemoryPropertyFlags {
    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
}

pub struct GpuBuffer {
    ctx: Rc<DeviceContext>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub(crate) fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Copies `bytes` to the start of a host-visible, coherent buffer.
    pub(crate) fn fill(&self, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as vk::DeviceSize;
        if len > self.size {
            return Err(VkError::UploadTooLarge {
                len,
                capacity: self.size,
            });
        }
        let device = self.ctx.device();
        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .op("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
            device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Reads `len` bytes from the start of a host-visible, coherent buffer.
    pub(crate) fn read(&self, len: vk::DeviceSize) -> Result<Vec<u8>> {
        let len = len.min(self.size);
        let mut out = vec![0u8; len as usize];
        let device = self.ctx.device();
        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .op("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), out.len());
            device.unmap_memory(self.memory);
        }
        Ok(out)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

pub struct GpuImage {
    ctx: Rc<DeviceContext>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl GpuImage {
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub(crate) fn context(&self) -> &Rc<DeviceContext> {
        &self.ctx
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Sampled image with its full view and sampler.
pub struct Texture {
    image: GpuImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    pub fn image(&self) -> &GpuImage {
        &self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let device = self.image.ctx.device();
        unsafe {
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.view, None);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the layout changes the engine performs. Anything else is
/// rejected.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::TRANSFER_WRITE,
            A::SHADER_READ,
            S::TRANSFER,
            S::FRAGMENT_SHADER,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::TRANSFER_READ, S::TRANSFER, S::TRANSFER)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::TRANSFER_READ,
            A::SHADER_READ,
            S::TRANSFER,
            S::FRAGMENT_SHADER,
        ),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::EARLY_FRAGMENT_TESTS,
        ),
        _ => return Err(VkError::UnsupportedTransition { old, new }),
    };
    Ok(TransitionMasks {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    })
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

pub fn is_depth(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspects a barrier on an image of `format` must cover.
pub fn aspect_for(format: vk::Format) -> vk::ImageAspectFlags {
    if is_depth(format) {
        if has_stencil(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

pub fn supports_linear_blit(props: &vk::FormatProperties) -> bool {
    props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipStep {
    Barrier {
        level: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    /// Blit `src_level` into `src_level + 1`.
    Blit {
        src_level: u32,
        src_extent: (i32, i32),
        dst_extent: (i32, i32),
    },
}

/// Barrier/blit sequence that fills levels 1.. from level 0 and leaves every
/// level in SHADER_READ_ONLY_OPTIMAL. All levels start in TRANSFER_DST_OPTIMAL.
pub fn plan_mip_chain(width: u32, height: u32, mip_levels: u32) -> Vec<MipStep> {
    use vk::ImageLayout as L;

    let levels = mip_levels.max(1);
    let mut steps = Vec::with_capacity(levels as usize * 3);
    let (mut w, mut h) = (width.max(1) as i32, height.max(1) as i32);

    for level in 1..levels {
        let src = level - 1;
        let (next_w, next_h) = ((w / 2).max(1), (h / 2).max(1));
        steps.push(MipStep::Barrier {
            level: src,
            old: L::TRANSFER_DST_OPTIMAL,
            new: L::TRANSFER_SRC_OPTIMAL,
        });
        steps.push(MipStep::Blit {
            src_level: src,
            src_extent: (w, h),
            dst_extent: (next_w, next_h),
        });
        steps.push(MipStep::Barrier {
            level: src,
            old: L::TRANSFER_SRC_OPTIMAL,
            new: L::SHADER_READ_ONLY_OPTIMAL,
        });
        w = next_w;
        h = next_h;
    }
    steps.push(MipStep::Barrier {
        level: levels - 1,
        old: L::TRANSFER_DST_OPTIMAL,
        new: L::SHADER_READ_ONLY_OPTIMAL,
    });
    steps
}

fn image_barrier(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    masks: &TransitionMasks,
    base_mip_level: u32,
    level_count: u32,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: masks.src_access,
        dst_access_mask: masks.dst_access,
        old_layout: old,
        new_layout: new,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub(crate) fn create_image_view(
    ctx: &DeviceContext,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    unsafe { ctx.device().create_image_view(&ci, None) }.op("vkCreateImageView")
}

/// Creates buffers and images and moves data into them with one-shot command
/// buffers on the graphics queue. Every transfer blocks until the queue is
/// idle, so at most one is in flight.
pub struct ResourceUploader {
    ctx: Rc<DeviceContext>,
    pool: vk::CommandPool,
}

impl ResourceUploader {
    pub fn new(ctx: Rc<DeviceContext>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: ctx.graphics_family(),
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            ..Default::default()
        };
        let pool = unsafe { ctx.device().create_command_pool(&pool_info, None) }
            .op("vkCreateCommandPool")?;
        Ok(Self { ctx, pool })
    }

    pub fn context(&self) -> &Rc<DeviceContext> {
        &self.ctx
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<GpuBuffer> {
        if size == 0 {
            return Err(VkError::ZeroSized("buffer"));
        }
        let device = self.ctx.device();
        let ci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { device.create_buffer(&ci, None) }
            .map_err(|code| VkError::BufferCreateFailed { size, usage, code })?;

        // From here on the buffer is owned, so early returns release it.
        let mut out = GpuBuffer {
            ctx: self.ctx.clone(),
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
        };
        let req = unsafe { device.get_buffer_memory_requirements(buffer) };
        out.memory = self.ctx.allocate_memory(req, properties)?;
        unsafe { device.bind_buffer_memory(buffer, out.memory, 0) }.op("vkBindBufferMemory")?;
        Ok(out)
    }

    pub fn create_host_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<GpuBuffer> {
        self.create_buffer(size, usage, host_coherent())
    }

    /// Copies `bytes` into the start of `dst`, which needs TRANSFER_DST usage.
    pub fn upload_via_staging(&self, dst: &GpuBuffer, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let len = bytes.len() as vk::DeviceSize;
        if len > dst.size() {
            return Err(VkError::UploadTooLarge {
                len,
                capacity: dst.size(),
            });
        }

        // 1) staging buffer (HOST_VISIBLE|COHERENT)
        let staging = self.create_host_buffer(len, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.fill(bytes)?;

        // 2) one-shot copy, blocking
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: len,
        };
        self.one_shot(|device, cmd| unsafe {
            device.cmd_copy_buffer(
                cmd,
                staging.handle(),
                dst.handle(),
                std::slice::from_ref(&region),
            );
        })?;
        debug!(bytes = len, "staged upload complete");
        Ok(())
    }

    pub fn create_device_local_buffer(
        &self,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<GpuBuffer> {
        let buffer = self.create_buffer(
            bytes.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.upload_via_staging(&buffer, bytes)?;
        Ok(buffer)
    }

    /// Copies the first `size` bytes of `src` (TRANSFER_SRC usage) back to the host.
    pub fn read_back(&self, src: &GpuBuffer, size: vk::DeviceSize) -> Result<Vec<u8>> {
        let size = size.min(src.size());
        if size == 0 {
            return Ok(Vec::new());
        }
        let staging = self.create_host_buffer(size, vk::BufferUsageFlags::TRANSFER_DST)?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.one_shot(|device, cmd| unsafe {
            device.cmd_copy_buffer(
                cmd,
                src.handle(),
                staging.handle(),
                std::slice::from_ref(&region),
            );
        })?;
        staging.read(size)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_image_2d(
        &self,
        width: u32,
        height: u32,
        mip_levels: u32,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<GpuImage> {
        if width == 0 || height == 0 {
            return Err(VkError::ZeroSized("image"));
        }
        let device = self.ctx.device();
        let ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: mip_levels.max(1),
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = unsafe { device.create_image(&ci, None) }.op("vkCreateImage")?;
        let mut out = GpuImage {
            ctx: self.ctx.clone(),
            image,
            memory: vk::DeviceMemory::null(),
            format,
            extent: vk::Extent2D { width, height },
            mip_levels: mip_levels.max(1),
        };
        let req = unsafe { device.get_image_memory_requirements(image) };
        out.memory = self.ctx.allocate_memory(req, properties)?;
        unsafe { device.bind_image_memory(image, out.memory, 0) }.op("vkBindImageMemory")?;
        Ok(out)
    }

    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        mip_levels: u32,
    ) -> Result<()> {
        let masks = transition_masks(old, new)?;
        let barrier = image_barrier(
            image,
            aspect_for(format),
            old,
            new,
            &masks,
            0,
            mip_levels.max(1),
        );
        self.one_shot(|device, cmd| unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            );
        })
    }

    /// Copies tightly packed pixels into mip level 0 of `image`, which must be
    /// in TRANSFER_DST_OPTIMAL.
    pub fn copy_buffer_to_image(&self, buffer: &GpuBuffer, image: &GpuImage) -> Result<()> {
        let extent = image.extent();
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: color_layers(0),
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        self.one_shot(|device, cmd| unsafe {
            device.cmd_copy_buffer_to_image(
                cmd,
                buffer.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
        })
    }

    /// Fills mip levels 1.. by repeated linear blits. Every level of `image`
    /// must be in TRANSFER_DST_OPTIMAL, level 0 holding the source pixels.
    pub fn generate_mip_chain(
        &self,
        image: vk::Image,
        format: vk::Format,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> Result<()> {
        if !supports_linear_blit(&self.ctx.format_properties(format)) {
            return Err(VkError::UnsupportedBlitFormat(format));
        }
        let steps = plan_mip_chain(width, height, mip_levels);
        let masks = steps
            .iter()
            .map(|step| match *step {
                MipStep::Barrier { old, new, .. } => transition_masks(old, new).map(Some),
                MipStep::Blit { .. } => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        self.one_shot(|device, cmd| {
            for (step, masks) in steps.iter().zip(&masks) {
                match (*step, masks) {
                    (MipStep::Barrier { level, old, new }, Some(m)) => {
                        let barrier = image_barrier(
                            image,
                            vk::ImageAspectFlags::COLOR,
                            old,
                            new,
                            m,
                            level,
                            1,
                        );
                        unsafe {
                            device.cmd_pipeline_barrier(
                                cmd,
                                m.src_stage,
                                m.dst_stage,
                                vk::DependencyFlags::empty(),
                                &[],
                                &[],
                                std::slice::from_ref(&barrier),
                            )
                        };
                    }
                    (
                        MipStep::Blit {
                            src_level,
                            src_extent,
                            dst_extent,
                        },
                        _,
                    ) => {
                        let blit = vk::ImageBlit {
                            src_subresource: color_layers(src_level),
                            src_offsets: [
                                vk::Offset3D::default(),
                                vk::Offset3D {
                                    x: src_extent.0,
                                    y: src_extent.1,
                                    z: 1,
                                },
                            ],
                            dst_subresource: color_layers(src_level + 1),
                            dst_offsets: [
                                vk::Offset3D::default(),
                                vk::Offset3D {
                                    x: dst_extent.0,
                                    y: dst_extent.1,
                                    z: 1,
                                },
                            ],
                        };
                        unsafe {
                            device.cmd_blit_image(
                                cmd,
                                image,
                                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                                image,
                                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                                std::slice::from_ref(&blit),
                                vk::Filter::LINEAR,
                            )
                        };
                    }
                    _ => {}
                }
            }
        })?;
        debug!(width, height, levels = mip_levels, "mip chain generated");
        Ok(())
    }

    /// Uploads RGBA8 pixels into an sRGB image with a full mip chain, ready
    /// for sampling from the fragment stage.
    pub fn create_texture(&self, data: &TextureData) -> Result<Texture> {
        let (width, height) = (data.width(), data.height());
        let levels = mip_level_count(width, height);
        if !supports_linear_blit(&self.ctx.format_properties(TEXTURE_FORMAT)) {
            return Err(VkError::UnsupportedBlitFormat(TEXTURE_FORMAT));
        }

        let staging = self.create_host_buffer(
            data.pixels().len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.fill(data.pixels())?;

        let image = self.create_image_2d(
            width,
            height,
            levels,
            TEXTURE_FORMAT,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.transition_image_layout(
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            levels,
        )?;
        self.copy_buffer_to_image(&staging, &image)?;
        drop(staging);
        self.generate_mip_chain(image.handle(), TEXTURE_FORMAT, width, height, levels)?;

        let view = create_image_view(
            &self.ctx,
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageAspectFlags::COLOR,
            levels,
        )?;
        let mut texture = Texture {
            image,
            view,
            sampler: vk::Sampler::null(),
        };
        texture.sampler = self.create_sampler(levels)?;
        debug!(width, height, levels, "texture uploaded");
        Ok(texture)
    }

    fn create_sampler(&self, mip_levels: u32) -> Result<vk::Sampler> {
        let anisotropy = self.ctx.max_sampler_anisotropy();
        let ci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mip_lod_bias: 0.0,
            anisotropy_enable: if anisotropy.is_some() {
                vk::TRUE
            } else {
                vk::FALSE
            },
            max_anisotropy: anisotropy.unwrap_or(1.0),
            compare_enable: vk::FALSE,
            compare_op: vk::CompareOp::ALWAYS,
            min_lod: 0.0,
            max_lod: mip_levels as f32,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: vk::FALSE,
            ..Default::default()
        };
        unsafe { self.ctx.device().create_sampler(&ci, None) }.op("vkCreateSampler")
    }

    fn one_shot(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<()> {
        let device = self.ctx.device();
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = unsafe { device.allocate_command_buffers(&ai) }.op("vkAllocateCommandBuffers")?[0];
        let result = self.submit_and_wait(cmd, record);
        unsafe { device.free_command_buffers(self.pool, std::slice::from_ref(&cmd)) };
        result
    }

    fn submit_and_wait(
        &self,
        cmd: vk::CommandBuffer,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<()> {
        let device = self.ctx.device();
        let queue = self.ctx.graphics_queue();
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        unsafe {
            device
                .begin_command_buffer(cmd, &bi)
                .op("vkBeginCommandBuffer")?;
            record(device, cmd);
            device.end_command_buffer(cmd).op("vkEndCommandBuffer")?;
            device
                .queue_submit(queue, std::slice::from_ref(&si), vk::Fence::null())
                .op("vkQueueSubmit")?;
            device.queue_wait_idle(queue).op("vkQueueWaitIdle")
        }
    }
}

impl Drop for ResourceUploader {
    fn drop(&mut self) {
        unsafe { self.ctx.device().destroy_command_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn mip_counts() {
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(512, 64), 10);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(0, 0), 1);
        assert_eq!(mip_level_count(300, 200), 9);
    }

    #[test]
    fn texture_transitions_are_in_the_table() {
        let m = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(m.src_access, vk::AccessFlags::empty());
        assert_eq!(m.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(m.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(m.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let m = transition_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(m.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(m.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let m = transition_masks(L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(m.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(m.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(m.dst_access, vk::AccessFlags::TRANSFER_READ);
    }

    #[test]
    fn depth_transition_targets_early_fragment_tests() {
        let m = transition_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(m.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
        assert!(m
            .dst_access
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn unknown_transition_is_rejected() {
        match transition_masks(L::SHADER_READ_ONLY_OPTIMAL, L::UNDEFINED) {
            Err(VkError::UnsupportedTransition { old, new }) => {
                assert_eq!(old, L::SHADER_READ_ONLY_OPTIMAL);
                assert_eq!(new, L::UNDEFINED);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn aspects_follow_format() {
        assert_eq!(aspect_for(vk::Format::R8G8B8A8_SRGB), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_for(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn mip_plan_for_256_halves_down_to_one() {
        let steps = plan_mip_chain(256, 256, 9);
        let blits: Vec<_> = steps
            .iter()
            .filter_map(|s| match s {
                MipStep::Blit {
                    src_level,
                    src_extent,
                    dst_extent,
                } => Some((*src_level, *src_extent, *dst_extent)),
                _ => None,
            })
            .collect();
        assert_eq!(blits.len(), 8);
        assert_eq!(blits[0], (0, (256, 256), (128, 128)));
        assert_eq!(blits[7], (7, (2, 2), (1, 1)));
        for pair in blits.windows(2) {
            assert_eq!(pair[0].2, pair[1].1);
        }
    }

    #[test]
    fn mip_plan_leaves_every_level_shader_readable() {
        let levels = 9;
        let mut layouts = vec![L::TRANSFER_DST_OPTIMAL; levels as usize];
        for step in plan_mip_chain(256, 256, levels) {
            match step {
                MipStep::Barrier { level, old, new } => {
                    assert_eq!(layouts[level as usize], old);
                    assert!(transition_masks(old, new).is_ok());
                    layouts[level as usize] = new;
                }
                MipStep::Blit { src_level, .. } => {
                    assert_eq!(layouts[src_level as usize], L::TRANSFER_SRC_OPTIMAL);
                    assert_eq!(layouts[src_level as usize + 1], L::TRANSFER_DST_OPTIMAL);
                }
            }
        }
        assert!(layouts.iter().all(|&l| l == L::SHADER_READ_ONLY_OPTIMAL));
    }

    #[test]
    fn non_square_plan_clamps_short_side() {
        let steps = plan_mip_chain(8, 2, mip_level_count(8, 2));
        let dsts: Vec<_> = steps
            .iter()
            .filter_map(|s| match s {
                MipStep::Blit { dst_extent, .. } => Some(*dst_extent),
                _ => None,
            })
            .collect();
        assert_eq!(dsts, vec![(4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn single_level_plan_is_one_barrier() {
        assert_eq!(
            plan_mip_chain(1, 1, 1),
            vec![MipStep::Barrier {
                level: 0,
                old: L::TRANSFER_DST_OPTIMAL,
                new: L::SHADER_READ_ONLY_OPTIMAL,
            }]
        );
    }

    #[test]
    fn linear_blit_support_check() {
        let yes = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
            ..Default::default()
        };
        assert!(supports_linear_blit(&yes));
        assert!(!supports_linear_blit(&vk::FormatProperties::default()));
    }
}
