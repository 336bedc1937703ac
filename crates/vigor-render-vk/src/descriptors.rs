// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use ash::vk;
use vigor_math::UniformData;

use crate::device::DeviceContext;
use crate::error::{Result, VkResultExt};
use crate::upload::{GpuBuffer, ResourceUploader, Texture};

pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;

const UNIFORM_SIZE: vk::DeviceSize = std::mem::size_of::<UniformData>() as vk::DeviceSize;

struct MappedUniform {
    buffer: GpuBuffer,
    ptr: *mut u8,
}

/// Set 0 for the scene pipeline: a per-slot uniform buffer (vertex stage) and
/// the shared texture (fragment stage). Uniform buffers stay mapped for the
/// binder's whole life; sets are written once here and never again.
pub struct DescriptorBinder {
    ctx: Rc<DeviceContext>,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    uniforms: Vec<MappedUniform>,
}

impl DescriptorBinder {
    pub fn new(uploader: &ResourceUploader, texture: &Texture, slot_count: usize) -> Result<Self> {
        let ctx = uploader.context().clone();
        let device = ctx.device();
        let mut out = Self {
            ctx: ctx.clone(),
            layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sets: Vec::with_capacity(slot_count),
            uniforms: Vec::with_capacity(slot_count),
        };

        out.layout = create_set_layout(device)?;

        let count = slot_count as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: count,
            },
        ];
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: count,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        out.pool = unsafe { device.create_descriptor_pool(&pool_ci, None) }
            .op("vkCreateDescriptorPool")?;

        for _ in 0..slot_count {
            let buffer =
                uploader.create_host_buffer(UNIFORM_SIZE, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
            let ptr = unsafe {
                device.map_memory(
                    buffer.memory(),
                    0,
                    UNIFORM_SIZE,
                    vk::MemoryMapFlags::empty(),
                )
            }
            .op("vkMapMemory")? as *mut u8;
            out.uniforms.push(MappedUniform { buffer, ptr });
        }

        let layouts = vec![out.layout; slot_count];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: out.pool,
            descriptor_set_count: count,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        out.sets =
            unsafe { device.allocate_descriptor_sets(&alloc) }.op("vkAllocateDescriptorSets")?;

        let image_info = vk::DescriptorImageInfo {
            sampler: texture.sampler(),
            image_view: texture.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = out
            .uniforms
            .iter()
            .map(|u| vk::DescriptorBufferInfo {
                buffer: u.buffer.handle(),
                offset: 0,
                range: UNIFORM_SIZE,
            })
            .collect();
        let mut writes = Vec::with_capacity(slot_count * 2);
        for (set, info) in out.sets.iter().zip(&buffer_infos) {
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: UNIFORM_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: info,
                ..Default::default()
            });
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: TEXTURE_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &image_info,
                ..Default::default()
            });
        }
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        Ok(out)
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    pub fn slot_count(&self) -> usize {
        self.uniforms.len()
    }

    /// Only call once the slot's fence has been waited on.
    pub fn write_uniform(&self, slot: usize, data: &UniformData) {
        let bytes = bytemuck::bytes_of(data);
        let dst = self.uniforms[slot].ptr;
        // Mapping is coherent and at least UNIFORM_SIZE bytes long.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
    }
}

fn create_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding {
            binding: UNIFORM_BINDING,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: TEXTURE_BINDING,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ];
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    unsafe { device.create_descriptor_set_layout(&ci, None) }.op("vkCreateDescriptorSetLayout")
}

impl Drop for DescriptorBinder {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            for u in &self.uniforms {
                device.unmap_memory(u.buffer.memory());
            }
            // Sets go with the pool.
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.layout, None);
        }
        // GpuBuffers release their memory when `uniforms` drops.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_three_matrices() {
        assert_eq!(UNIFORM_SIZE, 3 * 64);
    }
}
