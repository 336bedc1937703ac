// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use ash::vk;

use crate::device::DeviceContext;
use crate::error::{Result, VkResultExt};

#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub image_acquired: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    /// Created signaled so the first wait on every slot returns at once.
    pub in_flight: vk::Fence,
}

/// Command buffers and synchronization objects for each frame in flight.
pub struct FrameSlots {
    ctx: Rc<DeviceContext>,
    pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    pub fn new(ctx: Rc<DeviceContext>, count: usize) -> Result<Self> {
        let device = ctx.device();
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: ctx.graphics_family(),
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool =
            unsafe { device.create_command_pool(&pool_info, None) }.op("vkCreateCommandPool")?;
        let mut out = Self {
            ctx: ctx.clone(),
            pool,
            slots: Vec::with_capacity(count),
        };

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .op("vkAllocateCommandBuffers")?;

        for command_buffer in buffers {
            let mut slot = FrameSlot {
                command_buffer,
                image_acquired: vk::Semaphore::null(),
                render_finished: vk::Semaphore::null(),
                in_flight: vk::Fence::null(),
            };
            // Pushed before checking so Drop releases whatever was created.
            let result = create_slot_sync(device, &mut slot);
            out.slots.push(slot);
            result?;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot]
    }

    pub fn wait(&self, slot: usize) -> Result<()> {
        let fence = self.slots[slot].in_flight;
        unsafe {
            self.ctx
                .device()
                .wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX)
        }
        .op("vkWaitForFences")
    }

    pub fn reset(&self, slot: usize) -> Result<()> {
        let fence = self.slots[slot].in_flight;
        unsafe { self.ctx.device().reset_fences(std::slice::from_ref(&fence)) }
            .op("vkResetFences")
    }
}

fn create_slot_sync(device: &ash::Device, slot: &mut FrameSlot) -> Result<()> {
    let sem_ci = vk::SemaphoreCreateInfo::default();
    let fence_ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };
    unsafe {
        slot.image_acquired = device
            .create_semaphore(&sem_ci, None)
            .op("vkCreateSemaphore")?;
        slot.render_finished = device
            .create_semaphore(&sem_ci, None)
            .op("vkCreateSemaphore")?;
        slot.in_flight = device.create_fence(&fence_ci, None).op("vkCreateFence")?;
    }
    Ok(())
}

impl Drop for FrameSlots {
    fn drop(&mut self) {
        // A fence reset ahead of a failed submit never signals again, so wait
        // on the queue rather than on the fences.
        let _ = self.ctx.wait_idle();
        let device = self.ctx.device();
        unsafe {
            for s in self.slots.drain(..) {
                device.destroy_fence(s.in_flight, None);
                device.destroy_semaphore(s.render_finished, None);
                device.destroy_semaphore(s.image_acquired, None);
            }
            // Frees the command buffers allocated from it.
            device.destroy_command_pool(self.pool, None);
        }
    }
}
