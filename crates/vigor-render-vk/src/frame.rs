// SPDX-License-Identifier: CEPL-1.0
//! Per-tick frame lifecycle over a ring of frame slots.

use ash::vk;

use crate::error::Result;

pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Index of the presentable image. Suboptimal acquires land here too.
    Ready(u32),
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal; the chain should be rebuilt.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Presented {
        slot: usize,
        image: u32,
        rebuilt: bool,
    },
    /// Acquire found the chain out of date. Nothing was submitted.
    Rebuilt,
}

/// The GPU-facing half of a frame. `slot` always indexes synchronization
/// objects and command buffers; `image` indexes framebuffers.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;
    fn record(&mut self, slot: usize, image: u32) -> Result<()>;
    /// Unsignals the slot fence. Only called once recording succeeded.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    fn submit(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image: u32) -> Result<PresentOutcome>;
    /// `Ok(false)` when the surface has no area and the rebuild was put off.
    fn rebuild(&mut self) -> Result<bool>;
}

#[derive(Debug)]
pub struct FrameScheduler {
    slot_count: usize,
    current: usize,
    resize_pending: bool,
    frames_presented: u64,
    rebuilds: u64,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(MAX_FRAMES_IN_FLIGHT)
    }
}

impl FrameScheduler {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count: slot_count.max(1),
            current: 0,
            resize_pending: false,
            frames_presented: 0,
            rebuilds: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Forces a rebuild after the next present.
    pub fn request_rebuild(&mut self) {
        self.resize_pending = true;
    }

    pub fn rebuild_pending(&self) -> bool {
        self.resize_pending
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn tick<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<TickOutcome> {
        let slot = self.current;
        backend.wait_for_slot(slot)?;

        let image = match backend.acquire_image(slot)? {
            AcquireOutcome::Ready(image) => image,
            AcquireOutcome::OutOfDate => {
                // Fence stays signaled and the slot stays current.
                self.rebuild(backend)?;
                return Ok(TickOutcome::Rebuilt);
            }
        };

        // A failed recording leaves the fence signaled.
        backend.record(slot, image)?;
        backend.reset_slot(slot)?;
        backend.submit(slot)?;

        let stale = backend.present(slot, image)? == PresentOutcome::Stale;
        let rebuilt = if stale || self.resize_pending {
            self.rebuild(backend)?
        } else {
            false
        };

        self.frames_presented += 1;
        self.current = (self.current + 1) % self.slot_count;
        Ok(TickOutcome::Presented {
            slot,
            image,
            rebuilt,
        })
    }

    fn rebuild<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<bool> {
        let rebuilt = backend.rebuild()?;
        // A deferred rebuild stays pending until the surface has area again.
        self.resize_pending = !rebuilt;
        if rebuilt {
            self.rebuilds += 1;
        }
        Ok(rebuilt)
    }
}

/// Full-extent viewport and scissor.
pub fn viewport_for(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    (
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        },
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        },
    )
}
