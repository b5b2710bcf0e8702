//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! Semaphores order GPU work (acquire → render → present); fences let the CPU
//! wait for a frame slot's last submission. Both are released through the
//! deletion queue like any other resource, since a submission that is still
//! executing may signal them.

use std::rc::Rc;

use ash::vk;

use super::context::GraphicsContext;
use super::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive
pub struct Semaphore {
    ctx: Rc<GraphicsContext>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(ctx: &Rc<GraphicsContext>) -> VulkanResult<Self> {
        let semaphore = ctx.device().create_semaphore().map_err(VulkanError::Api)?;
        Ok(Self {
            ctx: Rc::clone(ctx),
            semaphore,
        })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.ctx.destroy_semaphore(self.semaphore);
    }
}

/// CPU-GPU synchronization primitive
pub struct Fence {
    ctx: Rc<GraphicsContext>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(ctx: &Rc<GraphicsContext>, signaled: bool) -> VulkanResult<Self> {
        let fence = ctx.device().create_fence(signaled).map_err(VulkanError::Api)?;
        Ok(Self {
            ctx: Rc::clone(ctx),
            fence,
        })
    }

    /// Wait for the fence; `Ok(false)` if `timeout_ns` elapsed first
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<bool> {
        match self.ctx.device().wait_for_fence(self.fence, timeout_ns) {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        self.ctx.device().reset_fence(self.fence).map_err(VulkanError::Api)
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.ctx.destroy_fence(self.fence);
    }
}

/// Per-slot objects of one frame in flight
///
/// The fence starts signaled so the first wait on each slot returns
/// immediately.
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready to be rendered to
    pub image_available: Semaphore,
    /// Signaled when the slot's last submission finished on the GPU
    pub in_flight: Fence,
    /// Primary command buffer recorded for this slot
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSync {
    /// Create `count` frame slots
    pub fn create_ring(ctx: &Rc<GraphicsContext>, count: usize) -> VulkanResult<Vec<Self>> {
        let count_u32 = u32::try_from(count).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("Too many frames in flight: {count}"),
        })?;
        let command_buffers = ctx
            .device()
            .allocate_command_buffers(count_u32)
            .map_err(VulkanError::Api)?;

        command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(Self {
                    image_available: Semaphore::new(ctx)?,
                    in_flight: Fence::new(ctx, true)?,
                    command_buffer,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ContextConfig;
    use crate::vulkan::api::PendingRelease;
    use crate::vulkan::mock::MockDevice;

    fn context(device: &MockDevice) -> Rc<GraphicsContext> {
        GraphicsContext::new(Box::new(device.clone()), &ContextConfig::default()).expect("Should create context")
    }

    #[test]
    fn test_fence_timeout_is_not_an_error() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let fence = Fence::new(&ctx, true).expect("Should create fence");

        device.push_fence_result(Err(vk::Result::TIMEOUT));
        assert!(!fence.wait(10).expect("Timeout is not an error"));
        assert!(fence.wait(10).expect("Should wait"));

        device.push_fence_result(Err(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(fence.wait(10), Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
    }

    #[test]
    fn test_ring_has_distinct_objects_per_slot() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let ring = FrameSync::create_ring(&ctx, 3).expect("Should create ring");

        assert_eq!(ring.len(), 3);
        assert_ne!(ring[0].command_buffer, ring[1].command_buffer);
        assert_ne!(ring[1].in_flight.handle(), ring[2].in_flight.handle());
        assert_ne!(ring[0].image_available.handle(), ring[2].image_available.handle());
    }

    #[test]
    fn test_sync_objects_release_through_queue() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let semaphore = Semaphore::new(&ctx).expect("Should create semaphore");
        let fence = Fence::new(&ctx, false).expect("Should create fence");
        let expected = vec![
            PendingRelease::Semaphore(semaphore.handle()),
            PendingRelease::Fence(fence.handle()),
        ];

        drop(semaphore);
        drop(fence);
        ctx.flush_deletion_queue(0);
        assert_eq!(device.destroyed(), expected);
    }
}
