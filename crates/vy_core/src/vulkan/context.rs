//! Graphics context
//!
//! Owns the device, the global descriptor pool and the deletion queue. It is
//! created once at startup and shared as `Rc<GraphicsContext>`; every resource
//! wrapper keeps a reference, so the device outlives everything allocated
//! from it.

use std::cell::RefCell;
use std::rc::Rc;

use ash::vk;

use super::api::{DeviceApi, PendingRelease};
use super::deletion_queue::DeletionQueue;
use super::descriptors::pool::{self, DescriptorAllocator};
use super::descriptors::DescriptorSetLayout;
use super::{VulkanError, VulkanResult};
use crate::core::config::ContextConfig;

/// Descriptor types the global pool reserves capacity for; covers every type
/// [`DescriptorWriter`](super::descriptors::DescriptorWriter) accepts
const GLOBAL_POOL_TYPES: [vk::DescriptorType; 9] = [
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// Device, global descriptor pool and deferred destruction
pub struct GraphicsContext {
    device: Box<dyn DeviceApi>,
    deletion_queue: RefCell<DeletionQueue>,
    global_pool: vk::DescriptorPool,
    frames_in_flight: usize,
}

impl GraphicsContext {
    /// Create the context around an initialized device
    pub fn new(device: Box<dyn DeviceApi>, config: &ContextConfig) -> VulkanResult<Rc<Self>> {
        if config.frames_in_flight == 0 {
            return Err(VulkanError::InitializationFailed(
                "Frames in flight must be at least 1".to_string(),
            ));
        }

        let pool_sizes: Vec<vk::DescriptorPoolSize> = GLOBAL_POOL_TYPES
            .iter()
            .map(|&ty| vk::DescriptorPoolSize {
                ty,
                descriptor_count: config.descriptor_pool.descriptors_per_type,
            })
            .collect();

        let mut flags = vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        if device.supports_update_after_bind() {
            flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }

        let global_pool = device
            .create_descriptor_pool(config.descriptor_pool.max_sets, &pool_sizes, flags)
            .map_err(VulkanError::Api)?;

        log::debug!(
            "Graphics context ready: {} frames in flight, global pool of {} sets",
            config.frames_in_flight,
            config.descriptor_pool.max_sets
        );

        Ok(Rc::new(Self {
            device,
            deletion_queue: RefCell::new(DeletionQueue::new(config.frames_in_flight)),
            global_pool,
            frames_in_flight: config.frames_in_flight,
        }))
    }

    /// The device behind this context
    pub fn device(&self) -> &dyn DeviceApi {
        self.device.as_ref()
    }

    /// Number of frame slots in the deletion ring
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot that destruction requests are currently queued into
    pub fn frame_slot(&self) -> usize {
        self.deletion_queue.borrow().current()
    }

    /// Queue subsequent destruction requests into `slot`
    pub fn set_frame_slot(&self, slot: usize) {
        self.deletion_queue.borrow_mut().set_current(slot);
    }

    /// Release everything queued in `slot`
    ///
    /// The caller must have waited for the fence of the last submission made
    /// from `slot`.
    pub fn flush_deletion_queue(&self, slot: usize) -> usize {
        self.deletion_queue.borrow_mut().flush(slot, self.device.as_ref())
    }

    /// Releases still waiting in `slot`
    pub fn pending_releases(&self, slot: usize) -> usize {
        self.deletion_queue.borrow().pending(slot).len()
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle().map_err(VulkanError::Api)
    }

    /// Wait for the device, then release every pending resource
    pub fn shutdown(&self) -> VulkanResult<()> {
        self.wait_idle()?;
        let released = self.deletion_queue.borrow_mut().flush_all(self.device.as_ref());
        log::debug!("Context shutdown released {released} pending resources");
        Ok(())
    }

    /// Schedule a raw release into the current frame slot
    pub fn schedule(&self, release: PendingRelease) {
        self.deletion_queue.borrow_mut().schedule(release);
    }

    /// Allocate a set from the global pool, `None` when it is exhausted
    pub fn allocate_set(&self, layout: &DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        pool::allocate_from(self.device(), self.global_pool, layout.handle())
    }

    /// Return sets to the global pool
    pub fn release_sets(&self, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
        if sets.is_empty() {
            return Ok(());
        }
        self.device
            .free_descriptor_sets(self.global_pool, sets)
            .map_err(VulkanError::Api)
    }

    /// Defer release of a buffer and its memory
    pub fn destroy_buffer(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) {
        debug_assert_eq!(
            buffer == vk::Buffer::null(),
            memory == vk::DeviceMemory::null(),
            "Buffer and its allocation must both be live or both be null"
        );
        if buffer != vk::Buffer::null() {
            self.schedule(PendingRelease::Buffer { buffer, memory });
        }
    }

    /// Defer release of an image and its memory
    pub fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory) {
        debug_assert_eq!(
            image == vk::Image::null(),
            memory == vk::DeviceMemory::null(),
            "Image and its allocation must both be live or both be null"
        );
        if image != vk::Image::null() {
            self.schedule(PendingRelease::Image { image, memory });
        }
    }

    /// Schedule an image view for release
    pub fn destroy_image_view(&self, view: vk::ImageView) {
        if view != vk::ImageView::null() {
            self.schedule(PendingRelease::ImageView(view));
        }
    }

    /// Schedule a sampler for release
    pub fn destroy_sampler(&self, sampler: vk::Sampler) {
        if sampler != vk::Sampler::null() {
            self.schedule(PendingRelease::Sampler(sampler));
        }
    }

    /// Schedule a descriptor set layout for release
    pub fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        if layout != vk::DescriptorSetLayout::null() {
            self.schedule(PendingRelease::DescriptorSetLayout(layout));
        }
    }

    /// Schedule a descriptor pool for release
    pub fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        if pool != vk::DescriptorPool::null() {
            self.schedule(PendingRelease::DescriptorPool(pool));
        }
    }

    /// Schedule a render pass for release
    pub fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        if render_pass != vk::RenderPass::null() {
            self.schedule(PendingRelease::RenderPass(render_pass));
        }
    }

    /// Schedule a framebuffer for release
    pub fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        if framebuffer != vk::Framebuffer::null() {
            self.schedule(PendingRelease::Framebuffer(framebuffer));
        }
    }

    /// Defer release of a pipeline created by downstream code
    pub fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        if pipeline != vk::Pipeline::null() {
            self.schedule(PendingRelease::Pipeline(pipeline));
        }
    }

    /// Defer release of a pipeline layout created by downstream code
    pub fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        if layout != vk::PipelineLayout::null() {
            self.schedule(PendingRelease::PipelineLayout(layout));
        }
    }

    /// Schedule a swapchain for release
    pub fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if swapchain != vk::SwapchainKHR::null() {
            self.schedule(PendingRelease::Swapchain(swapchain));
        }
    }

    /// Schedule a semaphore for release
    pub fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        if semaphore != vk::Semaphore::null() {
            self.schedule(PendingRelease::Semaphore(semaphore));
        }
    }

    /// Schedule a fence for release
    pub fn destroy_fence(&self, fence: vk::Fence) {
        if fence != vk::Fence::null() {
            self.schedule(PendingRelease::Fence(fence));
        }
    }
}

impl DescriptorAllocator for GraphicsContext {
    fn allocate_descriptor_set(&self, layout: &DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        self.allocate_set(layout)
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait idle failed during context teardown: {e:?}");
        }
        self.deletion_queue.get_mut().flush_all(self.device.as_ref());
        self.device.destroy(PendingRelease::DescriptorPool(self.global_pool));
    }
}
