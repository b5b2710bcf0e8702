//! Descriptor pools
//!
//! Allocation failure because a pool ran out of sets or descriptors is an
//! expected condition: callers get `None` and move on to another pool.

use std::rc::Rc;

use ash::vk;

use super::layout::DescriptorSetLayout;
use crate::vulkan::api::DeviceApi;
use crate::vulkan::context::GraphicsContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Anything that can hand out descriptor sets
pub trait DescriptorAllocator {
    /// Allocate one set of `layout`, `None` when out of capacity
    fn allocate_descriptor_set(&self, layout: &DescriptorSetLayout) -> Option<vk::DescriptorSet>;
}

/// Allocate one set from a raw pool, mapping exhaustion to `None`
pub(crate) fn allocate_from(
    device: &dyn DeviceApi,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Option<vk::DescriptorSet> {
    match device.allocate_descriptor_set(pool, layout) {
        Ok(set) => Some(set),
        Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
            log::debug!("Descriptor pool {pool:?} exhausted");
            None
        }
        Err(e) => {
            log::error!("Descriptor set allocation failed: {e:?}");
            None
        }
    }
}

/// Builder for [`DescriptorPool`]
#[derive(Debug)]
pub struct DescriptorPoolBuilder {
    max_sets: u32,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            max_sets: 1000,
            pool_sizes: Vec::new(),
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorPoolBuilder {
    /// Reserve `count` descriptors of `descriptor_type`
    #[must_use]
    pub fn add_pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(vk::DescriptorPoolSize {
            ty: descriptor_type,
            descriptor_count: count,
        });
        self
    }

    /// Maximum number of sets allocated at once
    #[must_use]
    pub const fn set_max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// Replace the pool creation flags
    #[must_use]
    pub const fn set_pool_flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Allow individual sets to be returned with [`DescriptorPool::free_descriptors`]
    #[must_use]
    pub fn free_descriptor_sets(mut self) -> Self {
        self.flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        self
    }

    /// Allow sets of update-after-bind layouts
    #[must_use]
    pub fn update_after_bind(mut self) -> Self {
        self.flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        self
    }

    /// Create the pool
    pub fn build(self, ctx: &Rc<GraphicsContext>) -> VulkanResult<DescriptorPool> {
        assert!(self.max_sets > 0, "Descriptor pool must allow at least one set");
        assert!(!self.pool_sizes.is_empty(), "Descriptor pool needs at least one pool size");

        let pool = ctx
            .device()
            .create_descriptor_pool(self.max_sets, &self.pool_sizes, self.flags)
            .map_err(VulkanError::Api)?;

        Ok(DescriptorPool {
            ctx: Rc::clone(ctx),
            pool,
            max_sets: self.max_sets,
            flags: self.flags,
        })
    }
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    ctx: Rc<GraphicsContext>,
    pool: vk::DescriptorPool,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPool {
    /// Start building a pool
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Allocate one set, `None` when the pool is exhausted or fragmented
    pub fn allocate_descriptor_set(&self, layout: &DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        debug_assert!(
            !layout.is_update_after_bind() || self.flags.contains(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND),
            "Update-after-bind layouts need an update-after-bind pool"
        );
        allocate_from(self.ctx.device(), self.pool, layout.handle())
    }

    /// Return individual sets to the pool
    pub fn free_descriptors(&self, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
        debug_assert!(
            self.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET),
            "Pool was not created with FREE_DESCRIPTOR_SET"
        );
        if sets.is_empty() {
            return Ok(());
        }
        self.ctx
            .device()
            .free_descriptor_sets(self.pool, sets)
            .map_err(VulkanError::Api)
    }

    /// Reset the descriptor pool (frees all allocated sets)
    pub fn reset_pool(&self) -> VulkanResult<()> {
        self.ctx.device().reset_descriptor_pool(self.pool).map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Maximum number of sets the pool holds
    pub const fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl DescriptorAllocator for DescriptorPool {
    fn allocate_descriptor_set(&self, layout: &DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        Self::allocate_descriptor_set(self, layout)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.ctx.destroy_descriptor_pool(self.pool);
    }
}
