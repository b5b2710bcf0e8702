//! Descriptor set layouts

use std::collections::BTreeMap;
use std::rc::Rc;

use ash::vk;

use crate::vulkan::context::GraphicsContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// One binding slot of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    /// Descriptor type every element of this binding holds
    pub descriptor_type: vk::DescriptorType,
    /// Shader stages that can access the binding
    pub stage_flags: vk::ShaderStageFlags,
    /// Array size of the binding
    pub count: u32,
    /// Per-binding flags (partially bound, update after bind, ...)
    pub flags: vk::DescriptorBindingFlags,
}

/// Descriptor set layout builder for creating reusable layouts
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BTreeMap<u32, LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding of `count` descriptors
    ///
    /// Declaring the same binding index twice is a programming error.
    #[must_use]
    pub fn add_binding(
        self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        self.add_binding_with_flags(binding, descriptor_type, stage_flags, count, vk::DescriptorBindingFlags::empty())
    }

    /// Add a binding with descriptor indexing flags
    #[must_use]
    pub fn add_binding_with_flags(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        debug_assert!(
            !self.bindings.contains_key(&binding),
            "Binding {binding} already declared in this layout"
        );
        debug_assert!(count > 0, "Binding {binding} must hold at least one descriptor");
        self.bindings.insert(
            binding,
            LayoutBinding {
                descriptor_type,
                stage_flags,
                count,
                flags,
            },
        );
        self
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags, 1)
    }

    /// Add a combined image sampler binding
    #[must_use]
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags, 1)
    }

    /// Add a storage buffer binding
    #[must_use]
    pub fn add_storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags, 1)
    }

    /// Add a partially bound, update-after-bind array of `count` descriptors
    #[must_use]
    pub fn add_bindless_array(
        self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        self.add_binding_with_flags(
            binding,
            descriptor_type,
            stage_flags,
            count,
            vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND,
        )
    }

    /// Build the descriptor set layout
    pub fn build(self, ctx: &Rc<GraphicsContext>) -> VulkanResult<DescriptorSetLayout> {
        let raw_bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|(&index, binding)| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(index)
                    .descriptor_type(binding.descriptor_type)
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stage_flags)
                    .build()
            })
            .collect();

        let update_after_bind = self
            .bindings
            .values()
            .any(|b| b.flags.contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND));
        let has_binding_flags = self.bindings.values().any(|b| !b.flags.is_empty());

        let binding_flags: Vec<vk::DescriptorBindingFlags> = if has_binding_flags {
            self.bindings.values().map(|b| b.flags).collect()
        } else {
            Vec::new()
        };

        let create_flags = if update_after_bind {
            vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL
        } else {
            vk::DescriptorSetLayoutCreateFlags::empty()
        };

        let layout = ctx
            .device()
            .create_descriptor_set_layout(&raw_bindings, &binding_flags, create_flags)
            .map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            ctx: Rc::clone(ctx),
            layout,
            bindings: self.bindings,
            update_after_bind,
        })
    }
}

/// Descriptor set layout; released through the context's deletion queue
pub struct DescriptorSetLayout {
    ctx: Rc<GraphicsContext>,
    layout: vk::DescriptorSetLayout,
    bindings: BTreeMap<u32, LayoutBinding>,
    update_after_bind: bool,
}

impl DescriptorSetLayout {
    /// Start building a layout
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::new()
    }

    /// Get the Vulkan descriptor set layout handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Declared binding at `index`
    pub fn binding(&self, index: u32) -> Option<&LayoutBinding> {
        self.bindings.get(&index)
    }

    /// All bindings in ascending index order
    pub fn bindings(&self) -> impl Iterator<Item = (u32, &LayoutBinding)> {
        self.bindings.iter().map(|(&index, binding)| (index, binding))
    }

    /// Sets of this layout must come from an update-after-bind pool
    pub const fn is_update_after_bind(&self) -> bool {
        self.update_after_bind
    }

    pub(crate) fn context(&self) -> &Rc<GraphicsContext> {
        &self.ctx
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.ctx.destroy_descriptor_set_layout(self.layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ContextConfig;
    use crate::vulkan::api::PendingRelease;
    use crate::vulkan::mock::{Call, MockDevice};

    fn context(device: &MockDevice) -> Rc<GraphicsContext> {
        GraphicsContext::new(Box::new(device.clone()), &ContextConfig::default()).expect("Should create context")
    }

    #[test]
    fn test_bindings_sorted_by_index() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let layout = DescriptorSetLayout::builder()
            .add_combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT)
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(&ctx)
            .expect("Should build");

        let indices: Vec<u32> = layout.bindings().map(|(index, _)| index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(
            layout.binding(2).map(|b| b.descriptor_type),
            Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        );
        assert!(layout.binding(1).is_none());
        assert!(!layout.is_update_after_bind());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already declared")]
    fn test_duplicate_binding_panics() {
        let _ = DescriptorSetLayout::builder()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_storage_buffer(0, vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn test_bindless_array_sets_update_after_bind_pool() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let layout = DescriptorSetLayout::builder()
            .add_bindless_array(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT, 1024)
            .build(&ctx)
            .expect("Should build");

        assert!(layout.is_update_after_bind());
        assert!(device.calls().iter().any(|call| matches!(
            call,
            Call::CreateDescriptorSetLayout { flags, .. }
                if flags.contains(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
        )));
    }

    #[test]
    fn test_drop_defers_destruction() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let layout = DescriptorSetLayout::builder()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(&ctx)
            .expect("Should build");
        let handle = layout.handle();

        drop(layout);
        assert!(device.destroyed().is_empty());

        ctx.flush_deletion_queue(0);
        assert_eq!(device.destroyed(), vec![PendingRelease::DescriptorSetLayout(handle)]);
    }
}
