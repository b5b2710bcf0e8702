//! Batched descriptor writes

use std::collections::BTreeMap;

use ash::vk;

use super::layout::DescriptorSetLayout;
use super::pool::DescriptorAllocator;
use crate::vulkan::api::{DescriptorInfo, DescriptorWrite};

pub(crate) const BUFFER_TYPES: [vk::DescriptorType; 4] = [
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
];

pub(crate) const IMAGE_TYPES: [vk::DescriptorType; 5] = [
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// Collects buffer and image references for the bindings of one layout and
/// writes them into a set in a single device call.
///
/// Successive writes to the same binding fill consecutive array elements.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    allocator: &'a dyn DescriptorAllocator,
    writes: Vec<DescriptorWrite>,
    next_element: BTreeMap<u32, u32>,
}

impl<'a> DescriptorWriter<'a> {
    /// Create a writer for sets of `layout` allocated from `allocator`
    pub fn new(layout: &'a DescriptorSetLayout, allocator: &'a dyn DescriptorAllocator) -> Self {
        Self {
            layout,
            allocator,
            writes: Vec::new(),
            next_element: BTreeMap::new(),
        }
    }

    /// Write a buffer to the next array element of `binding`
    #[must_use]
    pub fn write_buffer(self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.push(binding, DescriptorInfo::Buffer(info), &BUFFER_TYPES)
    }

    /// Write an image to the next array element of `binding`
    #[must_use]
    pub fn write_image(self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.push(binding, DescriptorInfo::Image(info), &IMAGE_TYPES)
    }

    fn push(mut self, binding: u32, info: DescriptorInfo, accepted: &[vk::DescriptorType]) -> Self {
        let Some(declared) = self.layout.binding(binding).copied() else {
            debug_assert!(false, "Layout does not contain binding {binding}");
            log::error!("Skipping descriptor write to undeclared binding {binding}");
            return self;
        };

        debug_assert!(
            accepted.contains(&declared.descriptor_type),
            "Binding {binding} holds {:?}, which does not match the written resource",
            declared.descriptor_type
        );

        let element = self.next_element.entry(binding).or_insert(0);
        if *element >= declared.count {
            debug_assert!(false, "Binding {binding} holds {} descriptors, write exceeds it", declared.count);
            log::error!("Skipping descriptor write past the end of binding {binding}");
            return self;
        }

        self.writes.push(DescriptorWrite {
            binding,
            array_element: *element,
            descriptor_type: declared.descriptor_type,
            info,
        });
        *element += 1;
        self
    }

    /// Pending writes
    pub fn writes(&self) -> &[DescriptorWrite] {
        &self.writes
    }

    /// Write everything into an existing set
    pub fn update(&self, set: vk::DescriptorSet) {
        if self.writes.is_empty() {
            return;
        }
        self.layout.context().device().update_descriptor_set(set, &self.writes);
    }

    /// Allocate a set and write everything into it, `None` when the allocator is exhausted
    pub fn build(self) -> Option<vk::DescriptorSet> {
        let set = self.allocator.allocate_descriptor_set(self.layout)?;
        self.update(set);
        Some(set)
    }
}
