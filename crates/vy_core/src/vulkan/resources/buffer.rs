//! GPU buffers
//!
//! A [`Buffer`] owns one `vk::Buffer` and the `vk::DeviceMemory` bound to it.
//! Buffers are either sized directly in bytes or as an array of instances,
//! where each instance is padded to a minimum offset alignment so it can be
//! bound on its own (per-frame uniform blocks, dynamic offsets).
//!
//! # Usage
//!
//! ```rust,no_run
//! # use std::rc::Rc;
//! # use ash::vk;
//! # use vy_core::vulkan::{context::GraphicsContext, resources::Buffer, VulkanResult};
//! # fn demo(ctx: &Rc<GraphicsContext>) -> VulkanResult<()> {
//! let alignment = ctx.device().min_uniform_buffer_offset_alignment();
//! let ubo = Buffer::builder()
//!     .instance(64, 2)
//!     .min_offset_alignment(alignment)
//!     .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
//!     .memory_properties(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT)
//!     .build(ctx)?;
//! ubo.write_to_index(&[1.0f32; 16], 1)?;
//! # Ok(())
//! # }
//! ```
//!
//! Dropping a buffer does not free it immediately; the release is queued on
//! the current frame slot.

use std::rc::Rc;

use ash::vk;

use crate::vulkan::api::BufferDesc;
use crate::vulkan::context::GraphicsContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Round `size` up to a multiple of `alignment` (a power of two, or 0 for none)
pub const fn aligned_size(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment > 0 {
        (size + alignment - 1) & !(alignment - 1)
    } else {
        size
    }
}

/// Builder for [`Buffer`]
#[derive(Debug, Clone)]
pub struct BufferBuilder {
    instance_size: vk::DeviceSize,
    instance_count: u32,
    min_offset_alignment: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self {
            instance_size: 0,
            instance_count: 1,
            min_offset_alignment: 1,
            usage: vk::BufferUsageFlags::empty(),
            memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        }
    }
}

impl BufferBuilder {
    /// Size of the buffer in bytes
    #[must_use]
    pub const fn size(mut self, size: vk::DeviceSize) -> Self {
        self.instance_size = size;
        self.instance_count = 1;
        self
    }

    /// Size the buffer as `count` instances of `instance_size` bytes
    #[must_use]
    pub const fn instance(mut self, instance_size: vk::DeviceSize, count: u32) -> Self {
        self.instance_size = instance_size;
        self.instance_count = count;
        self
    }

    /// Pad each instance to this alignment
    #[must_use]
    pub const fn min_offset_alignment(mut self, alignment: vk::DeviceSize) -> Self {
        self.min_offset_alignment = alignment;
        self
    }

    /// Buffer usage flags
    #[must_use]
    pub const fn usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// Required memory properties, host visible and coherent by default
    #[must_use]
    pub const fn memory_properties(mut self, properties: vk::MemoryPropertyFlags) -> Self {
        self.memory_properties = properties;
        self
    }

    /// Create the buffer and its memory
    ///
    /// # Panics
    ///
    /// If the resulting size is zero.
    pub fn build(self, ctx: &Rc<GraphicsContext>) -> VulkanResult<Buffer> {
        assert!(
            self.instance_size > 0 && self.instance_count > 0,
            "Buffer size must be greater than zero"
        );
        assert!(!self.usage.is_empty(), "Buffer usage must be specified");

        let alignment_size = aligned_size(self.instance_size, self.min_offset_alignment);
        let size = alignment_size * vk::DeviceSize::from(self.instance_count);

        let (buffer, memory) = ctx
            .device()
            .create_buffer(&BufferDesc {
                size,
                usage: self.usage,
                memory_properties: self.memory_properties,
            })
            .map_err(VulkanError::Api)?;

        log::trace!("Created buffer {buffer:?} ({size} bytes, {:?})", self.usage);

        Ok(Buffer {
            ctx: Rc::clone(ctx),
            buffer,
            memory,
            size,
            instance_size: self.instance_size,
            instance_count: self.instance_count,
            alignment_size,
            usage: self.usage,
            memory_properties: self.memory_properties,
        })
    }
}

/// GPU buffer wrapper with deferred release
pub struct Buffer {
    ctx: Rc<GraphicsContext>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Start building a buffer
    pub fn builder() -> BufferBuilder {
        BufferBuilder::default()
    }

    /// Get the buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the memory bound to the buffer
    pub const fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Total size in bytes, including instance padding
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Size of one instance including alignment padding
    pub const fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    /// Number of instances
    pub const fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Stride between instances
    pub const fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Usage the buffer was created with
    pub const fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Copy raw bytes into the buffer at `offset`
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        if !self.memory_properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer memory is not host visible".to_string(),
            });
        }
        if self.buffer == vk::Buffer::null() {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer has been destroyed".to_string(),
            });
        }
        let end = offset.checked_add(data.len() as vk::DeviceSize);
        if end.map_or(true, |end| end > self.size) {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Write of {} bytes at offset {offset} exceeds buffer size {}",
                    data.len(),
                    self.size
                ),
            });
        }
        self.ctx
            .device()
            .write_memory(self.memory, offset, data)
            .map_err(VulkanError::Api)
    }

    /// Copy a slice of plain data into the buffer at `offset`
    pub fn write_slice<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, data: &[T]) -> VulkanResult<()> {
        self.write_bytes(offset, bytemuck::cast_slice(data))
    }

    /// Copy one instance into slot `index`
    pub fn write_to_index<T: bytemuck::Pod>(&self, value: &T, index: u32) -> VulkanResult<()> {
        debug_assert!(index < self.instance_count, "Instance index {index} out of range");
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() as vk::DeviceSize > self.instance_size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Value of {} bytes exceeds instance size {}", bytes.len(), self.instance_size),
            });
        }
        self.write_bytes(self.index_offset(index), bytes)
    }

    /// Byte offset of instance `index`
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        vk::DeviceSize::from(index) * self.alignment_size
    }

    /// Descriptor info covering the whole buffer
    pub const fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }

    /// Descriptor info covering instance `index`
    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: self.index_offset(index),
            range: self.alignment_size,
        }
    }

    /// Queue the buffer for release; later calls do nothing
    pub fn destroy(&mut self) {
        self.ctx.destroy_buffer(self.buffer, self.memory);
        self.buffer = vk::Buffer::null();
        self.memory = vk::DeviceMemory::null();
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
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

    fn uniform(ctx: &Rc<GraphicsContext>, instance_size: vk::DeviceSize, count: u32) -> Buffer {
        Buffer::builder()
            .instance(instance_size, count)
            .min_offset_alignment(256)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .build(ctx)
            .expect("Should build buffer")
    }

    #[test]
    fn test_aligned_size() {
        assert_eq!(aligned_size(64, 256), 256);
        assert_eq!(aligned_size(256, 256), 256);
        assert_eq!(aligned_size(257, 256), 512);
        assert_eq!(aligned_size(13, 0), 13);
        assert_eq!(aligned_size(13, 1), 13);
    }

    #[test]
    fn test_instance_layout() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let buffer = uniform(&ctx, 80, 3);

        assert_eq!(buffer.alignment_size(), 256);
        assert_eq!(buffer.size(), 768);
        assert_eq!(buffer.index_offset(2), 512);

        let info = buffer.descriptor_info_for_index(1);
        assert_eq!(info.offset, 256);
        assert_eq!(info.range, 256);
        assert_eq!(buffer.descriptor_info().range, 768);
        assert!(matches!(device.calls()[1], Call::CreateBuffer { size: 768, .. }));
    }

    #[test]
    #[should_panic(expected = "greater than zero")]
    fn test_zero_size_panics() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let _ = Buffer::builder()
            .size(0)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .build(&ctx);
    }

    #[test]
    fn test_allocation_failure_carries_native_code() {
        let device = MockDevice::new();
        let ctx = context(&device);
        device.state().fail_allocations = true;

        let result = Buffer::builder()
            .size(64)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .build(&ctx);
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))));
    }

    #[test]
    fn test_write_to_index_uses_aligned_offset() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let buffer = uniform(&ctx, 16, 2);

        buffer.write_to_index(&[1u32, 2, 3, 4], 1).expect("Should write");

        let expected: Vec<u8> = bytemuck::cast_slice(&[1u32, 2, 3, 4]).to_vec();
        assert!(device.calls().contains(&Call::WriteMemory {
            memory: buffer.memory(),
            offset: 256,
            data: expected,
        }));
    }

    #[test]
    fn test_out_of_bounds_write_is_rejected() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let buffer = Buffer::builder()
            .size(8)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .build(&ctx)
            .expect("Should build");

        assert!(buffer.write_slice(4, &[0u32, 0]).is_err());
        assert!(buffer.write_slice(0, &[0u32, 0]).is_ok());
    }

    #[test]
    fn test_device_local_write_is_rejected() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let buffer = Buffer::builder()
            .size(8)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .memory_properties(vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .build(&ctx)
            .expect("Should build");

        assert!(matches!(buffer.write_bytes(0, &[1, 2]), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_destroy_twice_schedules_once() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let mut buffer = uniform(&ctx, 64, 1);
        let release = PendingRelease::Buffer { buffer: buffer.handle(), memory: buffer.memory() };

        buffer.destroy();
        buffer.destroy();
        drop(buffer);

        ctx.flush_deletion_queue(0);
        assert_eq!(device.destroyed(), vec![release]);
    }

    #[test]
    fn test_move_assignment_releases_previous_buffer() {
        let device = MockDevice::new();
        let ctx = context(&device);
        let mut buffer = uniform(&ctx, 64, 1);
        let first = buffer.handle();

        buffer = uniform(&ctx, 64, 1);
        assert_ne!(buffer.handle(), first);
        assert_eq!(ctx.pending_releases(0), 1);

        ctx.flush_deletion_queue(0);
        assert!(matches!(device.destroyed()[0], PendingRelease::Buffer { buffer, .. } if buffer == first));
    }
}
