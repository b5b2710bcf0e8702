//! Device seam
//!
//! [`DeviceApi`] is the narrow set of native calls the frame loop and the
//! resource wrappers need. [`AshDevice`](super::device::AshDevice) implements
//! it on top of `ash`; tests swap in a recording mock.

use ash::prelude::VkResult;
use ash::vk;

/// Parameters for a buffer plus its backing allocation
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: vk::DeviceSize,
    /// Buffer usage flags
    pub usage: vk::BufferUsageFlags,
    /// Required memory properties of the allocation
    pub memory_properties: vk::MemoryPropertyFlags,
}

/// Parameters for an image plus its backing allocation
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// 1D, 2D or 3D
    pub image_type: vk::ImageType,
    /// Size in texels
    pub extent: vk::Extent3D,
    /// Texel format
    pub format: vk::Format,
    /// Image usage flags
    pub usage: vk::ImageUsageFlags,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Number of array layers
    pub array_layers: u32,
    /// Samples per texel
    pub samples: vk::SampleCountFlags,
    /// Optimal or linear tiling
    pub tiling: vk::ImageTiling,
    /// Layout the image is created in
    pub initial_layout: vk::ImageLayout,
    /// Required memory properties of the allocation
    pub memory_properties: vk::MemoryPropertyFlags,
}

/// Parameters for a view of an existing image
#[derive(Debug, Clone, Copy)]
pub struct ImageViewDesc {
    /// Image being viewed
    pub image: vk::Image,
    /// View dimensionality
    pub view_type: vk::ImageViewType,
    /// Format the view interprets texels as
    pub format: vk::Format,
    /// Aspects, mips and layers visible through the view
    pub subresource_range: vk::ImageSubresourceRange,
}

/// Parameters for a sampler
#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Filtering between mip levels
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Addressing for all three coordinates
    pub address_mode: vk::SamplerAddressMode,
    /// `None` disables anisotropic filtering
    pub max_anisotropy: Option<f32>,
    /// Lowest mip level sampled
    pub min_lod: f32,
    /// Highest mip level sampled
    pub max_lod: f32,
    /// Color returned for clamp-to-border addressing
    pub border_color: vk::BorderColor,
    /// `Some` makes this a comparison sampler
    pub compare_op: Option<vk::CompareOp>,
}

/// Parameters for a swapchain on the device's surface
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    /// Minimum number of presentable images
    pub min_image_count: u32,
    /// Color format and color space of the images
    pub surface_format: vk::SurfaceFormatKHR,
    /// Image size in pixels
    pub extent: vk::Extent2D,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Surface transform applied on present
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Retired swapchain handed to the driver, or null
    pub old_swapchain: vk::SwapchainKHR,
}

/// A single image layout transition recorded as a pipeline barrier
#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    /// Image to transition
    pub image: vk::Image,
    /// Current layout
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Accesses made available before the barrier
    pub src_access: vk::AccessFlags,
    /// Accesses that wait on the barrier
    pub dst_access: vk::AccessFlags,
    /// Stages that must complete first
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait
    pub dst_stage: vk::PipelineStageFlags,
    /// Mips and layers transitioned
    pub subresource_range: vk::ImageSubresourceRange,
}

/// One command buffer submission of a frame
///
/// A null `command_buffer` or `signal_semaphore` is left out of the batch.
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc {
    /// Command buffer to execute
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore waited on before `wait_stage`
    pub wait_semaphore: vk::Semaphore,
    /// Stage that waits on `wait_semaphore`
    pub wait_stage: vk::PipelineStageFlags,
    /// Semaphore signaled when the batch completes
    pub signal_semaphore: vk::Semaphore,
}

/// Resource referenced by a descriptor write
#[derive(Debug, Clone, Copy)]
pub enum DescriptorInfo {
    /// Buffer range
    Buffer(vk::DescriptorBufferInfo),
    /// Image view, sampler and layout
    Image(vk::DescriptorImageInfo),
}

/// One descriptor of one binding of a set
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite {
    /// Binding number in the layout
    pub binding: u32,
    /// Element of the binding's array
    pub array_element: u32,
    /// Type declared by the layout for this binding
    pub descriptor_type: vk::DescriptorType,
    /// Resource written to the descriptor
    pub info: DescriptorInfo,
}

/// A native object whose release has been deferred
///
/// Buffers and images carry the allocation that backs them so both are
/// released together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingRelease {
    /// Buffer and its allocation
    Buffer {
        /// Buffer handle
        buffer: vk::Buffer,
        /// Memory bound to `buffer`
        memory: vk::DeviceMemory,
    },
    /// Image and its allocation
    Image {
        /// Image handle
        image: vk::Image,
        /// Memory bound to `image`
        memory: vk::DeviceMemory,
    },
    /// Image view
    ImageView(vk::ImageView),
    /// Sampler
    Sampler(vk::Sampler),
    /// Descriptor set layout
    DescriptorSetLayout(vk::DescriptorSetLayout),
    /// Descriptor pool, freeing every set allocated from it
    DescriptorPool(vk::DescriptorPool),
    /// Render pass
    RenderPass(vk::RenderPass),
    /// Framebuffer
    Framebuffer(vk::Framebuffer),
    /// Graphics or compute pipeline
    Pipeline(vk::Pipeline),
    /// Pipeline layout
    PipelineLayout(vk::PipelineLayout),
    /// Swapchain and its images
    Swapchain(vk::SwapchainKHR),
    /// Semaphore
    Semaphore(vk::Semaphore),
    /// Fence
    Fence(vk::Fence),
}

impl PendingRelease {
    /// Short name of the resource kind, for logging
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Buffer { .. } => "buffer",
            Self::Image { .. } => "image",
            Self::ImageView(_) => "image view",
            Self::Sampler(_) => "sampler",
            Self::DescriptorSetLayout(_) => "descriptor set layout",
            Self::DescriptorPool(_) => "descriptor pool",
            Self::RenderPass(_) => "render pass",
            Self::Framebuffer(_) => "framebuffer",
            Self::Pipeline(_) => "pipeline",
            Self::PipelineLayout(_) => "pipeline layout",
            Self::Swapchain(_) => "swapchain",
            Self::Semaphore(_) => "semaphore",
            Self::Fence(_) => "fence",
        }
    }
}

/// Native device operations used by the renderer core
///
/// All methods take `&self`; implementations own their handles and release
/// them on drop.
pub trait DeviceApi {
    // Resources

    /// Create a buffer and bind freshly allocated memory to it
    fn create_buffer(&self, desc: &BufferDesc) -> VkResult<(vk::Buffer, vk::DeviceMemory)>;

    /// Copy `data` into host-visible `memory` at `offset`
    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()>;

    /// Create an image and bind freshly allocated memory to it
    fn create_image(&self, desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)>;

    /// Create a view of an existing image
    fn create_image_view(&self, desc: &ImageViewDesc) -> VkResult<vk::ImageView>;

    /// Create a sampler
    fn create_sampler(&self, desc: &SamplerDesc) -> VkResult<vk::Sampler>;

    /// Whether `format` supports `features` with the given tiling
    fn format_supports(&self, format: vk::Format, tiling: vk::ImageTiling, features: vk::FormatFeatureFlags) -> bool;

    /// Alignment required for uniform buffer offsets
    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize;

    /// Largest anisotropy samplers may use, 1.0 when anisotropy is disabled
    fn max_sampler_anisotropy(&self) -> f32;

    /// Whether descriptor pools and layouts may use update-after-bind
    fn supports_update_after_bind(&self) -> bool;

    /// Release a native object immediately
    fn destroy(&self, release: PendingRelease);

    // Descriptors

    /// Create a layout; `binding_flags` is empty or parallel to `bindings`
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        binding_flags: &[vk::DescriptorBindingFlags],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<vk::DescriptorSetLayout>;

    /// Create a descriptor pool
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VkResult<vk::DescriptorPool>;

    /// Allocate one set; exhaustion surfaces as `ERROR_OUT_OF_POOL_MEMORY` or `ERROR_FRAGMENTED_POOL`
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;

    /// Return sets to a pool created with `FREE_DESCRIPTOR_SET`
    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()>;

    /// Return every set of `pool` at once
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;

    /// Write `writes` into `set`
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    // Synchronization

    /// Create a binary semaphore
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;

    /// Wait for `fence`; a timeout is reported as `Err(vk::Result::TIMEOUT)`
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    /// Block until the device has no work left
    fn wait_idle(&self) -> VkResult<()>;

    // Command recording

    /// Allocate primary command buffers from the device's resettable pool
    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;

    /// Begin one-time-submit recording, implicitly resetting the buffer
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Finish recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Begin `render_pass` over the full `extent` with inline contents
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    );

    /// Set a full-extent viewport and scissor
    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D);

    /// End the current render pass
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);

    /// Record a layout transition
    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier);

    // Presentation

    /// Capabilities of the presentation surface
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    /// Formats the surface supports
    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    /// Present modes the surface supports
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;

    /// Forward render pass with one presentable color attachment and one depth attachment
    fn create_render_pass(&self, color_format: vk::Format, depth_format: vk::Format) -> VkResult<vk::RenderPass>;

    /// Create a single-layer framebuffer
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;

    /// Create a swapchain on the device's surface
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;

    /// Presentable images owned by `swapchain`
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    /// Returns the image index and whether the swapchain is suboptimal
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// Submit one batch to the graphics queue, signaling `fence` on completion
    fn queue_submit(&self, submit: &SubmitDesc, fence: vk::Fence) -> VkResult<()>;

    /// Returns whether the swapchain is suboptimal
    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore) -> VkResult<bool>;
}
