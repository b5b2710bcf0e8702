//! Images and image views

use std::rc::Rc;

use ash::vk;

use crate::vulkan::api::{ImageBarrier, ImageDesc, ImageViewDesc};
use crate::vulkan::context::GraphicsContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Aspect flags matching the contents of `format`
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Access mask and pipeline stage that touch an image in `layout`
fn layout_access(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE)
        }
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        _ => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

/// Builder for [`Image`]
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    desc: ImageDesc,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self {
            desc: ImageDesc {
                image_type: vk::ImageType::TYPE_2D,
                extent: vk::Extent3D { width: 0, height: 0, depth: 1 },
                format: vk::Format::R8G8B8A8_SRGB,
                usage: vk::ImageUsageFlags::empty(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                initial_layout: vk::ImageLayout::UNDEFINED,
                memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
        }
    }
}

impl ImageBuilder {
    /// 2D extent in pixels
    #[must_use]
    pub const fn extent(mut self, width: u32, height: u32) -> Self {
        self.desc.extent = vk::Extent3D { width, height, depth: 1 };
        self
    }

    /// 3D extent; also switches the image type to 3D when `depth > 1`
    #[must_use]
    pub const fn extent_3d(mut self, extent: vk::Extent3D) -> Self {
        self.desc.extent = extent;
        if extent.depth > 1 {
            self.desc.image_type = vk::ImageType::TYPE_3D;
        }
        self
    }

    /// Texel format
    #[must_use]
    pub const fn format(mut self, format: vk::Format) -> Self {
        self.desc.format = format;
        self
    }

    /// Image usage flags
    #[must_use]
    pub const fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.desc.usage = usage;
        self
    }

    /// Number of mip levels
    #[must_use]
    pub const fn mip_levels(mut self, levels: u32) -> Self {
        self.desc.mip_levels = levels;
        self
    }

    /// Number of array layers
    #[must_use]
    pub const fn array_layers(mut self, layers: u32) -> Self {
        self.desc.array_layers = layers;
        self
    }

    /// Samples per texel
    #[must_use]
    pub const fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.desc.samples = samples;
        self
    }

    /// Optimal or linear tiling
    #[must_use]
    pub const fn tiling(mut self, tiling: vk::ImageTiling) -> Self {
        self.desc.tiling = tiling;
        self
    }

    /// Layout the image is created in
    #[must_use]
    pub const fn initial_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.desc.initial_layout = layout;
        self
    }

    /// Required memory properties, device local by default
    #[must_use]
    pub const fn memory_properties(mut self, properties: vk::MemoryPropertyFlags) -> Self {
        self.desc.memory_properties = properties;
        self
    }

    /// Create the image and its memory
    ///
    /// # Panics
    ///
    /// If any extent dimension, the mip level count or the layer count is zero.
    pub fn build(self, ctx: &Rc<GraphicsContext>) -> VulkanResult<Image> {
        let desc = self.desc;
        assert!(
            desc.extent.width > 0 && desc.extent.height > 0 && desc.extent.depth > 0,
            "Image extent must be greater than zero"
        );
        assert!(desc.mip_levels > 0, "Image needs at least one mip level");
        assert!(desc.array_layers > 0, "Image needs at least one array layer");
        assert!(!desc.usage.is_empty(), "Image usage must be specified");

        let (image, memory) = ctx.device().create_image(&desc).map_err(VulkanError::Api)?;

        log::trace!(
            "Created image {image:?} {}x{}x{} {:?}",
            desc.extent.width,
            desc.extent.height,
            desc.extent.depth,
            desc.format
        );

        Ok(Image {
            ctx: Rc::clone(ctx),
            image,
            memory,
            extent: desc.extent,
            format: desc.format,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            layout: desc.initial_layout,
        })
    }
}

/// GPU image wrapper with deferred release
///
/// Tracks the layout the image was last transitioned to.
pub struct Image {
    ctx: Rc<GraphicsContext>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    extent: vk::Extent3D,
    format: vk::Format,
    mip_levels: u32,
    array_layers: u32,
    layout: vk::ImageLayout,
}

impl Image {
    /// Start building an image
    pub fn builder() -> ImageBuilder {
        ImageBuilder::default()
    }

    /// Get the image handle
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// Memory bound to the image
    pub const fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Size in texels
    pub const fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Texel format
    pub const fn format(&self) -> vk::Format {
        self.format
    }

    /// Number of mip levels
    pub const fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Number of array layers
    pub const fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// Layout the image is in once previously recorded commands execute
    pub const fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Record a layout change made outside [`transition_layout`](Self::transition_layout), e.g. by a render pass
    pub fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }

    /// Subresource range covering every mip level and layer
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect_for_format(self.format),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// Record a barrier moving the whole image to `new_layout`
    pub fn transition_layout(&mut self, command_buffer: vk::CommandBuffer, new_layout: vk::ImageLayout) {
        if self.layout == new_layout {
            return;
        }
        let (src_access, src_stage) = layout_access(self.layout);
        let (dst_access, dst_stage) = layout_access(new_layout);

        self.ctx.device().cmd_image_barrier(
            command_buffer,
            &ImageBarrier {
                image: self.image,
                old_layout: self.layout,
                new_layout,
                src_access,
                dst_access,
                src_stage,
                dst_stage,
                subresource_range: self.full_range(),
            },
        );
        self.layout = new_layout;
    }

    /// Queue the image for release; later calls do nothing
    pub fn destroy(&mut self) {
        self.ctx.destroy_image(self.image, self.memory);
        self.image = vk::Image::null();
        self.memory = vk::DeviceMemory::null();
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Builder for [`ImageView`]
#[derive(Debug, Clone, Copy)]
pub struct ImageViewBuilder {
    desc: ImageViewDesc,
}

impl ImageViewBuilder {
    /// View dimensionality
    #[must_use]
    pub const fn view_type(mut self, view_type: vk::ImageViewType) -> Self {
        self.desc.view_type = view_type;
        self
    }

    /// Aspect override, derived from the format otherwise
    #[must_use]
    pub const fn aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.desc.subresource_range.aspect_mask = aspect;
        self
    }

    /// First mip level and number of levels
    #[must_use]
    pub const fn mip_range(mut self, base: u32, count: u32) -> Self {
        self.desc.subresource_range.base_mip_level = base;
        self.desc.subresource_range.level_count = count;
        self
    }

    /// First array layer and number of layers
    #[must_use]
    pub const fn layer_range(mut self, base: u32, count: u32) -> Self {
        self.desc.subresource_range.base_array_layer = base;
        self.desc.subresource_range.layer_count = count;
        self
    }

    /// Create the view
    pub fn build(self, ctx: &Rc<GraphicsContext>) -> VulkanResult<ImageView> {
        assert!(self.desc.image != vk::Image::null(), "Image view needs a live image");
        assert!(
            self.desc.subresource_range.level_count > 0 && self.desc.subresource_range.layer_count > 0,
            "Image view must cover at least one mip level and layer"
        );

        let view = ctx.device().create_image_view(&self.desc).map_err(VulkanError::Api)?;
        Ok(ImageView {
            ctx: Rc::clone(ctx),
            view,
            format: self.desc.format,
        })
    }
}

/// Image view wrapper with deferred release
pub struct ImageView {
    ctx: Rc<GraphicsContext>,
    view: vk::ImageView,
    format: vk::Format,
}

impl ImageView {
    /// Start building a view of `image`
    pub fn builder(image: vk::Image, format: vk::Format) -> ImageViewBuilder {
        ImageViewBuilder {
            desc: ImageViewDesc {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: aspect_for_format(format),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            },
        }
    }

    /// View covering every mip level and layer of `image`
    pub fn for_image(ctx: &Rc<GraphicsContext>, image: &Image) -> VulkanResult<Self> {
        let view_type = if image.extent().depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else if image.array_layers() > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        Self::builder(image.handle(), image.format())
            .view_type(view_type)
            .mip_range(0, image.mip_levels())
            .layer_range(0, image.array_layers())
            .build(ctx)
    }

    /// Get the image view handle
    pub const fn handle(&self) -> vk::ImageView {
        self.view
    }

    /// Format of the view
    pub const fn format(&self) -> vk::Format {
        self.format
    }

    /// Queue the view for release; later calls do nothing
    pub fn destroy(&mut self) {
        self.ctx.destroy_image_view(self.view);
        self.view = vk::ImageView::null();
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.destroy();
    }
}
