//! Swapchain lifecycle
//!
//! A [`Swapchain`] owns the presentable images, their views and framebuffers,
//! one depth attachment and the per-image synchronization state. Recreation
//! builds a new instance that takes ownership of the one it replaces; the
//! predecessor is released on the new swapchain's first successful acquire,
//! since presents queued against the old images may still be pending until
//! then.

use std::rc::Rc;

use ash::vk;

use super::api::{DeviceApi, SubmitDesc, SwapchainDesc};
use super::context::GraphicsContext;
use super::render_pass::{Framebuffer, RenderPass};
use super::resources::{Image, ImageView};
use super::sync::{FrameSync, Semaphore};
use super::{VulkanError, VulkanResult};
use crate::core::config::RendererConfig;

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Presentation settings that apply on (re)creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainOptions {
    /// Present with FIFO
    pub vsync: bool,
    /// Timeout for acquiring an image
    pub acquire_timeout_ns: u64,
    /// Timeout for waiting on frame fences
    pub fence_timeout_ns: u64,
}

impl SwapchainOptions {
    /// Options from the renderer configuration
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            vsync: config.vsync,
            acquire_timeout_ns: config.acquire_timeout_ns(),
            fence_timeout_ns: config.fence_timeout_ns(),
        }
    }
}

impl Default for SwapchainOptions {
    fn default() -> Self {
        Self::from_config(&RendererConfig::default())
    }
}

/// Outcome of acquiring the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image is ready to render; `suboptimal` asks for recreation after presenting
    Acquired {
        /// Index of the acquired image
        image_index: u32,
        /// The image can be presented but the surface has changed
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface and must be recreated
    OutOfDate,
    /// The slot fence or the acquire did not complete in time
    TimedOut,
}

/// Outcome of presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    /// Presented, swapchain still matches the surface
    Optimal,
    /// Presented, but the swapchain should be recreated
    Suboptimal,
    /// The swapchain no longer matches the surface
    OutOfDate,
    /// The acquired image was still owned by another frame; the frame was
    /// dropped without presenting
    TimedOut,
}

/// Preferred surface format: sRGB BGRA, otherwise the first one reported
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or(VulkanError::NoSurfaceFormats)
}

/// FIFO under vsync; otherwise mailbox, then immediate, then FIFO
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent, or the window extent clamped to the surface limits when the
/// surface leaves it to the swapchain
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window_extent
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window_extent
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum when the surface has one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// First candidate usable as an optimal-tiling depth attachment
pub fn find_depth_format(device: &dyn DeviceApi) -> VulkanResult<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            device.format_supports(
                format,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            )
        })
        .ok_or(VulkanError::UnsupportedDepthFormat)
}

/// Color and depth formats a swapchain created now would use
pub fn preferred_formats(device: &dyn DeviceApi) -> VulkanResult<(vk::Format, vk::Format)> {
    let formats = device.surface_formats().map_err(VulkanError::Api)?;
    Ok((choose_surface_format(&formats)?.format, find_depth_format(device)?))
}

/// Owned swapchain handle, released through the deletion queue
struct SwapchainHandle {
    ctx: Rc<GraphicsContext>,
    raw: vk::SwapchainKHR,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        self.ctx.destroy_swapchain(self.raw);
    }
}

/// Presentable images and everything sized to them
pub struct Swapchain {
    ctx: Rc<GraphicsContext>,
    // Field order is release order: framebuffers and views before the
    // attachments and the swapchain they reference.
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    image_views: Vec<ImageView>,
    depth_view: ImageView,
    depth_image: Image,
    render_finished: Vec<Semaphore>,
    handle: SwapchainHandle,
    previous: Option<Box<Swapchain>>,
    images: Vec<vk::Image>,
    images_in_flight: Vec<Option<vk::Fence>>,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    options: SwapchainOptions,
}

impl Swapchain {
    /// Create a swapchain for the current surface state
    ///
    /// When `previous` is given its handle is passed to the driver as the old
    /// swapchain and the instance is kept until the first successful acquire.
    /// Anything `previous` itself was still holding on to is released now.
    pub fn new(
        ctx: Rc<GraphicsContext>,
        window_extent: vk::Extent2D,
        options: &SwapchainOptions,
        previous: Option<Self>,
    ) -> VulkanResult<Self> {
        let device = ctx.device();
        let caps = device.surface_capabilities().map_err(VulkanError::Api)?;
        let surface_format = choose_surface_format(&device.surface_formats().map_err(VulkanError::Api)?)?;
        let present_mode = choose_present_mode(
            &device.surface_present_modes().map_err(VulkanError::Api)?,
            options.vsync,
        );
        let extent = choose_extent(&caps, window_extent);
        let image_count = choose_image_count(&caps);
        let depth_format = find_depth_format(device)?;

        let mut previous = previous.map(Box::new);
        if let Some(prev) = previous.as_mut() {
            if prev.previous.take().is_some() {
                log::debug!("Releasing swapchain that was never replaced by a successful acquire");
            }
        }
        let old_swapchain = previous.as_ref().map_or(vk::SwapchainKHR::null(), |prev| prev.handle());

        let raw = device
            .create_swapchain(&SwapchainDesc {
                min_image_count: image_count,
                surface_format,
                extent,
                present_mode,
                pre_transform: caps.current_transform,
                old_swapchain,
            })
            .map_err(VulkanError::Api)?;
        let handle = SwapchainHandle {
            ctx: Rc::clone(&ctx),
            raw,
        };

        let images = device.swapchain_images(raw).map_err(VulkanError::Api)?;

        let image_views = images
            .iter()
            .map(|&image| ImageView::builder(image, surface_format.format).build(&ctx))
            .collect::<VulkanResult<Vec<_>>>()?;

        let depth_image = Image::builder()
            .extent(extent.width, extent.height)
            .format(depth_format)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .memory_properties(vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .build(&ctx)?;
        let depth_view = ImageView::for_image(&ctx, &depth_image)?;

        let render_pass = RenderPass::new_forward_pass(&ctx, surface_format.format, depth_format)?;

        let framebuffers = image_views
            .iter()
            .map(|view| Framebuffer::new(&ctx, &render_pass, &[view.handle(), depth_view.handle()], extent))
            .collect::<VulkanResult<Vec<_>>>()?;

        let render_finished = images
            .iter()
            .map(|_| Semaphore::new(&ctx))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!(
            "Created swapchain {}x{} with {} images, {:?}, {:?}, depth {:?}",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode,
            depth_format
        );

        Ok(Self {
            images_in_flight: vec![None; images.len()],
            ctx,
            framebuffers,
            render_pass,
            image_views,
            depth_view,
            depth_image,
            render_finished,
            handle,
            previous,
            images,
            surface_format,
            depth_format,
            present_mode,
            extent,
            options: *options,
        })
    }

    /// Wait for `frame`'s previous submission, then acquire the next image
    ///
    /// Signals `frame.image_available` when an image is returned.
    pub fn acquire_next_image(&mut self, frame: &FrameSync) -> VulkanResult<AcquireResult> {
        if !frame.in_flight.wait(self.options.fence_timeout_ns)? {
            log::warn!("Timed out waiting for frame fence");
            return Ok(AcquireResult::TimedOut);
        }

        let result = self.ctx.device().acquire_next_image(
            self.handle(),
            self.options.acquire_timeout_ns,
            frame.image_available.handle(),
        );

        match result {
            Ok((image_index, suboptimal)) => {
                if self.previous.take().is_some() {
                    log::debug!("First image acquired, releasing previous swapchain");
                }
                if suboptimal {
                    log::debug!("Swapchain suboptimal at acquire");
                }
                Ok(AcquireResult::Acquired { image_index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date at acquire");
                Ok(AcquireResult::OutOfDate)
            }
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                log::warn!("Timed out acquiring swapchain image");
                Ok(AcquireResult::TimedOut)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Submit `frame`'s command buffer for `image_index` and present it
    pub fn submit_command_buffers(&mut self, frame: &FrameSync, image_index: u32) -> VulkanResult<SwapchainStatus> {
        let index = image_index as usize;
        let Some(&image_fence) = self.images_in_flight.get(index) else {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Image index {image_index} out of range"),
            });
        };

        let slot_fence = frame.in_flight.handle();
        if let Some(fence) = image_fence.filter(|&fence| fence != slot_fence) {
            // Another slot is still rendering to this image.
            match self.ctx.device().wait_for_fence(fence, self.options.fence_timeout_ns) {
                Ok(()) => {}
                Err(vk::Result::TIMEOUT) => {
                    log::warn!("Timed out waiting for image {image_index} to be released by another frame");
                    self.abandon_frame(frame)?;
                    return Ok(SwapchainStatus::TimedOut);
                }
                Err(e) => return Err(VulkanError::Api(e)),
            }
        }
        self.images_in_flight[index] = Some(slot_fence);

        let render_finished = self.render_finished[index].handle();

        // Reset just before submission so an early return never leaves the
        // slot fence unsignaled.
        frame.in_flight.reset()?;
        self.ctx
            .device()
            .queue_submit(
                &SubmitDesc {
                    command_buffer: frame.command_buffer,
                    wait_semaphore: frame.image_available.handle(),
                    wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    signal_semaphore: render_finished,
                },
                slot_fence,
            )
            .map_err(VulkanError::Api)?;

        match self.ctx.device().queue_present(self.handle(), image_index, render_finished) {
            Ok(false) => Ok(SwapchainStatus::Optimal),
            Ok(true) => Ok(SwapchainStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Drop a frame whose image was acquired but will not be presented
    ///
    /// Submits an empty batch that consumes `image_available` and signals the
    /// slot fence, so the slot can acquire again on its next turn.
    fn abandon_frame(&self, frame: &FrameSync) -> VulkanResult<()> {
        frame.in_flight.reset()?;
        self.ctx
            .device()
            .queue_submit(
                &SubmitDesc {
                    command_buffer: vk::CommandBuffer::null(),
                    wait_semaphore: frame.image_available.handle(),
                    wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    signal_semaphore: vk::Semaphore::null(),
                },
                frame.in_flight.handle(),
            )
            .map_err(VulkanError::Api)
    }

    /// Whether `other` renders with the same color and depth formats
    pub fn compare_swap_formats(&self, other: &Self) -> bool {
        self.surface_format.format == other.surface_format.format && self.depth_format == other.depth_format
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle.raw
    }

    /// Predecessor kept alive until the first successful acquire
    pub fn previous(&self) -> Option<&Self> {
        self.previous.as_deref()
    }

    /// Render pass the framebuffers were created for
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer of image `index`
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index].handle()
    }

    /// Color view of image `index`
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index].handle()
    }

    /// Presentable image `index`
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Depth image shared by all framebuffers
    pub fn depth_image(&self) -> vk::Image {
        self.depth_image.handle()
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Format of the presentable images
    pub const fn color_format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Format of the depth image
    pub const fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Present mode in use
    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Options the swapchain was created with
    pub const fn options(&self) -> &SwapchainOptions {
        &self.options
    }

    /// Image size in pixels
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Image width in pixels
    pub const fn width(&self) -> u32 {
        self.extent.width
    }

    /// Image height in pixels
    pub const fn height(&self) -> u32 {
        self.extent.height
    }

    /// Width over height
    #[allow(clippy::cast_precision_loss)]
    pub fn extent_aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }
}
