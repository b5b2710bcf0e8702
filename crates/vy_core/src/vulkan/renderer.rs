//! Frame loop
//!
//! The [`Renderer`] paces CPU recording against GPU completion with a fixed
//! ring of frame slots. Each frame it waits for the slot's previous
//! submission, acquires a swapchain image, retires the slot's deferred
//! releases, hands out the slot's command buffer, then submits, presents and
//! advances to the next slot. Out-of-date and suboptimal swapchains are
//! recreated here rather than reported to the caller.

use std::rc::Rc;

use ash::vk;

use super::context::GraphicsContext;
use super::swapchain::{preferred_formats, AcquireResult, Swapchain, SwapchainOptions, SwapchainStatus};
use super::sync::FrameSync;
use super::{VulkanError, VulkanResult, WindowSurface};
use crate::core::config::RendererConfig;

/// State of the frame between `begin_frame` and `end_frame`
#[derive(Debug, Clone, Copy)]
struct FrameRecording {
    command_buffer: vk::CommandBuffer,
    image_index: u32,
    render_pass_active: bool,
}

/// Drives the acquire, record, submit and present cycle
pub struct Renderer {
    frames: Vec<FrameSync>,
    swapchain: Option<Swapchain>,
    ctx: Rc<GraphicsContext>,
    frame_index: usize,
    recording: Option<FrameRecording>,
    recreate_pending: bool,
    options: SwapchainOptions,
    clear_color: [f32; 4],
}

impl Renderer {
    /// Create the frame ring and the initial swapchain
    ///
    /// The number of frame slots is the one the context was created with.
    pub fn new(ctx: Rc<GraphicsContext>, window: &dyn WindowSurface, config: &RendererConfig) -> VulkanResult<Self> {
        let frames_in_flight = ctx.frames_in_flight();
        if config.max_frames_in_flight != frames_in_flight {
            log::warn!(
                "Renderer configured for {} frames in flight but context has {}; using {}",
                config.max_frames_in_flight,
                frames_in_flight,
                frames_in_flight
            );
        }

        let options = SwapchainOptions::from_config(config);
        let frames = FrameSync::create_ring(&ctx, frames_in_flight)?;
        let swapchain = Swapchain::new(Rc::clone(&ctx), window.framebuffer_extent(), &options, None)?;

        log::info!(
            "Renderer ready: {} frames in flight, {} swapchain images, {}x{}",
            frames_in_flight,
            swapchain.image_count(),
            swapchain.width(),
            swapchain.height()
        );

        Ok(Self {
            frames,
            swapchain: Some(swapchain),
            ctx,
            frame_index: 0,
            recording: None,
            recreate_pending: false,
            options,
            clear_color: config.clear_color,
        })
    }

    /// Start a frame
    ///
    /// Returns the command buffer to record into, or `None` when this tick
    /// must be skipped because the swapchain had to be recreated.
    pub fn begin_frame(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<Option<vk::CommandBuffer>> {
        if self.recording.is_some() {
            return Err(VulkanError::InvalidOperation {
                reason: "begin_frame called while a frame is already in progress".to_string(),
            });
        }
        if self.swapchain.is_none() {
            self.recreate_swapchain(window)?;
        }

        let acquired = {
            let frame = &self.frames[self.frame_index];
            let swapchain = self.swapchain.as_mut().ok_or_else(missing_swapchain)?;
            swapchain.acquire_next_image(frame)?
        };

        let (image_index, suboptimal) = match acquired {
            AcquireResult::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireResult::OutOfDate | AcquireResult::TimedOut => {
                log::debug!("Skipping frame in slot {}: {:?}", self.frame_index, acquired);
                self.recreate_swapchain(window)?;
                return Ok(None);
            }
        };
        if suboptimal {
            self.recreate_pending = true;
        }

        // The slot fence has signaled, nothing the GPU still reads was released
        // into this slot.
        self.ctx.flush_deletion_queue(self.frame_index);
        self.ctx.set_frame_slot(self.frame_index);

        let command_buffer = self.frames[self.frame_index].command_buffer;
        self.ctx.device().begin_command_buffer(command_buffer)?;
        self.recording = Some(FrameRecording {
            command_buffer,
            image_index,
            render_pass_active: false,
        });

        log::trace!("Frame slot {} recording into image {}", self.frame_index, image_index);
        Ok(Some(command_buffer))
    }

    /// Finish recording, submit, present and advance to the next slot
    pub fn end_frame(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<()> {
        let recording = match self.recording {
            Some(recording) if recording.render_pass_active => {
                return Err(VulkanError::InvalidOperation {
                    reason: "end_frame called inside the swapchain render pass".to_string(),
                });
            }
            Some(recording) => recording,
            None => {
                return Err(VulkanError::InvalidOperation {
                    reason: "end_frame called without a frame in progress".to_string(),
                });
            }
        };
        self.recording = None;

        self.ctx.device().end_command_buffer(recording.command_buffer)?;

        let status = {
            let frame = &self.frames[self.frame_index];
            let swapchain = self.swapchain.as_mut().ok_or_else(missing_swapchain)?;
            swapchain.submit_command_buffers(frame, recording.image_index)?
        };

        self.frame_index = (self.frame_index + 1) % self.frames.len();

        let resized = window.take_resized();
        if status != SwapchainStatus::Optimal || resized || self.recreate_pending {
            log::debug!(
                "Recreating swapchain after present (status {:?}, resized {}, pending {})",
                status,
                resized,
                self.recreate_pending
            );
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    /// Begin the swapchain render pass on the current frame's command buffer
    ///
    /// Clears color to the configured clear color and depth to 1.0, and sets a
    /// full-extent viewport and scissor.
    pub fn begin_swapchain_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let recording = self.current_recording(command_buffer)?;
        if recording.render_pass_active {
            return Err(VulkanError::InvalidOperation {
                reason: "Swapchain render pass already begun".to_string(),
            });
        }
        let swapchain = self.swapchain.as_ref().ok_or_else(missing_swapchain)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let device = self.ctx.device();
        device.cmd_begin_render_pass(
            command_buffer,
            swapchain.render_pass(),
            swapchain.framebuffer(recording.image_index as usize),
            swapchain.extent(),
            &clear_values,
        );
        device.cmd_set_viewport_and_scissor(command_buffer, swapchain.extent());

        if let Some(recording) = self.recording.as_mut() {
            recording.render_pass_active = true;
        }
        Ok(())
    }

    /// End the swapchain render pass begun with [`begin_swapchain_render_pass`](Self::begin_swapchain_render_pass)
    pub fn end_swapchain_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let recording = self.current_recording(command_buffer)?;
        if !recording.render_pass_active {
            return Err(VulkanError::InvalidOperation {
                reason: "Swapchain render pass not begun".to_string(),
            });
        }
        self.ctx.device().cmd_end_render_pass(command_buffer);
        if let Some(recording) = self.recording.as_mut() {
            recording.render_pass_active = false;
        }
        Ok(())
    }

    fn current_recording(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<FrameRecording> {
        match self.recording {
            Some(recording) if recording.command_buffer == command_buffer => Ok(recording),
            Some(_) => Err(VulkanError::InvalidOperation {
                reason: "Command buffer does not belong to the current frame".to_string(),
            }),
            None => Err(VulkanError::InvalidOperation {
                reason: "No frame in progress".to_string(),
            }),
        }
    }

    /// Replace the swapchain to match the current surface
    ///
    /// Blocks on window events while the framebuffer is zero-sized. The old
    /// swapchain is handed to the new one and released on its first acquire.
    /// Rejected while a frame is in progress, since its image belongs to the
    /// current swapchain.
    pub fn recreate_swapchain(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<()> {
        if self.recording.is_some() {
            return Err(VulkanError::InvalidOperation {
                reason: "recreate_swapchain called while a frame is in progress".to_string(),
            });
        }

        let mut extent = window.framebuffer_extent();
        while extent.width == 0 || extent.height == 0 {
            log::debug!("Framebuffer is zero-sized, waiting for window events");
            window.wait_events();
            extent = window.framebuffer_extent();
        }

        let old = self.swapchain.take();
        if let Some(old) = old.as_ref() {
            let (color, depth) = preferred_formats(self.ctx.device())?;
            if color != old.color_format() || depth != old.depth_format() {
                log::warn!("Surface formats changed, waiting for device idle before recreating swapchain");
                self.ctx.wait_idle()?;
            }
        }
        let old_formats = old.as_ref().map(|old| (old.color_format(), old.depth_format()));

        let swapchain = Swapchain::new(Rc::clone(&self.ctx), extent, &self.options, old)?;
        let compatible = swapchain.previous().map_or(true, |previous| swapchain.compare_swap_formats(previous));
        let (new_color, new_depth) = (swapchain.color_format(), swapchain.depth_format());
        self.swapchain = Some(swapchain);
        self.recreate_pending = false;

        match old_formats {
            Some((old_color, old_depth)) if !compatible => Err(VulkanError::SwapchainFormatChanged {
                old_color,
                new_color,
                old_depth,
                new_depth,
            }),
            _ => {
                log::debug!("Swapchain recreated at {}x{}", extent.width, extent.height);
                Ok(())
            }
        }
    }

    /// Switch between FIFO and low-latency presentation
    ///
    /// Applied by recreating the swapchain at the end of the next frame.
    pub fn set_vsync(&mut self, vsync: bool) {
        if self.options.vsync != vsync {
            log::info!("VSync {}", if vsync { "enabled" } else { "disabled" });
            self.options.vsync = vsync;
            self.recreate_pending = true;
        }
    }

    /// Whether presentation waits for vertical blank
    pub const fn vsync(&self) -> bool {
        self.options.vsync
    }

    /// Current frame slot, in `0..frames_in_flight()`
    pub const fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Swapchain image the current frame renders to
    pub fn image_index(&self) -> Option<u32> {
        self.recording.map(|recording| recording.image_index)
    }

    /// Command buffer of the frame in progress
    pub fn current_command_buffer(&self) -> Option<vk::CommandBuffer> {
        self.recording.map(|recording| recording.command_buffer)
    }

    /// Whether `begin_frame` returned a command buffer that has not been ended
    pub const fn is_frame_in_progress(&self) -> bool {
        self.recording.is_some()
    }

    /// The current swapchain, if one exists
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    /// Swapchain size, zero while there is none
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.as_ref().map_or_else(vk::Extent2D::default, Swapchain::extent)
    }

    /// Width over height of the swapchain, 1.0 while there is none
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.as_ref().map_or(1.0, Swapchain::extent_aspect_ratio)
    }

    /// Render pass compatible with the swapchain framebuffers
    pub fn swapchain_render_pass(&self) -> vk::RenderPass {
        self.swapchain.as_ref().map_or_else(vk::RenderPass::null, Swapchain::render_pass)
    }

    /// Color the swapchain render pass clears to
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Shared graphics context
    pub fn context(&self) -> &Rc<GraphicsContext> {
        &self.ctx
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.ctx.wait_idle()
    }
}

fn missing_swapchain() -> VulkanError {
    VulkanError::InvalidOperation {
        reason: "No swapchain".to_string(),
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            log::warn!("Failed to wait for device idle while dropping renderer: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ContextConfig;
    use crate::vulkan::api::PendingRelease;
    use crate::vulkan::mock::{Call, MockDevice};
    use crate::vulkan::resources::Buffer;
    use std::collections::VecDeque;

    struct MockWindow {
        extent: vk::Extent2D,
        resized: bool,
        wait_calls: usize,
        extents_after_wait: VecDeque<vk::Extent2D>,
    }

    impl MockWindow {
        fn new() -> Self {
            Self {
                extent: vk::Extent2D { width: 800, height: 600 },
                resized: false,
                wait_calls: 0,
                extents_after_wait: VecDeque::new(),
            }
        }
    }

    impl WindowSurface for MockWindow {
        fn framebuffer_extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn wait_events(&mut self) {
            self.wait_calls += 1;
            if let Some(extent) = self.extents_after_wait.pop_front() {
                self.extent = extent;
            }
        }

        fn take_resized(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }
    }

    fn setup(frames: usize) -> (MockDevice, Rc<GraphicsContext>, Renderer, MockWindow) {
        let device = MockDevice::new();
        let config = RendererConfig::default().with_max_frames_in_flight(frames);
        let ctx = GraphicsContext::new(Box::new(device.clone()), &config.context_config())
            .expect("Should create context");
        let window = MockWindow::new();
        let renderer = Renderer::new(Rc::clone(&ctx), &window, &config).expect("Should create renderer");
        (device, ctx, renderer, window)
    }

    fn run_frame(renderer: &mut Renderer, window: &mut MockWindow) -> vk::CommandBuffer {
        let cmd = renderer
            .begin_frame(window)
            .expect("Should begin frame")
            .expect("Should acquire an image");
        renderer.end_frame(window).expect("Should end frame");
        cmd
    }

    fn swapchain_creations(device: &MockDevice) -> usize {
        device.count(|c| matches!(c, Call::CreateSwapchain { .. }))
    }

    #[test]
    fn test_buffer_released_when_its_slot_is_revisited() {
        let (device, ctx, mut renderer, mut window) = setup(2);

        // Slot 0
        renderer.begin_frame(&mut window).expect("begin").expect("image");
        assert_eq!(ctx.frame_slot(), 0);
        let buffer = Buffer::builder()
            .size(64)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .build(&ctx)
            .expect("Should create buffer");
        let released = PendingRelease::Buffer {
            buffer: buffer.handle(),
            memory: buffer.memory(),
        };
        drop(buffer);
        renderer.end_frame(&mut window).expect("end");

        // Slot 1
        renderer.begin_frame(&mut window).expect("begin").expect("image");
        assert_eq!(ctx.frame_slot(), 1);
        assert!(!device.destroyed().contains(&released), "Must not be released by another slot");
        renderer.end_frame(&mut window).expect("end");

        // Slot 0 again
        let slot0_fence = renderer.frames[0].in_flight.handle();
        device.clear_calls();
        renderer.begin_frame(&mut window).expect("begin").expect("image");
        let destroyed = device.destroyed();
        assert_eq!(destroyed.iter().filter(|r| **r == released).count(), 1);

        let fence_wait = device.position(|c| *c == Call::WaitForFence(slot0_fence));
        let release = device.position(|c| *c == Call::Destroy(released));
        assert!(fence_wait.is_some());
        assert!(fence_wait < release, "Release must follow the slot's fence wait");
        renderer.end_frame(&mut window).expect("end");
    }

    #[test]
    fn test_frame_index_cycles_independent_of_image_index() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        for index in [2, 2, 0, 1, 2] {
            device.push_acquire_result(Ok((index, false)));
        }

        let mut slots = Vec::new();
        let mut images = Vec::new();
        for _ in 0..5 {
            slots.push(renderer.frame_index());
            renderer.begin_frame(&mut window).expect("begin").expect("image");
            images.push(renderer.image_index().expect("Should record image index"));
            renderer.end_frame(&mut window).expect("end");
        }

        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(images, vec![2, 2, 0, 1, 2]);
        assert_eq!(renderer.frame_index(), 1);
    }

    #[test]
    fn test_three_frames_in_flight_cycle() {
        let (_device, _ctx, mut renderer, mut window) = setup(3);
        let mut slots = Vec::new();
        for _ in 0..7 {
            slots.push(renderer.frame_index());
            run_frame(&mut renderer, &mut window);
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame_and_recreates() {
        let (device, ctx, mut renderer, mut window) = setup(2);
        let created = swapchain_creations(&device);
        device.push_acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let cmd = renderer.begin_frame(&mut window).expect("Out of date is not an error");
        assert!(cmd.is_none());
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(renderer.frame_index(), 0);
        assert_eq!(ctx.frame_slot(), 0);
        assert_eq!(swapchain_creations(&device), created + 1);
        assert_eq!(device.count(|c| *c == Call::WaitIdle), 0, "Resize-only recreation must not stall");

        run_frame(&mut renderer, &mut window);
        assert_eq!(renderer.frame_index(), 1);
    }

    #[test]
    fn test_acquire_timeout_skips_frame() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        device.push_fence_result(Err(vk::Result::TIMEOUT));

        assert!(renderer.begin_frame(&mut window).expect("Timeout is not an error").is_none());
        assert_eq!(renderer.frame_index(), 0);
        assert!(!renderer.is_frame_in_progress());
    }

    #[test]
    fn test_image_wait_timeout_drops_frame_and_advances() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        device.push_acquire_result(Ok((0, false)));
        device.push_acquire_result(Ok((0, false)));
        run_frame(&mut renderer, &mut window);
        let created = swapchain_creations(&device);

        // Slot 1 fence wait succeeds, the wait for slot 0 to release image 0 does not.
        device.push_fence_result(Ok(()));
        device.push_fence_result(Err(vk::Result::TIMEOUT));
        let slot1 = renderer.frames[1].in_flight.handle();
        let semaphore = renderer.frames[1].image_available.handle();
        device.clear_calls();

        renderer.begin_frame(&mut window).expect("begin").expect("image");
        renderer.end_frame(&mut window).expect("Timeout is not an error");

        assert_eq!(renderer.frame_index(), 0);
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(device.count(|c| matches!(c, Call::Present { .. })), 0);
        assert!(device.calls().contains(&Call::Submit {
            command_buffer: vk::CommandBuffer::null(),
            wait: semaphore,
            signal: vk::Semaphore::null(),
            fence: slot1,
        }));
        assert_eq!(swapchain_creations(&device), created + 1);

        run_frame(&mut renderer, &mut window);
        run_frame(&mut renderer, &mut window);
        assert_eq!(renderer.frame_index(), 0);
    }

    #[test]
    fn test_recreate_during_frame_is_rejected() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        let handle = renderer.swapchain().expect("swapchain").handle();
        let created = swapchain_creations(&device);
        renderer.begin_frame(&mut window).expect("begin").expect("image");

        assert!(matches!(
            renderer.recreate_swapchain(&mut window),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert_eq!(swapchain_creations(&device), created);

        renderer.end_frame(&mut window).expect("end");
        let presents: Vec<Call> = device
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Present { .. }))
            .collect();
        assert_eq!(
            presents.last(),
            Some(&Call::Present {
                swapchain: handle,
                image_index: 0
            })
        );
        renderer.recreate_swapchain(&mut window).expect("Should recreate between frames");
        assert_eq!(swapchain_creations(&device), created + 1);
    }

    #[test]
    fn test_begin_frame_twice_is_rejected() {
        let (_device, _ctx, mut renderer, mut window) = setup(2);
        renderer.begin_frame(&mut window).expect("begin").expect("image");

        assert!(matches!(
            renderer.begin_frame(&mut window),
            Err(VulkanError::InvalidOperation { .. })
        ));
        renderer.end_frame(&mut window).expect("Frame should still be finishable");
    }

    #[test]
    fn test_end_frame_without_begin_is_rejected() {
        let (_device, _ctx, mut renderer, mut window) = setup(2);
        assert!(matches!(
            renderer.end_frame(&mut window),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_suboptimal_present_recreates_after_presenting() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        let created = swapchain_creations(&device);
        device.push_present_result(Ok(true));

        run_frame(&mut renderer, &mut window);

        let present = device.position(|c| matches!(c, Call::Present { .. }));
        let last_create = device
            .calls()
            .iter()
            .rposition(|c| matches!(c, Call::CreateSwapchain { .. }));
        assert!(present < last_create);
        assert_eq!(swapchain_creations(&device), created + 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_renders_then_recreates() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        let created = swapchain_creations(&device);
        device.push_acquire_result(Ok((1, true)));

        let cmd = renderer.begin_frame(&mut window).expect("begin");
        assert!(cmd.is_some());
        assert_eq!(swapchain_creations(&device), created);
        renderer.end_frame(&mut window).expect("end");
        assert_eq!(swapchain_creations(&device), created + 1);
    }

    #[test]
    fn test_resize_flag_recreates_with_new_extent() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        device.set_surface_extent(1024, 768);
        window.extent = vk::Extent2D { width: 1024, height: 768 };
        window.resized = true;

        run_frame(&mut renderer, &mut window);

        let extent = renderer.swapchain_extent();
        assert_eq!((extent.width, extent.height), (1024, 768));
        let swapchain = renderer.swapchain().expect("Should have swapchain");
        let previous = swapchain.previous().expect("Old swapchain kept until first acquire");
        assert!(swapchain.compare_swap_formats(previous));

        run_frame(&mut renderer, &mut window);
        assert!(renderer.swapchain().expect("swapchain").previous().is_none());
    }

    #[test]
    fn test_minimized_window_waits_for_events() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        window.extent = vk::Extent2D { width: 0, height: 0 };
        window
            .extents_after_wait
            .extend([vk::Extent2D { width: 0, height: 0 }, vk::Extent2D { width: 640, height: 480 }]);
        device.push_acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        assert!(renderer.begin_frame(&mut window).expect("begin").is_none());
        assert_eq!(window.wait_calls, 2);
    }

    #[test]
    fn test_vsync_toggle_recreates_with_new_present_mode() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        assert_eq!(
            renderer.swapchain().expect("swapchain").present_mode(),
            vk::PresentModeKHR::FIFO
        );

        renderer.set_vsync(false);
        run_frame(&mut renderer, &mut window);
        assert_eq!(
            renderer.swapchain().expect("swapchain").present_mode(),
            vk::PresentModeKHR::MAILBOX
        );

        let created = swapchain_creations(&device);
        renderer.set_vsync(false);
        run_frame(&mut renderer, &mut window);
        assert_eq!(swapchain_creations(&device), created, "Unchanged setting must not recreate");
    }

    #[test]
    fn test_format_change_waits_idle_and_errors() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        device.state().surface_formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        device.push_acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let result = renderer.begin_frame(&mut window);
        assert!(matches!(
            result,
            Err(VulkanError::SwapchainFormatChanged {
                old_color: vk::Format::B8G8R8A8_SRGB,
                new_color: vk::Format::B8G8R8A8_UNORM,
                ..
            })
        ));
        assert_eq!(device.count(|c| *c == Call::WaitIdle), 1);
    }

    #[test]
    fn test_swapchain_render_pass_records_into_current_frame() {
        let (device, _ctx, mut renderer, mut window) = setup(2);
        let cmd = renderer.begin_frame(&mut window).expect("begin").expect("image");
        let image_index = renderer.image_index().expect("image index") as usize;
        let framebuffer = renderer.swapchain().expect("swapchain").framebuffer(image_index);

        renderer.begin_swapchain_render_pass(cmd).expect("Should begin render pass");
        assert!(renderer.begin_swapchain_render_pass(cmd).is_err());
        assert!(renderer.end_frame(&mut window).is_err(), "Render pass must be ended first");
        renderer.end_swapchain_render_pass(cmd).expect("Should end render pass");
        renderer.end_frame(&mut window).expect("end");

        assert!(device.calls().contains(&Call::BeginRenderPass {
            command_buffer: cmd,
            framebuffer
        }));
        assert!(device.calls().contains(&Call::SetViewportAndScissor { width: 800, height: 600 }));
        assert!(renderer.end_swapchain_render_pass(cmd).is_err());
    }

    #[test]
    fn test_drop_waits_for_idle() {
        let (device, _ctx, renderer, _window) = setup(2);
        device.clear_calls();
        drop(renderer);
        assert_eq!(device.calls().first(), Some(&Call::WaitIdle));
    }
}
