//! Recording device for tests
//!
//! Hands out unique fake handles, logs every call in order and simulates the
//! bits of driver state the frame loop reacts to: descriptor pool capacity,
//! surface capabilities and scripted acquire, present and fence results.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use super::api::{
    BufferDesc, DescriptorWrite, DeviceApi, ImageBarrier, ImageDesc, ImageViewDesc, PendingRelease, SamplerDesc,
    SubmitDesc, SwapchainDesc,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateBuffer { buffer: vk::Buffer, memory: vk::DeviceMemory, size: vk::DeviceSize },
    WriteMemory { memory: vk::DeviceMemory, offset: vk::DeviceSize, data: Vec<u8> },
    CreateImage { image: vk::Image, memory: vk::DeviceMemory },
    CreateImageView(vk::ImageView),
    CreateSampler(vk::Sampler),
    Destroy(PendingRelease),
    CreateDescriptorSetLayout { layout: vk::DescriptorSetLayout, flags: vk::DescriptorSetLayoutCreateFlags },
    CreateDescriptorPool {
        pool: vk::DescriptorPool,
        max_sets: u32,
        flags: vk::DescriptorPoolCreateFlags,
        types: Vec<vk::DescriptorType>,
    },
    AllocateDescriptorSet { pool: vk::DescriptorPool, set: Option<vk::DescriptorSet> },
    FreeDescriptorSets { pool: vk::DescriptorPool, count: usize },
    ResetDescriptorPool(vk::DescriptorPool),
    UpdateDescriptorSet { set: vk::DescriptorSet, bindings: Vec<(u32, u32)> },
    CreateSemaphore(vk::Semaphore),
    CreateFence(vk::Fence),
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    WaitIdle,
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass { command_buffer: vk::CommandBuffer, framebuffer: vk::Framebuffer },
    SetViewportAndScissor { width: u32, height: u32 },
    EndRenderPass(vk::CommandBuffer),
    ImageBarrier { image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout },
    CreateRenderPass { render_pass: vk::RenderPass, color: vk::Format, depth: vk::Format },
    CreateFramebuffer(vk::Framebuffer),
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        old_swapchain: vk::SwapchainKHR,
        image_count: u32,
        width: u32,
        height: u32,
        present_mode: vk::PresentModeKHR,
    },
    AcquireNextImage { swapchain: vk::SwapchainKHR, result: Result<u32, vk::Result> },
    Submit { command_buffer: vk::CommandBuffer, wait: vk::Semaphore, signal: vk::Semaphore, fence: vk::Fence },
    Present { swapchain: vk::SwapchainKHR, image_index: u32 },
}

#[derive(Debug, Clone, Copy)]
struct PoolState {
    max_sets: u32,
    allocated: u32,
}

#[derive(Debug)]
pub struct MockState {
    pub calls: Vec<Call>,
    next_handle: u64,
    pools: HashMap<vk::DescriptorPool, PoolState>,
    pub min_image_count: u32,
    pub max_image_count: u32,
    pub current_extent: vk::Extent2D,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub depth_formats: Vec<vk::Format>,
    pub fail_allocations: bool,
    swapchain_images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    next_image: HashMap<vk::SwapchainKHR, u32>,
    acquire_results: VecDeque<VkResult<(u32, bool)>>,
    present_results: VecDeque<VkResult<bool>>,
    fence_results: VecDeque<VkResult<()>>,
}

impl MockState {
    fn handle<T: Handle>(&mut self) -> T {
        self.next_handle += 1;
        T::from_raw(self.next_handle)
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            next_handle: 0,
            pools: HashMap::new(),
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            surface_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            depth_formats: vec![vk::Format::D32_SFLOAT],
            fail_allocations: false,
            swapchain_images: HashMap::new(),
            next_image: HashMap::new(),
            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
            fence_results: VecDeque::new(),
        }
    }
}

/// Cloneable handle onto shared mock state; one clone goes into the context,
/// the test keeps another to inspect calls.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Rc<RefCell<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::cell::RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn destroyed(&self) -> Vec<PendingRelease> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Destroy(release) => Some(*release),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call matching `predicate`
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.state.borrow().calls.iter().position(predicate)
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().current_extent = vk::Extent2D { width, height };
    }

    pub fn push_acquire_result(&self, result: VkResult<(u32, bool)>) {
        self.state.borrow_mut().acquire_results.push_back(result);
    }

    pub fn push_present_result(&self, result: VkResult<bool>) {
        self.state.borrow_mut().present_results.push_back(result);
    }

    pub fn push_fence_result(&self, result: VkResult<()>) {
        self.state.borrow_mut().fence_results.push_back(result);
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl DeviceApi for MockDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> VkResult<(vk::Buffer, vk::DeviceMemory)> {
        let mut state = self.state.borrow_mut();
        if state.fail_allocations {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let buffer = state.handle();
        let memory = state.handle();
        state.calls.push(Call::CreateBuffer { buffer, memory, size: desc.size });
        Ok((buffer, memory))
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()> {
        self.record(Call::WriteMemory { memory, offset, data: data.to_vec() });
        Ok(())
    }

    fn create_image(&self, _desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)> {
        let mut state = self.state.borrow_mut();
        if state.fail_allocations {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let image = state.handle();
        let memory = state.handle();
        state.calls.push(Call::CreateImage { image, memory });
        Ok((image, memory))
    }

    fn create_image_view(&self, _desc: &ImageViewDesc) -> VkResult<vk::ImageView> {
        let mut state = self.state.borrow_mut();
        let view = state.handle();
        state.calls.push(Call::CreateImageView(view));
        Ok(view)
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> VkResult<vk::Sampler> {
        let mut state = self.state.borrow_mut();
        let sampler = state.handle();
        state.calls.push(Call::CreateSampler(sampler));
        Ok(sampler)
    }

    fn format_supports(&self, format: vk::Format, tiling: vk::ImageTiling, features: vk::FormatFeatureFlags) -> bool {
        tiling == vk::ImageTiling::OPTIMAL
            && features == vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            && self.state.borrow().depth_formats.contains(&format)
    }

    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        256
    }

    fn max_sampler_anisotropy(&self) -> f32 {
        16.0
    }

    fn supports_update_after_bind(&self) -> bool {
        true
    }

    fn destroy(&self, release: PendingRelease) {
        self.record(Call::Destroy(release));
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[vk::DescriptorSetLayoutBinding],
        _binding_flags: &[vk::DescriptorBindingFlags],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let mut state = self.state.borrow_mut();
        let layout = state.handle();
        state.calls.push(Call::CreateDescriptorSetLayout { layout, flags });
        Ok(layout)
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VkResult<vk::DescriptorPool> {
        let mut state = self.state.borrow_mut();
        let pool = state.handle();
        state.pools.insert(pool, PoolState { max_sets, allocated: 0 });
        let types = pool_sizes.iter().map(|size| size.ty).collect();
        state.calls.push(Call::CreateDescriptorPool { pool, max_sets, flags, types });
        Ok(pool)
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let mut state = self.state.borrow_mut();
        let pool_state = state.pools.get(&pool).copied().ok_or(vk::Result::ERROR_UNKNOWN)?;
        if pool_state.allocated >= pool_state.max_sets {
            state.calls.push(Call::AllocateDescriptorSet { pool, set: None });
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        let set = state.handle();
        if let Some(entry) = state.pools.get_mut(&pool) {
            entry.allocated += 1;
        }
        state.calls.push(Call::AllocateDescriptorSet { pool, set: Some(set) });
        Ok(set)
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(entry) = state.pools.get_mut(&pool) {
            entry.allocated = entry.allocated.saturating_sub(sets.len() as u32);
        }
        state.calls.push(Call::FreeDescriptorSets { pool, count: sets.len() });
        Ok(())
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(entry) = state.pools.get_mut(&pool) {
            entry.allocated = 0;
        }
        state.calls.push(Call::ResetDescriptorPool(pool));
        Ok(())
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let bindings = writes.iter().map(|w| (w.binding, w.array_element)).collect();
        self.record(Call::UpdateDescriptorSet { set, bindings });
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.state.borrow_mut();
        let semaphore = state.handle();
        state.calls.push(Call::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn create_fence(&self, _signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let fence = state.handle();
        state.calls.push(Call::CreateFence(fence));
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::WaitForFence(fence));
        state.fence_results.pop_front().unwrap_or(Ok(()))
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.record(Call::ResetFence(fence));
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        Ok((0..count).map(|_| state.handle()).collect())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        _extent: vk::Extent2D,
        _clear_values: &[vk::ClearValue],
    ) {
        self.record(Call::BeginRenderPass { command_buffer, framebuffer });
    }

    fn cmd_set_viewport_and_scissor(&self, _command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        self.record(Call::SetViewportAndScissor { width: extent.width, height: extent.height });
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.record(Call::EndRenderPass(command_buffer));
    }

    fn cmd_image_barrier(&self, _command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.record(Call::ImageBarrier {
            image: barrier.image,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
        });
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let state = self.state.borrow();
        Ok(vk::SurfaceCapabilitiesKHR {
            min_image_count: state.min_image_count,
            max_image_count: state.max_image_count,
            current_extent: state.current_extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        })
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state.borrow().surface_formats.clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state.borrow().present_modes.clone())
    }

    fn create_render_pass(&self, color_format: vk::Format, depth_format: vk::Format) -> VkResult<vk::RenderPass> {
        let mut state = self.state.borrow_mut();
        let render_pass = state.handle();
        state.calls.push(Call::CreateRenderPass { render_pass, color: color_format, depth: depth_format });
        Ok(render_pass)
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.borrow_mut();
        let framebuffer = state.handle();
        state.calls.push(Call::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.borrow_mut();
        let swapchain = state.handle();
        let images = (0..desc.min_image_count).map(|_| state.handle()).collect();
        state.swapchain_images.insert(swapchain, images);
        state.calls.push(Call::CreateSwapchain {
            swapchain,
            old_swapchain: desc.old_swapchain,
            image_count: desc.min_image_count,
            width: desc.extent.width,
            height: desc.extent.height,
            present_mode: desc.present_mode,
        });
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state
            .borrow()
            .swapchain_images
            .get(&swapchain)
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        _signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.borrow_mut();
        let result = match state.acquire_results.pop_front() {
            Some(scripted) => scripted,
            None => {
                let count = state.swapchain_images.get(&swapchain).map_or(1, Vec::len) as u32;
                let next = state.next_image.entry(swapchain).or_insert(0);
                let index = *next;
                *next = (index + 1) % count;
                Ok((index, false))
            }
        };
        state.calls.push(Call::AcquireNextImage {
            swapchain,
            result: result.map(|(index, _)| index),
        });
        result
    }

    fn queue_submit(&self, submit: &SubmitDesc, fence: vk::Fence) -> VkResult<()> {
        self.record(Call::Submit {
            command_buffer: submit.command_buffer,
            wait: submit.wait_semaphore,
            signal: submit.signal_semaphore,
            fence,
        });
        Ok(())
    }

    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, _wait: vk::Semaphore) -> VkResult<bool> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Present { swapchain, image_index });
        state.present_results.pop_front().unwrap_or(Ok(false))
    }
}
