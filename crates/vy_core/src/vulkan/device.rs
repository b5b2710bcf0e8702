//! Vulkan device backed by `ash`
//!
//! Creates the instance (with validation and a debug messenger when
//! requested), the presentation surface, the physical and logical device, the
//! queues and a resettable command pool, and implements [`DeviceApi`] on top
//! of them.

use std::ffi::{c_char, c_void, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::prelude::VkResult;
use ash::{vk, Device, Entry, Instance};

use super::api::{
    BufferDesc, DescriptorInfo, DescriptorWrite, DeviceApi, ImageBarrier, ImageDesc, ImageViewDesc, PendingRelease,
    SamplerDesc, SubmitDesc, SwapchainDesc,
};
use super::{SurfaceProvider, VulkanError, VulkanResult};
use crate::core::config::RendererConfig;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &str = "vy";

fn c_string(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|e| VulkanError::InitializationFailed(format!("Invalid name {value:?}: {e}")))
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Instance plus optional debug messenger, destroyed together
struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    api_version: u32,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    fn new(surface_provider: &dyn SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let instance_version = unsafe { entry.try_enumerate_instance_version() }
            .map_err(VulkanError::Api)?
            .unwrap_or(vk::API_VERSION_1_0);
        let api_version = instance_version.min(vk::API_VERSION_1_2);

        let app_name = c_string(&config.application_name)?;
        let engine_name = c_string(ENGINE_NAME)?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(api_version);

        let extension_names = surface_provider
            .required_instance_extensions()?
            .iter()
            .map(|name| c_string(name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let mut extensions: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let validation = config.validation_enabled();
        let mut layer_names = Vec::new();
        if validation {
            let available = unsafe { entry.enumerate_instance_layer_properties() }.map_err(VulkanError::Api)?;
            let found = available
                .iter()
                .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_bytes() == VALIDATION_LAYER.as_bytes());
            if !found {
                return Err(VulkanError::InitializationFailed(format!(
                    "Validation requested but {VALIDATION_LAYER} is not installed"
                )));
            }
            layer_names.push(c_string(VALIDATION_LAYER)?);
            extensions.push(DebugUtils::name().as_ptr());
        }
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));
            match unsafe { debug_utils.create_debug_utils_messenger(&messenger_info, None) } {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(VulkanError::Api(e));
                }
            }
        } else {
            None
        };

        log::info!(
            "Vulkan instance created (API {}.{}, validation {})",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            api_version,
            debug,
        })
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Presentation surface, destroyed before the instance it was created from
struct PresentationSurface {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// Physical device selection and capabilities
struct PhysicalDeviceInfo {
    device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    graphics_family: u32,
    present_family: u32,
    update_after_bind: bool,
}

impl PhysicalDeviceInfo {
    /// Pick a device with graphics and present queues and swapchain support,
    /// preferring discrete GPUs
    fn select_suitable_device(
        instance: &VulkanInstance,
        surface: &PresentationSurface,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        let mut candidates = Vec::new();
        for device in devices {
            match Self::evaluate_device(instance, device, surface) {
                Ok(info) => candidates.push(info),
                Err(e) => log::debug!("Skipping GPU: {e}"),
            }
        }

        let discrete = candidates
            .iter()
            .position(|info| info.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .unwrap_or(0);
        if candidates.is_empty() {
            return Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()));
        }
        let selected = candidates.swap_remove(discrete);

        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(selected.properties.device_name.as_ptr()).to_string_lossy()
        });
        Ok(selected)
    }

    fn evaluate_device(
        instance: &VulkanInstance,
        device: vk::PhysicalDevice,
        surface: &PresentationSurface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.instance.get_physical_device_properties(device) };
        let features = unsafe { instance.instance.get_physical_device_features(device) };
        let queue_families = unsafe { instance.instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in (0_u32..).zip(queue_families.iter()) {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface
                    .loader
                    .get_physical_device_surface_support(device, index, surface.surface)
            }
            .map_err(VulkanError::Api)?;
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics queue family found".to_string()))?;
        let present_family = present_family
            .ok_or_else(|| VulkanError::InitializationFailed("No present queue family found".to_string()))?;

        let extensions =
            unsafe { instance.instance.enumerate_device_extension_properties(device) }.map_err(VulkanError::Api)?;
        let has_swapchain = extensions
            .iter()
            .any(|available| unsafe { CStr::from_ptr(available.extension_name.as_ptr()) } == SwapchainLoader::name());
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        let update_after_bind = instance.api_version >= vk::API_VERSION_1_2
            && properties.api_version >= vk::API_VERSION_1_2
            && Self::query_update_after_bind(instance, device);

        Ok(Self {
            device,
            properties,
            features,
            graphics_family,
            present_family,
            update_after_bind,
        })
    }

    fn query_update_after_bind(instance: &VulkanInstance, device: vk::PhysicalDevice) -> bool {
        let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut indexing);
            unsafe { instance.instance.get_physical_device_features2(device, &mut features2) };
        }
        indexing.descriptor_binding_partially_bound == vk::TRUE
            && indexing.descriptor_binding_sampled_image_update_after_bind == vk::TRUE
            && indexing.runtime_descriptor_array == vk::TRUE
    }
}

/// Owns every device-level Vulkan object the renderer core needs
pub struct AshDevice {
    device: Device,
    swapchain_loader: SwapchainLoader,
    command_pool: vk::CommandPool,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    anisotropy_enabled: bool,
    update_after_bind: bool,
    // Destroyed after the logical device, surface before instance.
    surface: PresentationSurface,
    instance: VulkanInstance,
}

impl AshDevice {
    /// Create the instance, surface and logical device for `surface_provider`
    pub fn new(surface_provider: &mut dyn SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        log::debug!("Creating Vulkan device for {:?}", config.application_name);
        let instance = VulkanInstance::new(surface_provider, config)?;

        let surface = PresentationSurface {
            loader: Surface::new(&instance.entry, &instance.instance),
            surface: surface_provider.create_surface(instance.instance.handle())?,
        };

        let physical = PhysicalDeviceInfo::select_suitable_device(&instance, &surface)?;

        let mut families = vec![physical.graphics_family];
        if physical.present_family != physical.graphics_family {
            families.push(physical.present_family);
        }
        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let device_extensions = [SwapchainLoader::name().as_ptr()];
        let anisotropy_enabled = physical.features.sampler_anisotropy == vk::TRUE;
        let enabled_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(anisotropy_enabled)
            .build();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder().features(enabled_features);
        let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::builder()
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .runtime_descriptor_array(true);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&device_extensions)
            .push_next(&mut features2);
        if physical.update_after_bind {
            create_info = create_info.push_next(&mut indexing);
        }

        let device = unsafe { instance.instance.create_device(physical.device, &create_info, None) }
            .map_err(VulkanError::Api)?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(physical.graphics_family);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(VulkanError::Api(e));
            }
        };

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(&instance.instance, &device);
        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical.device)
        };

        log::debug!(
            "Logical device ready (graphics family {}, present family {}, update-after-bind {})",
            physical.graphics_family,
            physical.present_family,
            physical.update_after_bind
        );

        Ok(Self {
            device,
            swapchain_loader,
            command_pool,
            graphics_queue,
            present_queue,
            graphics_family: physical.graphics_family,
            present_family: physical.present_family,
            physical_device: physical.device,
            properties: physical.properties,
            memory_properties,
            anisotropy_enabled,
            update_after_bind: physical.update_after_bind,
            surface,
            instance,
        })
    }

    /// Raw `ash` device, for recording commands the core does not wrap
    pub const fn raw(&self) -> &Device {
        &self.device
    }

    /// Properties of the selected GPU
    pub const fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Queue frames are submitted to
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Index of a memory type allowed by `type_bits` with all of `properties`
    pub fn find_memory_type(&self, type_bits: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        (0..self.memory_properties.memory_type_count)
            .find(|&i| {
                type_bits & (1 << i) != 0
                    && self.memory_properties.memory_types[i as usize]
                        .property_flags
                        .contains(properties)
            })
            .ok_or(VulkanError::NoSuitableMemoryType)
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VkResult<vk::DeviceMemory> {
        let memory_type_index = self
            .find_memory_type(requirements.memory_type_bits, properties)
            .map_err(|e| {
                log::error!("{e} for {properties:?}");
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            })?;
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        unsafe { self.device.allocate_memory(&info, None) }
    }
}

impl DeviceApi for AshDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> VkResult<(vk::Buffer, vk::DeviceMemory)> {
        let info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        unsafe {
            let buffer = self.device.create_buffer(&info, None)?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let memory = match self.allocate(requirements, desc.memory_properties) {
                Ok(memory) => memory,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_buffer_memory(buffer, memory, 0) {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
                return Err(e);
            }
            Ok((buffer, memory))
        }
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()> {
        unsafe {
            let mapped = self.device.map_memory(
                memory,
                offset,
                data.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(desc.image_type)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(desc.initial_layout)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        unsafe {
            let image = self.device.create_image(&info, None)?;
            let requirements = self.device.get_image_memory_requirements(image);
            let memory = match self.allocate(requirements, desc.memory_properties) {
                Ok(memory) => memory,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_image_memory(image, memory, 0) {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
                return Err(e);
            }
            Ok((image, memory))
        }
    }

    fn create_image_view(&self, desc: &ImageViewDesc) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(desc.image)
            .view_type(desc.view_type)
            .format(desc.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(desc.subresource_range);
        unsafe { self.device.create_image_view(&info, None) }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> VkResult<vk::Sampler> {
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(desc.max_anisotropy.is_some())
            .max_anisotropy(desc.max_anisotropy.unwrap_or(1.0))
            .compare_enable(desc.compare_op.is_some())
            .compare_op(desc.compare_op.unwrap_or(vk::CompareOp::ALWAYS))
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(desc.border_color)
            .unnormalized_coordinates(false);
        unsafe { self.device.create_sampler(&info, None) }
    }

    fn format_supports(&self, format: vk::Format, tiling: vk::ImageTiling, features: vk::FormatFeatureFlags) -> bool {
        let props = unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    }

    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    fn max_sampler_anisotropy(&self) -> f32 {
        if self.anisotropy_enabled {
            self.properties.limits.max_sampler_anisotropy
        } else {
            1.0
        }
    }

    fn supports_update_after_bind(&self) -> bool {
        self.update_after_bind
    }

    fn destroy(&self, release: PendingRelease) {
        unsafe {
            match release {
                PendingRelease::Buffer { buffer, memory } => {
                    self.device.destroy_buffer(buffer, None);
                    self.device.free_memory(memory, None);
                }
                PendingRelease::Image { image, memory } => {
                    self.device.destroy_image(image, None);
                    self.device.free_memory(memory, None);
                }
                PendingRelease::ImageView(view) => self.device.destroy_image_view(view, None),
                PendingRelease::Sampler(sampler) => self.device.destroy_sampler(sampler, None),
                PendingRelease::DescriptorSetLayout(layout) => self.device.destroy_descriptor_set_layout(layout, None),
                PendingRelease::DescriptorPool(pool) => self.device.destroy_descriptor_pool(pool, None),
                PendingRelease::RenderPass(render_pass) => self.device.destroy_render_pass(render_pass, None),
                PendingRelease::Framebuffer(framebuffer) => self.device.destroy_framebuffer(framebuffer, None),
                PendingRelease::Pipeline(pipeline) => self.device.destroy_pipeline(pipeline, None),
                PendingRelease::PipelineLayout(layout) => self.device.destroy_pipeline_layout(layout, None),
                PendingRelease::Swapchain(swapchain) => self.swapchain_loader.destroy_swapchain(swapchain, None),
                PendingRelease::Semaphore(semaphore) => self.device.destroy_semaphore(semaphore, None),
                PendingRelease::Fence(fence) => self.device.destroy_fence(fence, None),
            }
        }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        binding_flags: &[vk::DescriptorBindingFlags],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(binding_flags);
        let mut info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(bindings)
            .flags(flags);
        if binding_flags.iter().any(|f| !f.is_empty()) {
            info = info.push_next(&mut flags_info);
        }
        unsafe { self.device.create_descriptor_set_layout(&info, None) }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VkResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(flags);
        unsafe { self.device.create_descriptor_pool(&info, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }?;
        sets.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        unsafe { self.device.free_descriptor_sets(pool, sets) }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let raw_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .map(|write| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(write.descriptor_type);
                match &write.info {
                    DescriptorInfo::Buffer(info) => builder.buffer_info(std::slice::from_ref(info)).build(),
                    DescriptorInfo::Image(info) => builder.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect();
        unsafe { self.device.update_descriptor_sets(&raw_writes, &[]) };
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&info, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&info) }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &info) }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }

    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        let image_barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image)
            .subresource_range(barrier.subresource_range)
            .src_access_mask(barrier.src_access)
            .dst_access_mask(barrier.dst_access)
            .build();
        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                barrier.src_stage,
                barrier.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface.surface)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_formats(self.physical_device, self.surface.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface.surface)
        }
    }

    fn create_render_pass(&self, color_format: vk::Format, depth_format: vk::Format) -> VkResult<vk::RenderPass> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let attachments = [color_attachment, depth_attachment];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .build()];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { self.device.create_render_pass(&info, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&info, None) }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let family_indices = [self.graphics_family, self.present_family];
        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);
        let info = if self.graphics_family == self.present_family {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };
        unsafe { self.swapchain_loader.create_swapchain(&info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        }
    }

    fn queue_submit(&self, submit: &SubmitDesc, fence: vk::Fence) -> VkResult<()> {
        let wait_semaphores = [submit.wait_semaphore];
        let wait_stages = [submit.wait_stage];
        let command_buffers: &[vk::CommandBuffer] = if submit.command_buffer == vk::CommandBuffer::null() {
            &[]
        } else {
            std::slice::from_ref(&submit.command_buffer)
        };
        let signal_semaphores: &[vk::Semaphore] = if submit.signal_semaphore == vk::Semaphore::null() {
            &[]
        } else {
            std::slice::from_ref(&submit.signal_semaphore)
        };
        let info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores)
            .build();
        unsafe { self.device.queue_submit(self.graphics_queue, &[info], fence) }
    }

    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain_loader.queue_present(self.present_queue, &info) }
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::warn!("Failed to wait for device idle during shutdown: {e:?}");
            }
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
        log::debug!("Vulkan device destroyed");
    }
}
