//! Vulkan backend
//!
//! Everything that touches the GPU goes through the [`api::DeviceApi`] seam.
//! Resources route their destruction through the
//! [`context::GraphicsContext`], which defers the native release until the
//! frame slot that last used them has been retired by the [`renderer::Renderer`].

use ash::vk;
use thiserror::Error;

pub mod api;
pub mod context;
pub mod deletion_queue;
pub mod descriptors;
pub mod device;
pub mod render_pass;
pub mod renderer;
pub mod resources;
pub mod swapchain;
pub mod sync;
#[cfg(feature = "glfw-window")]
pub mod window;

#[cfg(test)]
pub(crate) mod mock;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// None of the candidate depth formats supports depth-stencil attachments
    #[error("No supported depth format")]
    UnsupportedDepthFormat,

    /// The surface reported no formats
    #[error("Surface reports no formats")]
    NoSurfaceFormats,

    /// Swapchain recreation produced a different color or depth format
    #[error("Swapchain format changed: color {old_color:?} -> {new_color:?}, depth {old_depth:?} -> {new_depth:?}")]
    SwapchainFormatChanged {
        /// Color format before recreation
        old_color: vk::Format,
        /// Color format after recreation
        new_color: vk::Format,
        /// Depth format before recreation
        old_depth: vk::Format,
        /// Depth format after recreation
        new_depth: vk::Format,
    },
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Window state the renderer needs while pacing frames
pub trait WindowSurface {
    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;

    /// Block until the window receives events (used while minimized)
    fn wait_events(&mut self);

    /// Returns whether the framebuffer was resized since the last call, clearing the flag
    fn take_resized(&mut self) -> bool;
}

/// Native surface creation for [`device::AshDevice`]
pub trait SurfaceProvider {
    /// Instance extensions required to present to this surface
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create the presentation surface for `instance`
    fn create_surface(&mut self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR>;
}
