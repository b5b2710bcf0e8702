//! # vy_core
//!
//! Frame pacing and GPU resource lifetime management for Vulkan renderers.
//!
//! ## Features
//!
//! - **Deferred Destruction**: GPU resources are released only once every frame
//!   that could still reference them has finished on the GPU
//! - **Frame Pacing**: A fixed ring of frames in flight bounded by fences
//! - **Swapchain Lifecycle**: Acquire, submit, present and recreation on resize
//! - **Descriptor Allocation**: Pools, layouts and batched descriptor writes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vy_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     vy_core::foundation::logging::init();
//!
//!     let config = RendererConfig::default();
//!     let mut window = Window::new("vy", 1280, 720)?;
//!     let device = AshDevice::new(&mut window, &config)?;
//!     let ctx = GraphicsContext::new(Box::new(device), &config.context_config())?;
//!     let mut renderer = Renderer::new(ctx.clone(), &window, &config)?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         if let Some(cmd) = renderer.begin_frame(&mut window)? {
//!             renderer.begin_swapchain_render_pass(cmd)?;
//!             renderer.end_swapchain_render_pass(cmd)?;
//!             renderer.end_frame(&mut window)?;
//!         }
//!     }
//!
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod vulkan;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        core::config::{AppConfig, ContextConfig, EngineConfig, RendererConfig},
        config::Config,
        vulkan::{
            context::GraphicsContext,
            descriptors::{DescriptorAllocator, DescriptorPool, DescriptorSetLayout, DescriptorWriter},
            device::AshDevice,
            renderer::Renderer,
            resources::{Buffer, Image, ImageView, Sampler},
            swapchain::Swapchain,
            VulkanError, VulkanResult, WindowSurface,
        },
    };

    #[cfg(feature = "glfw-window")]
    pub use crate::vulkan::window::Window;
}
