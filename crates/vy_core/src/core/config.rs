//! # Renderer Configuration
//!
//! Typed configuration for the graphics context, the frame loop and the
//! application shell. Every type is serializable so it can be stored in TOML
//! or RON through [`Config`].
//!
//! ## Configuration Categories
//!
//! - **Renderer Config**: Vulkan instance metadata, frames in flight, timeouts, vsync
//! - **Descriptor Pool Config**: Sizing of the context's global descriptor pool
//! - **Engine Config**: Logging and window settings

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Upper bound on frames in flight accepted by [`RendererConfig::validate`]
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// # Global Descriptor Pool Configuration
///
/// The global pool backs [`GraphicsContext::allocate_set`](crate::vulkan::context::GraphicsContext::allocate_set)
/// for callers that do not own a private pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorPoolConfig {
    /// Maximum number of sets allocated from the global pool at once
    pub max_sets: u32,
    /// Descriptors reserved for each descriptor type
    pub descriptors_per_type: u32,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 1000,
            descriptors_per_type: 1000,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Application metadata, frame pacing and presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Present with FIFO when set, otherwise prefer mailbox or immediate
    pub vsync: bool,
    /// Timeout for swapchain image acquisition
    pub acquire_timeout_ms: u64,
    /// Timeout for waiting on a frame slot's fence
    pub fence_timeout_ms: u64,
    /// Clear color of the swapchain render pass (RGBA)
    pub clear_color: [f32; 4],
    /// Global descriptor pool sizing
    pub descriptor_pool: DescriptorPoolConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            max_frames_in_flight: 2,
            enable_validation: None,
            vsync: true,
            acquire_timeout_ms: 1000,
            fence_timeout_ms: 1000,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            descriptor_pool: DescriptorPoolConfig::default(),
        }
    }

    /// Set application version
    #[must_use]
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set maximum frames in flight
    #[must_use]
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Enable or disable vsync
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Set acquire and fence timeouts in milliseconds
    #[must_use]
    pub fn with_timeouts(mut self, acquire_ms: u64, fence_ms: u64) -> Self {
        self.acquire_timeout_ms = acquire_ms;
        self.fence_timeout_ms = fence_ms;
        self
    }

    /// Set the clear color
    #[must_use]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set global descriptor pool sizing
    #[must_use]
    pub fn with_descriptor_pool(mut self, pool: DescriptorPoolConfig) -> Self {
        self.descriptor_pool = pool;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Acquire timeout in nanoseconds
    pub const fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout_ms.saturating_mul(1_000_000)
    }

    /// Fence timeout in nanoseconds
    pub const fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }

    /// Settings the graphics context is built from
    pub const fn context_config(&self) -> ContextConfig {
        ContextConfig {
            frames_in_flight: self.max_frames_in_flight,
            descriptor_pool: self.descriptor_pool,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.max_frames_in_flight > MAX_FRAMES_IN_FLIGHT_LIMIT {
            return Err(format!(
                "Max frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT_LIMIT}"
            ));
        }

        if self.descriptor_pool.max_sets == 0 || self.descriptor_pool.descriptors_per_type == 0 {
            return Err("Global descriptor pool must have non-zero capacity".to_string());
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("vy application")
    }
}

/// Settings consumed by [`GraphicsContext::new`](crate::vulkan::context::GraphicsContext::new)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Number of deletion queue slots, one per frame in flight
    pub frames_in_flight: usize,
    /// Global descriptor pool sizing
    pub descriptor_pool: DescriptorPoolConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        RendererConfig::default().context_config()
    }
}

/// # Engine Configuration
///
/// Logging and window settings for the application shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Window title
    pub window_title: String,
    /// Initial window size in screen coordinates
    pub window_size: (u32, u32),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            window_title: "vy".to_string(),
            window_size: (1280, 720),
        }
    }
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine shell settings
    pub engine: EngineConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl AppConfig {
    /// Load and validate configuration, using defaults when the file is missing
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?;
        config.renderer.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

impl Config for AppConfig {}
