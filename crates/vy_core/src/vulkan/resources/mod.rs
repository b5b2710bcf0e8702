//! GPU resource wrappers
//!
//! Each wrapper owns one native handle (plus its memory for buffers and
//! images), is move-only and hands the handle to the
//! [`GraphicsContext`](crate::vulkan::context::GraphicsContext) for deferred
//! release when dropped.

pub mod buffer;
pub mod image;
pub mod sampler;

pub use buffer::{Buffer, BufferBuilder};
pub use image::{Image, ImageBuilder, ImageView, ImageViewBuilder};
pub use sampler::{Sampler, SamplerBuilder};
