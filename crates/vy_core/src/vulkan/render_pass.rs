//! Render pass and framebuffer wrappers

use std::rc::Rc;

use ash::vk;

use super::context::GraphicsContext;
use super::{VulkanError, VulkanResult};

/// Forward render pass: one presentable color attachment cleared on load,
/// one depth attachment
pub struct RenderPass {
    ctx: Rc<GraphicsContext>,
    render_pass: vk::RenderPass,
    color_format: vk::Format,
    depth_format: vk::Format,
}

impl RenderPass {
    /// Create a forward pass for the given attachment formats
    pub fn new_forward_pass(
        ctx: &Rc<GraphicsContext>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let render_pass = ctx
            .device()
            .create_render_pass(color_format, depth_format)
            .map_err(VulkanError::Api)?;
        Ok(Self {
            ctx: Rc::clone(ctx),
            render_pass,
            color_format,
            depth_format,
        })
    }

    /// Get the render pass handle
    pub const fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Format of the color attachment
    pub const fn color_format(&self) -> vk::Format {
        self.color_format
    }

    /// Format of the depth attachment
    pub const fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.ctx.destroy_render_pass(self.render_pass);
    }
}

/// Framebuffer wrapper
pub struct Framebuffer {
    ctx: Rc<GraphicsContext>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create a framebuffer binding `attachments` to `render_pass`
    pub fn new(
        ctx: &Rc<GraphicsContext>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer = ctx
            .device()
            .create_framebuffer(render_pass.handle(), attachments, extent)
            .map_err(VulkanError::Api)?;
        Ok(Self {
            ctx: Rc::clone(ctx),
            framebuffer,
            extent,
        })
    }

    /// Get the framebuffer handle
    pub const fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Size of the attachments
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.ctx.destroy_framebuffer(self.framebuffer);
    }
}
