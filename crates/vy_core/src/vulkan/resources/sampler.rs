//! Texture samplers

use std::rc::Rc;

use ash::vk;

use crate::vulkan::api::SamplerDesc;
use crate::vulkan::context::GraphicsContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Builder for [`Sampler`]; defaults to linear filtering with repeat addressing
#[derive(Debug, Clone, Copy)]
pub struct SamplerBuilder {
    desc: SamplerDesc,
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        Self {
            desc: SamplerDesc {
                mag_filter: vk::Filter::LINEAR,
                min_filter: vk::Filter::LINEAR,
                mipmap_mode: vk::SamplerMipmapMode::LINEAR,
                address_mode: vk::SamplerAddressMode::REPEAT,
                max_anisotropy: None,
                min_lod: 0.0,
                max_lod: vk::LOD_CLAMP_NONE,
                border_color: vk::BorderColor::INT_OPAQUE_BLACK,
                compare_op: None,
            },
        }
    }
}

impl SamplerBuilder {
    /// Magnification and minification filter
    #[must_use]
    pub const fn filter(mut self, filter: vk::Filter) -> Self {
        self.desc.mag_filter = filter;
        self.desc.min_filter = filter;
        self
    }

    /// Filtering between mip levels
    #[must_use]
    pub const fn mipmap_mode(mut self, mode: vk::SamplerMipmapMode) -> Self {
        self.desc.mipmap_mode = mode;
        self
    }

    /// Address mode for all three coordinates
    #[must_use]
    pub const fn address_mode(mut self, mode: vk::SamplerAddressMode) -> Self {
        self.desc.address_mode = mode;
        self
    }

    /// Anisotropic filtering level, clamped to the device limit at build time
    #[must_use]
    pub fn anisotropy(mut self, max_anisotropy: Option<f32>) -> Self {
        self.desc.max_anisotropy = max_anisotropy;
        self
    }

    /// Mip levels the sampler may access
    #[must_use]
    pub fn lod_range(mut self, min_lod: f32, max_lod: f32) -> Self {
        self.desc.min_lod = min_lod;
        self.desc.max_lod = max_lod;
        self
    }

    /// Color returned for clamp-to-border addressing
    #[must_use]
    pub const fn border_color(mut self, color: vk::BorderColor) -> Self {
        self.desc.border_color = color;
        self
    }

    /// Make this a comparison sampler (shadow map lookups)
    #[must_use]
    pub const fn compare_op(mut self, op: vk::CompareOp) -> Self {
        self.desc.compare_op = Some(op);
        self
    }

    /// Create the sampler
    pub fn build(self, ctx: &Rc<GraphicsContext>) -> VulkanResult<Sampler> {
        let mut desc = self.desc;
        assert!(desc.min_lod <= desc.max_lod, "Sampler LOD range is inverted");

        desc.max_anisotropy = desc
            .max_anisotropy
            .filter(|&level| level > 1.0)
            .map(|level| level.min(ctx.device().max_sampler_anisotropy()));

        let sampler = ctx.device().create_sampler(&desc).map_err(VulkanError::Api)?;
        Ok(Sampler {
            ctx: Rc::clone(ctx),
            sampler,
            desc,
        })
    }
}

/// Sampler wrapper with deferred release
pub struct Sampler {
    ctx: Rc<GraphicsContext>,
    sampler: vk::Sampler,
    desc: SamplerDesc,
}

impl Sampler {
    /// Start building a sampler
    pub fn builder() -> SamplerBuilder {
        SamplerBuilder::default()
    }

    /// Get the sampler handle
    pub const fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    /// Anisotropy level actually requested from the device
    pub fn anisotropy(&self) -> Option<f32> {
        self.desc.max_anisotropy
    }

    /// Descriptor info pairing this sampler with `view` in `layout`
    pub const fn descriptor_info(&self, view: vk::ImageView, layout: vk::ImageLayout) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: view,
            image_layout: layout,
        }
    }

    /// Queue the sampler for release; later calls do nothing
    pub fn destroy(&mut self) {
        self.ctx.destroy_sampler(self.sampler);
        self.sampler = vk::Sampler::null();
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.destroy();
    }
}
