//! Frame pacing demo
//!
//! Opens a window and clears it every frame while keeping one uniform buffer
//! and descriptor set per frame slot. Every few seconds the buffers are
//! reallocated, which exercises deferred destruction under load.
//!
//! Keys: Escape quits, V toggles vsync.

use std::rc::Rc;
use std::time::Instant;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glfw::{Action, Key, WindowEvent};
use thiserror::Error;
use vy_core::config::ConfigError;
use vy_core::prelude::*;
use vy_core::vulkan::window::WindowError;

const CONFIG_PATH: &str = "vy_demo.toml";

/// Frames between buffer reallocations
const REALLOCATE_INTERVAL: u64 = 240;

#[derive(Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    #[error("Global descriptor pool exhausted")]
    DescriptorPoolExhausted,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameUniforms {
    time: f32,
    aspect_ratio: f32,
    frame: u32,
    _padding: u32,
}

/// Uniform buffer and descriptor set owned by one frame slot
struct SlotResources {
    buffer: Buffer,
    set: vk::DescriptorSet,
}

fn create_uniform_buffer(ctx: &Rc<GraphicsContext>) -> Result<Buffer, DemoError> {
    Ok(Buffer::builder()
        .instance(std::mem::size_of::<FrameUniforms>() as vk::DeviceSize, 1)
        .min_offset_alignment(ctx.device().min_uniform_buffer_offset_alignment())
        .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
        .build(ctx)?)
}

fn create_slot(ctx: &Rc<GraphicsContext>, layout: &DescriptorSetLayout) -> Result<SlotResources, DemoError> {
    let buffer = create_uniform_buffer(ctx)?;
    let set = DescriptorWriter::new(layout, &**ctx)
        .write_buffer(0, buffer.descriptor_info())
        .build()
        .ok_or(DemoError::DescriptorPoolExhausted)?;
    Ok(SlotResources { buffer, set })
}

/// Swap in a fresh buffer; the old one is released once its slot comes around again
fn reallocate_slot(
    ctx: &Rc<GraphicsContext>,
    layout: &DescriptorSetLayout,
    slot: &mut SlotResources,
) -> Result<(), DemoError> {
    let buffer = create_uniform_buffer(ctx)?;
    DescriptorWriter::new(layout, &**ctx)
        .write_buffer(0, buffer.descriptor_info())
        .update(slot.set);
    slot.buffer = buffer;
    Ok(())
}

fn run() -> Result<(), DemoError> {
    let config = AppConfig::load(CONFIG_PATH)?;
    vy_core::foundation::logging::init_with_level(&config.engine.log_level);
    log::info!("Starting vy demo");

    let (width, height) = config.engine.window_size;
    let mut window = Window::new(&config.engine.window_title, width, height)?;
    let device = AshDevice::new(&mut window, &config.renderer)?;
    let ctx = GraphicsContext::new(Box::new(device), &config.renderer.context_config())?;
    let mut renderer = Renderer::new(Rc::clone(&ctx), &window, &config.renderer)?;

    let layout = DescriptorSetLayout::builder()
        .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
        .build(&ctx)?;
    let mut slots = (0..renderer.frames_in_flight())
        .map(|_| create_slot(&ctx, &layout))
        .collect::<Result<Vec<_>, _>>()?;

    let start = Instant::now();
    let mut frame_count: u64 = 0;

    while !window.should_close() {
        for event in window.poll_events() {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => window.set_should_close(true),
                WindowEvent::Key(Key::V, _, Action::Press, _) => renderer.set_vsync(!renderer.vsync()),
                _ => {}
            }
        }

        let slot_index = renderer.frame_index();
        let Some(cmd) = renderer.begin_frame(&mut window)? else {
            continue;
        };

        // The slot's previous frame has finished on the GPU, so its resources
        // may be rewritten.
        let slot = &mut slots[slot_index];
        if frame_count > 0 && frame_count % REALLOCATE_INTERVAL == 0 {
            log::debug!("Reallocating uniform buffer of slot {slot_index}");
            reallocate_slot(&ctx, &layout, slot)?;
        }
        #[allow(clippy::cast_possible_truncation)]
        let uniforms = FrameUniforms {
            time: start.elapsed().as_secs_f32(),
            aspect_ratio: renderer.aspect_ratio(),
            frame: frame_count as u32,
            _padding: 0,
        };
        slot.buffer.write_to_index(&uniforms, 0)?;

        let t = uniforms.time;
        renderer.set_clear_color([0.5 + 0.5 * t.sin(), 0.3, 0.5 + 0.5 * t.cos(), 1.0]);
        renderer.begin_swapchain_render_pass(cmd)?;
        renderer.end_swapchain_render_pass(cmd)?;
        renderer.end_frame(&mut window)?;

        frame_count += 1;
    }

    renderer.wait_idle()?;
    let sets: Vec<vk::DescriptorSet> = slots.iter().map(|slot| slot.set).collect();
    ctx.release_sets(&sets)?;
    drop(slots);
    drop(layout);
    drop(renderer);
    ctx.shutdown()?;

    log::info!(
        "Rendered {} frames in {:.1}s",
        frame_count,
        start.elapsed().as_secs_f32()
    );
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("{e}");
        eprintln!("vy_demo: {e}");
        std::process::exit(1);
    }
}
