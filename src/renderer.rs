// Renderer - owns every Vulkan object
//
// Creation order:
//   device -> swapchain -> pipeline -> framebuffers -> command pool
//          -> quad buffers -> descriptor pool -> frame slots
//
// shutdown() walks the same list backwards. Nothing here relies on Drop order.

use anyhow::{Context, Result};
use ash::vk;
use std::mem::size_of;
use std::time::Instant;
use crate::assets::AssetStore;
use crate::backend::buffer::{self, Buffer};
use crate::backend::descriptor::create_descriptor_pool;
use crate::backend::frame::{create_slots, DrawPass, FrameSlot};
use crate::backend::shader::{self, ShaderStage};
use crate::backend::{GraphicsPipeline, PresentStatus, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::mesh::{UniformBufferObject, QUAD_INDICES, QUAD_VERTICES};
use crate::scheduler::{FrameBackend, FrameScheduler, TickOutcome, MAX_FRAMES_IN_FLIGHT};
use crate::window::{AppWindow, PresentTarget};

pub struct Renderer {
    device: VulkanDevice,
    swapchain: Swapchain,
    pipeline: GraphicsPipeline,

    command_pool: vk::CommandPool,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,

    descriptor_pool: vk::DescriptorPool,
    slots: Vec<FrameSlot>,

    scheduler: FrameScheduler,
    clear_color: [f32; 4],
    started: Instant,
    destroyed: bool,
}

impl Renderer {
    pub fn new(config: &Config, window: &AppWindow) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // Validation is a development aid; release builds never load the layer
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(&config.window.title, enable_validation, window)?;

        let mut swapchain = Swapchain::new(
            &device,
            window.framebuffer_size(),
            config.preferred_present_mode(),
        )?;

        let store = AssetStore::new(&config.assets.root);
        log::info!("Loading shaders from {:?}", store.root());
        let vertex_spirv = shader::compile(&store, &config.assets.vertex_shader, ShaderStage::Vertex)?;
        let fragment_spirv = shader::compile(&store, &config.assets.fragment_shader, ShaderStage::Fragment)?;

        let pipeline = GraphicsPipeline::build(&device, swapchain.format, &vertex_spirv, &fragment_spirv)?;
        swapchain.create_framebuffers(&device, pipeline.render_pass)?;

        let graphics_family = device
            .queue_families
            .graphics
            .context("Graphics queue family missing")?;
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            // Each slot re-records its own buffer every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device.device.create_command_pool(&pool_info, None)
                .context("Failed to create command pool")?
        };

        let vertex_buffer = buffer::upload_static(
            &device,
            command_pool,
            &QUAD_VERTICES,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = buffer::upload_static(
            &device,
            command_pool,
            &QUAD_INDICES,
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        if cfg!(debug_assertions) {
            verify_upload(&device, command_pool, &vertex_buffer, bytemuck::cast_slice(&QUAD_VERTICES))?;
        }

        let descriptor_pool = create_descriptor_pool(&device, MAX_FRAMES_IN_FLIGHT as u32)?;
        let slots = create_slots(
            &device,
            command_pool,
            descriptor_pool,
            pipeline.descriptor_set_layout,
            size_of::<UniformBufferObject>() as vk::DeviceSize,
            MAX_FRAMES_IN_FLIGHT,
        )?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            device,
            swapchain,
            pipeline,
            command_pool,
            vertex_buffer,
            index_buffer,
            index_count: QUAD_INDICES.len() as u32,
            descriptor_pool,
            slots,
            scheduler: FrameScheduler::new(),
            clear_color: config.graphics.clear_color,
            started: Instant::now(),
            destroyed: false,
        })
    }

    /// Render one frame into `window`
    pub fn tick(&mut self, window: &mut AppWindow) -> Result<TickOutcome> {
        let elapsed = self.started.elapsed();

        // The scheduler drives `self` as its backend
        let mut scheduler = std::mem::take(&mut self.scheduler);
        let outcome = scheduler.tick(self, window, elapsed);
        self.scheduler = scheduler;

        outcome
    }

    /// Wait for the GPU, then destroy everything in reverse creation order.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        log::info!(
            "Cleaning up Vulkan resources after {} frames...",
            self.scheduler.frames_presented()
        );

        if let Err(e) = self.device.wait_idle() {
            log::error!("Device did not go idle before teardown: {:#}", e);
        }

        for slot in self.slots.drain(..) {
            slot.destroy(&self.device);
        }

        unsafe {
            self.device.device.destroy_descriptor_pool(self.descriptor_pool, None);
        }

        self.index_buffer.destroy(&self.device);
        self.vertex_buffer.destroy(&self.device);

        // Also frees the slot command buffers
        unsafe {
            self.device.device.destroy_command_pool(self.command_pool, None);
        }

        self.swapchain.destroy(&self.device);
        self.pipeline.destroy(&self.device);
        self.device.destroy();
    }

    fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }
}

impl FrameBackend for Renderer {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.slot(slot).sync.wait(&self.device)
    }

    fn acquire_image(&mut self, slot: usize) -> PresentStatus<u32> {
        let semaphore = self.slot(slot).sync.image_available;
        self.swapchain.acquire_next_image(&self.device, semaphore)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.slot(slot).sync.reset(&self.device)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let pass = DrawPass {
            render_pass: self.pipeline.render_pass,
            framebuffer: self.swapchain.framebuffer(image_index),
            extent: self.swapchain.extent,
            pipeline: self.pipeline.pipeline,
            pipeline_layout: self.pipeline.layout,
            vertex_buffer: self.vertex_buffer.buffer,
            index_buffer: self.index_buffer.buffer,
            index_count: self.index_count,
            clear_color: self.clear_color,
        };

        self.slot(slot).record(&self.device, &pass)
    }

    fn write_uniforms(&mut self, slot: usize, ubo: &UniformBufferObject) {
        self.slot(slot).uniforms.write(ubo);
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        self.slot(slot).submit(&self.device)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> PresentStatus<()> {
        let wait = [self.slot(slot).sync.render_finished];
        self.swapchain.present(&self.device, image_index, &wait)
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    fn recreate_swapchain(&mut self, framebuffer_size: vk::Extent2D) -> Result<()> {
        log::info!(
            "Recreating swapchain: {}x{}",
            framebuffer_size.width,
            framebuffer_size.height
        );
        self.swapchain
            .recreate(&self.device, framebuffer_size, self.pipeline.render_pass)
            .context("Failed to recreate swapchain")
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if !self.destroyed {
            log::warn!("Renderer dropped without shutdown(); cleaning up now");
            self.shutdown();
        }
    }
}

/// Copy a freshly uploaded buffer back and compare it with its source
fn verify_upload(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    uploaded: &Buffer,
    expected: &[u8],
) -> Result<()> {
    let bytes = buffer::read_back(device, command_pool, uploaded)?;
    if bytes != expected {
        anyhow::bail!("Uploaded buffer does not match its source data");
    }
    log::debug!("Verified {} uploaded bytes", bytes.len());
    Ok(())
}
