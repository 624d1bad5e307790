// Per-frame resources
//
// Each frame in flight owns its command buffer, sync objects, uniform buffer
// and descriptor set. Nothing in a slot may be touched until the slot's fence
// has signaled.

use anyhow::{Context, Result};
use ash::vk;
use super::buffer::MappedBuffer;
use super::descriptor::allocate_uniform_sets;
use super::sync::FrameSync;
use super::VulkanDevice;

pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub sync: FrameSync,
    pub uniforms: MappedBuffer,
    pub descriptor_set: vk::DescriptorSet,
}

/// Everything a slot's command buffer draws with
pub struct DrawPass {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub clear_color: [f32; 4],
}

/// Build `count` slots; command buffers come from `command_pool`, descriptor
/// sets from `descriptor_pool`
pub fn create_slots(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    uniform_size: vk::DeviceSize,
    count: usize,
) -> Result<Vec<FrameSlot>> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate frame command buffers")?;

    let uniforms = (0..count)
        .map(|_| MappedBuffer::uniform(device, uniform_size))
        .collect::<Result<Vec<_>>>()?;

    let uniform_refs: Vec<&MappedBuffer> = uniforms.iter().collect();
    let descriptor_sets = allocate_uniform_sets(device, descriptor_pool, layout, &uniform_refs)?;

    command_buffers
        .into_iter()
        .zip(uniforms)
        .zip(descriptor_sets)
        .map(|((command_buffer, uniforms), descriptor_set)| {
            Ok(FrameSlot {
                command_buffer,
                sync: FrameSync::new(device)?,
                uniforms,
                descriptor_set,
            })
        })
        .collect()
}

impl FrameSlot {
    /// Reset and re-record this slot's command buffer for one indexed draw
    pub fn record(&self, device: &VulkanDevice, pass: &DrawPass) -> Result<()> {
        let cmd = self.command_buffer;

        unsafe {
            device.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::default();
            device.device.begin_command_buffer(cmd, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue { float32: pass.clear_color },
            }];
            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: pass.extent,
            };
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(pass.render_pass)
                .framebuffer(pass.framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);

            device.device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pass.pipeline);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: pass.extent.width as f32,
                height: pass.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.device.cmd_set_scissor(cmd, 0, &[render_area]);

            device.device.cmd_bind_vertex_buffers(cmd, 0, &[pass.vertex_buffer], &[0]);
            device.device.cmd_bind_index_buffer(cmd, pass.index_buffer, 0, vk::IndexType::UINT16);
            device.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pass.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );

            device.device.cmd_draw_indexed(cmd, pass.index_count, 1, 0, 0, 0);

            device.device.cmd_end_render_pass(cmd);
            device.device.end_command_buffer(cmd)?;
        }

        Ok(())
    }

    /// Submit the recorded commands: wait for the acquired image at color
    /// output, signal render-finished and the in-flight fence on completion
    pub fn submit(&self, device: &VulkanDevice) -> Result<()> {
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished];
        let command_buffers = [self.command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info],
                self.sync.in_flight_fence,
            )
        }
        .context("Failed to submit draw command buffer")
    }

    /// The command buffer goes back with its pool
    pub fn destroy(&self, device: &VulkanDevice) {
        self.sync.destroy(device);
        self.uniforms.destroy(device);
    }
}
