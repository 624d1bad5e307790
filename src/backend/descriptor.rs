// Descriptor layout, pool and sets for the per-frame uniform buffers

use anyhow::{Context, Result};
use ash::vk;
use super::buffer::MappedBuffer;
use super::VulkanDevice;

/// Binding 0: one uniform buffer, read by the vertex stage
pub fn create_uniform_set_layout(device: &VulkanDevice) -> Result<vk::DescriptorSetLayout> {
    let bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX)];

    let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

    unsafe {
        device.device.create_descriptor_set_layout(&layout_info, None)
            .context("Failed to create descriptor set layout")
    }
}

/// Pool sized for `count` uniform-buffer sets
pub fn create_descriptor_pool(device: &VulkanDevice, count: u32) -> Result<vk::DescriptorPool> {
    let pool_sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: count,
    }];

    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .pool_sizes(&pool_sizes)
        .max_sets(count);

    unsafe {
        device.device.create_descriptor_pool(&pool_info, None)
            .context("Failed to create descriptor pool")
    }
}

/// One set per buffer, each pointing binding 0 at its buffer
pub fn allocate_uniform_sets(
    device: &VulkanDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    buffers: &[&MappedBuffer],
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; buffers.len()];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe {
        device.device.allocate_descriptor_sets(&alloc_info)
            .context("Failed to allocate descriptor sets")?
    };

    for (&set, buffer) in sets.iter().zip(buffers) {
        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer.buffer.buffer)
            .offset(0)
            .range(buffer.buffer.size)];

        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);

        unsafe {
            device.device.update_descriptor_sets(&[write], &[]);
        }
    }

    Ok(sets)
}
