// Buffer utilities for vertex, index, and uniform buffers
//
// Static data goes through a staging buffer into device-local memory once at
// startup. Uniform buffers stay host-visible and persistently mapped.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use std::ffi::c_void;
use super::VulkanDevice;
use crate::error::RendererError;

/// A buffer together with the memory bound to it
#[derive(Debug, Clone, Copy)]
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl Buffer {
    pub fn destroy(&self, device: &VulkanDevice) {
        unsafe {
            device.device.destroy_buffer(self.buffer, None);
            device.device.free_memory(self.memory, None);
        }
    }
}

/// Helper to create a GPU buffer with specified usage and memory properties
pub fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<Buffer> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe {
        device.device.create_buffer(&buffer_info, None)
            .context("Failed to create buffer")?
    };

    let mem_requirements = unsafe {
        device.device.get_buffer_memory_requirements(buffer)
    };

    let memory_type_index = find_memory_type(
        &device.memory_properties,
        mem_requirements.memory_type_bits,
        memory_properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device.device.allocate_memory(&alloc_info, None)
            .context("Failed to allocate buffer memory")?
    };

    unsafe {
        device.device.bind_buffer_memory(buffer, memory, 0)
            .context("Failed to bind buffer memory")?;
    }

    Ok(Buffer { buffer, memory, size })
}

/// Lowest-indexed memory type allowed by `type_filter` whose flags include
/// all of `properties`
pub fn find_memory_type(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, RendererError> {
    (0..mem_properties.memory_type_count)
        .find(|&i| {
            let has_type = (type_filter & (1 << i)) != 0;
            let has_properties = mem_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            has_type && has_properties
        })
        .ok_or(RendererError::NoSuitableMemoryType {
            type_filter,
            flags: properties,
        })
}

/// Upload immutable data into a device-local buffer through a staging copy.
///
/// Blocks until the graphics queue is idle; only meant for startup.
pub fn upload_static<T: Pod>(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    data: &[T],
    usage: vk::BufferUsageFlags,
) -> Result<Buffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let size = bytes.len() as vk::DeviceSize;

    let staging = create_buffer(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    unsafe {
        let ptr = device.device.map_memory(
            staging.memory,
            0,
            size,
            vk::MemoryMapFlags::empty(),
        )? as *mut u8;

        ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        device.device.unmap_memory(staging.memory);
    }

    let destination = create_buffer(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let copied = copy_buffer(device, command_pool, staging.buffer, destination.buffer, size);
    staging.destroy(device);
    copied?;

    log::debug!("Uploaded {} bytes for {:?}", size, usage);
    Ok(destination)
}

/// Copy a buffer's contents back to the host. Debug path: blocks on the queue.
pub fn read_back(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    source: &Buffer,
) -> Result<Vec<u8>> {
    let readback = create_buffer(
        device,
        source.size,
        vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let result = copy_buffer(device, command_pool, source.buffer, readback.buffer, source.size)
        .and_then(|()| unsafe {
            let ptr = device.device.map_memory(
                readback.memory,
                0,
                source.size,
                vk::MemoryMapFlags::empty(),
            )? as *const u8;

            let bytes = std::slice::from_raw_parts(ptr, source.size as usize).to_vec();
            device.device.unmap_memory(readback.memory);
            Ok(bytes)
        });

    readback.destroy(device);
    result
}

/// Record `src -> dst` into a one-shot command buffer, submit, and wait
fn copy_buffer(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    submit_one_shot(device, command_pool, |cmd| unsafe {
        let region = vk::BufferCopy::default().size(size);
        device.device.cmd_copy_buffer(cmd, src, dst, &[region]);
    })
}

fn submit_one_shot(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    record: impl FnOnce(vk::CommandBuffer),
) -> Result<()> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info)? };

    let result = unsafe {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        device.device.begin_command_buffer(command_buffers[0], &begin_info)
            .and_then(|()| {
                record(command_buffers[0]);
                device.device.end_command_buffer(command_buffers[0])
            })
            .and_then(|()| {
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                device.device.queue_submit(device.graphics_queue, &[submit_info], vk::Fence::null())
            })
            .and_then(|()| device.device.queue_wait_idle(device.graphics_queue))
    };

    unsafe {
        device.device.free_command_buffers(command_pool, &command_buffers);
    }

    result.context("One-shot transfer failed")
}

/// Host-visible buffer that stays mapped for its whole lifetime
pub struct MappedBuffer {
    pub buffer: Buffer,
    mapped: *mut c_void,
}

impl MappedBuffer {
    pub fn uniform(device: &VulkanDevice, size: vk::DeviceSize) -> Result<Self> {
        let buffer = create_buffer(
            device,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mapped = unsafe {
            device.device.map_memory(buffer.memory, 0, size, vk::MemoryMapFlags::empty())
        };

        match mapped {
            Ok(mapped) => Ok(Self { buffer, mapped }),
            Err(e) => {
                buffer.destroy(device);
                Err(e).context("Failed to map uniform buffer")
            }
        }
    }

    /// Plain copy into the mapping; coherent memory needs no flush.
    /// The caller guarantees the GPU is not reading this buffer.
    pub fn write<T: Pod>(&self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        assert!(bytes.len() as vk::DeviceSize <= self.buffer.size);

        unsafe {
            (self.mapped as *mut u8).copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        }
    }

    pub fn destroy(&self, device: &VulkanDevice) {
        unsafe {
            device.device.unmap_memory(self.buffer.memory);
        }
        self.buffer.destroy(device);
    }
}
