// Per-slot synchronization
//
// image_available: acquire -> submit (GPU side)
// render_finished: submit -> present (GPU side)
// in_flight_fence: submit -> host, gates reuse of the whole slot

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Signaled so the slot's first wait returns at once
        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
                in_flight_fence: device.device.create_fence(&fence_info, None)?,
            })
        }
    }

    /// Block until the slot's previous submission has finished on the GPU
    pub fn wait(&self, device: &VulkanDevice) -> Result<()> {
        unsafe {
            device.device.wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
        }
        .context("Failed waiting for in-flight fence")
    }

    /// Only call once a submission that signals the fence is certain to follow
    pub fn reset(&self, device: &VulkanDevice) -> Result<()> {
        unsafe {
            device.device.reset_fences(&[self.in_flight_fence])
        }
        .context("Failed to reset in-flight fence")
    }

    pub fn destroy(&self, device: &VulkanDevice) {
        unsafe {
            device.device.destroy_semaphore(self.image_available, None);
            device.device.destroy_semaphore(self.render_finished, None);
            device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
