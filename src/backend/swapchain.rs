// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The whole chain (swapchain, views, framebuffers) is rebuilt on resize;
// nothing is patched in place.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use super::device::QueueFamilyIndices;
use super::pipeline::create_framebuffers;
use super::VulkanDevice;

/// Outcome of an acquire or present call.
///
/// Stale and suboptimal surfaces are expected during resizes, so they are
/// values here rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus<T> {
    Success(T),
    Suboptimal(T),
    OutOfDate,
    Failed(vk::Result),
}

impl PresentStatus<u32> {
    pub fn from_acquire(result: VkResult<(u32, bool)>) -> Self {
        match result {
            Ok((index, false)) => PresentStatus::Success(index),
            Ok((index, true)) => PresentStatus::Suboptimal(index),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentStatus::OutOfDate,
            Err(e) => PresentStatus::Failed(e),
        }
    }
}

impl PresentStatus<()> {
    pub fn from_present(result: VkResult<bool>) -> Self {
        match result {
            Ok(false) => PresentStatus::Success(()),
            Ok(true) => PresentStatus::Suboptimal(()),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentStatus::OutOfDate,
            Err(e) => PresentStatus::Failed(e),
        }
    }
}

/// What the surface supports for a given physical device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Prefer 8-bit BGRA sRGB, otherwise whatever the driver lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Preferred mode when supported, otherwise FIFO (always available)
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A defined current extent is used verbatim; u32::MAX means the window
/// decides, clamped into the surface bounds.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer_size.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer_size.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped when the surface reports a maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Concurrent sharing across both families when they differ
pub fn choose_sharing(families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if families.is_complete() && !families.is_shared() {
        (vk::SharingMode::CONCURRENT, families.unique())
    } else {
        (vk::SharingMode::EXCLUSIVE, vec![])
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    preferred_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create the swapchain and its image views. Framebuffers come later,
    /// once a render pass for `format` exists.
    pub fn new(
        device: &VulkanDevice,
        framebuffer_size: vk::Extent2D,
        preferred_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        // Capabilities can change between creations, so always re-query.
        let support = device.query_swapchain_support()?;
        let families = device.query_queue_families()?;

        let surface_format = choose_surface_format(&support.formats)
            .context("No suitable surface format")?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_mode);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let image_count = choose_image_count(&support.capabilities);
        let (sharing_mode, family_indices) = choose_sharing(&families);

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe {
            device.swapchain_loader.create_swapchain(&create_info, None)
        }
        .context("Failed to create swapchain")?;

        let images = unsafe {
            device.swapchain_loader.get_swapchain_images(swapchain)
        }?;

        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe {
                    device.device.create_image_view(&create_info, None)
                        .context("Failed to create image view")
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            swapchain,
            images,
            image_views,
            framebuffers: Vec::new(),
            format: surface_format.format,
            extent,
            preferred_mode,
        })
    }

    pub fn create_framebuffers(
        &mut self,
        device: &VulkanDevice,
        render_pass: vk::RenderPass,
    ) -> Result<()> {
        self.framebuffers = create_framebuffers(device, &self.image_views, render_pass, self.extent)?;
        Ok(())
    }

    /// Tear down and rebuild everything sized by the window.
    /// The render pass is reused: the format does not change across resizes.
    pub fn recreate(
        &mut self,
        device: &VulkanDevice,
        framebuffer_size: vk::Extent2D,
        render_pass: vk::RenderPass,
    ) -> Result<()> {
        // No in-flight frame may still reference the old images
        device.wait_idle()?;

        self.destroy(device);

        let mut rebuilt = Self::new(device, framebuffer_size, self.preferred_mode)?;
        if rebuilt.format != self.format {
            log::warn!(
                "Swapchain format changed from {:?} to {:?}; render pass was not rebuilt",
                self.format,
                rebuilt.format
            );
        }
        rebuilt.create_framebuffers(device, render_pass)?;
        *self = rebuilt;

        Ok(())
    }

    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize]
    }

    /// Acquire next image for rendering
    pub fn acquire_next_image(
        &self,
        device: &VulkanDevice,
        semaphore: vk::Semaphore,
    ) -> PresentStatus<u32> {
        let result = unsafe {
            device.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        PresentStatus::from_acquire(result)
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        device: &VulkanDevice,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> PresentStatus<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            device.swapchain_loader.queue_present(device.present_queue, &present_info)
        };

        PresentStatus::from_present(result)
    }

    /// Destroy framebuffers, views, then the swapchain (which owns the images)
    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                device.device.destroy_framebuffer(framebuffer, None);
            }
            for view in self.image_views.drain(..) {
                device.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                device.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }
}
