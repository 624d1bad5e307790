// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers (fail fast when missing)
// - Window surface creation
// - Physical device selection (first suitable device wins)
// - Logical device + graphics/present queue creation

use anyhow::{Context, Result};
use ash::{vk, Entry};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};
use super::swapchain::SwapchainSupport;
use crate::error::RendererError;
use crate::window::AppWindow;

const VALIDATION_LAYERS: &[&CStr] = &[c"VK_LAYER_KHRONOS_validation"];

const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue families a device needs; both may be the same family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Walk the families in order, keeping the latest graphics / present
    /// candidates and stopping as soon as both are known.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Self> {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if supports_present(index)? {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct families, in ascending order
    pub fn unique(&self) -> Vec<u32> {
        self.graphics
            .into_iter()
            .chain(self.present)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Names from `required` that are absent from `available`
pub fn missing_names(required: &[&CStr], available: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Vulkan instance, surface and logical device
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,

    // Debug utils (if validation enabled)
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create the Vulkan device for a window
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Require and enable Khronos validation layers
    /// * `window` - Window the surface is created for
    pub fn new(app_name: &str, enable_validation: bool, window: &AppWindow) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        if enable_validation {
            Self::check_validation_layers(&entry)?;
        }

        let instance = Self::create_instance(&entry, app_name, enable_validation, window)?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface = window.create_surface(&entry, &instance)?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&instance, physical_device, &queue_families)?;

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let properties = unsafe {
            instance.get_physical_device_properties(physical_device)
        };
        let memory_properties = unsafe {
            instance.get_physical_device_memory_properties(physical_device)
        };

        log::info!("Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy());
        log::info!("API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version));
        log::debug!("Queue families: {:?}", queue_families);

        Ok(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            swapchain_loader,
            graphics_queue,
            present_queue,
            queue_families,
            debug_utils,
            memory_properties,
        })
    }

    fn check_validation_layers(entry: &Entry) -> Result<()> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?;
        let available: Vec<&CStr> = layers
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
            .collect();

        let missing = missing_names(VALIDATION_LAYERS, &available);
        if !missing.is_empty() {
            return Err(RendererError::ValidationLayersMissing(missing).into());
        }

        Ok(())
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        window: &AppWindow,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("Quad Renderer")?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        // Platform surface extensions, plus debug utils when validating
        let mut extensions: Vec<*const c_char> = window.required_extensions()?.to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layer_names: Vec<*const c_char> = if enable_validation {
            VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
        }
        .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    /// First enumerated device that has the swapchain extension, complete
    /// queue families and at least one surface format and present mode.
    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

            let extensions = unsafe { instance.enumerate_device_extension_properties(device) }?;
            let available: Vec<&CStr> = extensions
                .iter()
                .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
                .collect();

            let missing = missing_names(DEVICE_EXTENSIONS, &available);
            if !missing.is_empty() {
                log::debug!("Skipping {}: missing extensions {:?}", name, missing);
                continue;
            }

            let families = Self::find_queue_families(instance, surface_loader, device, surface)?;
            if !families.is_complete() {
                log::debug!("Skipping {}: incomplete queue families {:?}", name, families);
                continue;
            }

            let support = SwapchainSupport::query(surface_loader, device, surface)?;
            if !support.is_adequate() {
                log::debug!("Skipping {}: no surface formats or present modes", name);
                continue;
            }

            log::info!("Using {}", name);
            return Ok((device, families));
        }

        Err(RendererError::NoSuitableDevice.into())
    }

    fn find_queue_families(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<QueueFamilyIndices> {
        let families = unsafe {
            instance.get_physical_device_queue_family_properties(device)
        };

        QueueFamilyIndices::find(&families, |index| {
            let supported = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            }?;
            Ok(supported)
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: &QueueFamilyIndices,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let (graphics_family, present_family) = match (families.graphics, families.present) {
            (Some(graphics), Some(present)) => (graphics, present),
            _ => return Err(RendererError::NoSuitableDevice.into()),
        };

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions: Vec<*const c_char> =
            DEVICE_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = unsafe {
            instance.create_device(physical_device, &create_info, None)
        }
        .map_err(RendererError::DeviceCreation)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    /// Re-query queue families for the selected device
    pub fn query_queue_families(&self) -> Result<QueueFamilyIndices> {
        Self::find_queue_families(
            &self.instance,
            &self.surface_loader,
            self.physical_device,
            self.surface,
        )
    }

    /// Re-query surface capabilities, formats and present modes
    pub fn query_swapchain_support(&self) -> Result<SwapchainSupport> {
        SwapchainSupport::query(&self.surface_loader, self.physical_device, self.surface)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }

    /// Destroy device, surface, messenger and instance, in that order.
    /// Every child object must already be gone.
    pub fn destroy(&mut self) {
        log::info!("Destroying Vulkan device...");

        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
