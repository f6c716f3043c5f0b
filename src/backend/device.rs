// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with (optional) validation layers
// - Window surface creation
// - Physical device selection
// - Logical device + single graphics/present queue

use anyhow::{Context, Result};
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::selection::{self, PhysicalDevice, QueueFamilyCandidate, SelectionCriteria};
use super::surface::{PresentTarget, Surface};
use crate::config::Config;
use crate::error::RendererError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"Vulkan Notes";
const ENGINE_NAME: &CStr = c"No Engine";

/// Parameters for device creation, decided by the caller rather than by
/// process-wide constants.
pub struct DeviceDesc {
    pub enable_validation: bool,
    pub require_geometry_shader: bool,
    pub min_heap0_size: vk::DeviceSize,
}

impl DeviceDesc {
    pub fn from_config(config: &Config, enable_validation: bool) -> Self {
        Self {
            enable_validation,
            require_geometry_shader: config.graphics.require_geometry_shader,
            min_heap0_size: config.min_device_memory_bytes(),
        }
    }
}

/// The single queue used for graphics, presentation and transfers
#[derive(Clone, Copy)]
pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
    pub properties: vk::QueueFamilyProperties,
}

/// Instance-level handles. Owned separately from the logical device so that
/// a failure later in `VulkanDevice::new` still releases them.
struct InstanceContext {
    surface: Option<Surface>,
    debug_utils: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    instance: ash::Instance,
    entry: Entry,
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some(surface) = self.surface.take() {
                surface.destroy();
            }

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical: PhysicalDevice,
    pub queue: Queue,
    context: InstanceContext,
}

impl VulkanDevice {
    /// Create instance, surface, pick the GPU and create the logical device.
    pub fn new(desc: &DeviceDesc, target: PresentTarget) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device (validation: {})", desc.enable_validation);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance; from here on the context owns cleanup
        let instance = Self::create_instance(&entry, target, desc.enable_validation)?;
        let mut context = InstanceContext {
            surface: None,
            debug_utils: None,
            instance,
            entry,
        };

        // Step 3: Setup debug messenger if validation enabled
        if desc.enable_validation {
            context.debug_utils = Some(Self::setup_debug_messenger(&context.entry, &context.instance)?);
        }

        // Step 4: Create surface (platform-specific window connection)
        if let PresentTarget::Window { display, window } = target {
            context.surface = Some(Surface::new(&context.entry, &context.instance, display, window)?);
        }

        // Step 5: Pick physical device (GPU); fills in surface support
        let mut required_extensions: Vec<&CStr> = Vec::new();
        if context.surface.is_some() {
            required_extensions.push(khr::Swapchain::name());
        }
        let criteria = SelectionCriteria {
            required_extensions: &required_extensions,
            require_geometry_shader: desc.require_geometry_shader,
            min_heap0_size: desc.min_heap0_size,
        };
        let physical = selection::pick_physical_device(&context.instance, context.surface.as_mut(), &criteria)?;

        log::info!("Selected GPU: {}", physical.name());
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(physical.properties.api_version),
            vk::api_version_minor(physical.properties.api_version),
            vk::api_version_patch(physical.properties.api_version)
        );

        // Step 6: Pick the queue family and create the logical device
        let family_index = Self::pick_queue_family(&physical, context.surface.as_ref())?;
        let device =
            Self::create_logical_device(&context.instance, &physical, family_index, &required_extensions)?;
        let queue = Queue {
            family_index,
            handle: unsafe { device.get_device_queue(family_index, 0) },
            properties: physical.queue_families[family_index as usize],
        };

        log::info!("Logical device created (queue family {})", family_index);

        Ok(Arc::new(Self {
            device,
            physical,
            queue,
            context,
        }))
    }

    fn create_instance(entry: &Entry, target: PresentTarget, enable_validation: bool) -> Result<ash::Instance> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(APP_NAME)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Required extensions come from the windowing side
        let mut extensions = match target {
            PresentTarget::Window { display, .. } => ash_window::enumerate_required_extensions(display)
                .context("Failed to enumerate required surface extensions")?
                .to_vec(),
            PresentTarget::Headless => Vec::new(),
        };

        if enable_validation {
            extensions.push(ext::DebugUtils::name().as_ptr());
        }

        // Validation layers
        let requested_layers: Vec<&CStr> = if enable_validation {
            vec![VALIDATION_LAYER]
        } else {
            vec![]
        };
        Self::check_layer_support(entry, &requested_layers)?;
        let layer_names: Vec<_> = requested_layers.iter().map(|l| l.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Instance create error")?;

        log::info!("Vulkan instance created");
        Ok(instance)
    }

    /// Every requested layer must be present; the error lists all missing ones.
    fn check_layer_support(entry: &Entry, requested: &[&CStr]) -> Result<()> {
        let available: HashSet<CString> = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }.to_owned())
            .collect();

        let missing = missing_layers(&available, requested);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RendererError::MissingLayers(missing).into())
        }
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_queue_family(physical: &PhysicalDevice, surface: Option<&Surface>) -> Result<u32> {
        let families = physical
            .queue_families
            .iter()
            .enumerate()
            .map(|(index, props)| {
                let present_supported = match surface {
                    Some(surface) => surface.supports_present(physical.handle, index as u32)?,
                    None => true,
                };
                Ok(QueueFamilyCandidate {
                    flags: props.queue_flags,
                    present_supported,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        selection::pick_queue_family(&families).ok_or_else(|| RendererError::NoSuitableQueueFamily.into())
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: &PhysicalDevice,
        queue_family: u32,
        extensions: &[&CStr],
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extension_names: Vec<_> = extensions.iter().map(|e| e.as_ptr()).collect();

        // Device layers stay empty: validation is instance-level only
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extension_names);

        unsafe { instance.create_device(physical.handle, &create_info, None) }
            .context("failed to create logical device")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.context.instance
    }

    /// Surface of a windowed device
    pub fn surface(&self) -> Result<&Surface> {
        self.context.surface.as_ref().context("Device was created without a surface")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        // The instance context is dropped after this, in reverse order
        unsafe { self.device.destroy_device(None) };
    }
}

fn missing_layers(available: &HashSet<CString>, requested: &[&CStr]) -> Vec<String> {
    requested
        .iter()
        .filter(|layer| !available.contains(**layer))
        .map(|layer| layer.to_string_lossy().into_owned())
        .collect()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] ({:?}) {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] ({:?}) {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan] ({:?}) {}", message_type, message);
        }
        _ => {
            log::trace!("[Vulkan] ({:?}) {}", message_type, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_unavailable_layers_are_reported() {
        let available: HashSet<CString> = [c"VK_LAYER_MESA_overlay".to_owned()].into_iter().collect();
        let requested = [VALIDATION_LAYER, c"VK_LAYER_MESA_overlay", c"VK_LAYER_LUNARG_monitor"];

        assert_eq!(
            missing_layers(&available, &requested),
            vec!["VK_LAYER_KHRONOS_validation".to_string(), "VK_LAYER_LUNARG_monitor".to_string()]
        );
    }

    #[test]
    fn no_requested_layers_is_always_satisfied() {
        assert!(missing_layers(&HashSet::new(), &[]).is_empty());
    }
}
