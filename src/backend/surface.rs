// Presentation surface
//
// Wraps the platform surface plus whatever the selected adapter reported
// about it. Capabilities/formats/modes are filled in during adapter
// selection and must not be read before it completes.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Where the device is going to present, if anywhere
#[derive(Clone, Copy)]
pub enum PresentTarget {
    Window {
        display: RawDisplayHandle,
        window: RawWindowHandle,
    },
    /// No surface: used by GPU tests of the upload path
    Headless,
}

/// What a physical device supports on a given surface
#[derive(Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: khr::Surface,
    /// Populated from the winning adapter during selection
    pub support: SurfaceSupport,
}

impl Surface {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        let handle = unsafe { ash_window::create_surface(entry, instance, display, window, None) }
            .context("Unable to create window surface")?;
        let loader = khr::Surface::new(entry, instance);

        log::info!("Window surface created");

        Ok(Self {
            handle,
            loader,
            support: SurfaceSupport::default(),
        })
    }

    /// Query what `physical_device` supports on this surface
    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, self.handle)
                    .context("Failed to query surface capabilities")?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(physical_device, self.handle)
                    .context("Failed to query surface formats")?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, self.handle)
                    .context("Failed to query surface present modes")?,
            })
        }
    }

    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
                .context("Failed to query surface presentation support")
        }
    }

    /// Must run before the owning instance is destroyed
    pub(crate) unsafe fn destroy(&self) {
        self.loader.destroy_surface(self.handle, None);
    }
}
