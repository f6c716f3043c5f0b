// Physical device and queue family selection
//
// The Vulkan queries are collected into plain snapshots first; the decision
// itself is a pure function over those snapshots.

use anyhow::Result;
use ash::vk;
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use thiserror::Error;

use super::surface::{Surface, SurfaceSupport};
use crate::error::RendererError;

/// Selected adapter with everything cached at selection time.
/// Immutable afterwards.
#[derive(Clone)]
pub struct PhysicalDevice {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDevice {
    pub fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        unsafe {
            Self {
                handle,
                properties: instance.get_physical_device_properties(handle),
                features: instance.get_physical_device_features(handle),
                memory_properties: instance.get_physical_device_memory_properties(handle),
                queue_families: instance.get_physical_device_queue_family_properties(handle),
            }
        }
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Size of memory heap 0, the heap the selection threshold applies to
    pub fn heap0_size(&self) -> vk::DeviceSize {
        if self.memory_properties.memory_heap_count == 0 {
            0
        } else {
            self.memory_properties.memory_heaps[0].size
        }
    }
}

/// Everything adapter selection looks at, detached from Vulkan handles
#[derive(Debug, Clone, Default)]
pub struct AdapterCandidate {
    pub name: String,
    pub extensions: HashSet<CString>,
    pub geometry_shader: bool,
    pub heap0_size: vk::DeviceSize,
    /// `None` when there is no surface to check against
    pub surface_formats: Option<usize>,
    pub present_modes: Option<usize>,
}

impl AdapterCandidate {
    pub fn probe(
        instance: &ash::Instance,
        device: &PhysicalDevice,
        support: Option<&SurfaceSupport>,
    ) -> Result<Self> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(device.handle)? }
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
            .collect();

        Ok(Self {
            name: device.name(),
            extensions,
            geometry_shader: device.features.geometry_shader == vk::TRUE,
            heap0_size: device.heap0_size(),
            surface_formats: support.map(|s| s.formats.len()),
            present_modes: support.map(|s| s.present_modes.len()),
        })
    }
}

pub struct SelectionCriteria<'a> {
    pub required_extensions: &'a [&'a CStr],
    pub require_geometry_shader: bool,
    pub min_heap0_size: vk::DeviceSize,
}

/// Why an adapter was passed over
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing device extensions: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),
    #[error("geometry shaders not supported")]
    NoGeometryShader,
    #[error("heap 0 has {available} bytes, {required} required")]
    InsufficientMemory {
        available: vk::DeviceSize,
        required: vk::DeviceSize,
    },
    #[error("no surface formats or present modes")]
    NoSwapchainSupport,
}

pub fn check_candidate(
    candidate: &AdapterCandidate,
    criteria: &SelectionCriteria,
) -> Result<(), Rejection> {
    let missing: Vec<String> = criteria
        .required_extensions
        .iter()
        .filter(|name| !candidate.extensions.contains(**name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    if !missing.is_empty() {
        return Err(Rejection::MissingExtensions(missing));
    }

    if criteria.require_geometry_shader && !candidate.geometry_shader {
        return Err(Rejection::NoGeometryShader);
    }

    if candidate.heap0_size < criteria.min_heap0_size {
        return Err(Rejection::InsufficientMemory {
            available: candidate.heap0_size,
            required: criteria.min_heap0_size,
        });
    }

    // Headless candidates carry no surface information
    match (candidate.surface_formats, candidate.present_modes) {
        (Some(0), _) | (_, Some(0)) => Err(Rejection::NoSwapchainSupport),
        _ => Ok(()),
    }
}

/// Index of the first adapter passing every criterion
pub fn select_adapter(
    candidates: &[AdapterCandidate],
    criteria: &SelectionCriteria,
) -> Result<usize, RendererError> {
    if candidates.is_empty() {
        return Err(RendererError::NoPhysicalDevices);
    }

    for (index, candidate) in candidates.iter().enumerate() {
        match check_candidate(candidate, criteria) {
            Ok(()) => return Ok(index),
            Err(reason) => log::warn!("Skipping physical device ({}): {}", candidate.name, reason),
        }
    }

    Err(RendererError::NoSuitableDevice)
}

/// Enumerate, probe and pick an adapter. On success the surface (if any)
/// receives the winner's capabilities, formats and present modes.
pub fn pick_physical_device(
    instance: &ash::Instance,
    mut surface: Option<&mut Surface>,
    criteria: &SelectionCriteria,
) -> Result<PhysicalDevice> {
    let handles = unsafe { instance.enumerate_physical_devices()? };

    let mut devices = Vec::with_capacity(handles.len());
    let mut supports = Vec::with_capacity(handles.len());
    let mut candidates = Vec::with_capacity(handles.len());

    for handle in handles {
        let device = PhysicalDevice::query(instance, handle);
        let support = match surface.as_deref() {
            Some(surface) => Some(surface.query_support(handle)?),
            None => None,
        };
        candidates.push(AdapterCandidate::probe(instance, &device, support.as_ref())?);
        devices.push(device);
        supports.push(support);
    }

    let index = select_adapter(&candidates, criteria)?;

    if let (Some(surface), Some(support)) = (surface.as_deref_mut(), supports.swap_remove(index)) {
        surface.support = support;
    }

    Ok(devices.swap_remove(index))
}

/// One queue family as seen by queue selection
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyCandidate {
    pub flags: vk::QueueFlags,
    pub present_supported: bool,
}

/// First family with graphics operations and presentation. No fallback to
/// separate graphics and present queues.
pub fn pick_queue_family(families: &[QueueFamilyCandidate]) -> Option<u32> {
    families
        .iter()
        .position(|f| f.flags.contains(vk::QueueFlags::GRAPHICS) && f.present_supported)
        .map(|i| i as u32)
}
