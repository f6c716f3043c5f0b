// Swapchain - Window presentation
//
// Negotiates format, present mode, extent and image count with the surface
// and owns the ring of presentable images, their views and framebuffers.
// The extent is fixed for the life of the swapchain; there is no recreation.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::image::create_image_view;
use super::VulkanDevice;
use crate::config::ImageCountPolicy;
use crate::error::RendererError;

/// Prefer 8-bit BGRA sRGB with the non-linear colour space, else the first
/// format the surface reports.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first().copied())
}

/// The preferred mode if the surface offers it; FIFO is always supported
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Framebuffer size clamped to the surface's extent range
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// `min + 1` images, bounded by `max` when the surface reports one
/// (`max == 0` means unbounded).
///
/// `Clamp` caps the count at `max`. `Modulo` reduces it modulo `max` and
/// rejects a result below `min`.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, policy: ImageCountPolicy) -> Result<u32, RendererError> {
    let min = caps.min_image_count;
    let max = caps.max_image_count;
    let requested = min + 1;

    if max == 0 {
        return Ok(requested);
    }

    match policy {
        ImageCountPolicy::Clamp => Ok(requested.min(max)),
        ImageCountPolicy::Modulo => {
            let count = requested % max;
            if count < min {
                Err(RendererError::ImageCountPolicy { requested: count, min, max })
            } else {
                Ok(count)
            }
        }
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: &Arc<VulkanDevice>,
        preferred_mode: vk::PresentModeKHR,
        policy: ImageCountPolicy,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let surface = device.surface()?;
        let support = &surface.support;

        let surface_format = choose_surface_format(&support.formats).context("No suitable surface format")?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_mode);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = choose_image_count(&support.capabilities, policy)?;

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let swapchain_loader = khr::Swapchain::new(device.instance(), &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Unable to create swap chain")?;

        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: surface_format.format,
            present_mode,
            extent,
            device: device.clone(),
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain) }?;

        // Views are pushed one by one so Drop cleans up a partial set
        for &image in &this.images {
            let view = create_image_view(device, image, this.format, vk::ImageAspectFlags::COLOR)?;
            this.image_views.push(view);
        }

        log::info!("Created swapchain with {} images", this.images.len());
        Ok(this)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// One framebuffer per image view; a depth view is shared by all of them
    pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass, depth_view: Option<vk::ImageView>) -> Result<()> {
        for &view in &self.image_views {
            let mut attachments = vec![view];
            attachments.extend(depth_view);

            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe { self.device.device.create_framebuffer(&framebuffer_info, None) }
                .context("Failed to create framebuffer")?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    pub fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.device.device.destroy_framebuffer(framebuffer, None) };
        }
    }

    /// Acquire the next image, signalling `semaphore` when it is ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<u32> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        Ok(acquire_outcome(result)?)
    }

    /// Present `image_index` once every semaphore in `wait_semaphores` fires
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphores: &[vk::Semaphore]) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        Ok(present_outcome(result)?)
    }
}

/// Anything but plain success is fatal, SUBOPTIMAL included: the swapchain
/// is never recreated.
pub fn acquire_outcome(result: VkResult<(u32, bool)>) -> Result<u32, RendererError> {
    match result {
        Ok((index, false)) => Ok(index),
        Ok((_, true)) => Err(RendererError::AcquireFailed(vk::Result::SUBOPTIMAL_KHR)),
        Err(e) => Err(RendererError::AcquireFailed(e)),
    }
}

pub fn present_outcome(result: VkResult<bool>) -> Result<(), RendererError> {
    match result {
        Ok(false) => Ok(()),
        Ok(true) => Err(RendererError::PresentFailed(vk::Result::SUBOPTIMAL_KHR)),
        Err(e) => Err(RendererError::PresentFailed(e)),
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suboptimal_acquire_is_fatal() {
        assert_eq!(acquire_outcome(Ok((2, false))).unwrap(), 2);
        assert!(matches!(
            acquire_outcome(Ok((2, true))),
            Err(RendererError::AcquireFailed(vk::Result::SUBOPTIMAL_KHR))
        ));
        assert!(matches!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(RendererError::AcquireFailed(vk::Result::ERROR_OUT_OF_DATE_KHR))
        ));
    }

    #[test]
    fn suboptimal_present_is_fatal() {
        assert!(present_outcome(Ok(false)).is_ok());
        assert!(matches!(
            present_outcome(Ok(true)),
            Err(RendererError::PresentFailed(vk::Result::SUBOPTIMAL_KHR))
        ));
        assert!(matches!(
            present_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(RendererError::PresentFailed(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn extent_is_clamped() {
        let caps = caps(2, 3);
        assert_eq!(choose_extent(&caps, 800, 600), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(choose_extent(&caps, 10, 5000), vk::Extent2D { width: 64, height: 1080 });
    }

    #[test]
    fn clamp_policy_respects_bounds() {
        assert_eq!(choose_image_count(&caps(2, 0), ImageCountPolicy::Clamp).unwrap(), 3);
        assert_eq!(choose_image_count(&caps(2, 8), ImageCountPolicy::Clamp).unwrap(), 3);
        assert_eq!(choose_image_count(&caps(2, 2), ImageCountPolicy::Clamp).unwrap(), 2);
        assert_eq!(choose_image_count(&caps(3, 3), ImageCountPolicy::Clamp).unwrap(), 3);

        for min in 1..6 {
            for max in (0..10).filter(|&m| m == 0 || m >= min) {
                let count = choose_image_count(&caps(min, max), ImageCountPolicy::Clamp).unwrap();
                assert!(count >= min);
                if max > 0 {
                    assert!(count <= max);
                }
            }
        }
    }

    #[test]
    fn modulo_policy_reduces_by_max() {
        assert_eq!(choose_image_count(&caps(2, 8), ImageCountPolicy::Modulo).unwrap(), 3);
        assert_eq!(choose_image_count(&caps(2, 0), ImageCountPolicy::Modulo).unwrap(), 3);
    }

    #[test]
    fn modulo_below_min_is_rejected() {
        // min + 1 = 3, max = 2: 3 % 2 = 1 < 2
        let err = choose_image_count(&caps(2, 2), ImageCountPolicy::Modulo).unwrap_err();
        assert!(matches!(
            err,
            RendererError::ImageCountPolicy { requested: 1, min: 2, max: 2 }
        ));
    }
}
