// Frame loop - per-frame acquire / record / submit / present protocol
//
// The loop owns the round-robin slot index and the per-slot state; the GPU
// work itself is done by a FrameDriver. The slot index advances after every
// submit and is unrelated to the swapchain image index returned by acquire.
//
// Per frame, in order:
//   scene update -> vertex re-upload (dynamic scenes)
//   1. wait on the slot's fence      2. reset it
//   3. write the slot's uniforms     4. acquire an image
//   5. record                        6. submit (signals the fence)
//   7. advance the slot index        8. present

use anyhow::Result;

use crate::scene::{DrawCall, FrameInput, Scene, UniformBlock};

/// Lifecycle of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled, resources free for reuse
    Idle,
    Acquiring,
    Recording,
    /// Fence unsignaled, GPU executing
    Submitted,
}

/// GPU side of the frame loop. Every error is fatal to the loop.
pub trait FrameDriver {
    /// Re-upload the vertex buffer through the staging path
    fn upload_vertices(&mut self, bytes: &[u8]) -> Result<()>;

    /// Block until the previous submission from `slot` has finished
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    fn write_uniforms(&mut self, slot: usize, uniforms: &UniformBlock) -> Result<()>;

    /// Acquire a swapchain image, signalling the slot's image-available
    /// semaphore
    fn acquire_image(&mut self, slot: usize) -> Result<u32>;

    fn record(&mut self, slot: usize, image_index: u32, draws: &[DrawCall]) -> Result<()>;

    /// Submit the slot's command buffer; the slot's fence is signaled on
    /// completion
    fn submit(&mut self, slot: usize) -> Result<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> Result<()>;
}

/// What a single `render_frame` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub slot: usize,
    pub image_index: u32,
}

pub struct FrameLoop {
    current_frame: usize,
    slots: Vec<SlotState>,
    frames_rendered: u64,
}

impl FrameLoop {
    /// One slot per swapchain image
    pub fn new(slot_count: usize) -> Result<Self> {
        anyhow::ensure!(slot_count > 0, "Frame loop needs at least one frame slot");
        Ok(Self {
            current_frame: 0,
            slots: vec![SlotState::Idle; slot_count],
            frames_rendered: 0,
        })
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.slots[slot]
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Slots whose last submission has not been waited on
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|&&s| s == SlotState::Submitted).count()
    }

    pub fn render_frame<D: FrameDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        scene: &mut dyn Scene,
        input: &FrameInput,
    ) -> Result<FrameReport> {
        let update = scene.update(input);
        if update.vertices_dirty {
            driver.upload_vertices(scene.vertex_bytes())?;
        }

        let slot = self.current_frame;

        driver.wait_for_slot(slot)?;
        self.slots[slot] = SlotState::Idle;
        driver.reset_slot(slot)?;

        // Safe to overwrite only now that the GPU is done with this slot
        driver.write_uniforms(slot, &update.uniforms)?;

        self.slots[slot] = SlotState::Acquiring;
        let image_index = driver.acquire_image(slot)?;

        self.slots[slot] = SlotState::Recording;
        driver.record(slot, image_index, &scene.draw_calls())?;

        driver.submit(slot)?;
        self.slots[slot] = SlotState::Submitted;

        self.current_frame = (self.current_frame + 1) % self.slots.len();

        driver.present(slot, image_index)?;
        self.frames_rendered += 1;

        log::trace!("Frame {} on slot {} (image {})", self.frames_rendered, slot, image_index);
        Ok(FrameReport { slot, image_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_slots_is_rejected() {
        assert!(FrameLoop::new(0).is_err());
    }

    #[test]
    fn fresh_loop_is_idle() {
        let frames = FrameLoop::new(3).unwrap();
        assert_eq!(frames.current_frame(), 0);
        assert_eq!(frames.in_flight(), 0);
        assert!((0..3).all(|s| frames.slot_state(s) == SlotState::Idle));
    }
}
