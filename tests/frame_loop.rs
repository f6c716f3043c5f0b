// Frame loop protocol against a simulated GPU

use anyhow::Result;
use ash::vk;
use vulkan_notes::config::CameraConfig;
use vulkan_notes::frame::{FrameDriver, FrameLoop, SlotState};
use vulkan_notes::input::InputState;
use vulkan_notes::scene::{Camera, DrawCall, FrameInput, GridScene, TriangleScene, UniformBlock};
use vulkan_notes::RendererError;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Upload(usize),
    Wait(usize),
    Reset(usize),
    Uniforms(usize),
    Acquire(usize),
    Record { slot: usize, image: u32, draws: usize },
    Submit(usize),
    Present { slot: usize, image: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fail {
    Acquire,
    Submit,
    Present,
}

/// Fences complete only when waited on, so the host is always as far ahead
/// of the GPU as the protocol allows.
struct SimulatedGpu {
    fence_signaled: Vec<bool>,
    waited_since_submit: Vec<bool>,
    image_count: u32,
    next_image: u32,
    calls: Vec<Call>,
    max_in_flight: usize,
    fail: Option<Fail>,
}

impl SimulatedGpu {
    fn new(slots: usize) -> Self {
        Self {
            fence_signaled: vec![true; slots],
            waited_since_submit: vec![true; slots],
            image_count: slots as u32,
            // Start off by one so image and slot indices never line up
            next_image: 1,
            calls: Vec::new(),
            max_in_flight: 0,
            fail: None,
        }
    }

    fn in_flight(&self) -> usize {
        self.fence_signaled.iter().filter(|&&s| !s).count()
    }
}

impl FrameDriver for SimulatedGpu {
    fn upload_vertices(&mut self, bytes: &[u8]) -> Result<()> {
        self.calls.push(Call::Upload(bytes.len()));
        Ok(())
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.calls.push(Call::Wait(slot));
        self.fence_signaled[slot] = true;
        self.waited_since_submit[slot] = true;
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        assert!(self.waited_since_submit[slot], "slot {slot} reset before its fence was waited on");
        self.calls.push(Call::Reset(slot));
        self.fence_signaled[slot] = false;
        Ok(())
    }

    fn write_uniforms(&mut self, slot: usize, _uniforms: &UniformBlock) -> Result<()> {
        assert!(self.waited_since_submit[slot], "uniforms of slot {slot} written while in use");
        self.calls.push(Call::Uniforms(slot));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<u32> {
        self.calls.push(Call::Acquire(slot));
        if self.fail == Some(Fail::Acquire) {
            return Err(RendererError::AcquireFailed(vk::Result::ERROR_OUT_OF_DATE_KHR).into());
        }
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(image)
    }

    fn record(&mut self, slot: usize, image_index: u32, draws: &[DrawCall]) -> Result<()> {
        self.calls.push(Call::Record {
            slot,
            image: image_index,
            draws: draws.len(),
        });
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        assert!(!self.fence_signaled[slot], "slot {slot} submitted with a signaled fence");
        self.calls.push(Call::Submit(slot));
        if self.fail == Some(Fail::Submit) {
            return Err(RendererError::SubmitFailed(vk::Result::ERROR_DEVICE_LOST).into());
        }
        self.waited_since_submit[slot] = false;
        self.max_in_flight = self.max_in_flight.max(self.in_flight());
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.calls.push(Call::Present { slot, image: image_index });
        if self.fail == Some(Fail::Present) {
            return Err(RendererError::PresentFailed(vk::Result::ERROR_SURFACE_LOST_KHR).into());
        }
        Ok(())
    }
}

fn frame_input(input: &InputState, time: f32) -> FrameInput<'_> {
    FrameInput {
        time,
        delta: 1.0 / 60.0,
        aspect: 4.0 / 3.0,
        input,
    }
}

#[test]
fn triangle_frame_advances_current_frame() {
    let mut gpu = SimulatedGpu::new(3);
    let mut frames = FrameLoop::new(3).unwrap();
    let mut scene = TriangleScene::new();
    let input = InputState::default();

    assert_eq!(frames.current_frame(), 0);
    let report = frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, 0.0)).unwrap();

    assert_eq!(report.slot, 0);
    assert_eq!(frames.current_frame(), 1);
    assert_eq!(frames.slot_state(0), SlotState::Submitted);
    assert_eq!(
        gpu.calls,
        vec![
            Call::Wait(0),
            Call::Reset(0),
            Call::Uniforms(0),
            Call::Acquire(0),
            Call::Record { slot: 0, image: 1, draws: 1 },
            Call::Submit(0),
            Call::Present { slot: 0, image: 1 },
        ]
    );
}

#[test]
fn slots_round_robin_independently_of_images() {
    let mut gpu = SimulatedGpu::new(3);
    let mut frames = FrameLoop::new(3).unwrap();
    let mut scene = TriangleScene::new();
    let input = InputState::default();

    let reports: Vec<_> = (0..7)
        .map(|i| frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, i as f32)).unwrap())
        .collect();

    let slots: Vec<usize> = reports.iter().map(|r| r.slot).collect();
    assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    assert!(reports.iter().all(|r| r.slot as u32 != r.image_index));
    assert_eq!(frames.current_frame(), 1);
    assert_eq!(frames.frames_rendered(), 7);
}

#[test]
fn never_more_than_slot_count_in_flight() {
    for slots in 1..=4 {
        let mut gpu = SimulatedGpu::new(slots);
        let mut frames = FrameLoop::new(slots).unwrap();
        let mut scene = TriangleScene::new();
        let input = InputState::default();

        for i in 0..20 {
            frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, i as f32)).unwrap();
            assert!(frames.in_flight() <= slots);
        }
        assert_eq!(gpu.max_in_flight, slots);
    }
}

#[test]
fn every_slot_is_waited_before_reuse() {
    let mut gpu = SimulatedGpu::new(2);
    let mut frames = FrameLoop::new(2).unwrap();
    let mut scene = TriangleScene::new();
    let input = InputState::default();

    for i in 0..6 {
        frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, i as f32)).unwrap();
    }

    let mut last_submit: Vec<Option<usize>> = vec![None; 2];
    let mut waited_after: Vec<bool> = vec![true; 2];
    for (position, call) in gpu.calls.iter().enumerate() {
        match *call {
            Call::Wait(slot) => waited_after[slot] = true,
            Call::Submit(slot) => {
                assert!(waited_after[slot], "slot {slot} resubmitted at {position} without a wait");
                waited_after[slot] = false;
                last_submit[slot] = Some(position);
            }
            _ => {}
        }
    }
    assert!(last_submit.iter().all(Option::is_some));
}

#[test]
fn dynamic_scene_uploads_before_waiting() {
    let mut gpu = SimulatedGpu::new(2);
    let mut frames = FrameLoop::new(2).unwrap();
    let mut scene = GridScene::new(4, Camera::from_config(&CameraConfig::default())).unwrap();
    let input = InputState::default();

    frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, 0.5)).unwrap();

    // 16 vertices of 24 bytes
    assert_eq!(gpu.calls[0], Call::Upload(16 * 24));
    assert_eq!(gpu.calls[1], Call::Wait(0));
}

#[test]
fn acquire_failure_is_fatal_and_keeps_the_slot() {
    let mut gpu = SimulatedGpu::new(2);
    let mut frames = FrameLoop::new(2).unwrap();
    let mut scene = TriangleScene::new();
    let input = InputState::default();

    gpu.fail = Some(Fail::Acquire);
    let err = frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, 0.0)).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RendererError>(),
        Some(RendererError::AcquireFailed(vk::Result::ERROR_OUT_OF_DATE_KHR))
    ));
    assert_eq!(frames.current_frame(), 0);
    assert_eq!(frames.slot_state(0), SlotState::Acquiring);
    assert!(!gpu.calls.iter().any(|c| matches!(c, Call::Submit(_))));
}

#[test]
fn submit_failure_is_fatal() {
    let mut gpu = SimulatedGpu::new(2);
    let mut frames = FrameLoop::new(2).unwrap();
    let mut scene = TriangleScene::new();
    let input = InputState::default();

    gpu.fail = Some(Fail::Submit);
    let err = frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, 0.0)).unwrap_err();

    assert!(matches!(err.downcast_ref::<RendererError>(), Some(RendererError::SubmitFailed(_))));
    assert_eq!(frames.current_frame(), 0);
    assert!(!gpu.calls.iter().any(|c| matches!(c, Call::Present { .. })));
}

#[test]
fn present_failure_is_fatal_after_the_slot_advanced() {
    let mut gpu = SimulatedGpu::new(2);
    let mut frames = FrameLoop::new(2).unwrap();
    let mut scene = TriangleScene::new();
    let input = InputState::default();

    gpu.fail = Some(Fail::Present);
    let err = frames.render_frame(&mut gpu, &mut scene, &frame_input(&input, 0.0)).unwrap_err();

    assert!(matches!(err.downcast_ref::<RendererError>(), Some(RendererError::PresentFailed(_))));
    assert_eq!(frames.current_frame(), 1);
    assert_eq!(frames.frames_rendered(), 0);
}
