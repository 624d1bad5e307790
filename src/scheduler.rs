// Frame scheduler
//
// Drives one frame per tick against a ring of MAX_FRAMES_IN_FLIGHT slots:
//
//   wait fence -> acquire -> reset fence -> record -> uniforms -> submit
//              -> present -> (recreate swapchain?) -> next slot
//
// The GPU work itself sits behind FrameBackend so the ordering rules live in
// one place and can be exercised without a device.

use anyhow::Result;
use ash::vk;
use std::time::Duration;
use crate::backend::PresentStatus;
use crate::error::RendererError;
use crate::mesh::{aspect_ratio, UniformBufferObject};
use crate::window::PresentTarget;

/// Frames the CPU may run ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// GPU operations the scheduler sequences. `slot` is always in
/// `0..MAX_FRAMES_IN_FLIGHT`.
pub trait FrameBackend {
    /// Block until the slot's in-flight fence signals
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    /// Ask for the next presentable image, signaling the slot's acquire semaphore
    fn acquire_image(&mut self, slot: usize) -> PresentStatus<u32>;
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn write_uniforms(&mut self, slot: usize, ubo: &UniformBufferObject);
    fn submit(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> PresentStatus<()>;
    /// Current swapchain extent
    fn extent(&self) -> vk::Extent2D;
    fn recreate_swapchain(&mut self, framebuffer_size: vk::Extent2D) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Presented,
    /// The swapchain was out of date; nothing was recorded or submitted
    Skipped,
}

#[derive(Debug)]
pub struct FrameScheduler {
    current: usize,
    slots: [SlotState; MAX_FRAMES_IN_FLIGHT],
    frames_presented: u64,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            current: 0,
            slots: [SlotState::Idle; MAX_FRAMES_IN_FLIGHT],
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Run one frame. `elapsed` is the time since startup and drives the
    /// model rotation.
    pub fn tick<B, T>(&mut self, backend: &mut B, target: &mut T, elapsed: Duration) -> Result<TickOutcome>
    where
        B: FrameBackend,
        T: PresentTarget,
    {
        let slot = self.current;

        backend.wait_for_slot(slot)?;
        self.slots[slot] = SlotState::Acquiring;

        let (image_index, mut stale) = match backend.acquire_image(slot) {
            PresentStatus::Success(index) => (index, false),
            PresentStatus::Suboptimal(index) => (index, true),
            PresentStatus::OutOfDate => {
                log::debug!("Swapchain out of date on acquire, skipping frame");
                // Fence was not reset, so the next wait on this slot returns at once
                self.slots[slot] = SlotState::Idle;
                self.recreate(backend, target)?;
                return Ok(TickOutcome::Skipped);
            }
            PresentStatus::Failed(code) => {
                self.slots[slot] = SlotState::Idle;
                return Err(RendererError::Presentation(code).into());
            }
        };

        // Only now is work guaranteed to be submitted against this fence
        backend.reset_slot(slot)?;

        self.slots[slot] = SlotState::Recording;
        backend.record(slot, image_index)?;

        let ubo = UniformBufferObject::at(elapsed, aspect_ratio(backend.extent()));
        backend.write_uniforms(slot, &ubo);

        backend.submit(slot)?;
        self.slots[slot] = SlotState::Submitted;

        match backend.present(slot, image_index) {
            PresentStatus::Success(()) => {}
            PresentStatus::Suboptimal(()) | PresentStatus::OutOfDate => stale = true,
            PresentStatus::Failed(code) => {
                return Err(RendererError::Presentation(code).into());
            }
        }
        self.frames_presented += 1;

        if stale || target.resize_pending() {
            self.recreate(backend, target)?;
        }

        self.current = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
        log::trace!("Frame {} presented from slot {}", self.frames_presented, slot);

        Ok(TickOutcome::Presented)
    }

    fn recreate<B, T>(&mut self, backend: &mut B, target: &mut T) -> Result<()>
    where
        B: FrameBackend,
        T: PresentTarget,
    {
        let size = target.framebuffer_size();
        if size.width == 0 || size.height == 0 {
            // Minimized; try again once the window has an area
            target.set_resize_pending(true);
            return Ok(());
        }

        backend.recreate_swapchain(size)?;
        target.set_resize_pending(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::rotation_degrees;
    use std::collections::VecDeque;

    const IMAGE_COUNT: u32 = 3;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Fence {
        Signaled,
        Unsignaled,
        /// Submitted; the fake GPU finishes it on the next wait
        Pending,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Uniforms(usize),
        Submit(usize),
        Present(usize, u32),
        Recreate(u32, u32),
    }

    struct FakeGpu {
        calls: Vec<Call>,
        fences: [Fence; MAX_FRAMES_IN_FLIGHT],
        resets: [u32; MAX_FRAMES_IN_FLIGHT],
        completions: [u32; MAX_FRAMES_IN_FLIGHT],
        acquire_script: VecDeque<PresentStatus<u32>>,
        present_script: VecDeque<PresentStatus<()>>,
        fail_submit: bool,
        next_image: u32,
        extent: vk::Extent2D,
        uniforms: Vec<UniformBufferObject>,
    }

    impl FakeGpu {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                fences: [Fence::Signaled; MAX_FRAMES_IN_FLIGHT],
                resets: [0; MAX_FRAMES_IN_FLIGHT],
                completions: [0; MAX_FRAMES_IN_FLIGHT],
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fail_submit: false,
                next_image: 0,
                extent: vk::Extent2D { width: 800, height: 600 },
                uniforms: Vec::new(),
            }
        }

        fn recorded(&self) -> bool {
            self.calls.iter().any(|c| matches!(c, Call::Record(..) | Call::Submit(_)))
        }

        fn recreations(&self) -> usize {
            self.calls.iter().filter(|c| matches!(c, Call::Recreate(..))).count()
        }
    }

    impl FrameBackend for FakeGpu {
        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            match self.fences[slot] {
                Fence::Signaled => {}
                Fence::Pending => {
                    self.fences[slot] = Fence::Signaled;
                    self.completions[slot] += 1;
                }
                Fence::Unsignaled => panic!("slot {slot} waits on a fence nothing will signal"),
            }
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> PresentStatus<u32> {
            self.calls.push(Call::Acquire(slot));
            self.acquire_script.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % IMAGE_COUNT;
                PresentStatus::Success(index)
            })
        }

        fn reset_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Reset(slot));
            assert_eq!(self.fences[slot], Fence::Signaled, "reset of unsignaled fence");
            self.fences[slot] = Fence::Unsignaled;
            self.resets[slot] += 1;
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
            self.calls.push(Call::Record(slot, image_index));
            assert_eq!(self.fences[slot], Fence::Unsignaled, "slot {slot} still in flight");
            Ok(())
        }

        fn write_uniforms(&mut self, slot: usize, ubo: &UniformBufferObject) {
            self.calls.push(Call::Uniforms(slot));
            assert_ne!(self.fences[slot], Fence::Pending, "uniforms of slot {slot} in use");
            self.uniforms.push(*ubo);
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Submit(slot));
            if self.fail_submit {
                anyhow::bail!("queue submission failed");
            }
            self.fences[slot] = Fence::Pending;
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> PresentStatus<()> {
            self.calls.push(Call::Present(slot, image_index));
            self.present_script.pop_front().unwrap_or(PresentStatus::Success(()))
        }

        fn extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn recreate_swapchain(&mut self, framebuffer_size: vk::Extent2D) -> Result<()> {
            self.calls.push(Call::Recreate(framebuffer_size.width, framebuffer_size.height));
            self.extent = framebuffer_size;
            Ok(())
        }
    }

    struct FakeWindow {
        size: vk::Extent2D,
        resize_pending: bool,
    }

    impl FakeWindow {
        fn new(width: u32, height: u32) -> Self {
            Self {
                size: vk::Extent2D { width, height },
                resize_pending: false,
            }
        }
    }

    impl PresentTarget for FakeWindow {
        fn framebuffer_size(&self) -> vk::Extent2D {
            self.size
        }

        fn resize_pending(&self) -> bool {
            self.resize_pending
        }

        fn set_resize_pending(&mut self, pending: bool) {
            self.resize_pending = pending;
        }
    }

    fn presentation_code(err: &anyhow::Error) -> Option<vk::Result> {
        match err.downcast_ref::<RendererError>() {
            Some(RendererError::Presentation(code)) => Some(*code),
            _ => None,
        }
    }

    /// Signed difference folded into (-180, 180]
    fn angle_delta(a: f32, b: f32) -> f32 {
        (a - b + 540.0).rem_euclid(360.0) - 180.0
    }

    #[test]
    fn clean_tick_follows_frame_protocol() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(800, 600);

        let outcome = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();

        assert_eq!(outcome, TickOutcome::Presented);
        assert_eq!(
            gpu.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Uniforms(0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(scheduler.slots[0], SlotState::Submitted);
        assert_eq!(scheduler.slots[1], SlotState::Idle);
        assert_eq!(scheduler.current, 1);
        assert_eq!(scheduler.frames_presented(), 1);
    }

    #[test]
    fn out_of_date_acquire_skips_recording_and_submission() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(1024, 768);
        gpu.acquire_script.push_back(PresentStatus::OutOfDate);

        let outcome = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();

        assert_eq!(outcome, TickOutcome::Skipped);
        assert_eq!(
            gpu.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Recreate(1024, 768)]
        );
        assert!(!gpu.recorded());
        assert_eq!(gpu.fences[0], Fence::Signaled);
        assert_eq!(scheduler.slots[0], SlotState::Idle);
        assert_eq!(scheduler.current, 0);
        assert_eq!(scheduler.frames_presented(), 0);

        // The retry reuses the same slot without blocking on its fence
        gpu.calls.clear();
        let outcome = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();
        assert_eq!(outcome, TickOutcome::Presented);
        assert_eq!(gpu.calls[0], Call::Wait(0));
        assert_eq!(gpu.calls[3], Call::Record(0, 0));
    }

    #[test]
    fn suboptimal_acquire_draws_then_recreates() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(640, 480);
        gpu.acquire_script.push_back(PresentStatus::Suboptimal(2));

        let outcome = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();

        assert_eq!(outcome, TickOutcome::Presented);
        assert_eq!(gpu.calls[3], Call::Record(0, 2));
        assert_eq!(gpu.calls[6], Call::Present(0, 2));
        assert_eq!(gpu.calls[7], Call::Recreate(640, 480));
        assert_eq!(scheduler.current, 1);
    }

    #[test]
    fn stale_present_triggers_recreation() {
        for status in [PresentStatus::Suboptimal(()), PresentStatus::OutOfDate] {
            let mut scheduler = FrameScheduler::new();
            let mut gpu = FakeGpu::new();
            let mut window = FakeWindow::new(800, 600);
            gpu.present_script.push_back(status);

            let outcome = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();

            assert_eq!(outcome, TickOutcome::Presented);
            assert_eq!(gpu.calls.last(), Some(&Call::Recreate(800, 600)));
            assert_eq!(scheduler.current, 1);
        }
    }

    #[test]
    fn pending_resize_recreates_once_and_clears() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(1280, 720);
        window.resize_pending = true;
        gpu.present_script.push_back(PresentStatus::Suboptimal(()));

        scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();

        assert_eq!(gpu.recreations(), 1);
        assert!(!window.resize_pending);
        assert_eq!(gpu.extent, vk::Extent2D { width: 1280, height: 720 });

        scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();
        assert_eq!(gpu.recreations(), 1);
    }

    #[test]
    fn minimized_window_defers_recreation() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(0, 0);
        gpu.acquire_script.push_back(PresentStatus::OutOfDate);

        let outcome = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();

        assert_eq!(outcome, TickOutcome::Skipped);
        assert_eq!(gpu.recreations(), 0);
        assert!(window.resize_pending);

        window.size = vk::Extent2D { width: 300, height: 200 };
        scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();
        assert_eq!(gpu.calls.last(), Some(&Call::Recreate(300, 200)));
        assert!(!window.resize_pending);
    }

    #[test]
    fn acquire_failure_is_fatal_before_any_work() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(800, 600);
        gpu.acquire_script.push_back(PresentStatus::Failed(vk::Result::ERROR_DEVICE_LOST));

        let err = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap_err();

        assert_eq!(presentation_code(&err), Some(vk::Result::ERROR_DEVICE_LOST));
        assert!(!gpu.recorded());
        assert_eq!(gpu.fences[0], Fence::Signaled);
        assert_eq!(gpu.recreations(), 0);
    }

    #[test]
    fn present_failure_is_fatal() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(800, 600);
        gpu.present_script.push_back(PresentStatus::Failed(vk::Result::ERROR_SURFACE_LOST_KHR));

        let err = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap_err();

        assert_eq!(presentation_code(&err), Some(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert_eq!(gpu.recreations(), 0);
    }

    #[test]
    fn submit_failure_propagates() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(800, 600);
        gpu.fail_submit = true;

        let err = scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap_err();

        assert!(err.to_string().contains("queue submission failed"));
        assert!(!gpu.calls.iter().any(|c| matches!(c, Call::Present(..))));
    }

    #[test]
    fn slots_alternate_and_fences_cycle_once_per_own_tick() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(800, 600);

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();
        }
        assert_eq!(gpu.resets, [1, 1]);
        assert_eq!(gpu.completions, [0, 0]);
        assert_eq!(gpu.fences, [Fence::Pending, Fence::Pending]);

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            scheduler.tick(&mut gpu, &mut window, Duration::ZERO).unwrap();
        }
        assert_eq!(gpu.resets, [2, 2]);
        assert_eq!(gpu.completions, [1, 1]);

        let recorded_slots: Vec<usize> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Record(slot, _) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(recorded_slots, vec![0, 1, 0, 1]);
    }

    #[test]
    fn quad_runs_120_ticks_with_steady_rotation() {
        let mut scheduler = FrameScheduler::new();
        let mut gpu = FakeGpu::new();
        let mut window = FakeWindow::new(800, 600);

        for tick in 0..120u64 {
            let elapsed = Duration::from_micros(tick * 1_000_000 / 60);
            let outcome = scheduler.tick(&mut gpu, &mut window, elapsed).unwrap();
            assert_eq!(outcome, TickOutcome::Presented);

            let model = gpu.uniforms.last().unwrap().model;
            let angle = model.x_axis.y.atan2(model.x_axis.x).to_degrees();
            let expected = (elapsed.as_secs_f64() * 90.0 % 360.0) as f32;
            assert!(
                angle_delta(angle, expected).abs() < 1e-2,
                "tick {tick}: angle {angle} expected {expected}"
            );
            assert!((rotation_degrees(elapsed) - expected).abs() < 1e-3);
        }

        assert_eq!(scheduler.frames_presented(), 120);
        assert_eq!(gpu.resets, [60, 60]);
        assert_eq!(gpu.completions, [59, 59]);
        assert_eq!(gpu.recreations(), 0);
    }
}
