//! The per-frame protocol: wait, acquire, update, record, submit, present, advance.
//!
//! [`FrameLoop`] owns only the frame counter and the stale-swapchain flag.
//! Every GPU-facing step goes through [`FrameBackend`], which the Vulkan
//! renderer implements and tests replace with a recording mock.

use crate::uniforms::FrameTransform;
use mc2_gpu::{AcquireOutcome, PresentOutcome, PresentationTarget, Result};

/// Number of frames that may have GPU work outstanding at once.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// The GPU side of one frame, addressed by slot index.
pub trait FrameBackend {
    /// Block until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next presentable image, signaling the slot's image-acquired semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    /// Reset the slot's fence to unsignaled.
    fn reset_slot_fence(&mut self, slot: usize) -> Result<()>;

    /// Write the slot's uniform buffer.
    fn update_uniforms(&mut self, slot: usize, transform: &FrameTransform) -> Result<()>;

    /// Reset and re-record the slot's command buffer for `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Submit the slot's command buffer, signaling its fence on completion.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present `image_index` once the slot's rendering has finished.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Rebuild the swapchain and everything sized to it.
    ///
    /// Returns `false` if the target closed before it had a drawable area.
    fn recreate_swapchain(&mut self, target: &mut dyn PresentationTarget) -> Result<bool>;
}

/// What happened to one [`FrameLoop::draw`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and presented.
    Presented,
    /// The swapchain was stale; it was recreated and nothing was drawn.
    Skipped,
    /// The target closed while the swapchain was being recreated.
    TargetClosed,
}

/// Round-robin frame-slot state machine.
#[derive(Debug, Default)]
pub struct FrameLoop {
    frame_number: u64,
    swapchain_stale: bool,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames presented so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot the next frame uses.
    pub fn slot(&self) -> usize {
        (self.frame_number % FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Recreate the swapchain before the next acquire, e.g. after a resize.
    pub fn mark_stale(&mut self) {
        self.swapchain_stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.swapchain_stale
    }

    /// Run one frame through `backend`.
    ///
    /// A stale acquire skips the rest of the frame and recreates the
    /// swapchain; the frame counter only advances once a frame is submitted.
    pub fn draw<B, P>(
        &mut self,
        backend: &mut B,
        target: &mut P,
        transform: &FrameTransform,
    ) -> Result<FrameStatus>
    where
        B: FrameBackend + ?Sized,
        P: PresentationTarget,
    {
        if self.swapchain_stale && !self.recreate(backend, target)? {
            return Ok(FrameStatus::TargetClosed);
        }

        let slot = self.slot();
        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Ready(index) => index,
            AcquireOutcome::Stale => {
                tracing::warn!(
                    "Swapchain stale on acquire, skipping frame {}",
                    self.frame_number
                );
                return if self.recreate(backend, target)? {
                    Ok(FrameStatus::Skipped)
                } else {
                    Ok(FrameStatus::TargetClosed)
                };
            }
        };

        // Only reset once the frame is certain to be submitted.
        backend.reset_slot_fence(slot)?;
        backend.update_uniforms(slot, transform)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        let presented = backend.present(slot, image_index)?;

        self.frame_number += 1;

        if presented == PresentOutcome::Stale {
            tracing::warn!("Swapchain stale on present");
            self.swapchain_stale = true;
        }

        Ok(FrameStatus::Presented)
    }

    fn recreate<B, P>(&mut self, backend: &mut B, target: &mut P) -> Result<bool>
    where
        B: FrameBackend + ?Sized,
        P: PresentationTarget,
    {
        let recreated = backend.recreate_swapchain(target)?;
        self.swapchain_stale = !recreated;
        Ok(recreated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Wait(usize),
        Acquire(usize),
        ResetFence(usize),
        Update(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Resources a slot owns, by id. Ids are unique across slots.
    #[derive(Debug, Clone, Copy)]
    struct SlotResources {
        command_buffer: u32,
        uniform_buffer: u32,
        fence: u32,
        image_acquired: u32,
        render_finished: u32,
    }

    impl SlotResources {
        fn for_slot(slot: usize) -> Self {
            let base = slot as u32 * 100;
            Self {
                command_buffer: base + 1,
                uniform_buffer: base + 2,
                fence: base + 3,
                image_acquired: base + 4,
                render_finished: base + 5,
            }
        }

        fn ids(&self) -> [u32; 5] {
            [
                self.command_buffer,
                self.uniform_buffer,
                self.fence,
                self.image_acquired,
                self.render_finished,
            ]
        }
    }

    /// Fence that needs a number of polls after submission before it signals.
    #[derive(Debug, Default, Clone, Copy)]
    struct SlowFence {
        pending_polls: u32,
        signaled: bool,
    }

    struct MockBackend {
        steps: Vec<Step>,
        /// Slot whose fence was last waited on; every later step of the
        /// frame must use it.
        open_slot: Option<usize>,
        /// (slot being processed, resource id touched)
        touches: Vec<(usize, u32)>,
        resources: [SlotResources; FRAMES_IN_FLIGHT],
        fences: [SlowFence; FRAMES_IN_FLIGHT],
        gpu_latency_polls: u32,
        polls: Vec<u32>,
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
        image_count: u32,
        next_image: u32,
        live_views: usize,
        views_created: usize,
        views_destroyed: usize,
        extent: (u32, u32),
        extents: Vec<(u32, u32)>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                steps: Vec::new(),
                open_slot: None,
                touches: Vec::new(),
                resources: [SlotResources::for_slot(0), SlotResources::for_slot(1)],
                fences: [SlowFence {
                    pending_polls: 0,
                    signaled: true,
                }; FRAMES_IN_FLIGHT],
                gpu_latency_polls: 0,
                polls: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                image_count: 3,
                next_image: 0,
                live_views: 3,
                views_created: 3,
                views_destroyed: 0,
                extent: (800, 600),
                extents: Vec::new(),
            }
        }

        fn touch(&mut self, id: u32) {
            let slot = self.open_slot.expect("resource touched before any wait");
            self.touches.push((slot, id));
        }

        fn expect_open(&self, slot: usize, step: Step) {
            assert_eq!(
                self.open_slot,
                Some(slot),
                "{step:?} used slot {slot} outside the frame that waited on it"
            );
        }

        fn count(&self, step: Step) -> usize {
            self.steps.iter().filter(|&&s| s == step).count()
        }

        fn count_matching(&self, pred: impl Fn(&Step) -> bool) -> usize {
            self.steps.iter().filter(|s| pred(s)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.steps.push(Step::Wait(slot));
            self.open_slot = Some(slot);
            let fence_id = self.resources[slot].fence;
            self.touch(fence_id);

            let mut polls = 0;
            let fence = &mut self.fences[slot];
            while !fence.signaled {
                polls += 1;
                if fence.pending_polls <= 1 {
                    fence.pending_polls = 0;
                    fence.signaled = true;
                } else {
                    fence.pending_polls -= 1;
                }
            }
            self.polls.push(polls);
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.steps.push(Step::Acquire(slot));
            self.expect_open(slot, Step::Acquire(slot));
            let semaphore = self.resources[slot].image_acquired;
            self.touch(semaphore);

            let outcome = self.acquire_script.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Ready(index)
            });
            Ok(outcome)
        }

        fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
            self.steps.push(Step::ResetFence(slot));
            self.expect_open(slot, Step::ResetFence(slot));
            let fence_id = self.resources[slot].fence;
            self.touch(fence_id);

            let fence = &mut self.fences[slot];
            assert!(fence.signaled, "fence of slot {slot} reset while pending");
            fence.signaled = false;
            Ok(())
        }

        fn update_uniforms(&mut self, slot: usize, _transform: &FrameTransform) -> Result<()> {
            self.steps.push(Step::Update(slot));
            self.expect_open(slot, Step::Update(slot));
            let ubo = self.resources[slot].uniform_buffer;
            self.touch(ubo);
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
            self.steps.push(Step::Record(slot, image_index));
            self.expect_open(slot, Step::Record(slot, image_index));
            let cmd = self.resources[slot].command_buffer;
            self.touch(cmd);
            assert_eq!(
                self.fences[slot].pending_polls, 0,
                "slot {slot} re-recorded while its previous submission is in flight"
            );
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            self.steps.push(Step::Submit(slot));
            self.expect_open(slot, Step::Submit(slot));
            let resources = self.resources[slot];
            for id in [
                resources.command_buffer,
                resources.image_acquired,
                resources.render_finished,
                resources.fence,
            ] {
                self.touch(id);
            }
            self.fences[slot] = SlowFence {
                pending_polls: self.gpu_latency_polls,
                signaled: self.gpu_latency_polls == 0,
            };
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
            self.steps.push(Step::Present(slot, image_index));
            self.expect_open(slot, Step::Present(slot, image_index));
            let semaphore = self.resources[slot].render_finished;
            self.touch(semaphore);
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn recreate_swapchain(&mut self, target: &mut dyn PresentationTarget) -> Result<bool> {
            self.steps.push(Step::Recreate);
            self.views_destroyed += self.live_views;
            self.live_views = 0;

            let Some(extent) = mc2_gpu::swapchain::wait_for_drawable_extent(target) else {
                return Ok(false);
            };
            self.extent = (extent.width, extent.height);
            self.extents.push(self.extent);
            self.live_views = self.image_count as usize;
            self.views_created += self.image_count as usize;
            self.next_image = 0;
            Ok(true)
        }
    }

    struct Window {
        size: (u32, u32),
        open: bool,
    }

    impl Window {
        fn visible() -> Self {
            Self {
                size: (800, 600),
                open: true,
            }
        }
    }

    impl PresentationTarget for Window {
        fn drawable_size(&self) -> (u32, u32) {
            self.size
        }

        fn wait_events(&mut self) -> bool {
            // Restored as soon as events are pumped, unless closed.
            if self.open {
                self.size = (800, 600);
            }
            self.open
        }
    }

    fn draw_n(frame_loop: &mut FrameLoop, backend: &mut MockBackend, frames: usize) {
        let mut window = Window::visible();
        for _ in 0..frames {
            frame_loop
                .draw(backend, &mut window, &FrameTransform::default())
                .unwrap();
        }
    }

    #[test]
    fn full_frame_runs_steps_in_order() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        draw_n(&mut frame_loop, &mut backend, 1);

        assert_eq!(
            backend.steps,
            vec![
                Step::Wait(0),
                Step::Acquire(0),
                Step::ResetFence(0),
                Step::Update(0),
                Step::Record(0, 0),
                Step::Submit(0),
                Step::Present(0, 0),
            ]
        );
        assert_eq!(frame_loop.frame_number(), 1);
    }

    #[test]
    fn slots_rotate_round_robin() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        draw_n(&mut frame_loop, &mut backend, 6);

        let waits: Vec<usize> = backend
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::Wait(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(waits, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(frame_loop.frame_number(), 6);
        assert_eq!(frame_loop.slot(), 0);
    }

    #[test]
    fn stale_acquire_short_circuits_the_frame() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        backend.acquire_script.push_back(AcquireOutcome::Stale);

        let mut window = Window::visible();
        let status = frame_loop
            .draw(&mut backend, &mut window, &FrameTransform::default())
            .unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(backend.count(Step::Recreate), 1);
        assert_eq!(backend.count_matching(|s| matches!(s, Step::Record(..))), 0);
        assert_eq!(backend.count_matching(|s| matches!(s, Step::Submit(_))), 0);
        assert_eq!(backend.count_matching(|s| matches!(s, Step::Present(..))), 0);
        assert_eq!(backend.count_matching(|s| matches!(s, Step::ResetFence(_))), 0);
        assert_eq!(frame_loop.frame_number(), 0);
        assert!(!frame_loop.is_stale());

        // The retry reuses the same slot, whose fence is still signaled.
        frame_loop
            .draw(&mut backend, &mut window, &FrameTransform::default())
            .unwrap();
        assert_eq!(backend.count(Step::Submit(0)), 1);
        assert_eq!(backend.count(Step::Recreate), 1);
        assert_eq!(frame_loop.frame_number(), 1);
    }

    #[test]
    fn stale_present_recreates_before_next_frame() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        backend.present_script.push_back(PresentOutcome::Stale);

        draw_n(&mut frame_loop, &mut backend, 1);
        assert_eq!(frame_loop.frame_number(), 1);
        assert!(frame_loop.is_stale());
        assert_eq!(backend.count(Step::Recreate), 0);

        draw_n(&mut frame_loop, &mut backend, 1);
        let recreate_at = backend
            .steps
            .iter()
            .position(|&s| s == Step::Recreate)
            .unwrap();
        assert_eq!(backend.steps[recreate_at + 1], Step::Wait(1));
        assert_eq!(backend.count(Step::Recreate), 1);
        assert_eq!(frame_loop.frame_number(), 2);
    }

    #[test]
    fn resize_notification_recreates_once() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        frame_loop.mark_stale();

        draw_n(&mut frame_loop, &mut backend, 3);
        assert_eq!(backend.steps[0], Step::Recreate);
        assert_eq!(backend.count(Step::Recreate), 1);
    }

    #[test]
    fn slot_resources_never_cross() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        backend.gpu_latency_polls = 2;
        draw_n(&mut frame_loop, &mut backend, 10);

        let owned: Vec<HashSet<u32>> = backend
            .resources
            .iter()
            .map(|r| r.ids().into_iter().collect())
            .collect();
        assert!(owned[0].is_disjoint(&owned[1]));

        // Touches are attributed to the slot that was waited on, not the one
        // passed to the step, so a step aimed at the other slot shows up here.
        assert!(!backend.touches.is_empty());
        for &(slot, id) in &backend.touches {
            assert!(
                owned[slot].contains(&id),
                "frame on slot {slot} touched resource {id} it does not own"
            );
        }
    }

    #[test]
    fn every_step_of_a_frame_uses_one_slot() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        draw_n(&mut frame_loop, &mut backend, 4);

        let frame = |slot: usize, image: u32| {
            [
                Step::Wait(slot),
                Step::Acquire(slot),
                Step::ResetFence(slot),
                Step::Update(slot),
                Step::Record(slot, image),
                Step::Submit(slot),
                Step::Present(slot, image),
            ]
        };
        let expected: Vec<Step> = [frame(0, 0), frame(1, 1), frame(0, 2), frame(1, 0)]
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(backend.steps, expected);
    }

    #[test]
    fn record_waits_for_slow_fence() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        backend.gpu_latency_polls = 3;

        draw_n(&mut frame_loop, &mut backend, 4);

        // First use of each slot finds the fence signaled at creation; reuse
        // has to poll until the previous submission completes.
        assert_eq!(backend.polls, vec![0, 0, 3, 3]);
        for window in backend.steps.windows(2) {
            if let [Step::Wait(a), Step::Acquire(b)] = window {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn recreate_keeps_extent_and_view_count() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        backend.acquire_script.push_back(AcquireOutcome::Stale);
        backend.acquire_script.push_back(AcquireOutcome::Stale);

        let mut window = Window::visible();
        for _ in 0..2 {
            let status = frame_loop
                .draw(&mut backend, &mut window, &FrameTransform::default())
                .unwrap();
            assert_eq!(status, FrameStatus::Skipped);
        }

        assert_eq!(backend.extents, vec![(800, 600), (800, 600)]);
        assert_eq!(backend.live_views, 3);
        assert_eq!(
            backend.views_created - backend.views_destroyed,
            backend.live_views
        );
    }

    #[test]
    fn minimized_window_blocks_recreate_until_restored() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        backend.acquire_script.push_back(AcquireOutcome::Stale);

        let mut window = Window {
            size: (0, 0),
            open: true,
        };
        let status = frame_loop
            .draw(&mut backend, &mut window, &FrameTransform::default())
            .unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(backend.extents, vec![(800, 600)]);
    }

    #[test]
    fn closing_while_minimized_stops_the_loop() {
        let mut frame_loop = FrameLoop::new();
        let mut backend = MockBackend::new();
        frame_loop.mark_stale();

        let mut window = Window {
            size: (0, 0),
            open: false,
        };
        let status = frame_loop
            .draw(&mut backend, &mut window, &FrameTransform::default())
            .unwrap();

        assert_eq!(status, FrameStatus::TargetClosed);
        assert!(frame_loop.is_stale());
        assert_eq!(backend.count_matching(|s| matches!(s, Step::Wait(_))), 0);
        assert_eq!(backend.live_views, 0);
    }
}
