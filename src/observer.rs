//! Per-pass observation hooks for step-observed sorting.

use std::future::Future;
use std::time::Duration;

use crate::render::SnapshotRenderer;
use crate::schedule::PassDescriptor;

/// The first `original_len` elements of the current buffer after a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub pass: PassDescriptor,
    /// 0-based position of `pass` in the schedule.
    pub pass_index: usize,
    pub total_passes: usize,
    pub values: Vec<f32>,
}

impl Snapshot {
    pub fn is_last(&self) -> bool {
        self.pass_index + 1 == self.total_passes
    }
}

/// Receives a snapshot after every pass. The engine awaits the returned
/// future before dispatching the next pass.
pub trait StepObserver {
    fn on_step(&mut self, snapshot: Snapshot) -> impl Future<Output = ()>;
}

impl<F, Fut> StepObserver for F
where
    F: FnMut(Snapshot) -> Fut,
    Fut: Future<Output = ()>,
{
    fn on_step(&mut self, snapshot: Snapshot) -> impl Future<Output = ()> {
        self(snapshot)
    }
}

/// Pause between visualized passes.
pub trait Pacer {
    fn pause(&mut self, pass: PassDescriptor) -> impl Future<Output = ()>;
}

/// No pause at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacer for NoDelay {
    async fn pause(&mut self, _pass: PassDescriptor) {}
}

/// Fixed pause after every pass.
///
/// Sleeps the calling thread, which is the executor thread under
/// `pollster::block_on`.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    /// 200 ms between passes.
    pub const DEFAULT: FixedDelay = FixedDelay(Duration::from_millis(200));

    pub fn from_millis(ms: u64) -> Self {
        FixedDelay(Duration::from_millis(ms))
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Pacer for FixedDelay {
    async fn pause(&mut self, _pass: PassDescriptor) {
        if !self.0.is_zero() {
            std::thread::sleep(self.0);
        }
    }
}

/// Draws every snapshot, then waits on its pacer.
#[derive(Debug)]
pub struct RenderingObserver<R, P> {
    renderer: R,
    pacer: P,
    frames: usize,
}

impl<R: SnapshotRenderer, P: Pacer> RenderingObserver<R, P> {
    pub fn new(renderer: R, pacer: P) -> Self {
        Self {
            renderer,
            pacer,
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }
}

impl<R: SnapshotRenderer, P: Pacer> StepObserver for RenderingObserver<R, P> {
    async fn on_step(&mut self, snapshot: Snapshot) {
        self.renderer.render(&snapshot.values);
        self.frames += 1;
        self.pacer.pause(snapshot.pass).await;
    }
}
