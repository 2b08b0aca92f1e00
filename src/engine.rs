//! Sort engine: padding, scheduling and the pass loop.
//!
//! Both execution modes share [`SortEngine::run`]. Batch mode passes no
//! observer and never reads back between passes. Step-observed mode reads
//! back the first `original_len` elements after every pass and awaits the
//! observer before the next dispatch.
//!
//! Per-job phases are `Planned -> Uploaded -> Running(i) -> Completed`.
//! Buffers are dropped when the job completes or fails.

use std::fmt;
use std::sync::Arc;

use log::{debug, trace};

use crate::buffers::BufferPair;
use crate::device::ComputeDevice;
use crate::error::{FailureContext, SortError, SortResult};
use crate::executor;
use crate::observer::{Snapshot, StepObserver};
use crate::padding::{self, FillPolicy, SortJob};
use crate::schedule::PassSchedule;

/// Engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineConfig {
    pub fill: FillPolicy,
}

impl EngineConfig {
    pub fn with_fill(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }
}

/// Lifecycle of one sort job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Planned,
    Uploaded,
    Running(usize),
    Completed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Planned => write!(f, "planned"),
            JobPhase::Uploaded => write!(f, "uploaded"),
            JobPhase::Running(pass) => write!(f, "running pass {pass}"),
            JobPhase::Completed => write!(f, "completed"),
        }
    }
}

/// Observer for batch mode. Never called.
struct Unobserved;

impl StepObserver for Unobserved {
    async fn on_step(&mut self, _snapshot: Snapshot) {}
}

/// Bitonic sort engine bound to one compute device.
///
/// The device handle may be shared between engines; each job allocates its
/// own buffer pair.
pub struct SortEngine<D: ComputeDevice> {
    device: Arc<D>,
    config: EngineConfig,
}

impl<D: ComputeDevice> fmt::Debug for SortEngine<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortEngine")
            .field("device", &self.device.info().name)
            .field("config", &self.config)
            .finish()
    }
}

impl<D: ComputeDevice> Clone for SortEngine<D> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            config: self.config,
        }
    }
}

impl<D: ComputeDevice> SortEngine<D> {
    pub fn new(device: Arc<D>, config: EngineConfig) -> Self {
        Self { device, config }
    }

    /// Engine with the default configuration taking ownership of `device`.
    pub fn with_device(device: D) -> Self {
        Self::new(Arc::new(device), EngineConfig::default())
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sort `values`, running every pass back to back.
    pub async fn sort_batch(&self, values: &[f32]) -> SortResult<Vec<f32>> {
        self.run::<Unobserved>(values, None).await
    }

    /// Sort `values`, handing a snapshot to `observer` after every pass.
    pub async fn sort_with_observer<O: StepObserver>(
        &self,
        values: &[f32],
        observer: &mut O,
    ) -> SortResult<Vec<f32>> {
        self.run(values, Some(observer)).await
    }

    /// [`sort_batch`](Self::sort_batch) on the calling thread.
    pub fn sort_batch_blocking(&self, values: &[f32]) -> SortResult<Vec<f32>> {
        pollster::block_on(self.sort_batch(values))
    }

    /// [`sort_with_observer`](Self::sort_with_observer) on the calling thread.
    pub fn sort_with_observer_blocking<O: StepObserver>(
        &self,
        values: &[f32],
        observer: &mut O,
    ) -> SortResult<Vec<f32>> {
        pollster::block_on(self.sort_with_observer(values, observer))
    }

    /// Plan a job without touching the device.
    pub fn plan(&self, values: &[f32]) -> SortResult<SortJob> {
        padding::plan(values, self.config.fill)
    }

    async fn run<O: StepObserver>(
        &self,
        values: &[f32],
        mut observer: Option<&mut O>,
    ) -> SortResult<Vec<f32>> {
        let job = self.plan(values)?;
        let mut phase = JobPhase::Planned;
        debug!(
            "job {phase}: {} elements padded to {} ({} passes, fill {:?})",
            job.original_len,
            job.padded_len(),
            job.total_passes(),
            job.fill_value
        );

        if job.total_passes() == 0 {
            return Ok(values.to_vec());
        }

        let device = self.device.as_ref();
        let mut pair = BufferPair::allocate(device, job.padded_len())
            .map_err(SortError::kernel(FailureContext::Allocate))?;
        pair.upload(device, &job.padded)
            .map_err(SortError::kernel(FailureContext::Upload))?;
        phase = JobPhase::Uploaded;
        debug!("job {phase} to {}", device.info().name);

        let schedule = PassSchedule::new(job.stage_count());
        let total_passes = schedule.total_passes();
        for (pass_index, pass) in schedule.enumerate() {
            phase = JobPhase::Running(pass_index);
            trace!("job {phase} of {total_passes}: {pass}");

            executor::execute(device, &mut pair, pass).await?;

            if let Some(observer) = observer.as_deref_mut() {
                let values = pair
                    .read_current(device, job.original_len)
                    .await
                    .map_err(SortError::kernel(FailureContext::Snapshot(pass)))?;
                observer
                    .on_step(Snapshot {
                        pass,
                        pass_index,
                        total_passes,
                        values,
                    })
                    .await;
            }
        }

        let sorted = pair
            .read_current(device, job.original_len)
            .await
            .map_err(SortError::kernel(FailureContext::FinalReadback))?;
        phase = JobPhase::Completed;
        debug!("job {phase} after {} passes", pair.swaps());
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_sort;
    use crate::error::DeviceError;
    use crate::host_device::{Fault, HostDevice, HostStats};
    use crate::schedule::PassDescriptor;
    use rand::Rng;

    fn engine() -> SortEngine<HostDevice> {
        SortEngine::with_device(HostDevice::new())
    }

    fn expected(values: &[f32]) -> Vec<f32> {
        let mut sorted = values.to_vec();
        cpu_sort::sort_unstable(&mut sorted);
        sorted
    }

    #[test]
    fn test_sort_four_elements() {
        let engine = engine();
        let out = engine.sort_batch_blocking(&[5.0, 3.0, 8.0, 1.0]).unwrap();
        assert_eq!(out, vec![1.0, 3.0, 5.0, 8.0]);
        assert_eq!(engine.device().stats().dispatches, 3);
    }

    #[test]
    fn test_sort_three_elements_with_padding() {
        let out = engine().sort_batch_blocking(&[9.0, 2.0, 7.0]).unwrap();
        assert_eq!(out, vec![2.0, 7.0, 9.0]);
    }

    #[test]
    fn test_single_element_skips_device() {
        let engine = engine();
        let out = engine.sort_batch_blocking(&[42.0]).unwrap();
        assert_eq!(out, vec![42.0]);
        assert_eq!(engine.device().stats(), HostStats::default());
    }

    #[test]
    fn test_single_element_observer_not_called() {
        let engine = engine();
        let mut calls = 0;
        let out = engine
            .sort_with_observer_blocking(&[0.25], &mut |_: Snapshot| {
                calls += 1;
                async {}
            })
            .unwrap();
        assert_eq!(out, vec![0.25]);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_empty_input_rejected_before_allocation() {
        let engine = engine();
        let result = engine.sort_batch_blocking(&[]);
        assert!(matches!(result, Err(SortError::InvalidInput(_))));
        assert_eq!(engine.device().stats().allocations, 0);
    }

    #[test]
    fn test_fixed_fill_below_max_rejected() {
        let engine = SortEngine::new(
            Arc::new(HostDevice::new()),
            EngineConfig::default().with_fill(FillPolicy::Fixed(1.0)),
        );
        assert!(matches!(
            engine.sort_batch_blocking(&[9.0, 2.0, 7.0]),
            Err(SortError::InvalidInput(_))
        ));
        assert_eq!(engine.device().stats().allocations, 0);

        let out = engine.sort_batch_blocking(&[0.9, 0.2, 0.7]).unwrap();
        assert_eq!(out, vec![0.2, 0.7, 0.9]);
    }

    #[test]
    fn test_fixed_fill_unused_without_padding() {
        let engine = SortEngine::new(
            Arc::new(HostDevice::new()),
            EngineConfig::default().with_fill(FillPolicy::Fixed(1.0)),
        );
        assert_eq!(engine.sort_batch_blocking(&[5.0]).unwrap(), vec![5.0]);
        assert_eq!(
            engine.sort_batch_blocking(&[5.0, 3.0, 8.0, 1.0]).unwrap(),
            vec![1.0, 3.0, 5.0, 8.0]
        );
    }

    #[test]
    fn test_nan_input_keeps_its_values() {
        let engine = engine();
        let out = engine
            .sort_batch_blocking(&[f32::NAN, f32::NAN, f32::NAN])
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v.is_nan()));

        let out = engine
            .sort_batch_blocking(&[0.5, f32::NAN, -1.0, 3.0, f32::NAN])
            .unwrap();
        assert_eq!(&out[..3], &[-1.0, 0.5, 3.0]);
        assert!(out[3..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_sorted_permutation_for_many_lengths() {
        let engine = engine();
        let mut rng = rand::thread_rng();
        for len in 1..=130usize {
            let values: Vec<f32> = (0..len).map(|_| rng.gen_range(-1000.0..1000.0)).collect();
            let out = engine.sort_batch_blocking(&values).unwrap();
            assert_eq!(out, expected(&values), "len={len}");
        }
    }

    #[test]
    fn test_already_sorted_is_identity() {
        let values: Vec<f32> = (0..100).map(|i| i as f32 * 0.5).collect();
        assert_eq!(engine().sort_batch_blocking(&values).unwrap(), values);
    }

    #[test]
    fn test_reverse_and_duplicates() {
        let engine = engine();
        let reverse: Vec<f32> = (0..257).rev().map(|i| i as f32).collect();
        assert_eq!(engine.sort_batch_blocking(&reverse).unwrap(), expected(&reverse));

        let same = vec![0.5f32; 33];
        assert_eq!(engine.sort_batch_blocking(&same).unwrap(), same);
    }

    #[test]
    fn test_batch_buffer_traffic() {
        let engine = engine();
        engine.sort_batch_blocking(&[0.3; 100]).unwrap();
        // 100 -> 128 = 2^7, 28 passes
        assert_eq!(
            engine.device().stats(),
            HostStats {
                allocations: 2,
                uploads: 1,
                dispatches: 28,
                readbacks: 1
            }
        );
    }

    #[test]
    fn test_observer_sees_every_pass_in_order() {
        let engine = engine();
        let mut rng = rand::thread_rng();
        let values: Vec<f32> = (0..37).map(|_| rng.gen()).collect();

        let mut snapshots = Vec::new();
        let out = engine
            .sort_with_observer_blocking(&values, &mut |s: Snapshot| {
                snapshots.push(s);
                async {}
            })
            .unwrap();

        // 37 -> 64 = 2^6, 21 passes
        assert_eq!(snapshots.len(), 21);
        let passes: Vec<PassDescriptor> = snapshots.iter().map(|s| s.pass).collect();
        let schedule: Vec<PassDescriptor> = PassSchedule::new(6).collect();
        assert_eq!(passes, schedule);
        for (i, snapshot) in snapshots.iter().enumerate() {
            assert_eq!(snapshot.pass_index, i);
            assert_eq!(snapshot.total_passes, 21);
            assert_eq!(snapshot.values.len(), 37);
        }
        assert!(snapshots.last().unwrap().is_last());
        assert_eq!(snapshots.last().unwrap().values, out);
        assert_eq!(out, engine.sort_batch_blocking(&values).unwrap());
        assert_eq!(out, expected(&values));
    }

    #[test]
    fn test_observer_trace_four_elements() {
        let mut trace = Vec::new();
        engine()
            .sort_with_observer_blocking(&[5.0, 3.0, 8.0, 1.0], &mut |s: Snapshot| {
                trace.push((s.pass.stage, s.pass.step, s.values));
                async {}
            })
            .unwrap();
        assert_eq!(
            trace,
            vec![
                (0, 0, vec![3.0, 5.0, 8.0, 1.0]),
                (1, 0, vec![3.0, 1.0, 8.0, 5.0]),
                (1, 1, vec![1.0, 3.0, 5.0, 8.0]),
            ]
        );
    }

    #[test]
    fn test_observed_buffer_traffic() {
        let engine = engine();
        engine
            .sort_with_observer_blocking(&[3.0, 1.0, 2.0], &mut |_: Snapshot| async {})
            .unwrap();
        let stats = engine.device().stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.dispatches, 3);
        assert_eq!(stats.readbacks, 4);
    }

    #[test]
    fn test_dispatch_failure_is_fatal() {
        let engine = engine();
        let failing = PassDescriptor::new(2, 1);
        engine.device().inject_fault(Fault::Dispatch(failing));

        let mut seen = Vec::new();
        let err = engine
            .sort_with_observer_blocking(&[0.5; 8], &mut |s: Snapshot| {
                seen.push(s.pass);
                async {}
            })
            .unwrap_err();

        assert_eq!(err.failed_pass(), Some(failing));
        assert!(matches!(
            err,
            SortError::KernelExecution {
                source: DeviceError::Dispatch(_),
                ..
            }
        ));
        // (0,0) (1,0) (1,1) (2,0) ran; (2,1) failed
        assert_eq!(seen.len(), 4);
        assert!(!seen.contains(&failing));
        assert_eq!(engine.device().stats().readbacks, 4);
    }

    #[test]
    fn test_snapshot_readback_failure() {
        let engine = engine();
        engine.device().inject_fault(Fault::Readback(1));
        let err = engine
            .sort_with_observer_blocking(&[4.0, 3.0, 2.0, 1.0], &mut |_: Snapshot| async {})
            .unwrap_err();
        assert_eq!(err.failed_pass(), Some(PassDescriptor::new(1, 0)));
    }

    #[test]
    fn test_final_readback_failure() {
        let engine = engine();
        engine.device().inject_fault(Fault::Readback(0));
        let err = engine.sort_batch_blocking(&[4.0, 3.0, 2.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            SortError::KernelExecution {
                context: FailureContext::FinalReadback,
                ..
            }
        ));
    }

    #[test]
    fn test_engine_reusable_after_failure() {
        let engine = engine();
        engine
            .device()
            .inject_fault(Fault::Dispatch(PassDescriptor::new(0, 0)));
        assert!(engine.sort_batch_blocking(&[2.0, 1.0]).is_err());
        assert_eq!(engine.sort_batch_blocking(&[2.0, 1.0]).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_shared_device_sequential_jobs() {
        let device = Arc::new(HostDevice::new());
        let a = SortEngine::new(Arc::clone(&device), EngineConfig::default());
        let b = a.clone();
        assert_eq!(a.sort_batch_blocking(&[3.0, 1.0, 2.0]).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(b.sort_batch_blocking(&[6.0, 5.0, 4.0]).unwrap(), vec![4.0, 5.0, 6.0]);
        assert_eq!(device.stats().allocations, 4);
    }
}
