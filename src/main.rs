//! Bitonic Sort CLI
//!
//! Sorts random `f32` data with the bitonic network on the selected backend:
//! - **animate**: draws a bar chart after every pass, pausing between passes
//! - **measure**: times a batch sort against the CPU baseline (pdqsort), then
//!   draws the sorted result
//! - **probe**: lists the devices each backend can acquire

mod cli;

use std::error::Error;
use std::time::Instant;

use clap::Parser;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gpu_bitonic_sort::cpu_sort;
use gpu_bitonic_sort::render::{BarChart, SnapshotRenderer, TerminalChart};
use gpu_bitonic_sort::{
    ComputeDevice, EngineConfig, FixedDelay, HostDevice, MetalDevice, RenderingObserver,
    SortEngine,
};

use cli::{AnimateArgs, Backend, ChartArgs, Cli, Command, InputArgs, MeasureArgs};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Probe => {
            probe();
            Ok(())
        }
        Command::Animate(args) => run_on_backend(cli.backend, &Task::Animate(args)),
        Command::Measure(args) => run_on_backend(cli.backend, &Task::Measure(args)),
    }
}

/// A sorting command, runnable on any device.
enum Task {
    Animate(AnimateArgs),
    Measure(MeasureArgs),
}

impl Task {
    fn run<D: ComputeDevice>(&self, device: D) -> Result<(), Box<dyn Error>> {
        let info = device.info().clone();
        println!("Using {} device: {}", info.backend, info.name);

        match self {
            Task::Animate(args) => {
                let engine = engine(device, &args.input);
                animate(&engine, args)
            }
            Task::Measure(args) => {
                let engine = engine(device, &args.input);
                measure(&engine, args)
            }
        }
    }
}

fn engine<D: ComputeDevice>(device: D, input: &InputArgs) -> SortEngine<D> {
    SortEngine::new(
        std::sync::Arc::new(device),
        EngineConfig::default().with_fill(input.fill),
    )
}

fn run_on_backend(backend: Backend, task: &Task) -> Result<(), Box<dyn Error>> {
    match backend {
        Backend::Host => task.run(HostDevice::new()),
        Backend::Metal => task.run(MetalDevice::new()?),
        Backend::Webgpu => run_on_webgpu(task),
        Backend::Auto => {
            #[cfg(feature = "webgpu")]
            {
                match gpu_bitonic_sort::WgpuDevice::new() {
                    Ok(device) => return task.run(device),
                    Err(e) => debug!("webgpu backend unavailable: {e}"),
                }
            }
            match MetalDevice::new() {
                Ok(device) => return task.run(device),
                Err(e) => debug!("metal backend unavailable: {e}"),
            }
            warn!("no GPU backend available, falling back to host lanes");
            task.run(HostDevice::new())
        }
    }
}

#[cfg(feature = "webgpu")]
fn run_on_webgpu(task: &Task) -> Result<(), Box<dyn Error>> {
    task.run(gpu_bitonic_sort::WgpuDevice::new()?)
}

#[cfg(not(feature = "webgpu"))]
fn run_on_webgpu(_task: &Task) -> Result<(), Box<dyn Error>> {
    Err("built without the `webgpu` feature".into())
}

/// `len` values uniform in [0, 1).
fn random_values(len: usize, seed: Option<u64>) -> Vec<f32> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    (0..len).map(|_| rng.gen::<f32>()).collect()
}

fn animate<D: ComputeDevice>(
    engine: &SortEngine<D>,
    args: &AnimateArgs,
) -> Result<(), Box<dyn Error>> {
    let data = random_values(args.length, args.input.seed);
    let job = engine.plan(&data)?;

    let mut chart = TerminalChart::new(args.chart.width, args.chart.height);
    chart.set_caption(format!(
        "{} values, {} passes, unsorted",
        job.original_len,
        job.total_passes()
    ));
    chart.render(&data);
    chart.set_caption(format!(
        "{} values, {} passes",
        job.original_len,
        job.total_passes()
    ));

    let mut observer = RenderingObserver::new(chart, FixedDelay::from_millis(args.delay_ms));
    let sorted = engine.sort_with_observer_blocking(&data, &mut observer)?;

    println!("\nRendered {} frames", observer.frames());
    verify(&data, &sorted)?;
    println!("Sort verified: OK");
    Ok(())
}

fn measure<D: ComputeDevice>(
    engine: &SortEngine<D>,
    args: &MeasureArgs,
) -> Result<(), Box<dyn Error>> {
    println!(
        "Array size: {} elements ({} MB)",
        args.length,
        args.length * 4 / 1_000_000
    );
    let data = random_values(args.length, args.input.seed);
    let job = engine.plan(&data)?;
    if job.padding() > 0 {
        println!(
            "Note: Bitonic sort will use {} elements (padded to power of 2)",
            job.padded_len()
        );
    }

    let bitonic_start = Instant::now();
    let sorted = engine.sort_batch_blocking(&data)?;
    let bitonic_duration = bitonic_start.elapsed();

    let mut cpu_data = data.clone();
    let cpu_start = Instant::now();
    cpu_sort::sort_unstable(&mut cpu_data);
    let cpu_duration = cpu_start.elapsed();

    println!(
        "Bitonic sort: {:.3} ms, CPU sort: {:.3} ms",
        bitonic_duration.as_secs_f64() * 1000.0,
        cpu_duration.as_secs_f64() * 1000.0
    );

    if sorted != cpu_data {
        return Err("bitonic sort result differs from CPU sort".into());
    }
    println!("Bitonic sort verified: OK\n");
    print!("{}", result_chart(&sorted, args.chart));
    Ok(())
}

/// Frame of the sorted result, drawn without clearing the report above it.
fn result_chart(values: &[f32], size: ChartArgs) -> String {
    let mut chart = BarChart::new(size.width, size.height);
    chart.render(values);
    chart.frame()
}

fn verify(input: &[f32], sorted: &[f32]) -> Result<(), Box<dyn Error>> {
    let mut expected = input.to_vec();
    cpu_sort::sort_unstable(&mut expected);
    if expected == sorted {
        Ok(())
    } else {
        Err("bitonic sort result differs from CPU sort".into())
    }
}

fn probe() {
    println!("Compute devices");
    println!("===============\n");

    #[cfg(feature = "webgpu")]
    {
        let adapters = gpu_bitonic_sort::wgpu_device::probe_devices();
        if adapters.is_empty() {
            println!("webgpu: no adapters");
        }
        for info in adapters {
            println!(
                "webgpu: {} (gpu: {}, max buffer: {} elements)",
                info.name, info.is_gpu, info.max_buffer_len
            );
        }
    }
    #[cfg(not(feature = "webgpu"))]
    println!("webgpu: not compiled in");

    match MetalDevice::new() {
        Ok(device) => println!("metal: {}", device.info().name),
        Err(e) => println!("metal: {e}"),
    }

    let host = HostDevice::new();
    println!(
        "host: {} (max buffer: {} elements)",
        host.info().name,
        host.info().max_buffer_len
    );
}
