use clap::{Args, Parser, Subcommand, ValueEnum};

use gpu_bitonic_sort::FillPolicy;

/// Default element count for `measure`
pub const DEFAULT_MEASURE_LEN: usize = 1 << 20;

/// Default element count for `animate`
pub const DEFAULT_ANIMATE_LEN: usize = 100;

#[derive(Parser)]
#[command(
    name = "bitonic-sort",
    about = "Bitonic sort on compute devices, animated or timed",
    version
)]
pub struct Cli {
    /// Compute backend to sort on
    #[arg(long, value_enum, default_value_t = Backend::Auto, global = true)]
    pub backend: Backend,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Draw the sequence after every pass of the network
    Animate(AnimateArgs),
    /// Time a batch sort against the CPU baseline
    Measure(MeasureArgs),
    /// List the devices each backend can see
    Probe,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Backend {
    /// First of webgpu, metal, host that is available
    Auto,
    Webgpu,
    Metal,
    Host,
}

/// Input shared by every sorting command.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Seed for the random input; fresh entropy when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Padding value: `max` of the input, or a float at least that large
    #[arg(long, default_value = "max", value_parser = parse_fill)]
    pub fill: FillPolicy,
}

#[derive(Args, Debug, Clone)]
pub struct AnimateArgs {
    /// Number of random values in [0, 1)
    #[arg(long, default_value_t = DEFAULT_ANIMATE_LEN)]
    pub length: usize,

    #[command(flatten)]
    pub input: InputArgs,

    /// Pause after every pass
    #[arg(long = "delay-ms", default_value_t = 200)]
    pub delay_ms: u64,

    #[command(flatten)]
    pub chart: ChartArgs,
}

/// Size of the terminal bar chart.
#[derive(Args, Debug, Clone, Copy)]
pub struct ChartArgs {
    /// Chart width in columns
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Chart height in rows
    #[arg(long, default_value_t = 24)]
    pub height: usize,
}

#[derive(Args, Debug, Clone)]
pub struct MeasureArgs {
    /// Number of random values in [0, 1)
    #[arg(long, default_value_t = DEFAULT_MEASURE_LEN)]
    pub length: usize,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub chart: ChartArgs,
}

fn parse_fill(s: &str) -> Result<FillPolicy, String> {
    if s.eq_ignore_ascii_case("max") {
        return Ok(FillPolicy::InputMax);
    }
    s.parse::<f32>()
        .map(FillPolicy::Fixed)
        .map_err(|e| format!("expected `max` or a number, got {s:?}: {e}"))
}
