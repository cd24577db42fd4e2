use clap::Parser;
use hpcg_mg::config::DEFAULT_NUM_LEVELS;
use hpcg_mg::multigrid::copy_hierarchy_to_host;
use hpcg_mg::output::{self, LevelSummary};
use hpcg_mg::stats::Stats;
use hpcg_mg::{
    compute_prolongation, CoarseProblemBuilder, Device, GeometryGenerator, HostDevice, MgConfig,
    Ordering, SparseLevel, StructuredGeometry, Vector, WgpuDevice,
};
use std::io;
use std::time::Instant;

/// Multigrid hierarchy setup for a 27-point stencil benchmark problem
#[derive(Parser)]
#[command(name = "hpcg-mg", version)]
struct Cli {
    /// Local grid points along x
    #[arg(long, default_value_t = 16)]
    nx: u32,

    /// Local grid points along y
    #[arg(long, default_value_t = 16)]
    ny: u32,

    /// Local grid points along z
    #[arg(long, default_value_t = 16)]
    nz: u32,

    /// Total number of levels, the fine level included
    #[arg(long, default_value_t = DEFAULT_NUM_LEVELS)]
    levels: usize,

    /// Use the host device instead of the GPU
    #[arg(long)]
    cpu: bool,

    /// Order rows by 8-color parity instead of naturally
    #[arg(long)]
    multicolor: bool,

    /// Allocate the fine residual buffers and mirror every coarse level to host
    #[arg(long)]
    reference: bool,

    /// Print performance stats to stderr
    #[arg(long)]
    stats: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut stats = if cli.stats { Some(Stats::new()) } else { None };

    let result = if cli.cpu {
        run(&HostDevice::new(), &cli, stats.as_mut())
    } else {
        let device = WgpuDevice::new().unwrap_or_else(|e| {
            eprintln!("GPU device error: {}", e);
            std::process::exit(1);
        });
        run(&device, &cli, stats.as_mut())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Some(ref stats) = stats {
        stats.display();
    }
}

fn run<D: Device>(device: &D, cli: &Cli, mut stats: Option<&mut Stats>) -> hpcg_mg::Result<()> {
    let ordering = if cli.multicolor {
        Ordering::Multicolor
    } else {
        Ordering::Natural
    };
    let config = MgConfig::default()
        .with_levels(cli.levels)
        .with_ordering(ordering)
        .with_reference_check(cli.reference || cfg!(feature = "reference"));
    let builder = CoarseProblemBuilder::new(device, config);

    let start = Instant::now();
    let threads = rayon::current_num_threads();
    let geom =
        StructuredGeometry.build(1, 0, threads, 0, 0, 0, cli.nx, cli.ny, cli.nz, 1, 1, 1)?;
    let mut fine = builder.generate_fine_level(geom)?;
    if let Some(s) = stats.as_deref_mut() {
        s.add_phase("Fine level", start.elapsed());
    }

    let start = Instant::now();
    builder.build_hierarchy(&mut fine)?;
    if let Some(s) = stats.as_deref_mut() {
        s.add_phase("Hierarchy", start.elapsed());
    }

    if builder.config().reference_check {
        let start = Instant::now();
        let mirrored = copy_hierarchy_to_host(device, &mut fine)?;
        if let Some(s) = stats.as_deref_mut() {
            s.add_phase("Host mirror", start.elapsed());
            s.host_mirrors = mirrored;
        }
    }

    let start = Instant::now();
    let mut summaries = Vec::with_capacity(fine.depth());
    let mut current = Some(&mut fine);
    while let Some(level) = current {
        let prolongated = unit_prolongation(device, level)?;
        if prolongated > 0 {
            if let Some(s) = stats.as_deref_mut() {
                s.prolongations += 1;
            }
        }
        summaries.push(LevelSummary::new(summaries.len(), &*level, prolongated));
        current = level.coarse_mut();
    }
    if let Some(s) = stats.as_deref_mut() {
        s.add_phase("Prolongation", start.elapsed());
        s.levels = summaries.len();
        s.device_name = device.name();
        s.device = device.counters();
    }

    output::write_hierarchy_csv(&summaries, &mut io::stdout())
}

/// Prolongate a coarse correction of ones into a zero fine vector and count
/// the fine entries it reached. The coarse correction is zeroed again after.
fn unit_prolongation<D: Device>(device: &D, level: &mut SparseLevel<D>) -> hpcg_mg::Result<usize> {
    let Some(mg) = level.mg_data_mut() else {
        return Ok(0);
    };
    let n = mg.xc().len();
    mg.xc_mut().upload(device, &vec![1.0; n])?;

    let mut xf = Vector::on_device(device, level.local_cols())?;
    compute_prolongation(device, level, &mut xf)?;
    let reached = xf.to_vec(device)?.iter().filter(|&&v| v != 0.0).count();

    if let Some(mg) = level.mg_data_mut() {
        mg.xc_mut().upload(device, &vec![0.0; n])?;
    }
    Ok(reached)
}
