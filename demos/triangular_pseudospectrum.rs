//! Pseudospectrum of an upper-triangular test matrix
//!
//! Builds one of the classic test matrices, keeps its upper triangle and
//! samples `‖(U − zI)⁻¹‖₂` on a rectangle of the complex plane. Every process
//! of the SPMD program runs as a thread of this binary.
//!
//! Run with:
//! ```bash
//! cargo run --release --example triangular_pseudospectrum -- --mat-type grcar --size 200
//! RUST_LOG=distla=debug cargo run --example triangular_pseudospectrum -- --procs 6 --write ascii
//! ```

use clap::{Parser, ValueEnum};
use distla::blas::make_triangular;
use distla::io::{self, FileFormat};
use distla::lapack::{PseudospecCtrl, triangular_pseudospectrum};
use distla::matrices::{grcar, hanowa, lotkin, uniform};
use distla::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MatType {
    Uniform,
    Lotkin,
    Grcar,
    Hanowa,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Ascii,
    Matlab,
    Binary,
}

impl From<Format> for FileFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Ascii => FileFormat::Ascii,
            Format::Matlab => FileFormat::AsciiMatlab,
            Format::Binary => FileFormat::Binary,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Sample the pseudospectrum of a triangular test matrix")]
struct Args {
    /// Test matrix whose upper triangle is used
    #[arg(long, value_enum, default_value_t = MatType::Uniform)]
    mat_type: MatType,

    /// Height of the matrix
    #[arg(long, default_value_t = 100)]
    size: usize,

    /// Number of processes (threads)
    #[arg(long, default_value_t = 4)]
    procs: usize,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    real_center: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    imag_center: f64,

    /// Width of the window along the real axis; 0 picks one from the spectrum
    #[arg(long, default_value_t = 0.0)]
    real_width: f64,

    /// Width of the window along the imaginary axis; 0 picks one from the spectrum
    #[arg(long, default_value_t = 0.0)]
    imag_width: f64,

    /// Number of samples along the real axis
    #[arg(long, default_value_t = 100)]
    real_size: usize,

    /// Number of samples along the imaginary axis
    #[arg(long, default_value_t = 100)]
    imag_size: usize,

    /// Disable deflation of converged shifts
    #[arg(long)]
    no_deflate: bool,

    #[arg(long, default_value_t = 1000)]
    max_its: usize,

    #[arg(long, default_value_t = 1e-6)]
    tol: f64,

    /// Number of bands kept by the Grcar matrix
    #[arg(long, default_value_t = 3)]
    num_bands: usize,

    /// Log convergence of every sweep
    #[arg(long)]
    progress: bool,

    /// Write the matrix and the maps in this format
    #[arg(long, value_enum)]
    write: Option<Format>,

    /// Directory the files are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

fn build_matrix(args: &Args, env: &Environment, a: &mut DistMatrix<Complex128>) -> Result<()> {
    let n = args.size;
    match args.mat_type {
        MatType::Uniform => uniform(a, n, n, Complex128::new(0.0, 0.0), 1.0, &mut *env.rng())?,
        MatType::Lotkin => lotkin(a, n),
        MatType::Grcar => grcar(a, n, args.num_bands),
        MatType::Hanowa => {
            if n % 2 != 0 {
                return Err(Error::invalid_argument("size", "the Hanowa matrix needs an even size"));
            }
            hanowa(a, n, Complex128::new(-1.0, 0.0))
        }
    }
    Ok(())
}

fn run(args: &Args, env: &Environment) -> Result<()> {
    let grid = env.default_grid()?;
    let root = grid.vc_rank() == Some(0);

    let mut a = DistMatrix::<Complex128>::new(&grid, Dist::Mc, Dist::Mr);
    build_matrix(args, env, &mut a)?;
    make_triangular(UpperOrLower::Upper, &mut a);
    if let Some(format) = args.write {
        io::write(&a, args.out_dir.join("A"), format.into())?;
    }

    let ctrl = PseudospecCtrl {
        deflate: !args.no_deflate,
        max_its: args.max_its,
        tol: args.tol,
        progress: args.progress,
        seed: None,
    };
    let start = std::time::Instant::now();
    let ps = triangular_pseudospectrum(
        &a,
        Complex128::new(args.real_center, args.imag_center),
        args.real_width,
        args.imag_width,
        args.real_size,
        args.imag_size,
        &ctrl,
    )?;
    let elapsed = start.elapsed();

    // [MC,MR] stores every entry once, so the local maxima cover the matrix
    let counts = ps.it_count_map.local();
    let local_max = (0..counts.width()).flat_map(|j| counts.col(j).iter().copied()).max().unwrap_or(0);
    let iterations = grid.comm(CommKind::Vc).all_reduce_scalar(local_max, ReduceOp::Max)?;
    if root {
        tracing::info!(
            ?elapsed,
            iterations,
            real_width = ps.real_width,
            imag_width = ps.imag_width,
            "pseudospectrum computed"
        );
    }

    if let Some(format) = args.write {
        let format = FileFormat::from(format);
        io::write(&ps.inv_norm_map, args.out_dir.join("invNormMap"), format)?;
        io::write(&ps.it_count_map, args.out_dir.join("itCountMap"), format)?;

        let mut log_map = ps.inv_norm_map.clone();
        let mut local = log_map.local_mut();
        for j in 0..local.width() {
            for v in local.col_mut(j) {
                *v = v.ln();
            }
        }
        io::write(&log_map, args.out_dir.join("logInvNormMap"), format)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if args.procs == 0 {
        tracing::error!("--procs must be positive");
        return ExitCode::FAILURE;
    }

    let envs = Environment::universe(args.procs, config);
    let args = &args;
    let failures = std::thread::scope(|s| {
        let handles: Vec<_> = envs
            .into_iter()
            .map(|env| {
                s.spawn(move || {
                    let rank = env.world().rank();
                    let outcome = run(args, &env);
                    if let Err(e) = &outcome {
                        tracing::error!(rank, error = %e, "process failed");
                    }
                    outcome.is_err()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap_or(true)).filter(|&failed| failed).count()
    });

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
