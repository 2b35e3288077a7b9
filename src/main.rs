mod pipelines;
mod utils;
mod config;
mod cli;

use std::time::Instant;
use std::{env, fs};
use std::path::PathBuf;
use std::sync::Arc;
use std::io::Write;

use anyhow::Result;
use log::{LevelFilter, debug, info, error};
use env_logger::Builder;

use crate::cli::parse;
use crate::config::defs::{OutDirs, RunConfig};
use crate::utils::system::{detect_cores, subsampling_seed};
use pipelines::cut_tag;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Cut&Tag\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let max_cores = detect_cores(args.threads);
    debug!("Using {} threads for external tools", max_cores);

    let seed = subsampling_seed(args.seed);
    debug!("Subsampling seed: {}", seed);

    let out_dir = setup_output_dir(&args, &dir)?;
    info!("Writing results to {:?}", out_dir);

    let dirs = OutDirs::new(&out_dir);
    let run_config = Arc::new(RunConfig {
        cwd: dir,
        out_dir,
        dirs,
        args,
        threads: max_cores,
        seed,
    });

    if let Err(e) = cut_tag::run(run_config).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


/// Sets up the output directory.
/// If `out_dir` is specified from args, uses it;
/// otherwise, creates a directory named `<prefix>_YYYYMMDD`.
/// Ensures the directory exists.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the output directory.
fn setup_output_dir(args: &cli::args::Arguments, cwd: &PathBuf) -> Result<PathBuf> {
    let out_dir = match &args.out_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        }
        None => {
            let timestamp = chrono::Local::now().format("%Y%m%d").to_string();
            cwd.join(format!("{}_{}", args.prefix, timestamp))
        }
    };
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}
