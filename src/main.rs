//! lics-fetch: mirror LiCSAR product files
//!
//! Reads a manifest (or selects one out of a harvested frame record), then
//! mirrors every entry under the output root. Files whose local size and
//! modification time already match the server are skipped, so re-running
//! against a populated root transfers nothing.

use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;

use lics_sync::cancel::{install_interrupt_handler, INTERRUPTED_EXIT_CODE};
use lics_sync::cli::FetchArgs;
use lics_sync::config::Settings;
use lics_sync::harvest::load_frame_record;
use lics_sync::http::HttpClient;
use lics_sync::job::total_cost;
use lics_sync::logger::open_logger;
use lics_sync::manifest::{load_manifest, prepare_destinations, select_from_frame, ManifestEntry};
use lics_sync::pool::{RunOutcome, WorkerPool};
use lics_sync::progress::{format_size, TerminalLine};
use lics_sync::transfer::{TransferContext, TransferOutcome};

fn build_manifest(args: &FetchArgs, settings: &Settings) -> Result<Vec<ManifestEntry>> {
    if let Some(frame) = &args.frame {
        let record = load_frame_record(frame)?;
        return Ok(select_from_frame(
            &record,
            &settings.mirror.base_url,
            &args.selection(),
        ));
    }
    match &args.manifest {
        Some(path) => load_manifest(path),
        None => bail!("a manifest or --frame is required"),
    }
}

fn main() -> Result<()> {
    let args = FetchArgs::parse();
    let mut settings = Settings::load(args.common.config.as_deref())?;
    args.apply(&mut settings);
    let logger = open_logger(args.common.log_file.as_deref(), "lics-fetch");

    let start = Instant::now();
    let entries = build_manifest(&args, &settings)?;

    // Configuration problems stop the run before anything is dispatched.
    let mut pool = WorkerPool::new(settings.mirror.lanes)?.with_unit("files");
    if !args.common.no_progress {
        pool = pool.with_progress(Arc::new(TerminalLine::new()));
    }
    let out_root = settings.mirror.out_dir.as_path();
    prepare_destinations(out_root, &entries)?;
    install_interrupt_handler(pool.cancel_token().clone())?;

    let total = entries.len();
    println!(
        "* mirroring {} files ({}) into {}",
        total,
        format_size(total_cost(&entries)),
        out_root.display()
    );

    let client = HttpClient::new(settings.network.timeouts());
    let ctx = TransferContext {
        remote: &client,
        out_root,
        logger: logger.as_ref(),
    };

    let results = match pool.run(entries, |entry, cancel| ctx.transfer(entry, cancel))? {
        RunOutcome::Completed(results) => results,
        RunOutcome::Cancelled { partial } => {
            let finished = partial.iter().filter(|r| r.is_some()).count();
            println!();
            println!("  interrupted after {finished} of {total} files");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    };

    let mut fetched = 0u64;
    let mut skipped = 0u64;
    let mut bytes = 0u64;
    for outcome in &results {
        match outcome {
            TransferOutcome::Fetched(n) => {
                fetched += 1;
                bytes += n;
            }
            TransferOutcome::Skipped => skipped += 1,
        }
    }
    let elapsed = start.elapsed().as_secs_f64();
    logger.done(results.len() as u64, bytes, elapsed);

    println!(
        "  fetched {} files ({}), {} already up to date",
        fetched,
        format_size(bytes),
        skipped
    );
    println!("elapsed time : {:.02} seconds", elapsed);
    Ok(())
}
