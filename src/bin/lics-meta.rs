//! lics-meta: harvest per-frame metadata from the product archive
//!
//! Writes `frames.json` plus one `{group}/{frame}.json` record per frame,
//! grouped by frame id prefix.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;

use lics_sync::cancel::{install_interrupt_handler, INTERRUPTED_EXIT_CODE};
use lics_sync::cli::MetaArgs;
use lics_sync::config::Settings;
use lics_sync::harvest::{collect_frame, list_frames, save_metadata};
use lics_sync::logger::open_logger;
use lics_sync::paths::ensure_dir_exists;
use lics_sync::pool::{RunOutcome, WorkerPool};
use lics_sync::progress::TerminalLine;

fn main() -> Result<()> {
    let args = MetaArgs::parse();
    let mut settings = Settings::load(args.common.config.as_deref())?;
    args.apply(&mut settings);
    let harvest = &settings.harvest;
    let logger = open_logger(args.common.log_file.as_deref(), "lics-meta");

    let start = Instant::now();

    let mut pool = WorkerPool::new(harvest.lanes)?.with_unit("frames");
    if !args.common.no_progress {
        pool = pool.with_progress(Arc::new(TerminalLine::new()));
    }
    ensure_dir_exists(&harvest.out_path)?;
    install_interrupt_handler(pool.cancel_token().clone())?;

    println!("* searching for frames");
    let frames = list_frames(&harvest.lics_path)?;
    let total = frames.len();
    println!("  found {} frames", total);

    println!("* getting metadata for frames");
    let outcome = pool.run(frames, |frame, cancel| {
        let record = collect_frame(&harvest.lics_path, frame, &harvest.patterns, cancel)?;
        logger.harvested(&record.id, record.file_count());
        Ok(record)
    })?;
    let records = match outcome {
        RunOutcome::Completed(records) => records,
        RunOutcome::Cancelled { partial } => {
            let finished = partial.iter().filter(|r| r.is_some()).count();
            println!();
            println!("  interrupted after {finished} of {total} frames");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    };

    println!("* saving metadata in {}", harvest.out_path.display());
    save_metadata(&harvest.out_path, &records)?;

    let elapsed = start.elapsed().as_secs_f64();
    logger.done(records.len() as u64, 0, elapsed);
    println!("elapsed time : {:.02} seconds", elapsed);
    Ok(())
}
