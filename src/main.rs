//! Entry point: parses CLI args into one `Task` per input, then runs them
//! sequentially through `TaskRunner` — each conversion finishes before the
//! next one starts.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use csotool::cli::Args;
use csotool::runner;
use csotool::task::{Task, TaskStatus};

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .expect("global thread pool already initialized");
    }

    let flags = args.flags()?;
    let mut had_error = false;

    for (index, input_path) in args.inputs.iter().enumerate() {
        let output_path = args.output_for(index, input_path);
        let label = input_path.to_string_lossy().to_string();

        let bar = if args.quiet {
            None
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes}")
                    .unwrap()
                    .progress_chars("=> "),
            );
            bar.set_message(label.clone());
            Some(bar)
        };
        let bar_for_progress = bar.clone();
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let errors_for_cb = errors.clone();

        let mut task = Task {
            input: input_path.clone(),
            output: output_path,
            block_size: args.block,
            flags,
            orig_max_cost_percent: 0,
            lz4_max_cost_percent: 2,
            progress: Box::new(move |status, pos, total, _written| {
                if let Some(bar) = &bar_for_progress {
                    if status == TaskStatus::InProgress || status == TaskStatus::Success {
                        bar.set_length(total.max(0) as u64);
                        bar.set_position(pos.max(0) as u64);
                    }
                }
            }),
            error: Box::new(move |status, reason| {
                if status == TaskStatus::Success {
                    // The checksum path's only textual channel is this
                    // callback; surface it directly rather than as an error.
                    println!("{reason}");
                } else {
                    errors_for_cb.lock().unwrap().push(reason.to_string());
                }
            }),
        };

        let result = runner::run_task(&mut task);
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }

        match result {
            Ok(()) => {
                if !args.quiet {
                    println!("{label}: done");
                }
            }
            Err(e) => {
                had_error = true;
                eprintln!("{label}: {e}");
                for extra in errors.lock().unwrap().iter() {
                    eprintln!("{label}: {extra}");
                }
            }
        }
    }

    if had_error {
        std::process::exit(1);
    }
    Ok(())
}
