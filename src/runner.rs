//! Drives one `Task` end to end: open the input, size the buffer pool and
//! output, then pull blocks through the Input/Sector/Output pipeline until
//! both sides are drained.

use std::fs::OpenOptions;

use crate::checksum;
use crate::container::SECTOR_SIZE;
use crate::error::{invalid_option, TaskResult};
use crate::input::Input;
use crate::output::Output;
use crate::pool;
use crate::sector::CostPolicy;
use crate::task::{Task, TaskStatus};

/// Sectors accumulated into in-flight blocks at once. Bounds live memory at
/// `queue_capacity * block_size * (1 + trial count)`.
const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// A block size above this threshold (2 GiB) switches the automatic default
/// from 2048 to 16384.
const AUTO_BLOCK_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024;

pub fn run_task(task: &mut Task) -> TaskResult<()> {
    let mut input = match Input::open(&task.input) {
        Ok(i) => i,
        Err(e) => {
            task.notify_error(e.status, &e.message);
            return Err(e);
        }
    };

    if task.is_checksum_only() {
        return run_checksum(task, &mut input);
    }

    let block_size = resolve_block_size(task, &input)?;
    if block_size < SECTOR_SIZE || !block_size.is_power_of_two() {
        let e = invalid_option("block size must be a power of two >= 2048");
        task.notify_error(e.status, &e.message);
        return Err(e);
    }
    if !pool::set_buffer_size(block_size as usize) {
        let e = invalid_option("pool resize failed: buffers outstanding");
        task.notify_error(e.status, &e.message);
        return Err(e);
    }

    let output_path = task.output.clone().expect("checksum-only handled above");
    let output_file = match OpenOptions::new().create(true).write(true).truncate(true).open(&output_path) {
        Ok(f) => f,
        Err(e) => {
            let e = crate::error::bad_output(format!("open failed: {e}"));
            task.notify_error(e.status, &e.message);
            return Err(e);
        }
    };

    let policy = CostPolicy {
        orig_max_cost: task.orig_max_cost_percent * block_size / 100,
        lz4_max_cost: task.lz4_max_cost_percent * block_size / 100,
        dax_override: matches!(task.format(), crate::container::CsoFormat::Dax),
    };

    let total = input.total_size();
    let mut output = match Output::set_file(
        output_file,
        total,
        block_size,
        task.format(),
        task.flags,
        policy,
        DEFAULT_QUEUE_CAPACITY,
    ) {
        Ok(o) => o,
        Err(e) => {
            task.notify_error(e.status, &e.message);
            return Err(e);
        }
    };

    let result = drive(task, &mut input, &mut output);
    match &result {
        Ok(()) => task.notify_progress(TaskStatus::Success, total as i64, total as i64, output.dst_pos() as i64),
        Err(e) => task.notify_error(e.status, &e.message),
    }
    result
}

fn drive(task: &mut Task, input: &mut Input, output: &mut Output) -> TaskResult<()> {
    let total = input.total_size();

    loop {
        // `queue_full()` is Output's back-pressure primitive; not pulling
        // further from Input while it's full *is* `input.pause()`.
        if !output.queue_full() && !input.is_done() {
            if let Some((pos, block)) = input.next_block()? {
                for (i, sector) in block.chunks(2048).enumerate() {
                    output.enqueue(pos + (i as u64 * 2048), sector)?;
                }
            }
        }

        if output.drain_ready()? {
            task.notify_progress(TaskStatus::InProgress, output.src_pos() as i64, total as i64, output.dst_pos() as i64);
        }

        if input.is_done() {
            // The final partial block (if any) still needs zero-padding and
            // a round through the worker pool before it can resolve; until
            // `flush_tail` runs, it sits in `partial` forever and never
            // shows up in `in_flight`, so checking `in_flight() == 0` alone
            // would spin forever on a source size that isn't a multiple of
            // block_size.
            if output.has_partial() {
                output.flush_tail()?;
                continue;
            }
            if output.in_flight() == 0 {
                break;
            }
        }
        if !output.queue_full() && !input.is_done() {
            continue;
        }
        std::thread::yield_now();
    }

    while output.in_flight() > 0 {
        output.drain_ready()?;
        std::thread::yield_now();
    }
    output.drain_ready()?;
    debug_assert!(!output.has_partial(), "final drain left an incomplete block behind");

    output.finish()?;
    debug_assert!(output.is_complete(), "finish() must leave both data and index written");
    Ok(())
}

fn run_checksum(task: &mut Task, input: &mut Input) -> TaskResult<()> {
    match checksum::run(input) {
        Ok(message) => {
            let total = input.total_size() as i64;
            task.notify_progress(TaskStatus::Success, total, total, 0);
            task.notify_error(TaskStatus::Success, &message);
            Ok(())
        }
        Err(e) => {
            task.notify_error(e.status, &e.message);
            Err(e)
        }
    }
}

fn resolve_block_size(task: &Task, input: &Input) -> TaskResult<u32> {
    if task.block_size != 0 {
        return Ok(task.block_size);
    }
    Ok(if input.total_size() > AUTO_BLOCK_THRESHOLD { 16384 } else { SECTOR_SIZE })
}
