//! End-to-end round-trip tests over the public `Task`/`TaskRunner` surface,
//! driving the crate in-process with real temp-file fixtures rather than
//! shelling out to a built binary.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use csotool::container::CsoFormat;
use csotool::task::{Task, TaskFlags, TaskStatus};

fn make_task(input: &Path, output: &Path, block_size: u32, flags: TaskFlags) -> (Task, Arc<Mutex<Vec<String>>>) {
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors_for_cb = errors.clone();
    let task = Task {
        input: input.to_path_buf(),
        output: Some(output.to_path_buf()),
        block_size,
        flags,
        orig_max_cost_percent: 0,
        lz4_max_cost_percent: 2,
        progress: Box::new(|_, _, _, _| {}),
        error: Box::new(move |status, reason| {
            errors_for_cb.lock().unwrap().push(format!("{status:?}: {reason}"));
        }),
    };
    (task, errors)
}

fn pattern(len: usize, f: impl Fn(usize) -> u8) -> Vec<u8> {
    (0..len).map(f).collect()
}

#[test]
fn empty_ish_smallest_case_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("zero.iso");
    fs::File::create(&iso_path).unwrap().write_all(&[0u8; 2048]).unwrap();

    let cso_path = dir.path().join("zero.cso");
    let (mut task, errors) = make_task(&iso_path, &cso_path, 2048, TaskFlags::empty());
    csotool::runner::run_task(&mut task).expect(&format!("compress failed: {:?}", errors.lock().unwrap()));

    let cso_bytes = fs::read(&cso_path).unwrap();
    assert_eq!(&cso_bytes[0..4], b"CISO");
    assert_eq!(cso_bytes[20], 1); // version

    let back_path = dir.path().join("zero.back.iso");
    let (mut decompress_task, errors) = make_task(&cso_path, &back_path, 0, TaskFlags::DECOMPRESS);
    csotool::runner::run_task(&mut decompress_task)
        .expect(&format!("decompress failed: {:?}", errors.lock().unwrap()));

    assert_eq!(fs::read(&back_path).unwrap(), vec![0u8; 2048]);
}

#[test]
fn power_of_two_block_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("fill.iso");
    let data = vec![0xA5u8; 1024 * 1024];
    fs::File::create(&iso_path).unwrap().write_all(&data).unwrap();

    let cso_path = dir.path().join("fill.cso");
    let (mut task, errors) = make_task(&iso_path, &cso_path, 4096, TaskFlags::empty());
    csotool::runner::run_task(&mut task).expect(&format!("compress failed: {:?}", errors.lock().unwrap()));

    let back_path = dir.path().join("fill.back.iso");
    let (mut decompress_task, errors) = make_task(&cso_path, &back_path, 0, TaskFlags::DECOMPRESS);
    csotool::runner::run_task(&mut decompress_task)
        .expect(&format!("decompress failed: {:?}", errors.lock().unwrap()));

    assert_eq!(fs::read(&back_path).unwrap(), data);
    assert!(fs::metadata(&cso_path).unwrap().len() < data.len() as u64);
}

#[test]
fn cso_v2_mixed_content_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("mixed.iso");
    let mut data = pattern(2 * 1024 * 1024, |i| (i % 7) as u8);
    // Sprinkle in some high-entropy regions so LZ4/deflate both plausibly win blocks.
    let mut x: u32 = 0xC0FFEE;
    for chunk in data.chunks_mut(4096).step_by(3) {
        for b in chunk.iter_mut() {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            *b = (x & 0xFF) as u8;
        }
    }
    fs::File::create(&iso_path).unwrap().write_all(&data).unwrap();

    let cso_path = dir.path().join("mixed.cso2");
    let mut flags = TaskFlags::FMT_CSO_2;
    flags.insert(TaskFlags::FORCE_ALL);
    let (mut task, errors) = make_task(&iso_path, &cso_path, 2048, flags);
    csotool::runner::run_task(&mut task).expect(&format!("compress failed: {:?}", errors.lock().unwrap()));

    let back_path = dir.path().join("mixed.back.iso");
    let (mut decompress_task, errors) = make_task(&cso_path, &back_path, 0, TaskFlags::DECOMPRESS);
    csotool::runner::run_task(&mut decompress_task)
        .expect(&format!("decompress failed: {:?}", errors.lock().unwrap()));

    assert_eq!(fs::read(&back_path).unwrap(), data);
}

#[test]
fn dax_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("game.iso");
    let data = pattern(4 * 1024 * 1024, |i| ((i * 31) % 256) as u8);
    fs::File::create(&iso_path).unwrap().write_all(&data).unwrap();

    let dax_path = dir.path().join("game.dax");
    let (mut task, errors) = make_task(&iso_path, &dax_path, 8192, TaskFlags::FMT_DAX);
    csotool::runner::run_task(&mut task).expect(&format!("compress failed: {:?}", errors.lock().unwrap()));

    let header = fs::read(&dax_path).unwrap();
    assert_eq!(&header[0..4], b"DAX\0");
    let nc_areas = u32::from_le_bytes(header[12..16].try_into().unwrap());
    assert_eq!(nc_areas, 0, "output must never synthesize NC-areas");

    let back_path = dir.path().join("game.back.iso");
    let (mut decompress_task, errors) = make_task(&dax_path, &back_path, 0, TaskFlags::DECOMPRESS);
    csotool::runner::run_task(&mut decompress_task)
        .expect(&format!("decompress failed: {:?}", errors.lock().unwrap()));

    assert_eq!(fs::read(&back_path).unwrap(), data);
}

#[test]
fn zso_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("disc.iso");
    let data = pattern(512 * 1024, |i| (i % 13) as u8);
    fs::File::create(&iso_path).unwrap().write_all(&data).unwrap();

    let zso_path = dir.path().join("disc.zso");
    let (mut task, errors) = make_task(&iso_path, &zso_path, 2048, TaskFlags::FMT_ZSO);
    csotool::runner::run_task(&mut task).expect(&format!("compress failed: {:?}", errors.lock().unwrap()));

    let back_path = dir.path().join("disc.back.iso");
    let (mut decompress_task, errors) = make_task(&zso_path, &back_path, 0, TaskFlags::DECOMPRESS);
    csotool::runner::run_task(&mut decompress_task)
        .expect(&format!("decompress failed: {:?}", errors.lock().unwrap()));

    assert_eq!(fs::read(&back_path).unwrap(), data);
}

#[test]
fn partial_final_block_round_trips() {
    // Source size is not a multiple of block_size, so the last Sector is
    // completed by flush_tail's zero-padding rather than by enqueue alone.
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("odd.iso");
    let data = pattern(4096 * 10 + 2048 * 3, |i| ((i * 7 + 3) % 256) as u8);
    fs::File::create(&iso_path).unwrap().write_all(&data).unwrap();

    let cso_path = dir.path().join("odd.cso");
    let (mut task, errors) = make_task(&iso_path, &cso_path, 4096, TaskFlags::empty());
    csotool::runner::run_task(&mut task).expect(&format!("compress failed: {:?}", errors.lock().unwrap()));

    let back_path = dir.path().join("odd.back.iso");
    let (mut decompress_task, errors) = make_task(&cso_path, &back_path, 0, TaskFlags::DECOMPRESS);
    csotool::runner::run_task(&mut decompress_task)
        .expect(&format!("decompress failed: {:?}", errors.lock().unwrap()));

    let restored = fs::read(&back_path).unwrap();
    assert_eq!(restored.len(), data.len(), "decompressed output must not carry a padded tail");
    assert_eq!(restored, data);
}

#[test]
fn checksum_matches_round_tripped_image() {
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("disc.iso");
    let data = pattern(256 * 1024, |i| (i % 251) as u8);
    fs::File::create(&iso_path).unwrap().write_all(&data).unwrap();

    let cso_path = dir.path().join("disc.cso");
    let (mut task, errors) = make_task(&iso_path, &cso_path, 2048, TaskFlags::empty());
    csotool::runner::run_task(&mut task).expect(&format!("compress failed: {:?}", errors.lock().unwrap()));

    let mut original = csotool::input::Input::open(&iso_path).unwrap();
    let original_crc = csotool::checksum::run(&mut original).unwrap();

    let mut roundtripped = csotool::input::Input::open(&cso_path).unwrap();
    let roundtripped_crc = csotool::checksum::run(&mut roundtripped).unwrap();

    assert_eq!(original_crc, roundtripped_crc);
}

#[test]
fn rejects_invalid_block_size() {
    let dir = tempfile::tempdir().unwrap();
    let iso_path = dir.path().join("disc.iso");
    fs::File::create(&iso_path).unwrap().write_all(&[0u8; 2048]).unwrap();

    let cso_path = dir.path().join("disc.cso");
    let (mut task, _errors) = make_task(&iso_path, &cso_path, 3000, TaskFlags::empty());
    let result = csotool::runner::run_task(&mut task);
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().status, TaskStatus::InvalidOption);
}

#[test]
fn format_selection_matches_flags() {
    assert_eq!(
        Task {
            input: "x".into(),
            output: None,
            block_size: 0,
            flags: TaskFlags::FMT_ZSO,
            orig_max_cost_percent: 0,
            lz4_max_cost_percent: 0,
            progress: Box::new(|_, _, _, _| {}),
            error: Box::new(|_, _| {}),
        }
        .format(),
        CsoFormat::Zso
    );
}
