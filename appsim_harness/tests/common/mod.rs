//! Shared helpers for end-to-end tests against the real emulator binary.

#![allow(dead_code)]

use appsim_harness::{Options, Reporter};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Bound every construction must finish within, success or failure.
pub const FAIL_FAST: Duration = Duration::from_secs(2);

/// Options pointing at the emulator built alongside these tests.
pub fn options() -> Options {
    Options::new()
        .with_emulator_path(env!("CARGO_BIN_EXE_appsim-emulator"))
        .with_startup_timeout(Duration::from_secs(1))
}

pub fn fixture(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

/// Reporter that records everything it is handed.
#[derive(Default)]
pub struct RecordingReporter {
    pub lines: Mutex<Vec<String>>,
    pub fatals: Mutex<Vec<String>>,
}

impl Reporter for RecordingReporter {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn fatal(&self, message: &str) {
        self.fatals.lock().unwrap().push(message.to_string());
    }
}

/// Number of live emulator processes started for `app_id`.
#[cfg(target_os = "linux")]
pub fn emulators_running(app_id: &str) -> usize {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|entry| std::fs::read(entry.path().join("cmdline")).ok())
        .map(|cmdline| String::from_utf8_lossy(&cmdline).replace('\0', " "))
        .filter(|cmdline| cmdline.contains("appsim-emulator") && cmdline.contains(app_id))
        .count()
}
