//! Common test utilities and helpers

#![allow(dead_code)]

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use pexec::subprocess::{ExecCommand, ExecFuture};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A future running `script` under `sh -c`
pub fn sh(script: &str) -> ExecFuture {
    ExecFuture::new(ExecCommand::new("sh").args(["-c", script]).build())
}

/// Is there a process (running or zombie) with this pid?
pub fn process_exists(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Number of descriptors open in this process
pub fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Files in `dir`, sorted by name
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

/// Wait until `dir` holds at least `count` non-empty files
pub fn wait_for_files(dir: &Path, count: usize, timeout: Duration) -> Vec<PathBuf> {
    let deadline = Instant::now() + timeout;
    loop {
        let files: Vec<PathBuf> = list_files(dir)
            .into_iter()
            .filter(|path| std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false))
            .collect();
        if files.len() >= count || Instant::now() >= deadline {
            return files;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Pids written one per file by child processes
pub fn read_pids(files: &[PathBuf]) -> Vec<u32> {
    files
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .filter_map(|content| content.trim().parse().ok())
        .collect()
}

/// Poll `check` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
