#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use pzip_core::Run;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Writes each payload to `dir/input-<i>.bin` and returns the paths in order.
pub fn write_inputs(dir: &Path, payloads: &[&[u8]]) -> std::io::Result<Vec<PathBuf>> {
    payloads
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            let path = dir.join(format!("input-{index}.bin"));
            fs::write(&path, payload)?;
            Ok(path)
        })
        .collect()
}

/// Naive per-file run-length encoding, used as the expected output.
pub fn reference_runs(files: &[&[u8]]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for file in files {
        let mut current: Option<Run> = None;
        for &byte in *file {
            match current.as_mut() {
                Some(run) if run.symbol == byte => run.length += 1,
                _ => {
                    if let Some(run) = current.take() {
                        runs.push(run);
                    }
                    current = Some(Run::new(byte, 1));
                }
            }
        }
        runs.extend(current);
    }
    runs
}

/// Deterministic bytes with runs of varying length, seeded by `seed`.
pub fn patterned(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let symbol = b'a' + ((state >> 33) % 4) as u8;
        let run = 1 + ((state >> 40) % 700) as usize;
        let take = run.min(len - out.len());
        out.extend(std::iter::repeat_n(symbol, take));
    }
    out
}
