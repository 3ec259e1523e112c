use serde::{Deserialize, Serialize};

/// Process-level memory usage sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMemorySample {
    /// Resident set size in bytes.
    pub rss_bytes: Option<u64>,
    /// Virtual memory size in bytes.
    pub virtual_bytes: Option<u64>,
    /// Peak resident set size in bytes.
    pub peak_rss_bytes: Option<u64>,
}

/// Samples the current process's memory usage.
///
/// Reads `/proc/self/status` on Linux; every field is `None` elsewhere.
pub fn sample_process_memory() -> ProcessMemorySample {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => ProcessMemorySample {
                rss_bytes: parse_kib_field(&status, "VmRSS:"),
                virtual_bytes: parse_kib_field(&status, "VmSize:"),
                peak_rss_bytes: parse_kib_field(&status, "VmHWM:"),
            },
            Err(_) => ProcessMemorySample::default(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        ProcessMemorySample::default()
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_kib_field(status: &str, field: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse::<u64>().ok())
        .and_then(|kib| kib.checked_mul(1024))
}
