// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Display formatting
//
// Decimal units throughout (1 MB = 1_000_000 bytes).

const MB: f64 = 1_000_000.0;

/// Format a rate in bytes per second, e.g. "12.35 MB/s"
pub fn format_transfer_speed(bytes_per_sec: f64) -> String {
    format!("{:.2} MB/s", bytes_per_sec.max(0.0) / MB)
}

/// Format remaining seconds as "m:ss"
pub fn format_eta(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Format a size in MB, switching to GB above 1000 MB
pub fn format_file_size(bytes: u64) -> String {
    let mb = bytes as f64 / MB;
    if mb > 1000.0 {
        format!("{:.2} GB", mb / 1000.0)
    } else {
        format!("{:.2} MB", mb)
    }
}
