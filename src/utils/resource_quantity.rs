//! Renders internal `f64` cores / `u64` bytes into the `Quantity` string
//! shapes the `metrics.k8s.io` API uses: CPU as millicores (`"50m"`) or
//! whole cores (`"2"`), memory with binary-SI suffixes (`"200Mi"`).

/// Formats a CPU rate (in cores) as a Kubernetes `Quantity` string.
///
/// Whole-core values are rendered without a suffix (`"2"`); anything else
/// is rendered in millicores (`"50m"`), which is what every real
/// `metrics.k8s.io` client already expects to parse.
pub fn format_cpu_cores(cores: f64) -> String {
    let millis = (cores * 1000.0).round() as i64;
    if millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        format!("{millis}m")
    }
}

/// Formats a byte count as a Kubernetes `Quantity` string, preferring the
/// largest binary-SI unit that divides evenly.
pub fn format_memory_bytes(bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;
    if bytes >= GIB && bytes % GIB == 0 {
        format!("{}Gi", bytes / GIB)
    } else if bytes >= MIB && bytes % MIB == 0 {
        format!("{}Mi", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}Ki", bytes / KIB)
    } else {
        format!("{bytes}")
    }
}
