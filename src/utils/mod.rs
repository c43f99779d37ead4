use std::time::{Duration, Instant};
use tracing::info;

/// Logs how long a stage took once it goes out of scope.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  {} started", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  {} finished in {:.2?}", self.label, self.elapsed());
    }
}

/// Percentage with at most two decimals and no trailing zeros.
/// 10.0 → "10" | 12.5 → "12.5" | 32.456 → "32.46"
pub fn fmt_percent(v: f64) -> String {
    let s = format!("{:.2}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}
