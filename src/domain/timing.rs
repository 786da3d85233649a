use chrono::Duration;

/// Serialize a `chrono::Duration` as integer milliseconds
pub mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::milliseconds)
    }
}

/// Drop sub-millisecond precision so derived values survive a save/load cycle
pub fn whole_millis(duration: Duration) -> Duration {
    Duration::milliseconds(duration.num_milliseconds())
}

/// Clamp a duration to `[0, +inf)`
pub fn non_negative(duration: Duration) -> Duration {
    duration.max(Duration::zero())
}

/// Duration in fractional seconds
pub fn as_secs_f64(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

/// Ratio clamped to `[0, 1]`; a non-positive denominator or non-finite result yields 0
pub fn unit_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Format a duration as "Xh Ym" (omits 0 values)
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes();
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours > 0 && minutes > 0 {
        format!("{}h {}m", hours, minutes)
    } else if hours > 0 {
        format!("{}h", hours)
    } else {
        format!("{}m", minutes)
    }
}

/// Format a duration as a countdown "H:MM:SS" or "M:SS"
pub fn format_countdown(duration: Duration) -> String {
    let total = non_negative(duration).num_seconds();
    let hours = total / 3600;
    let minutes = total % 3600 / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
