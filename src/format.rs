//! Pace and duration formatting.
//!
//! Paces are decimal minutes per kilometer throughout the crate; these
//! helpers convert them to and from the `m:ss` form people type and read.

/// Format decimal minutes as `m:ss`, e.g. `4.5` -> `"4:30"`.
///
/// Non-positive and non-finite values format as `"n/a"`.
pub fn format_min_sec(minutes: f64) -> String {
    if !minutes.is_finite() || minutes <= 0.0 {
        return "n/a".to_string();
    }
    let mut whole = minutes.floor() as u64;
    let mut secs = ((minutes - minutes.floor()) * 60.0).round() as u64;
    if secs == 60 {
        whole += 1;
        secs = 0;
    }
    format!("{}:{:02}", whole, secs)
}

/// Format seconds as `hh:mm:ss`. Negative and non-finite values format as `"-"`.
pub fn format_hms(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "-".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Parse `m:ss` (or plain decimal minutes) into decimal minutes.
///
/// Returns `None` for malformed input, seconds of 60 or more, or a
/// non-positive result.
pub fn parse_min_sec(input: &str) -> Option<f64> {
    let input = input.trim();
    let minutes = match input.split_once(':') {
        Some((m, s)) => {
            let m: u32 = m.trim().parse().ok()?;
            let s: f64 = s.trim().parse().ok()?;
            if !(0.0..60.0).contains(&s) {
                return None;
            }
            m as f64 + s / 60.0
        }
        None => input.parse::<f64>().ok()?,
    };
    (minutes.is_finite() && minutes > 0.0).then_some(minutes)
}

/// Convert a pace (min/km) to a velocity (m/s).
pub fn pace_to_velocity(min_per_km: f64) -> Option<f64> {
    (min_per_km.is_finite() && min_per_km > 0.0).then(|| 1000.0 / (min_per_km * 60.0))
}

/// Convert a velocity (m/s) to a pace (min/km).
pub fn velocity_to_pace(meters_per_second: f64) -> Option<f64> {
    (meters_per_second.is_finite() && meters_per_second > 0.0)
        .then(|| 1000.0 / meters_per_second / 60.0)
}
