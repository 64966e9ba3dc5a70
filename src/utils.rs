/// Year component of a period label: the text before the first hyphen,
/// or the whole label for bare `"YYYY"` labels.
pub fn period_year(period: &str) -> &str {
    match period.split_once('-') {
        Some((year, _)) => year,
        None => period,
    }
}

/// Period-over-period change for KPI readings.
///
/// A zero base yields 100% when the current value is positive and 0% otherwise.
/// When the value crosses zero the denominator is `abs(previous)` so the sign of
/// the change follows the direction of movement.
pub fn kpi_change_pct(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }

    let crosses_zero = (previous < 0.0 && current > 0.0) || (previous > 0.0 && current < 0.0);
    if crosses_zero {
        (current - previous) / previous.abs() * 100.0
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Year-over-year growth for financial totals. Undefined when the base is not positive.
pub fn growth_pct(current: f64, previous: f64) -> Option<f64> {
    if previous > 0.0 {
        Some((current - previous) / previous * 100.0)
    } else {
        None
    }
}

/// Change across a span of years, measured against `abs(start)`; 0 when the start is zero.
pub fn span_change_pct(start: f64, end: f64) -> f64 {
    if start == 0.0 {
        return 0.0;
    }
    (end - start) / start.abs() * 100.0
}

/// Progress toward a target, uncapped. A zero target is met only by a zero value.
pub fn progress_pct(value: f64, target: f64) -> f64 {
    if target == 0.0 {
        return if value == 0.0 { 100.0 } else { 0.0 };
    }
    value / target * 100.0
}

pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() > max_chars {
        let head: String = label.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        label.to_string()
    }
}

/// Leading four-digit year of a file stem such as `2023_990.xml`.
pub fn year_prefix(stem: &str) -> Option<i32> {
    let prefix = stem.get(..4)?;
    if prefix.chars().all(|c| c.is_ascii_digit()) {
        prefix.parse().ok()
    } else {
        None
    }
}
