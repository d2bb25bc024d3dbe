// Number and text formatting for dashboard labels

/// Scale an amount into bilhões / milhões / mil with two decimals.
///
/// The prefix is kept verbatim and always followed by one space, so an empty
/// prefix yields a leading space.
pub fn format_metric(value: f64, prefix: &str) -> String {
    if value >= 1_000_000_000.0 {
        format!("{} {:.2} bilhões", prefix, value / 1_000_000_000.0)
    } else if value >= 1_000_000.0 {
        format!("{} {:.2} milhões", prefix, value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{} {:.2} mil", prefix, value / 1_000.0)
    } else {
        format!("{} {:.2}", prefix, value)
    }
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
