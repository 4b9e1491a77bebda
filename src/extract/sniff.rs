/// Minimum share of printable ASCII or whitespace characters for a file of
/// unknown type to be treated as text.
pub const PRINTABLE_RATIO: f64 = 0.90;

/// Decode bytes leniently and keep the result only if it reads as text.
pub fn sniff_text(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);

    let mut total = 0usize;
    let mut printable = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_ascii_graphic() || c.is_whitespace() {
            printable += 1;
        }
    }

    if total == 0 || text.trim().is_empty() {
        return None;
    }
    if (printable as f64 / total as f64) < PRINTABLE_RATIO {
        return None;
    }
    Some(text.into_owned())
}
