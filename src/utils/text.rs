/// Keeps the first `max_chars` characters of `value`.
///
/// Returns the kept prefix and whether anything was cut.
pub fn truncate_chars(value: &str, max_chars: usize) -> (String, bool) {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => (value[..cut].to_string(), true),
        None => (value.to_string(), false),
    }
}
