use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const REDACTION_MARKER: &str = "[REDACTED]";

const SECRET_HEX_LEN: usize = 64;

/// `NAME=VALUE` where NAME mentions a secret-ish word. Only VALUE is masked.
static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Za-z0-9_]*(?:SECRET|KEY|PASSWORD|TOKEN)[A-Za-z0-9_]*=)\S+")
        .expect("secret assignment regex")
});

/// Maximal hex runs; the replacer keeps everything but exact 64-char runs.
static HEX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-fA-F]+").expect("hex run regex"));

/// Masks secrets in captured remote output.
///
/// Two rules are applied to the whole text:
/// - the value of any `NAME=VALUE` whose NAME contains SECRET, KEY, PASSWORD
///   or TOKEN (any case) becomes `[REDACTED]`, NAME and `=` are kept;
/// - every run of exactly 64 hex digits not adjacent to another hex digit
///   becomes `[REDACTED]`. Longer and shorter runs are left alone.
///
/// Everything else, newlines included, is returned byte-for-byte.
pub fn redact_output(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let assignments = SECRET_ASSIGNMENT.replace_all(text, |caps: &Captures| {
        format!("{}{}", &caps[1], REDACTION_MARKER)
    });
    HEX_RUN
        .replace_all(&assignments, |caps: &Captures| {
            let run = &caps[0];
            if run.len() == SECRET_HEX_LEN {
                REDACTION_MARKER.to_string()
            } else {
                run.to_string()
            }
        })
        .into_owned()
}
