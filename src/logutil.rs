//! Logging utilities for rendering raw modem traffic on a single log line.
//! Escapes control bytes (CR, LF, Ctrl-Z, ESC) that otherwise break log readability.

/// Escape raw modem bytes for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - other control or non-ASCII bytes => `\\xNN`
///
///   Truncates very long inputs (over `MAX_PREVIEW` bytes) with an ellipsis to cap log noise.
pub fn escape_bytes(data: &[u8]) -> String {
    const MAX_PREVIEW: usize = 200;
    let mut out = String::with_capacity(data.len().min(MAX_PREVIEW) + 8);
    for (count, &b) in data.iter().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            other => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", other);
            }
        }
    }
    out
}

/// Convenience wrapper for text that may carry control characters (SMS bodies, commands).
pub fn escape_log(s: &str) -> String {
    escape_bytes(s.as_bytes())
}
