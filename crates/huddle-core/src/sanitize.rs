//! Client text is never trusted as markup. Bodies are stored HTML-escaped,
//! with control characters removed and line endings normalized.

/// Escape markup and strip control characters (newline and tab survive).
/// Leading and trailing whitespace is trimmed.
pub fn sanitize_body(raw: &str) -> String {
    escape_markup(&strip_controls(raw))
}

/// Trimmed, newline-normalized text with control characters removed but
/// markup left as typed. Command arguments are read from this form.
pub fn strip_controls(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    normalized
        .trim()
        .chars()
        .filter(|&ch| match ch {
            '\n' | '\t' => true,
            c if c.is_control() => false,
            // Bidi overrides can disguise the rest of a line.
            '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' => false,
            _ => true,
        })
        .collect()
}

pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Single-line label (channel display names, categories, filenames).
pub fn sanitize_label(raw: &str) -> String {
    sanitize_body(raw)
        .chars()
        .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Filenames lose any directory part as well.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    sanitize_label(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            sanitize_body("<script>alert('x')</script> & co"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; co"
        );
    }

    #[test]
    fn strips_controls_and_normalizes_newlines() {
        assert_eq!(sanitize_body("  a\r\nb\u{0007}\tc\r  "), "a\nb\tc");
        assert_eq!(sanitize_body("x\u{202E}y"), "xy");
    }

    #[test]
    fn strip_keeps_markup() {
        assert_eq!(strip_controls(" tom & <jerry>\u{0007} "), "tom & <jerry>");
    }

    #[test]
    fn commands_pass_through() {
        assert_eq!(sanitize_body("/order #1001"), "/order #1001");
    }

    #[test]
    fn filename_drops_path() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\tmp\\report<1>.pdf"), "report&lt;1&gt;.pdf");
    }
}
