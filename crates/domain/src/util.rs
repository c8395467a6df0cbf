/// Byte-safe truncation — never splits a UTF-8 codepoint.
///
/// Used uniformly across run-node previews, policy-hook truncation, and
/// the AU2 conversation-text builder.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
