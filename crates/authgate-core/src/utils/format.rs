/// Number of leading token characters kept by `mask_token`
const TOKEN_VISIBLE_CHARS: usize = 6;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Mask a bearer token for log output, keeping only a short prefix
pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "<none>".to_string();
    }
    let prefix: String = token.chars().take(TOKEN_VISIBLE_CHARS).collect();
    if prefix.len() == token.len() {
        "***".to_string()
    } else {
        format!("{}***", prefix)
    }
}
