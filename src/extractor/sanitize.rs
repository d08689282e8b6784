//! Dump-name sanitization.

const MAX_DUMP_NAME_LEN: usize = 30;

/// Sanitize a dump field name: keep only ASCII alphanumerics and
/// underscores, then truncate to 30 characters.
pub fn sanitize_dump_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    cleaned.chars().take(MAX_DUMP_NAME_LEN).collect()
}
