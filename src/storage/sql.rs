//! Small `SQL`-text helpers shared by the repositories.

/// Escapes `%`, `_`, and `\` in `s` so it can be interpolated into a `LIKE`
/// pattern (with `ESCAPE '\'`) and matched as a literal substring rather than
/// as a wildcard expression.
#[must_use]
pub fn escape_like_wildcards(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '%' || c == '_' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builds a case-insensitive substring `LIKE` pattern from raw user input,
/// escaping wildcard metacharacters first so the query only ever matches a
/// literal substring.
#[must_use]
pub fn substring_like_pattern(query: &str) -> String {
    format!("%{}%", escape_like_wildcards(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_wildcards_escapes_percent_and_underscore() {
        assert_eq!(escape_like_wildcards("50%_off"), "50\\%\\_off");
    }

    #[test]
    fn escape_like_wildcards_escapes_backslash_itself() {
        assert_eq!(escape_like_wildcards(r"a\b"), r"a\\b");
    }

    #[test]
    fn substring_like_pattern_wraps_with_percent() {
        assert_eq!(substring_like_pattern("abc"), "%abc%");
    }
}
