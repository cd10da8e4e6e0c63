//! Path patterns used to select files, e.g. which ones to leave unpacked.

/// Check if a pattern contains glob wildcard characters.
pub fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters, including `/`
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // zero characters, or one more and keep the star
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Whether a slash-separated relative path is selected by any pattern.
///
/// Patterns are matched against the full path and against the base name;
/// patterns without wildcards must match one of them exactly.
pub fn matches_any(patterns: &[String], rel_path: &str) -> bool {
    let base = rel_path.rsplit('/').next().unwrap_or(rel_path);
    patterns.iter().any(|p| {
        let p = p.replace('\\', "/");
        if has_glob_chars(&p) {
            glob_match(&p, rel_path) || glob_match(&p, base)
        } else {
            rel_path == p || base == p
        }
    })
}
