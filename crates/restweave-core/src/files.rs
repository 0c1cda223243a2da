//! File-name matching shared by the loader and the file watcher.
//!
//! Patterns use a single `*` wildcard (translated to `.*`); everything else
//! is matched literally. Hidden and editor scratch files are rejected
//! regardless of pattern.

use regex::Regex;

/// Translate a glob pattern into an anchored regular expression.
fn glob_to_regex(pattern: &str) -> String {
    let mut translated = String::with_capacity(pattern.len() + 4);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            ch => translated.push_str(&regex::escape(&ch.to_string())),
        }
    }
    translated.push('$');
    translated
}

/// Whether `name` matches the glob `pattern`.
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    match Regex::new(&glob_to_regex(pattern)) {
        Ok(regex) => regex.is_match(name),
        // Escaped patterns always compile; treat a failure as a non-match.
        Err(_) => false,
    }
}

/// Whether `name` matches any of the given glob patterns. An empty pattern
/// list matches everything.
pub fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|pattern| glob_matches(pattern, name))
}

/// Reject list for hidden and temporary files: leading `.`, trailing `.tmp`
/// or `.swp`, or any `~`.
pub fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".tmp") || name.ends_with(".swp") || name.contains('~')
}
