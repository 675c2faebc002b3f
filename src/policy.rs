//! Engine subprocess environment policy (spec.md §4.14).
//!
//! Any environment variable whose name ends in `_API_KEY` is stripped before
//! it reaches an engine subprocess's environment. The host's own environment
//! is never mutated; callers log the sorted list of removed names (never
//! values) once at startup.

/// Filters `base_env` (an iterator of `(key, value)` pairs, typically
/// `std::env::vars()`), returning the sanitized entries and a sorted list of
/// the keys that were removed.
pub fn engine_env<I>(base_env: I) -> (Vec<(String, String)>, Vec<String>)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut removed = Vec::new();
    let mut out = Vec::new();
    for (k, v) in base_env {
        if k.ends_with("_API_KEY") {
            removed.push(k);
        } else {
            out.push((k, v));
        }
    }
    removed.sort();
    (out, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_api_key_suffixed_vars() {
        let input = vec![
            ("OPENAI_API_KEY".to_string(), "sk-secret".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("MY_CUSTOM_API_KEY".to_string(), "xyz".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let (sanitized, removed) = engine_env(input);
        assert_eq!(removed, vec!["MY_CUSTOM_API_KEY", "OPENAI_API_KEY"]);
        let keys: Vec<&str> = sanitized.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["PATH", "HOME"]);
    }

    #[test]
    fn preserves_non_matching_entries_unchanged() {
        let input = vec![("SHELL".to_string(), "/bin/bash".to_string())];
        let (sanitized, removed) = engine_env(input);
        assert!(removed.is_empty());
        assert_eq!(sanitized, vec![("SHELL".to_string(), "/bin/bash".to_string())]);
    }
}
