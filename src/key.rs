//! Cache key construction and glob-style pattern matching.

/// Builds namespaced cache keys.
///
/// Final key format: `"{prefix}:{rest}"`. The prefix isolates one process's
/// entries so pattern invalidation cannot cross tenant boundaries.
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        KeyBuilder {
            prefix: prefix.into(),
        }
    }

    /// Namespace a caller-supplied key: `"user:42"` -> `"rk:user:42"`.
    pub fn key(&self, rest: &str) -> String {
        format!("{}:{}", self.prefix, rest)
    }

    /// Namespace a pattern the same way keys are namespaced.
    pub fn pattern(&self, rest: &str) -> String {
        format!("{}:{}", self.prefix, rest)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Match `text` against a Redis-style glob pattern.
///
/// Supports `*` (any run of characters, including empty) and `?` (exactly one
/// character). This is the subset the in-memory backend needs to mirror what
/// `SCAN MATCH` does server-side in Redis.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Iterative two-pointer matcher with star backtracking.
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builder_formats() {
        let keys = KeyBuilder::new("rk");
        assert_eq!(keys.key("user:42"), "rk:user:42");
        assert_eq!(keys.pattern("user:*"), "rk:user:*");
        assert_eq!(keys.prefix(), "rk");
    }

    #[test]
    fn test_glob_exact() {
        assert!(glob_match("user:42", "user:42"));
        assert!(!glob_match("user:42", "user:43"));
    }

    #[test]
    fn test_glob_star() {
        assert!(glob_match("user:*", "user:42"));
        assert!(glob_match("user:*", "user:"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("ns:*:detail", "ns:42:detail"));
        assert!(!glob_match("user:*", "course:42"));
    }

    #[test]
    fn test_glob_question_mark() {
        assert!(glob_match("user:?", "user:7"));
        assert!(!glob_match("user:?", "user:42"));
    }

    #[test]
    fn test_glob_star_backtracking() {
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }
}
