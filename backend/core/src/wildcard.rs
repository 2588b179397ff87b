//! Wildcard matching.
//!
//! Supports `*` (any sequence, including empty) and `?` (exactly one character).
//! Every other character, `.` included, matches itself literally.
//!
//! Patterns come from operator configuration and inputs come from plugins, so
//! the matcher is the iterative single-backtrack algorithm: worst case
//! O(pattern * input) and no recursion.

/// Returns true if `input` matches `pattern` in its entirety.
pub fn wildcard_match(pattern: &str, input: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = input.chars().collect();
    match_chars(&p, &s)
}

fn match_chars(p: &[char], s: &[char]) -> bool {
    let (mut pi, mut si) = (0usize, 0usize);
    // Position of the last `*` seen and the input index it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == s[si]) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, si));
            pi += 1;
        } else if let Some((star_pi, star_si)) = star {
            pi = star_pi + 1;
            si = star_si + 1;
            star = Some((star_pi, star_si + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Returns true if the pattern contains no wildcard characters.
pub fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        assert!(wildcard_match("/secret/config.yml", "/secret/config.yml"));
        assert!(!wildcard_match("/secret/config.yml", "/secret/config.yaml"));
    }

    #[test]
    fn test_star_matches_any_sequence() {
        assert!(wildcard_match("/secret/*", "/secret/config.yml"));
        assert!(wildcard_match("/secret/*", "/secret/"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn test_question_mark_matches_one() {
        assert!(wildcard_match("file?.txt", "file1.txt"));
        assert!(!wildcard_match("file?.txt", "file.txt"));
        assert!(!wildcard_match("file?.txt", "file12.txt"));
    }

    #[test]
    fn test_dot_is_literal() {
        assert!(!wildcard_match("com.example", "comXexample"));
        assert!(wildcard_match("com.example.*", "com.example.Main"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!wildcard_match("Evil", "evil"));
    }

    #[test]
    fn test_adversarial_pattern_terminates() {
        let pattern = "*a*a*a*a*a*a*a*a*a*a*b";
        let input = "a".repeat(4096);
        assert!(!wildcard_match(pattern, &input));
    }

    #[test]
    fn test_is_literal() {
        assert!(is_literal("/tmp/a.txt"));
        assert!(!is_literal("/tmp/*.txt"));
        assert!(!is_literal("file?"));
    }
}
