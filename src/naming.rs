//! Sandbox identifiers and the names derived from them.
//!
//! Sandbox names double as file names in the metadata store and as the last
//! segment of the sandbox branch, so they are restricted to `[A-Za-z0-9._-]`.

use sha2::{Digest, Sha256};

/// Generates a fresh sandbox name: `<prefix><YYYYmmdd-HHMMSS>-<4 hex>`.
///
/// Two calls within the same second collide with probability 1/65536, so
/// creation must still be prepared to report a conflict.
pub fn generate(prefix: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}-{}", prefix, stamp, &suffix[..4])
}

/// Lower-cases `input` and strips it down to `[a-z0-9._-]`.
///
/// Spaces and path separators become `-`; anything else outside the allowed
/// set is dropped. Leading and trailing `-`/`.` are trimmed, so the result is
/// empty when nothing usable remains.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars().flat_map(char::to_lowercase) {
        match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => out.push(c),
            ' ' | '/' | '\\' => out.push('-'),
            _ => {}
        }
    }
    out.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Returns true if `name` is non-empty and only uses `[A-Za-z0-9._-]`.
pub fn is_valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Container name for a sandbox: `prefix` followed by the normalized name.
pub fn container_name(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, normalize(name))
}

/// First 12 hex characters of the SHA-256 of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_separators_and_drops_punctuation() {
        let cases = [
            ("Feature A", "feature-a"),
            ("feat/login\\fix", "feat-login-fix"),
            ("--.Weird..Name.--", "weird..name"),
            ("hello@world!", "helloworld"),
            ("v1.2_rc-3", "v1.2_rc-3"),
            ("@@@", ""),
            ("", ""),
        ];
        for (input, want) in cases {
            assert_eq!(normalize(input), want, "normalize({:?})", input);
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "Feature A",
            " /leading and trailing/ ",
            "..dots..",
            "MiXeD_Case-42",
            "ünïcödé name",
            "a - . - b",
            "-./\\-",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "normalize not idempotent for {:?}", input);
        }
    }

    #[test]
    fn is_valid_accepts_safe_names_only() {
        assert!(is_valid("feat-1"));
        assert!(is_valid("Feat_1.2"));
        assert!(!is_valid(""));
        assert!(!is_valid("bad/name"));
        assert!(!is_valid("bad\\name"));
        assert!(!is_valid("has space"));
        assert!(!is_valid("semi;colon"));
    }

    #[test]
    fn generate_produces_valid_prefixed_names() {
        let name = generate("sb-");
        assert!(name.starts_with("sb-"));
        assert!(is_valid(&name));
        // sb- + 8 date + - + 6 time + - + 4 hex
        assert_eq!(name.len(), 3 + 8 + 1 + 6 + 1 + 4);
    }

    #[test]
    fn container_name_normalizes() {
        assert_eq!(container_name("codex-sb-", "Feat A"), "codex-sb-feat-a");
    }

    #[test]
    fn short_hash_is_deterministic_and_fixed_length() {
        let a = short_hash("cfg|Dockerfile|ctx");
        let b = short_hash("cfg|Dockerfile|ctx");
        let c = short_hash("cfg|Dockerfile|other");

        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, c);
    }
}
