//! Artifact version bumping.
//!
//! Documents (`prp`, `docs`) use `MAJOR.MINOR` and bump the minor component;
//! code uses `MAJOR.MINOR.PATCH` and bumps the patch component. A malformed
//! current version never errors: it resets to a fixed value instead.

/// Outcome of parsing and bumping a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionBump {
    Bumped(String),
    /// The current value was malformed; the caller applies its reset value.
    UseDefault,
}

impl VersionBump {
    pub fn or_reset(self, reset: &str) -> String {
        match self {
            VersionBump::Bumped(version) => version,
            VersionBump::UseDefault => reset.to_string(),
        }
    }
}

pub const DOC_VERSION_INITIAL: &str = "0.0";
pub const DOC_VERSION_RESET: &str = "1.0";
pub const CODE_VERSION_INITIAL: &str = "0.0.0";
pub const CODE_VERSION_RESET: &str = "0.1.0";

/// Bump the last component of a dotted version with exactly `parts` numeric components.
pub fn bump_last(current: &str, parts: usize) -> VersionBump {
    let components: Vec<&str> = current.trim().split('.').collect();
    if components.len() != parts {
        return VersionBump::UseDefault;
    }
    let mut numbers = Vec::with_capacity(parts);
    for component in components {
        match component.parse::<u64>() {
            Ok(n) => numbers.push(n),
            Err(_) => return VersionBump::UseDefault,
        }
    }
    if let Some(last) = numbers.last_mut() {
        *last += 1;
    }
    let rendered: Vec<String> = numbers.iter().map(u64::to_string).collect();
    VersionBump::Bumped(rendered.join("."))
}

/// Next `MAJOR.MINOR` document version (`None` means no version recorded yet).
pub fn next_doc_version(current: Option<&str>) -> String {
    bump_last(current.unwrap_or(DOC_VERSION_INITIAL), 2).or_reset(DOC_VERSION_RESET)
}

/// Next `MAJOR.MINOR.PATCH` code version (`None` means no version recorded yet).
pub fn next_code_version(current: Option<&str>) -> String {
    bump_last(current.unwrap_or(CODE_VERSION_INITIAL), 3).or_reset(CODE_VERSION_RESET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_version_bumps_patch() {
        assert_eq!(next_code_version(Some("1.2.3")), "1.2.4");
        assert_eq!(next_code_version(Some("0.9.99")), "0.9.100");
    }

    #[test]
    fn code_version_starts_from_zero() {
        assert_eq!(next_code_version(None), "0.0.1");
    }

    #[test]
    fn malformed_code_version_resets() {
        for bad in ["", "1.2", "1.2.x", "v1.2.3", "1..3", "1.2.3.4"] {
            assert_eq!(next_code_version(Some(bad)), "0.1.0", "input {bad:?}");
        }
    }

    #[test]
    fn doc_version_bumps_minor() {
        assert_eq!(next_doc_version(Some("1.0")), "1.1");
        assert_eq!(next_doc_version(Some("2.9")), "2.10");
        assert_eq!(next_doc_version(None), "0.1");
    }

    #[test]
    fn malformed_doc_version_resets() {
        for bad in ["1", "1.0.0", "one.two", ""] {
            assert_eq!(next_doc_version(Some(bad)), "1.0", "input {bad:?}");
        }
    }

    #[test]
    fn bump_reports_use_default_instead_of_failing() {
        assert_eq!(bump_last("abc", 2), VersionBump::UseDefault);
        assert_eq!(bump_last("3.4", 2), VersionBump::Bumped("3.5".to_string()));
    }
}
