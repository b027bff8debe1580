use crate::error::{RelsyncError, Result};

/// Pull the value of the `version = ...` assignment out of a version
/// descriptor (e.g. `gradle.properties`).
///
/// Comment lines (`#`) are ignored, the keyword is matched
/// case-insensitively, and everything after the first `=` is the value,
/// so `version=7=8=9` yields `7=8=9`.
pub fn extract_version(descriptor: &str) -> Result<String> {
    for line in descriptor.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let is_version = line
            .get(..7)
            .is_some_and(|head| head.eq_ignore_ascii_case("version"));
        if !is_version {
            continue;
        }
        let mut parts = line.split('=');
        let _key = parts.next();
        let value: Vec<&str> = parts.collect();
        if value.is_empty() {
            continue;
        }
        return Ok(value.join("=").trim().to_string());
    }
    Err(RelsyncError::VersionNotFound)
}
