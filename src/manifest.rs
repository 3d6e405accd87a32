//! Format-preserving edits of JSON manifests.
//!
//! Manifests are shared with version control and with the host's package
//! manager, so edits never go through a parse/serialize round trip that could
//! reorder keys or reflow whitespace. Each patch locates one `"key": "value"`
//! pair with a regular expression and splices in the new value; every other
//! byte of the text is left as it was.
//!
//! Limitations: only the first match is edited, keys split across lines and
//! values containing escaped quotes are not recognised, and duplicate keys are
//! not detected.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;

static VERSION_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""version"\s*:\s*"([^"]*)""#).expect("version field pattern is valid")
});

/// Replace the value of the first `"version"` field with `new_version`.
///
/// Returns `None` when the text has no version field.
pub fn patch_version_field(text: &str, new_version: &str) -> Option<String> {
    splice_first(&VERSION_FIELD, text, new_version)
}

/// The value of the first `"version"` field, as written.
pub fn read_version_field(text: &str) -> Option<&str> {
    Some(VERSION_FIELD.captures(text)?.get(1)?.as_str())
}

/// Replace the string value declared for `package` with `new_source`.
///
/// The key must match exactly. Returns `None` when the key is absent.
pub fn patch_package_source_field(text: &str, package: &str, new_source: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*"([^"]*)""#, regex::escape(package));
    let re = Regex::new(&pattern).ok()?;
    splice_first(&re, text, new_source)
}

/// Escape `value` for use inside a JSON string literal.
pub fn escape_json_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Read the `dependencies` map of a manifest as `(name, source)` pairs,
/// sorted by name. Non-string values are skipped.
///
/// This is a read-only view used for listing; edits go through the patch
/// functions above.
pub fn read_dependencies(text: &str) -> Result<Vec<(String, String)>> {
    let manifest: Value = serde_json::from_str(text).context("Manifest is not valid JSON")?;
    let Some(dependencies) = manifest.get("dependencies").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    Ok(dependencies
        .iter()
        .filter_map(|(name, source)| Some((name.clone(), source.as_str()?.to_string())))
        .collect())
}

fn splice_first(re: &Regex, text: &str, replacement: &str) -> Option<String> {
    let value = re.captures(text)?.get(1)?;
    let escaped = escape_json_string(replacement);

    let mut patched = String::with_capacity(text.len() + escaped.len());
    patched.push_str(&text[..value.start()]);
    patched.push_str(&escaped);
    patched.push_str(&text[value.end()..]);
    Some(patched)
}
