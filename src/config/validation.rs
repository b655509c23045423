//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is first parsed into a `toml::Value`, its key tree walked
//! and compared against the known field names. Unknown keys produce warnings
//! with "did you mean?" suggestions; they never break an existing config.
//! Range checks live in `GaugeConfig::validate`.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `GaugeConfig`.
///
/// Must be kept in step with the structs in gauge_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [watch]
        "watch",
        "watch.dir",
        "watch.canonical_name",
        "watch.extensions",
        "watch.mode",
        "watch.poll_interval_ms",
        "watch.debounce_ms",
        "watch.stability_poll_ms",
        "watch.stability_max_polls",
        "watch.relocate_attempts",
        "watch.relocate_backoff_ms",
        // [storage]
        "storage",
        "storage.archive_dir",
        "storage.value_file",
        "storage.display_image",
        // [calibration]
        "calibration",
        "calibration.min_angle",
        "calibration.max_angle",
        "calibration.min_value",
        "calibration.max_value",
        // [vision]
        "vision",
        "vision.resolution",
        "vision.blur_kernel",
        "vision.canny_low",
        "vision.canny_high",
        "vision.hough_threshold",
        "vision.min_line_length",
        "vision.max_line_gap",
        "vision.privacy_blur_kernel",
        "vision.blur_archive",
        "vision.composite_display",
        // [alert]
        "alert",
        "alert.sanity_min",
        "alert.sanity_max",
        "alert.default_threshold",
        "alert.tick_interval_ms",
        // [publish]
        "publish",
        "publish.enabled",
        "publish.endpoint",
        "publish.topic",
        "publish.timeout_secs",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smaller key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            ValidationWarning {
                message: format!("Unknown config key '{key}'"),
                field: key,
                suggestion,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("treshold", "threshold"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = "[a]\nb = 1\nc = 2\n".parse().unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"a".to_string()));
        assert!(keys.contains(&"a.b".to_string()));
        assert!(keys.contains(&"a.c".to_string()));
    }

    #[test]
    fn test_typo_in_calibration_suggests_fix() {
        let warnings = validate_unknown_keys("[calibration]\nmin_angel = 220.0\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "calibration.min_angel");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("calibration.min_angle"));
    }

    #[test]
    fn test_unrelated_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("[watch]\ncompletely_unrelated_setting = true\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].suggestion.is_none());
    }

    #[test]
    fn test_known_keys_produce_no_warnings() {
        let raw = r#"
[watch]
dir = "/srv/gauge"
mode = "poll"

[vision]
blur_archive = true

[publish]
topic = "meter_workorder"
"#;
        assert!(validate_unknown_keys(raw).is_empty());
    }

    #[test]
    fn test_unparseable_toml_is_left_to_serde() {
        assert!(validate_unknown_keys("this is = = not toml").is_empty());
    }
}
