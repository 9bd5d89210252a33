//! Prefix remapping from archive entry names to install-root paths.
//!
//! Rules are kept longest-prefix first, so a library directory rule is never
//! shadowed by a catch-all rule whatever order they were configured in.
//! Entry names are untrusted: anything absolute or containing a `..`
//! component is rejected before a path is built.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use super::error::InstallError;

// ============================================================================
// Rules
// ============================================================================

/// Routes entries starting with `prefix` to `destination` (relative to the
/// install root, empty for the root itself). The prefix is stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRule {
    pub prefix: String,
    #[serde(default)]
    pub destination: String,
    /// When set, directory entries under this prefix are not created.
    #[serde(default)]
    pub files_only: bool,
}

impl PathRule {
    pub fn new(prefix: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            destination: destination.into(),
            files_only: false,
        }
    }

    pub fn files_only(mut self) -> Self {
        self.files_only = true;
        self
    }
}

/// What happens to entries no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Drop the entry.
    #[default]
    Structured,
    /// Write the entry under the install root with its full name.
    Flatten,
}

/// Where an entry ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Write to `target`, which lies under `root`.
    Mapped { root: PathBuf, target: PathBuf },
    /// Not extracted.
    Skipped,
}

// ============================================================================
// Path Mapping
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct RawPathMapping {
    #[serde(default)]
    rules: Vec<PathRule>,
    #[serde(default)]
    unmatched: UnmatchedPolicy,
}

impl From<RawPathMapping> for PathMapping {
    fn from(raw: RawPathMapping) -> Self {
        PathMapping::new(raw.rules, raw.unmatched)
    }
}

/// Ordered prefix rules plus the policy for unmatched entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPathMapping")]
pub struct PathMapping {
    rules: Vec<PathRule>,
    unmatched: UnmatchedPolicy,
}

impl PathMapping {
    /// Creates a mapping. Rules are re-ordered longest prefix first; rules
    /// with equal prefix length keep their relative order.
    pub fn new(mut rules: Vec<PathRule>, unmatched: UnmatchedPolicy) -> Self {
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { rules, unmatched }
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    pub fn unmatched(&self) -> UnmatchedPolicy {
        self.unmatched
    }

    /// Resolves an archive entry to its destination under `install_root`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::PathTraversal`] if the entry name (or the
    /// matched rule's destination) would leave its destination root.
    pub fn resolve(
        &self,
        entry_name: &str,
        is_directory: bool,
        install_root: &Path,
    ) -> Result<Resolution, InstallError> {
        let traversal = || InstallError::PathTraversal {
            entry: entry_name.to_string(),
        };

        // Checked on the raw name so it fails whatever rule would match.
        let safe_name = sanitize(entry_name).ok_or_else(traversal)?;

        let (root, remainder) = match self.rules.iter().find(|r| entry_name.starts_with(&r.prefix)) {
            Some(rule) => {
                if rule.files_only && is_directory {
                    return Ok(Resolution::Skipped);
                }
                let destination = sanitize(&rule.destination).ok_or_else(traversal)?;
                let remainder = sanitize(&entry_name[rule.prefix.len()..]).ok_or_else(traversal)?;
                (install_root.join(destination), remainder)
            }
            None => match self.unmatched {
                UnmatchedPolicy::Structured => return Ok(Resolution::Skipped),
                UnmatchedPolicy::Flatten => (install_root.to_path_buf(), safe_name),
            },
        };

        let target = root.join(&remainder);
        if !target.starts_with(&root) || !root.starts_with(install_root) {
            return Err(traversal());
        }

        Ok(Resolution::Mapped { root, target })
    }
}

impl Default for PathMapping {
    /// The game archive layout: native libraries, OBB data, then the rest of
    /// the APK contents at the root.
    fn default() -> Self {
        Self::new(
            vec![
                PathRule::new("apk_files/lib/armeabi-v7a/", "lib/armeabi-v7a"),
                PathRule::new("obb/data/", "data"),
                PathRule::new("apk_files/", "").files_only(),
            ],
            UnmatchedPolicy::Structured,
        )
    }
}

/// Turns a slash-separated relative name into a path of plain components.
///
/// Returns `None` for absolute names, `..` components or platform prefixes.
/// Empty and `.` components are dropped.
fn sanitize(name: &str) -> Option<PathBuf> {
    if name.starts_with('/') || name.starts_with('\\') {
        return None;
    }

    let mut path = PathBuf::new();
    for part in name.split(['/', '\\']) {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return None;
        }
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(normal)), None) => path.push(normal),
            _ => return None,
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/games/gtasa")
    }

    fn target_of(resolution: Resolution) -> PathBuf {
        match resolution {
            Resolution::Mapped { target, .. } => target,
            Resolution::Skipped => panic!("entry was skipped"),
        }
    }

    #[test]
    fn test_default_mapping_layout() {
        let mapping = PathMapping::default();

        let lib = mapping
            .resolve("apk_files/lib/armeabi-v7a/libsamp.so", false, &root())
            .unwrap();
        assert_eq!(target_of(lib), root().join("lib/armeabi-v7a/libsamp.so"));

        let img = mapping.resolve("obb/data/gta3.img", false, &root()).unwrap();
        assert_eq!(target_of(img), root().join("data/gta3.img"));

        let dex = mapping.resolve("apk_files/classes.dex", false, &root()).unwrap();
        assert_eq!(target_of(dex), root().join("classes.dex"));

        let nested = mapping
            .resolve("apk_files/assets/texdb/gta3.txt", false, &root())
            .unwrap();
        assert_eq!(target_of(nested), root().join("assets/texdb/gta3.txt"));
    }

    #[test]
    fn test_specific_prefix_wins_regardless_of_order() {
        let mapping = PathMapping::new(
            vec![
                PathRule::new("apk_files/", ""),
                PathRule::new("apk_files/lib/armeabi-v7a/", "lib/armeabi-v7a"),
            ],
            UnmatchedPolicy::Structured,
        );
        assert_eq!(mapping.rules()[0].prefix, "apk_files/lib/armeabi-v7a/");

        let lib = mapping
            .resolve("apk_files/lib/armeabi-v7a/libGTASA.so", false, &root())
            .unwrap();
        assert_eq!(target_of(lib), root().join("lib/armeabi-v7a/libGTASA.so"));
    }

    #[test]
    fn test_equal_length_rules_keep_configured_order() {
        let mapping = PathMapping::new(
            vec![PathRule::new("aa/", "first"), PathRule::new("aa/", "second")],
            UnmatchedPolicy::Structured,
        );
        let resolved = mapping.resolve("aa/x", false, &root()).unwrap();
        assert_eq!(target_of(resolved), root().join("first/x"));
    }

    #[test]
    fn test_unmatched_policies() {
        let structured = PathMapping::default();
        assert_eq!(
            structured.resolve("readme.txt", false, &root()).unwrap(),
            Resolution::Skipped
        );

        let flatten = PathMapping::new(vec![], UnmatchedPolicy::Flatten);
        let resolved = flatten.resolve("docs/readme.txt", false, &root()).unwrap();
        assert_eq!(target_of(resolved), root().join("docs/readme.txt"));
    }

    #[test]
    fn test_files_only_rule_skips_directories() {
        let mapping = PathMapping::default();
        assert_eq!(
            mapping.resolve("apk_files/res/", true, &root()).unwrap(),
            Resolution::Skipped
        );

        // Directory entries under other rules are created.
        let lib_dir = mapping
            .resolve("apk_files/lib/armeabi-v7a/", true, &root())
            .unwrap();
        assert_eq!(target_of(lib_dir), root().join("lib/armeabi-v7a"));
    }

    #[test]
    fn test_traversal_rejected_under_every_policy() {
        let mappings = [
            PathMapping::default(),
            PathMapping::new(vec![], UnmatchedPolicy::Flatten),
            PathMapping::new(vec![], UnmatchedPolicy::Structured),
        ];
        let bad_names = [
            "../evil.so",
            "apk_files/../../evil.so",
            "obb/data/../../../etc/passwd",
            "apk_files/lib/armeabi-v7a/..\\..\\evil.so",
            "/etc/passwd",
            "\\windows\\system32",
        ];

        for mapping in &mappings {
            for name in bad_names {
                let err = mapping.resolve(name, false, &root()).unwrap_err();
                assert!(
                    matches!(err, InstallError::PathTraversal { ref entry } if entry == name),
                    "{} -> {:?}",
                    name,
                    err
                );
            }
        }
    }

    #[test]
    fn test_dot_segments_are_ignored() {
        let mapping = PathMapping::default();
        let resolved = mapping
            .resolve("obb/data/./models//gta3.img", false, &root())
            .unwrap();
        assert_eq!(target_of(resolved), root().join("data/models/gta3.img"));
    }

    #[test]
    fn test_bad_rule_destination_rejected() {
        let mapping = PathMapping::new(
            vec![PathRule::new("obb/", "../outside")],
            UnmatchedPolicy::Structured,
        );
        let err = mapping.resolve("obb/main.obb", false, &root()).unwrap_err();
        assert!(matches!(err, InstallError::PathTraversal { .. }));
    }

    #[test]
    fn test_mapping_json_roundtrip_sorts_rules() {
        let json = r#"{
            "rules": [
                {"prefix": "apk_files/", "files_only": true},
                {"prefix": "apk_files/lib/armeabi-v7a/", "destination": "lib/armeabi-v7a"}
            ],
            "unmatched": "flatten"
        }"#;
        let mapping: PathMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.rules()[0].prefix, "apk_files/lib/armeabi-v7a/");
        assert_eq!(mapping.unmatched(), UnmatchedPolicy::Flatten);
        assert!(mapping.rules()[1].files_only);

        let back: PathMapping =
            serde_json::from_str(&serde_json::to_string(&mapping).unwrap()).unwrap();
        assert_eq!(back, mapping);
    }
}
