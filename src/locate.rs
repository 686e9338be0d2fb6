// Personal data location - expands the configured glob patterns into the
// concrete file list the personal-data wipe mode operates on.
//
// Enumeration failures are collected into the report instead of being
// swallowed; the caller decides whether a partial listing is acceptable.

use glob::glob;
use serde::Serialize;
use std::path::PathBuf;

/// Default personal data locations: user documents, caches, mail spools and
/// temporary files.
pub const PERSONAL_DATA_PATTERNS: &[&str] = &[
    "/home/*/Documents/**/*",
    "/home/*/Downloads/**/*",
    "/home/*/Pictures/**/*",
    "/home/*/Videos/**/*",
    "/home/*/Music/**/*",
    "/home/*/Desktop/**/*",
    "/home/*/.cache/**/*",
    "/home/*/.local/share/**/*",
    "/tmp/*",
    "/var/tmp/*",
    "/var/spool/mail/*",
];

/// Browser profiles, histories and caches.
pub const BROWSER_DATA_PATTERNS: &[&str] = &[
    "/home/*/.config/google-chrome/**/*",
    "/home/*/.config/chromium/**/*",
    "/home/*/.mozilla/firefox/**/*",
    "/home/*/.config/opera/**/*",
    "/home/*/.thunderbird/**/*",
    "/home/*/.cache/mozilla/**/*",
    "/home/*/.cache/google-chrome/**/*",
    "/home/*/.cache/chromium/**/*",
];

#[derive(Debug, Clone, Serialize)]
pub struct LocateError {
    pub pattern: String,
    pub detail: String,
}

/// Result of one enumeration sweep.
#[derive(Debug, Default, Serialize)]
pub struct LocateReport {
    pub files: Vec<PathBuf>,
    pub errors: Vec<LocateError>,
}

impl LocateReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }
}

/// Expand `patterns` into the matching regular files. Directories are
/// skipped (they are wiped through their contents); unreadable paths and
/// malformed patterns land in `errors`.
pub fn locate_personal_data<S: AsRef<str>>(patterns: &[S]) -> LocateReport {
    let mut report = LocateReport::default();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let paths = match glob(pattern) {
            Ok(paths) => paths,
            Err(e) => {
                report.errors.push(LocateError {
                    pattern: pattern.to_string(),
                    detail: e.to_string(),
                });
                continue;
            }
        };

        for entry in paths {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        report.files.push(path);
                    }
                }
                Err(e) => {
                    report.errors.push(LocateError {
                        pattern: pattern.to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    report.files.sort();
    report.files.dedup();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree_with_files() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::create_dir_all(dir.path().join("cache/sub")).unwrap();
        fs::write(dir.path().join("docs/a.txt"), b"aa").unwrap();
        fs::write(dir.path().join("docs/b.txt"), b"bbbb").unwrap();
        fs::write(dir.path().join("cache/sub/c.bin"), b"cccccc").unwrap();
        dir
    }

    #[test]
    fn matches_files_but_not_directories() {
        let dir = tree_with_files();
        let pattern = format!("{}/**/*", dir.path().display());

        let report = locate_personal_data(&[pattern]);

        assert!(report.is_complete());
        assert_eq!(report.files.len(), 3);
        assert!(report.files.iter().all(|p| p.is_file()));
    }

    #[test]
    fn overlapping_patterns_are_deduplicated() {
        let dir = tree_with_files();
        let wide = format!("{}/**/*", dir.path().display());
        let narrow = format!("{}/docs/*.txt", dir.path().display());

        let report = locate_personal_data(&[wide, narrow]);
        assert_eq!(report.files.len(), 3);
    }

    #[test]
    fn malformed_pattern_is_reported_not_swallowed() {
        let report = locate_personal_data(&["/tmp/[invalid"]);

        assert!(!report.is_complete());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].pattern, "/tmp/[invalid");
    }

    #[test]
    fn unmatched_pattern_is_empty_but_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/no-such-dir/*", dir.path().display());

        let report = locate_personal_data(&[pattern]);
        assert!(report.files.is_empty());
        assert!(report.is_complete());
    }

    #[test]
    fn total_bytes_sums_matched_files() {
        let dir = tree_with_files();
        let pattern = format!("{}/**/*", dir.path().display());

        let report = locate_personal_data(&[pattern]);
        assert_eq!(report.total_bytes(), 2 + 4 + 6);
    }
}
