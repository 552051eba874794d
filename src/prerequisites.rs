//! Environment checks run before indexing (`rag check`, `rag init`).

use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::scanner::list_markdown_files;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn error(message: String) -> Self {
        Self {
            severity: Severity::Error,
            message,
        }
    }

    fn warning(message: String) -> Self {
        Self {
            severity: Severity::Warning,
            message,
        }
    }
}

/// Problems that would stop or degrade indexing. Empty means ready.
pub fn check_prerequisites(config: &Config) -> Vec<Issue> {
    let mut issues = Vec::new();

    let data_dir = &config.paths.data_dir;
    if !data_dir.is_dir() {
        issues.push(Issue::error(format!(
            "Document directory does not exist: {}",
            data_dir.display()
        )));
    } else {
        match list_markdown_files(data_dir) {
            Ok(files) if files.is_empty() => issues.push(Issue::warning(format!(
                "No markdown files found in {}",
                data_dir.display()
            ))),
            Ok(_) => {}
            Err(e) => issues.push(Issue::error(format!(
                "Failed to scan {}: {}",
                data_dir.display(),
                e
            ))),
        }
    }

    if let Err(e) = ensure_writable_dir(&config.paths.index_dir) {
        issues.push(Issue::error(format!(
            "Cannot create index directory {}: {}",
            config.paths.index_dir.display(),
            e
        )));
    }

    if let Err(e) = config.validate() {
        issues.push(Issue::error(format!("Invalid configuration: {}", e)));
    }

    issues
}

pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Check that `dir` exists and is writable, or could be created. Writes
/// only an anonymous temp file into the nearest existing ancestor.
fn ensure_writable_dir(dir: &Path) -> std::io::Result<()> {
    let existing = dir
        .ancestors()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .find(|p| p.exists())
        .unwrap_or(Path::new("."));
    if !existing.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} is not a directory", existing.display()),
        ));
    }
    tempfile::tempfile_in(existing).map(|_| ())
}

/// Print issues in a table; used by `rag check`.
pub fn print_issues(issues: &[Issue]) {
    if issues.is_empty() {
        println!("All checks passed.");
        return;
    }
    println!("{:<10} MESSAGE", "SEVERITY");
    for issue in issues {
        let label = match issue.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        println!("{:<10} {}", label, issue.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.data_dir = tmp.path().join("data");
        config.paths.index_dir = tmp.path().join("db");
        config
    }

    #[test]
    fn test_missing_data_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        let issues = check_prerequisites(&config_in(&tmp));
        assert_eq!(issues.len(), 1);
        assert!(has_errors(&issues));
    }

    #[test]
    fn test_empty_data_dir_is_warning_only() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        let issues = check_prerequisites(&config_in(&tmp));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(!has_errors(&issues));
    }

    #[test]
    fn test_ready_environment_has_no_issues() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/phb.md"), "# Rules").unwrap();
        assert!(check_prerequisites(&config_in(&tmp)).is_empty());
    }

    #[test]
    fn test_check_does_not_create_index_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/phb.md"), "# Rules").unwrap();
        let mut config = config_in(&tmp);
        config.paths.index_dir = tmp.path().join("storage/db");

        assert!(check_prerequisites(&config).is_empty());
        assert!(!tmp.path().join("storage").exists());
    }

    #[test]
    fn test_index_dir_under_a_file_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/phb.md"), "# Rules").unwrap();
        fs::write(tmp.path().join("blocker"), "").unwrap();
        let mut config = config_in(&tmp);
        config.paths.index_dir = tmp.path().join("blocker/db");

        let issues = check_prerequisites(&config);
        assert!(has_errors(&issues));
        assert!(issues[0].message.starts_with("Cannot create index directory"));
    }

    #[test]
    fn test_invalid_chunking_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/phb.md"), "# Rules").unwrap();
        let mut config = config_in(&tmp);
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        let issues = check_prerequisites(&config);
        assert!(has_errors(&issues));
    }
}
