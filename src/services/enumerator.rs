//! Discovery of per-owner, per-application shinylogs stores
//!
//! Layout: `<home_root>/<owner>/<apps_dir>/<application>/<log_path>`.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Directory under an apps dir that holds server logs, not an application
const SERVER_LOG_DIR: &str = "log";

/// A log store that may exist for one owner's application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub owner: String,
    pub application: String,
    pub path: PathBuf,
}

impl SourceCandidate {
    /// File name used for the staged copy
    pub fn staged_name(&self) -> String {
        format!("{}_{}.sqlite", self.owner, self.application)
    }
}

/// Lists candidate log stores under the owners' home directories
pub struct SourceEnumerator {
    home_root: PathBuf,
    apps_dir: String,
    log_path: PathBuf,
}

impl SourceEnumerator {
    pub fn new(home_root: PathBuf, apps_dir: String, log_path: PathBuf) -> Self {
        Self {
            home_root,
            apps_dir,
            log_path,
        }
    }

    /// Application directories of one owner
    fn app_dirs(&self, owner: &str) -> Vec<PathBuf> {
        let base = self.home_root.join(owner).join(&self.apps_dir);
        let pattern = Path::new(&glob::Pattern::escape(&base.to_string_lossy())).join("*");

        let mut dirs: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map(|paths| {
                paths
                    .filter_map(|e| e.ok())
                    .filter(|p| p.is_dir())
                    .filter(|p| p.file_name().is_some_and(|n| n != SERVER_LOG_DIR))
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();
        dirs
    }

    /// Every (owner, application) log path, whether or not the file exists yet
    pub fn sources(&self, owners: &[String]) -> Vec<SourceCandidate> {
        let mut candidates = Vec::new();
        for owner in owners {
            let dirs = self.app_dirs(owner);
            debug!(owner = %owner, apps = dirs.len(), "scanned apps directory");
            for dir in dirs {
                let Some(application) = dir.file_name().map(|n| n.to_string_lossy().into_owned())
                else {
                    continue;
                };
                candidates.push(SourceCandidate {
                    owner: owner.clone(),
                    application,
                    path: dir.join(&self.log_path),
                });
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn enumerator(home: &Path) -> SourceEnumerator {
        SourceEnumerator::new(
            home.to_path_buf(),
            "ShinyApps".to_string(),
            PathBuf::from("logs/shinylogs.sqlite"),
        )
    }

    #[test]
    fn test_sources_lists_app_directories() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("alice/ShinyApps/sales/logs")).unwrap();
        fs::create_dir_all(home.path().join("alice/ShinyApps/reports")).unwrap();

        let sources = enumerator(home.path()).sources(&["alice".to_string()]);

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].application, "reports");
        assert_eq!(sources[1].application, "sales");
        assert_eq!(
            sources[1].path,
            home.path().join("alice/ShinyApps/sales/logs/shinylogs.sqlite")
        );
    }

    #[test]
    fn test_sources_excludes_log_directory_and_files() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("alice/ShinyApps/log")).unwrap();
        fs::create_dir_all(home.path().join("alice/ShinyApps/sales")).unwrap();
        fs::write(home.path().join("alice/ShinyApps/README"), "x").unwrap();

        let sources = enumerator(home.path()).sources(&["alice".to_string()]);

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].application, "sales");
    }

    #[test]
    fn test_sources_missing_owner_yields_nothing() {
        let home = TempDir::new().unwrap();
        let sources = enumerator(home.path()).sources(&["nobody".to_string()]);
        assert!(sources.is_empty());
    }

    #[test]
    fn test_staged_name() {
        let candidate = SourceCandidate {
            owner: "alice".into(),
            application: "sales".into(),
            path: PathBuf::from("/tmp/x"),
        };
        assert_eq!(candidate.staged_name(), "alice_sales.sqlite");
    }
}
