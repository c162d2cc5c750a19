//! Upgrade a configuration file in place, keeping a backup of the original.

use std::path::PathBuf;

use chrono::Utc;
use semver::Version;
use tracing::info;

use super::{MigrationStep, document_version, upgrade};
use crate::config::{CiCdKind, ConfigStore};
use crate::error::DeployResult;

#[derive(Debug, Clone, PartialEq)]
pub enum UpgradeStatus {
    AlreadyUpToDate(Version),
    Upgraded {
        from: Option<Version>,
        to: Version,
        backup: PathBuf,
        notices: Vec<String>,
        /// CI workflow files embed the version and must be rendered again.
        rerender_ci: bool,
    },
}

/// Migrate the file behind `store` to `finish`.
///
/// The original is copied to `<file>.<version>.backup` (`old` for unversioned
/// files) before the upgraded document is written. A file that already
/// records `finish` is left alone.
pub fn upgrade_config_file(
    store: &ConfigStore,
    finish: &Version,
    table: &[MigrationStep],
) -> DeployResult<UpgradeStatus> {
    let mut document = store.load_document()?;
    let from = document_version(&document)?;
    if from.as_ref() == Some(finish) {
        info!(version = %finish, "configuration already up to date");
        return Ok(UpgradeStatus::AlreadyUpToDate(finish.clone()));
    }

    let outcome = upgrade(&mut document, finish, table)?;

    let suffix = from
        .as_ref()
        .map(Version::to_string)
        .unwrap_or_else(|| "old".to_string());
    let backup = if store.backup_path(&suffix).exists() {
        store.backup(&format!("{suffix}.{}", Utc::now().format("%Y%m%d%H%M%S")))?
    } else {
        store.backup(&suffix)?
    };
    store.save_document(&document)?;
    info!(
        path = %store.config_path().display(),
        backup = %backup.display(),
        to = %finish,
        "configuration upgraded"
    );

    let rerender_ci = document
        .get("ci_cd")
        .and_then(|ci| ci.get("type"))
        .and_then(|kind| serde_yaml::from_value::<CiCdKind>(kind.clone()).ok())
        .is_some_and(|kind| matches!(kind, CiCdKind::GithubActions | CiCdKind::GitlabCi));

    Ok(UpgradeStatus::Upgraded {
        from: outcome.from,
        to: outcome.to,
        backup,
        notices: outcome.notices,
        rerender_ci,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILENAME;
    use crate::error::DeployError;
    use crate::upgrade::MIGRATIONS;
    use tempfile::TempDir;

    fn store_with(content: &str) -> (TempDir, ConfigStore) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, content).unwrap();
        (tmp, ConfigStore::new(path))
    }

    #[test]
    fn current_file_is_left_alone() {
        let content = "project_name: demo\nprovider: local\nversion: 2024.9.1\n";
        let (_tmp, store) = store_with(content);

        let status = upgrade_config_file(&store, &Version::new(2024, 9, 1), MIGRATIONS).unwrap();

        assert_eq!(
            status,
            UpgradeStatus::AlreadyUpToDate(Version::new(2024, 9, 1))
        );
        assert_eq!(std::fs::read_to_string(store.config_path()).unwrap(), content);
        assert!(!store.backup_path("2024.9.1").exists());
    }

    #[test]
    fn upgrade_writes_backup_and_new_version() {
        let content = "project_name: demo\nprovider: local\nversion: 2024.4.1\nci_cd:\n  type: github-actions\n";
        let (_tmp, store) = store_with(content);

        let status = upgrade_config_file(&store, &Version::new(2024, 9, 1), MIGRATIONS).unwrap();

        let UpgradeStatus::Upgraded {
            backup, rerender_ci, ..
        } = status
        else {
            panic!("expected an upgrade");
        };
        assert!(rerender_ci);
        assert_eq!(backup, store.backup_path("2024.4.1"));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), content);
        assert_eq!(store.load_document().unwrap()["version"], "2024.9.1");
    }

    #[test]
    fn existing_backup_is_not_overwritten() {
        let (_tmp, store) = store_with("project_name: demo\nprovider: local\nversion: 2024.4.1\n");
        std::fs::write(store.backup_path("2024.4.1"), "earlier").unwrap();

        let status = upgrade_config_file(&store, &Version::new(2024, 9, 1), MIGRATIONS).unwrap();

        let UpgradeStatus::Upgraded { backup, .. } = status else {
            panic!("expected an upgrade");
        };
        assert_ne!(backup, store.backup_path("2024.4.1"));
        assert_eq!(
            std::fs::read_to_string(store.backup_path("2024.4.1")).unwrap(),
            "earlier"
        );
    }

    #[test]
    fn newer_file_is_rejected_and_untouched() {
        let content = "project_name: demo\nprovider: local\nversion: 2030.1.1\n";
        let (_tmp, store) = store_with(content);

        let err = upgrade_config_file(&store, &Version::new(2024, 9, 1), MIGRATIONS).unwrap_err();

        assert!(matches!(err, DeployError::Config(_)));
        assert_eq!(std::fs::read_to_string(store.config_path()).unwrap(), content);
    }
}
