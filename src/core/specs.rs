//! Stored group spec management
//!
//! Specs are standalone JSON files containing a [`GroupSpec`]. Named specs
//! live in the application's data directory under `specs/`, each with a
//! SHA-256 sidecar written on save. Specs can also be read from any path.

use crate::core::error::{Error, Result, SpecError};
use crate::core::permission::GroupSpec;
use crate::utils::get_data_dir;
use std::path::{Path, PathBuf};

/// Maximum number of permissions accepted from a spec file
///
/// Limit prevents memory exhaustion from malformed files.
pub const MAX_PERMISSIONS: usize = 1000;

/// Validates a stored spec name for filesystem safety.
///
/// Constraints:
/// - Alphanumeric, underscores, and hyphens only
/// - Max 64 chars
/// - Rejects "." and ".."
pub fn validate_spec_name(name: &str) -> std::result::Result<(), SpecError> {
    if name.is_empty() {
        return Err(SpecError::InvalidName("Name cannot be empty".into()));
    }

    if name.len() > 64 {
        return Err(SpecError::InvalidName("Name too long (max 64 chars)".into()));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SpecError::InvalidName(
            "Name contains invalid characters (use only a-z, 0-9, _, -)".into(),
        ));
    }

    if name == "." || name == ".." {
        return Err(SpecError::InvalidName("Invalid name".into()));
    }

    Ok(())
}

fn checksum(json: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parses a spec document, enforcing [`MAX_PERMISSIONS`].
pub fn parse_spec(json: &str, origin: &str) -> Result<GroupSpec> {
    let spec: GroupSpec = serde_json::from_str(json)?;
    if spec.permissions.len() > MAX_PERMISSIONS {
        return Err(Error::Validation {
            field: "permissions".to_string(),
            message: format!(
                "{origin} contains {} permissions (max: {MAX_PERMISSIONS})",
                spec.permissions.len()
            ),
        });
    }
    Ok(spec)
}

/// Reads a spec from an arbitrary file.
pub async fn load_spec_file(path: &Path) -> Result<GroupSpec> {
    let json = tokio::fs::read_to_string(path).await?;
    parse_spec(&json, &path.display().to_string())
}

/// Directory of named specs
#[derive(Debug, Clone)]
pub struct SpecStore {
    dir: PathBuf,
}

impl SpecStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `<data dir>/specs`.
    pub fn open_default() -> Result<Self> {
        let mut dir = get_data_dir().ok_or(SpecError::DataDirUnavailable)?;
        dir.push("specs");
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of a named spec, validating the name first.
    pub fn spec_path(&self, name: &str) -> Result<PathBuf> {
        validate_spec_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::create_dir_all(&self.dir).await?;
        }
        Ok(())
    }

    /// Lists stored spec names, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        self.ensure_dir().await?;
        let mut names = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.is_file()
                && path.extension().and_then(|s| s.to_str()) == Some("json")
                && let Some(name) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Loads a named spec. A checksum mismatch warns but does not fail,
    /// since specs are meant to be edited by hand.
    pub async fn load(&self, name: &str) -> Result<GroupSpec> {
        let path = self.spec_path(name)?;

        if !tokio::fs::try_exists(&path).await? {
            return Err(SpecError::NotFound(name.to_string()).into());
        }

        let json = tokio::fs::read_to_string(&path).await?;

        let mut checksum_path = path.clone();
        checksum_path.set_extension("json.sha256");

        if let Ok(expected) = tokio::fs::read_to_string(&checksum_path).await {
            let actual = checksum(&json);
            if expected.trim() != actual {
                tracing::warn!(
                    "Spec '{}' checksum mismatch (expected: {}, got: {})",
                    name,
                    expected.trim(),
                    actual
                );
            }
        }

        parse_spec(&json, name)
    }

    /// Saves a spec atomically and records its checksum.
    pub async fn save(&self, name: &str, spec: &GroupSpec) -> Result<PathBuf> {
        let path = self.spec_path(name)?;
        self.ensure_dir().await?;
        let json = serde_json::to_string_pretty(spec)?;

        let mut temp_path = path.clone();
        temp_path.set_extension("json.tmp");

        #[cfg(unix)]
        {
            use tokio::fs::OpenOptions;
            use tokio::io::AsyncWriteExt;

            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .mode(0o600)
                .open(&temp_path)
                .await?;

            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }

        #[cfg(not(unix))]
        {
            tokio::fs::write(&temp_path, &json).await?;
        }

        tokio::fs::rename(&temp_path, &path).await?;

        let mut checksum_path = path.clone();
        checksum_path.set_extension("json.sha256");
        tokio::fs::write(checksum_path, checksum(&json)).await?;

        Ok(path)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.spec_path(name)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(SpecError::NotFound(name.to_string()).into());
        }
        tokio::fs::remove_file(&path).await?;

        let mut checksum_path = path;
        checksum_path.set_extension("json.sha256");
        if tokio::fs::try_exists(&checksum_path).await? {
            tokio::fs::remove_file(checksum_path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::permission::PermissionRule;

    fn sample() -> GroupSpec {
        GroupSpec::new("web", "vpc-1", "us-east-1")
            .with_permission(PermissionRule::icmp_any(["10.0.0.0/8"]))
    }

    #[test]
    fn test_spec_name_validation() {
        assert!(validate_spec_name("web-prod_1").is_ok());
        assert!(validate_spec_name("").is_err());
        assert!(validate_spec_name("../etc").is_err());
        assert!(validate_spec_name("a b").is_err());
        assert!(validate_spec_name(&"x".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_save_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path().join("specs"));

        store.save("web", &sample()).await.unwrap();
        store.save("db", &GroupSpec::new("db", "vpc-1", "us-east-1")).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["db", "web"]);
        assert_eq!(store.load("web").await.unwrap(), sample());

        store.delete("web").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["db"]);
        assert!(!dir.path().join("specs/web.json.sha256").exists());
    }

    #[tokio::test]
    async fn test_load_missing_spec() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, Error::Spec(SpecError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_edited_spec_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());
        let path = store.save("web", &sample()).await.unwrap();

        let mut edited = sample();
        edited.region = "eu-west-1".to_string();
        std::fs::write(&path, serde_json::to_string(&edited).unwrap()).unwrap();

        assert_eq!(store.load("web").await.unwrap().region, "eu-west-1");
    }

    #[test]
    fn test_parse_spec_enforces_limit() {
        let mut spec = GroupSpec::new("big", "vpc-1", "us-east-1");
        for port in 0..=i32::try_from(MAX_PERMISSIONS).unwrap() {
            spec.permissions.push(PermissionRule::new(
                crate::core::permission::Protocol::Tcp,
                port,
                port,
                ["10.0.0.0/8"],
            ));
        }
        let json = serde_json::to_string(&spec).unwrap();
        let err = parse_spec(&json, "big.json").unwrap_err();
        assert!(err.to_string().contains("max: 1000"));
    }
}
