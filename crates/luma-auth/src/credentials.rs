//! Credential persistence for OAuth tokens
//!
//! One JSON record (`{accessToken, refreshToken, expiresAt, scope}`) at a
//! configurable path, default `~/.glowctl/credentials.json`. Writes use
//! atomic temp-file + rename so a concurrent reader never observes a torn
//! file, and both the file (0600) and its directory (0700) are owner-only.
//! There is no cross-process locking — glowctl is a single-user local tool
//! and concurrent invocations racing on this file is accepted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A complete set of OAuth credentials.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a
/// delta), computed at storage time from the token endpoint's `expires_in`
/// seconds. A record with any empty field is invalid and never observed by
/// callers: construction goes through [`CredentialSet::new`], and
/// deserialization routes through the same check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCredentialSet")]
pub struct CredentialSet {
    /// Bearer token for API calls
    pub access_token: String,
    /// Refresh token for obtaining new access tokens
    pub refresh_token: String,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
    /// Space-separated scopes the tokens were granted
    pub scope: String,
}

impl CredentialSet {
    /// Validating constructor: `None` if any field is empty or the expiry
    /// is zero. A record failing this is treated as absent, never as a
    /// partial state.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: u64,
        scope: impl Into<String>,
    ) -> Option<Self> {
        let credential = Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            scope: scope.into(),
        };
        if credential.access_token.is_empty()
            || credential.refresh_token.is_empty()
            || credential.expires_at == 0
            || credential.scope.is_empty()
        {
            return None;
        }
        Some(credential)
    }

    /// Whether the access token expires within `buffer_minutes` from now.
    /// The boundary itself counts as expiring.
    pub fn is_expiring(&self, buffer_minutes: u64) -> bool {
        self.is_expiring_at(now_millis(), buffer_minutes)
    }

    /// Expiry check against an explicit clock, for deterministic tests.
    pub fn is_expiring_at(&self, now_ms: u64, buffer_minutes: u64) -> bool {
        self.expires_at <= now_ms + buffer_minutes * 60_000
    }
}

/// Wire shape accepted during deserialization. Missing fields default to
/// empty so validation produces one uniform "invalid record" outcome
/// instead of a field-specific serde error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredentialSet {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_at: u64,
    #[serde(default)]
    scope: String,
}

impl TryFrom<RawCredentialSet> for CredentialSet {
    type Error = String;

    fn try_from(raw: RawCredentialSet) -> std::result::Result<Self, String> {
        CredentialSet::new(raw.access_token, raw.refresh_token, raw.expires_at, raw.scope)
            .ok_or_else(|| "credential record is missing required fields".into())
    }
}

/// Current time as unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// File-backed store for the single credential record.
///
/// The file is the source of truth; every call re-reads it rather than
/// caching, so a record written by one glowctl invocation is visible to
/// the next.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the credential file.
    ///
    /// Returns `None` — never an error — when the file is absent,
    /// unreadable, unparseable, or fails record validation. Each condition
    /// is logged.
    pub async fn load(&self) -> Option<CredentialSet> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no credential file, not logged in");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "credential file unreadable, treating as absent");
                return None;
            }
        };

        match serde_json::from_str::<CredentialSet>(&contents) {
            Ok(credential) => {
                debug!(path = %self.path.display(), "loaded credentials");
                Some(credential)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "credential file invalid, treating as absent");
                None
            }
        }
    }

    /// Persist a credential record.
    ///
    /// Creates the parent directory (0700) if absent, then writes via a
    /// temp file in the same directory renamed over the target. File mode
    /// is 0600 — the record contains live OAuth tokens.
    pub async fn save(&self, credential: &CredentialSet) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

        if !dir.exists() {
            create_private_dir(dir).await?;
        }

        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

        let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

        // Set 0600 permissions (unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, perms)
                .await
                .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

        debug!(path = %self.path.display(), "persisted credentials");
        Ok(())
    }

    /// Remove the credential file (logout).
    ///
    /// An already-absent file is success; any other filesystem error
    /// propagates.
    pub async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "deleted credentials");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("deleting credential file: {e}"))),
        }
    }
}

/// Create a directory recursively with owner-only (0700) permissions.
async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(dir)
        .await
        .map_err(|e| Error::Io(format!("creating credential directory: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credential() -> CredentialSet {
        CredentialSet::new("at_luma_1", "rt_luma_1", 1_735_500_000_000, "lights:read")
            .expect("valid test credential")
    }

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("glow").join("credentials.json"))
    }

    #[test]
    fn constructor_rejects_empty_fields() {
        assert!(CredentialSet::new("", "rt", 1, "s").is_none());
        assert!(CredentialSet::new("at", "", 1, "s").is_none());
        assert!(CredentialSet::new("at", "rt", 0, "s").is_none());
        assert!(CredentialSet::new("at", "rt", 1, "").is_none());
        assert!(CredentialSet::new("at", "rt", 1, "s").is_some());
    }

    #[test]
    fn is_expiring_boundary_is_inclusive() {
        let now = 1_700_000_000_000u64;
        let mut credential = test_credential();

        credential.expires_at = now + 5 * 60_000;
        assert!(credential.is_expiring_at(now, 5), "boundary counts as expiring");

        credential.expires_at = now + 5 * 60_000 + 1;
        assert!(!credential.is_expiring_at(now, 5));

        credential.expires_at = now - 1;
        assert!(credential.is_expiring_at(now, 5), "already expired");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_string(&test_credential()).unwrap();
        assert!(json.contains("\"accessToken\""));
        assert!(json.contains("\"refreshToken\""));
        assert!(json.contains("\"expiresAt\""));
        assert!(json.contains("\"scope\""));
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let credential = test_credential();
        store.save(&credential).await.unwrap();

        let loaded = store.load().await.expect("credential must load");
        assert_eq!(loaded, credential);
    }

    #[tokio::test]
    async fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().await.is_none());
    }

    #[tokio::test]
    async fn load_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "not json {{{").await.unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn load_record_missing_scope_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(
            &path,
            r#"{"accessToken":"at","refreshToken":"rt","expiresAt":1735500000000}"#,
        )
        .await
        .unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().await.is_none(), "partial record must be absent");
    }

    #[tokio::test]
    async fn load_record_with_empty_token_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(
            &path,
            r#"{"accessToken":"","refreshToken":"rt","expiresAt":1735500000000,"scope":"s"}"#,
        )
        .await
        .unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_file_and_absent_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&test_credential()).await.unwrap();
        assert!(store.path().exists());

        store.delete().await.unwrap();
        assert!(!store.path().exists());

        // Second delete: file already absent, still success
        store.delete().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_0600_and_directory_0700() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&test_credential()).await.unwrap();

        let file_mode = tokio::fs::metadata(store.path())
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(file_mode, 0o600, "credential file must be 0600, got {file_mode:o}");

        let dir_mode = tokio::fs::metadata(store.path().parent().unwrap())
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "credential dir must be 0700, got {dir_mode:o}");
    }

    #[tokio::test]
    async fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&test_credential()).await.unwrap();
        let newer = CredentialSet::new("at_luma_2", "rt_luma_2", 1_800_000_000_000, "lights:read")
            .unwrap();
        store.save(&newer).await.unwrap();

        assert_eq!(store.load().await.unwrap(), newer);
    }
}
