use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::PathBuf;

use crate::api::{AuthError, ChatBackend, IdentityClaim};
use crate::models::UserProfile;

/// An authenticated session: the user's identity plus the opaque
/// credential sent with every backend call. The credential is immutable
/// while the session is active; profile edits touch `user` only.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserProfile,
    pub token: String,
}

/// On-disk form of a Session. The token is base64-obfuscated so the raw
/// credential never sits in the file verbatim.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    user: UserProfile,
    token: String,
}

/// Exchange an identity claim for a Session.
///
/// Required fields are checked locally first; an incomplete claim fails
/// with `InvalidClaim` before any network I/O. Nothing is persisted here;
/// the caller decides whether to call `save_session`.
pub async fn authenticate(
    backend: &dyn ChatBackend,
    claim: &IdentityClaim,
) -> Result<Session, AuthError> {
    if let Some(field) = claim.missing_field() {
        return Err(AuthError::InvalidClaim(format!("missing field: {}", field)));
    }

    let response = backend.authenticate(claim).await?;
    info!("Authenticated as {} (user id {})", response.user.name, response.user.id);

    Ok(Session {
        user: response.user,
        token: response.token,
    })
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("nuntius");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

static SESSION_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Redirect session storage to an explicit path. Primarily for tests;
/// once set it stays set for the process lifetime.
pub fn set_session_path_override(path: PathBuf) {
    let _ = SESSION_PATH_OVERRIDE.set(path);
}

fn get_session_path() -> Result<PathBuf> {
    if let Some(path) = SESSION_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("session.json"))
}

/// Persist the session to local storage.
pub fn save_session(session: &Session) -> Result<()> {
    let stored = StoredSession {
        user: session.user.clone(),
        token: BASE64.encode(&session.token),
    };

    let path = get_session_path()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &stored)?;

    info!("Session saved for {}", session.user.name);
    Ok(())
}

/// Restore a previously persisted session without touching the network.
///
/// Returns Ok(None) when no session file exists or when the file is
/// malformed; a corrupt file must never block startup, it just means the
/// user logs in again.
pub fn load_session() -> Result<Option<Session>> {
    let path = get_session_path()?;

    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)?;
    let stored: StoredSession = match serde_json::from_str(&contents) {
        Ok(stored) => stored,
        Err(e) => {
            warn!("Ignoring malformed session file {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    let token = match BASE64
        .decode(&stored.token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    {
        Some(token) if !token.is_empty() => token,
        _ => {
            warn!("Ignoring session file with undecodable credential");
            return Ok(None);
        }
    };

    info!("Restored session for {} from {}", stored.user.name, path.display());
    Ok(Some(Session {
        user: stored.user,
        token,
    }))
}

/// Remove the persisted session. This is the only way a session ends
/// before credential expiry.
pub fn clear_session() -> Result<()> {
    let path = get_session_path()?;
    if path.exists() {
        fs::remove_file(&path)?;
        info!("Cleared persisted session");
    }
    Ok(())
}
