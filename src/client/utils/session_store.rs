use keyring::Entry;
use log::{info, warn};
use std::path::PathBuf;

const SERVICE: &str = "linkup_chat";
const USER: &str = "linkup_session";

fn fallback_enabled() -> bool {
    std::env::var("KEYRING_FALLBACK").unwrap_or_default() == "true"
}

fn fallback_path() -> PathBuf {
    std::path::Path::new("data").join("session_token.txt")
}

/// Persist the bearer credential in the OS keyring. The plain file fallback
/// is used only when `KEYRING_FALLBACK=true`.
pub fn save_session_token(token: &str) -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE, USER);
    match entry.set_password(token) {
        Ok(()) => Ok(()),
        Err(e) if fallback_enabled() => {
            let path = fallback_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, token)?;
            // mai il token nei log
            warn!("[SESSION_STORE] Keyring unavailable ({}), token stored in fallback file", e);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("keyring unavailable and file fallback disabled: {}", e)),
    }
}

pub fn load_session_token() -> Option<String> {
    let entry = Entry::new(SERVICE, USER);
    match entry.get_password() {
        Ok(t) if !t.trim().is_empty() => Some(t),
        Ok(_) => None,
        Err(_) if fallback_enabled() => std::fs::read_to_string(fallback_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|t| !t.is_empty()),
        Err(_) => None,
    }
}

pub fn clear_session_token() -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE, USER);
    let _ = entry.delete_password();
    if fallback_enabled() {
        let path = fallback_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    info!("[SESSION_STORE] Stored credential cleared");
    Ok(())
}
