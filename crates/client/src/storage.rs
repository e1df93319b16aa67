//! Cross-platform key-value persistence for small client-side strings.
//!
//! - Web: `localStorage`
//! - Native: one file per key under the platform config directory
//!   (e.g. `~/.config/deskwire/` on Linux)

/// Store a string under `key`. Returns `true` on success.
pub fn save(key: &str, value: &str) -> bool {
    save_raw(key, value)
}

/// Read the string stored under `key`, if any.
pub fn load(key: &str) -> Option<String> {
    load_raw(key)
}

/// Remove the entry stored under `key`. Missing keys are ignored.
pub fn remove(key: &str) {
    remove_raw(key);
}

// =========================================
// Web (WASM) implementation
// =========================================

#[cfg(target_arch = "wasm32")]
fn save_raw(key: &str, value: &str) -> bool {
    if let Some(window) = web_sys::window() {
        if let Ok(Some(storage)) = window.local_storage() {
            return storage.set_item(key, value).is_ok();
        }
    }
    false
}

#[cfg(target_arch = "wasm32")]
fn load_raw(key: &str) -> Option<String> {
    let window = web_sys::window()?;
    let storage = window.local_storage().ok()??;
    storage.get_item(key).ok()?
}

#[cfg(target_arch = "wasm32")]
fn remove_raw(key: &str) {
    if let Some(window) = web_sys::window() {
        if let Ok(Some(storage)) = window.local_storage() {
            let _ = storage.remove_item(key);
        }
    }
}

// =========================================
// Native implementation
// =========================================

#[cfg(not(target_arch = "wasm32"))]
fn file_path(key: &str) -> Option<std::path::PathBuf> {
    let dir = dirs::config_dir()?.join("deskwire");
    if !dir.exists() {
        std::fs::create_dir_all(&dir).ok()?;
    }
    // Sanitize key so it is a valid filename
    let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    Some(dir.join(safe_key))
}

#[cfg(not(target_arch = "wasm32"))]
fn save_raw(key: &str, value: &str) -> bool {
    match file_path(key) {
        Some(path) => std::fs::write(path, value).is_ok(),
        None => false,
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn load_raw(key: &str) -> Option<String> {
    std::fs::read_to_string(file_path(key)?).ok()
}

#[cfg(not(target_arch = "wasm32"))]
fn remove_raw(key: &str) {
    if let Some(path) = file_path(key) {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn save_load_remove_round_trip() {
        let key = format!("storage_test_{}", std::process::id());
        assert!(save(&key, "value-1"));
        assert_eq!(load(&key).as_deref(), Some("value-1"));
        assert!(save(&key, "value-2"));
        assert_eq!(load(&key).as_deref(), Some("value-2"));
        remove(&key);
        assert_eq!(load(&key), None);
        // Removing twice is fine
        remove(&key);
    }
}
