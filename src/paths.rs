// Filesystem locations for settings, history and scratch audio

use std::path::PathBuf;

const APP_DIR: &str = "ghosttype";

/// Settings file under the platform config directory.
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("settings.json")
}

/// Append-only history file under the platform data directory.
pub fn history_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("history.jsonl")
}

/// Scratch directory for chunk WAVs and retained refinement audio.
pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(APP_DIR)
}

/// Scratch directory, created on first use.
pub fn ensure_scratch_dir() -> std::io::Result<PathBuf> {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_end_with_expected_names() {
        assert!(settings_path().ends_with("ghosttype/settings.json"));
        assert!(history_path().ends_with("ghosttype/history.jsonl"));
    }

    #[test]
    fn test_ensure_scratch_dir_creates_directory() {
        let dir = ensure_scratch_dir().unwrap();
        assert!(dir.is_dir());
    }
}
