//! Configuration loading and resolution.
//!
//! The API key is never baked into the binary. It is taken from, in order:
//! the `--api-key` flag, the `GLITCH_API_KEY` environment variable,
//! `./.glitch/api_key`, and `~/.glitch/api_key`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};

use glitch::{KnownGame, PhotoPayload, SessionConfig, Vibe, DEFAULT_BASE_URL};

pub const API_KEY_ENV: &str = "GLITCH_API_KEY";
pub const BASE_URL_ENV: &str = "GLITCH_BASE_URL";

const KEY_FILE: &str = ".glitch/api_key";

/// Resolve the API key from the flag, environment, or a key file.
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    let env_value = std::env::var(API_KEY_ENV).ok();
    let candidates = [PathBuf::from(KEY_FILE), home_dir().join(KEY_FILE)];
    resolve_api_key_in(explicit, env_value.as_deref(), &candidates)
}

fn resolve_api_key_in(
    explicit: Option<&str>,
    env_value: Option<&str>,
    key_files: &[PathBuf],
) -> Option<String> {
    if let Some(key) = non_empty(explicit) {
        return Some(key);
    }
    if let Some(key) = non_empty(env_value) {
        return Some(key);
    }
    key_files.iter().find_map(|path| read_key_file(path))
}

fn read_key_file(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    tracing::debug!("Read API key from {}", path.display());
    non_empty(Some(&contents))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the API base URL.
pub fn resolve_base_url(explicit: Option<&str>) -> String {
    non_empty(explicit)
        .or_else(|| non_empty(std::env::var(BASE_URL_ENV).ok().as_deref()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

pub fn history_path() -> PathBuf {
    home_dir().join(".glitch_history")
}

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

/// Build a session config from command-line style choices.
///
/// A photo or a typed name takes the place of a picked game.
pub fn build_session(
    game: Option<&str>,
    name: Option<&str>,
    photo: Option<&Path>,
    vibe: &str,
    lenient: bool,
) -> anyhow::Result<SessionConfig> {
    let vibe = Vibe::from_key(vibe).ok_or_else(|| {
        anyhow!("unknown vibe '{vibe}' (expected one of: {})", vibe_keys())
    })?;

    let game = match game {
        Some(key) => Some(
            KnownGame::from_key(key)
                .ok_or_else(|| anyhow!("unknown game '{key}' (expected one of: {})", game_keys()))?,
        ),
        None => None,
    };

    let photo = match photo {
        Some(path) => Some(PhotoPayload::from_file(path)?),
        None => None,
    };

    let config = SessionConfig {
        game,
        custom_name: non_empty(name),
        photo,
        vibe,
        require_recognition: !lenient,
    };
    if config.validate().is_err() {
        bail!("pick a game with --game, type one with --name, or attach --photo");
    }
    Ok(config)
}

pub fn game_keys() -> String {
    KnownGame::ALL
        .iter()
        .map(|g| g.key())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn vibe_keys() -> String {
    Vibe::ALL
        .iter()
        .map(|v| v.key())
        .collect::<Vec<_>>()
        .join(", ")
}
