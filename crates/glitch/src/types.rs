//! Core data types for game sessions and the rule pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::PhotoPayload;
use crate::messages::Messages;

/// Board games offered as one-tap choices on the home screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownGame {
    Monopoly,
    Taki,
    Catan,
    Poker,
    Rummikub,
    Uno,
}

impl KnownGame {
    pub const ALL: [KnownGame; 6] = [
        KnownGame::Monopoly,
        KnownGame::Taki,
        KnownGame::Catan,
        KnownGame::Poker,
        KnownGame::Rummikub,
        KnownGame::Uno,
    ];

    /// Stable lowercase key, used on the command line and in logs.
    pub fn key(self) -> &'static str {
        match self {
            KnownGame::Monopoly => "monopoly",
            KnownGame::Taki => "taki",
            KnownGame::Catan => "catan",
            KnownGame::Poker => "poker",
            KnownGame::Rummikub => "rummikub",
            KnownGame::Uno => "uno",
        }
    }

    /// Look up a game by key, ignoring case.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.into_iter().find(|g| g.key() == key)
    }
}

/// Tone of the generated rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vibe {
    #[default]
    Chaotic,
    Drinking,
    Funny,
}

impl Vibe {
    pub const ALL: [Vibe; 3] = [Vibe::Chaotic, Vibe::Drinking, Vibe::Funny];

    pub fn key(self) -> &'static str {
        match self {
            Vibe::Chaotic => "chaotic",
            Vibe::Drinking => "drinking",
            Vibe::Funny => "funny",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.into_iter().find(|v| v.key() == key)
    }
}

/// Everything the user chose before booting a session.
///
/// Immutable for the lifetime of a session: the supplier clones it into
/// every fetch it issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub game: Option<KnownGame>,
    pub custom_name: Option<String>,
    pub photo: Option<PhotoPayload>,
    pub vibe: Vibe,
    /// When set, the model must recognise the game (or see a photo) before
    /// it invents rules; otherwise it answers with the unknown-game sentinel.
    pub require_recognition: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game: None,
            custom_name: None,
            photo: None,
            vibe: Vibe::default(),
            require_recognition: true,
        }
    }
}

impl SessionConfig {
    pub fn for_game(game: KnownGame) -> Self {
        Self {
            game: Some(game),
            ..Self::default()
        }
    }

    pub fn for_custom_name(name: impl Into<String>) -> Self {
        Self {
            custom_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn for_photo(photo: PhotoPayload) -> Self {
        Self {
            photo: Some(photo),
            ..Self::default()
        }
    }

    pub fn with_vibe(mut self, vibe: Vibe) -> Self {
        self.vibe = vibe;
        self
    }

    pub fn with_recognition(mut self, require: bool) -> Self {
        self.require_recognition = require;
        self
    }

    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    fn custom_name_trimmed(&self) -> Option<&str> {
        self.custom_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Name of the game as it should appear in the prompt.
    ///
    /// A typed name wins over a picked game.
    pub fn game_name(&self, messages: &Messages) -> String {
        if let Some(name) = self.custom_name_trimmed() {
            return name.to_string();
        }
        match self.game {
            Some(game) => messages.game_name(game).to_string(),
            None => "unknown game".to_string(),
        }
    }

    /// Reject configs that give the model nothing to work with.
    pub fn validate(&self) -> GlitchResult<()> {
        if self.game.is_none() && self.custom_name_trimmed().is_none() && self.photo.is_none() {
            return Err(GlitchError::InvalidInput(
                "pick a game, type a game name, or attach a photo".to_string(),
            ));
        }
        Ok(())
    }
}

/// Network activity of the supplier. At most one fetch is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    #[default]
    Idle,
    FetchingInitial,
    FetchingRefill,
}

impl FetchState {
    pub fn is_in_flight(self) -> bool {
        !matches!(self, FetchState::Idle)
    }
}

/// Which screen the presentation layer should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Home,
    Loading,
    Playing,
}

/// Point-in-time view of the supplier, published on every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupplierSnapshot {
    pub session_id: Option<Uuid>,
    pub phase: Phase,
    pub queue_len: usize,
    pub fetch_state: FetchState,
    pub fetching: bool,
    pub cooling_down: bool,
    pub auto_mode: bool,
    /// Delay drawn for the pending auto-mode timer, if one is armed.
    pub auto_delay_ms: Option<u64>,
    pub current_rule: String,
    pub face_up: bool,
    pub unknown_game: bool,
    pub reveals: u64,
}

/// Discrete notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplierEvent {
    /// The initial fetch finished and the play screen can be shown.
    Ready { queued: usize },
    /// The model did not recognise the game.
    UnknownGame,
    FetchFailed { initial: bool, message: String },
    /// A card was revealed. `from_queue` is false for the loading placeholder.
    Revealed { rule: String, from_queue: bool },
    /// Fire the haptic/audio glitch feedback.
    Glitch,
}

/// Errors that can occur in the GLITCH library.
#[derive(thiserror::Error, Debug)]
pub enum GlitchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No API key configured")]
    MissingApiKey,
}

/// Convenience result type.
pub type GlitchResult<T> = Result<T, GlitchError>;
