//! Localized strings the supplier itself can put on a card.

use serde::{Deserialize, Serialize};

use crate::types::{KnownGame, Vibe};

/// Display language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    He,
}

impl Locale {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Locale::En),
            "he" | "hebrew" => Some(Locale::He),
            _ => None,
        }
    }

    /// Language name as the model should read it.
    pub fn language_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::He => "Hebrew",
        }
    }
}

/// Placeholder texts and display names for one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Messages {
    pub locale: Locale,
    pub corrupt_rule: &'static str,
    pub data_error: &'static str,
    /// Queued in place of a batch when the initial fetch fails.
    pub network_errors: [&'static str; 3],
    pub loading_more: &'static str,
    pub unknown_game: &'static str,
}

impl Messages {
    pub fn for_locale(locale: Locale) -> Self {
        match locale {
            Locale::En => Self {
                locale,
                corrupt_rule: "Corrupted rule",
                data_error: "Data error",
                network_errors: [
                    "Network hiccup",
                    "Check your internet",
                    "Give it another shot",
                ],
                loading_more: "Loading more...",
                unknown_game: "Don't know that game. Try snapping a pic of the rules or the box for a better experience!",
            },
            Locale::He => Self {
                locale,
                corrupt_rule: "חוק משובש",
                data_error: "שגיאת נתונים",
                network_errors: ["⚠️ תקלה ברשת", "בדוק חיבור אינטרנט", "נסה שוב"],
                loading_more: "טוען עוד נתונים...",
                unknown_game: "לא מכיר את המשחק הזה. נסה לצלם את הקופסה או את החוקים!",
            },
        }
    }

    pub fn game_name(&self, game: KnownGame) -> &'static str {
        match (self.locale, game) {
            (Locale::En, KnownGame::Monopoly) => "Monopoly",
            (Locale::En, KnownGame::Taki) => "Taki",
            (Locale::En, KnownGame::Catan) => "Catan",
            (Locale::En, KnownGame::Poker) => "Poker",
            (Locale::En, KnownGame::Rummikub) => "Rummikub",
            (Locale::En, KnownGame::Uno) => "UNO",
            (Locale::He, KnownGame::Monopoly) => "מונופול",
            (Locale::He, KnownGame::Taki) => "טאקי",
            (Locale::He, KnownGame::Catan) => "קטאן",
            (Locale::He, KnownGame::Poker) => "פוקר",
            (Locale::He, KnownGame::Rummikub) => "רמיקוב",
            (Locale::He, KnownGame::Uno) => "אונו",
        }
    }

    pub fn vibe_name(&self, vibe: Vibe) -> &'static str {
        match (self.locale, vibe) {
            (Locale::En, Vibe::Chaotic) => "Chaos",
            (Locale::En, Vibe::Drinking) => "Drinks",
            (Locale::En, Vibe::Funny) => "Silly",
            (Locale::He, Vibe::Chaotic) => "כאוס",
            (Locale::He, Vibe::Drinking) => "שתייה (18+)",
            (Locale::He, Vibe::Funny) => "שטותי",
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::for_locale(Locale::default())
    }
}
