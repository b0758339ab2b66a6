//! Prompt construction for rule generation.

use crate::messages::{Locale, Messages};
use crate::parse::UNKNOWN_GAME_SENTINEL;
use crate::types::{SessionConfig, Vibe};

/// Rules requested per batch.
pub const RULES_PER_BATCH: usize = 10;

fn style_example(vibe: Vibe) -> &'static str {
    match vibe {
        Vibe::Chaotic => "Wild, unhinged rules that flip the game upside down. Example: \"Whoever's winning swaps places with whoever's losing - surprise, you're last now\"",
        Vibe::Drinking => "Drinking rules with clear triggers and a party vibe. Example: \"Rolled an even number? Take a sip and make the player across from you drink too\"",
        Vibe::Funny => "Family-friendly silly rules with goofy challenges. Example: \"Whoever's turn it is must speak in a British accent - break character and go back 3 spaces\"",
    }
}

const WRITING_RULES: &str = "\
MANDATORY writing rules:
1. Every rule MUST be specific to this game - use real elements from the game
2. Structure: clear condition -> clear action -> funny twist
3. Length: 8-20 words per rule (not too short!)
4. Write in a fun, casual tone - like a friend explaining house rules
5. Sound like something someone would actually say at game night, not a rulebook
6. No emojis in the rules themselves";

const EXAMPLES: &str = "\
Good examples:
- \"Rolled doubles? Nice, you get another turn - but you have to swap seats with the player on your left\"
- \"Landed on someone's property? Pay double rent AND give them a genuine compliment\"
- \"Buying a property? You gotta sing about it or the deal's off\"
- \"Got three of a kind? Pass them to the player on your right... sorry about that\"

Bad examples:
- \"Double turn!\" - unclear what triggers it
- \"Swap!\" - swap what with whom?
- \"Player skips\" - why and when?

Game-specific elements:
- Monopoly: spaces, streets, money, properties, hotels, bank, jail
- Card games (Taki/UNO): cards, colors, +2/+4, reverse, hands, draw pile
- Catan: resources, settlements, roads, development cards, robber
- Dice games: rolls, specific numbers, doubles, snake eyes
- Rummikub: tiles, runs, groups, jokers";

/// Build the generation prompt for a session.
pub fn build_prompt(config: &SessionConfig, messages: &Messages) -> String {
    let game_name = config.game_name(messages);

    let subject = if config.has_photo() {
        format!(
            "Analyze this image:
1. Identify the game name
2. Read all visible rules and mechanics
3. Identify specific elements (cards, dice, tiles, categories, resources, etc.)
4. Create {RULES_PER_BATCH} GLITCH rules based directly on the mechanics you identified"
        )
    } else if config.require_recognition {
        format!(
            "The game: {game_name}

First check:
- Do you know the game \"{game_name}\" and its mechanics?
- If yes - continue creating rules
- If not - return exactly: \"{UNKNOWN_GAME_SENTINEL}\""
        )
    } else {
        format!("The game: {game_name}")
    };

    let closing = if config.has_photo() {
        "Base your rules only on what you see in the image. Create rules that match the specific mechanics of this game.".to_string()
    } else {
        format!(
            "Identify \"{game_name}\", understand its unique mechanics, and create rules that twist the original rules in creative ways."
        )
    };

    let language = match messages.locale {
        Locale::En => String::new(),
        other => format!("\nWrite every rule in {} only.", other.language_name()),
    };

    format!(
        "You are the GLITCH engine - a system that creates hilariously twisted rules for board games.

{subject}

Vibe: {vibe}
Style example: {style}

{WRITING_RULES}
7. Return exactly {RULES_PER_BATCH} rules
8. Format: JSON array of strings only

{EXAMPLES}

Do NOT create generic rules that could work for any game!
Do NOT add markdown or explanations!
Only JSON: [\"rule 1\", \"rule 2\", ...]{language}

{closing}
",
        vibe = messages.vibe_name(config.vibe),
        style = style_example(config.vibe),
    )
}
