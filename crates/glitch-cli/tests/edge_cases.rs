//! Edge case integration tests for the glitch CLI.
//!
//! Covers session selection from command-line input and card rendering.

use glitch::{parse_batch, KnownGame, Locale, Messages, Vibe};
use glitch_cli::config::{build_session, resolve_base_url};
use glitch_cli::repl::{batch_rules, render_card};

// ─────────────────────── helpers ───────────────────────

fn width_of(line: &str) -> usize {
    line.chars().count()
}

// ═══════════════════════════════════════════════════════
// SESSION SELECTION
// ═══════════════════════════════════════════════════════

#[test]
fn test_game_keys_are_case_insensitive() {
    let config = build_session(Some("  RUMMIKUB "), None, None, "DRINKING", false).unwrap();
    assert_eq!(config.game, Some(KnownGame::Rummikub));
    assert_eq!(config.vibe, Vibe::Drinking);
}

#[test]
fn test_blank_name_does_not_count() {
    assert!(build_session(None, Some("   "), None, "chaotic", false).is_err());
}

#[test]
fn test_custom_name_wins_over_game_in_display() {
    let config = build_session(Some("uno"), Some("Uno Flip"), None, "funny", false).unwrap();
    assert_eq!(config.game_name(&Messages::default()), "Uno Flip");
}

#[test]
fn test_unsupported_photo_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.txt");
    std::fs::write(&path, "not an image").unwrap();

    let err = build_session(None, None, Some(path.as_path()), "chaotic", false).unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_missing_photo_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.png");
    assert!(build_session(None, None, Some(path.as_path()), "chaotic", false).is_err());
}

#[test]
fn test_explicit_base_url_used() {
    assert_eq!(
        resolve_base_url(Some("http://127.0.0.1:9000")),
        "http://127.0.0.1:9000"
    );
}

// ═══════════════════════════════════════════════════════
// CARD RENDERING
// ═══════════════════════════════════════════════════════

#[test]
fn test_card_fits_hebrew_text() {
    let card = render_card("כל מי שזורק שש חייב לשיר את שם המשבצת", 30);
    assert!(card.iter().all(|l| width_of(l) == 30));
}

#[test]
fn test_card_for_max_length_rule() {
    let rule = "x".repeat(199);
    let card = render_card(&rule, 36);
    // 199 chars at 32 per line is 7 body lines plus the two borders.
    assert_eq!(card.len(), 9);
}

#[test]
fn test_tiny_card_width_still_renders() {
    let card = render_card("go left", 2);
    assert!(card.len() >= 3);
}

// ═══════════════════════════════════════════════════════
// ONE-SHOT BATCHES
// ═══════════════════════════════════════════════════════

#[test]
fn test_unknown_game_batch_is_an_error() {
    let messages = Messages::for_locale(Locale::He);
    let err = batch_rules(parse_batch("```\nUNKNOWN_GAME\n```", &messages), &messages)
        .unwrap_err();
    assert_eq!(err.to_string(), messages.unknown_game);
}

#[test]
fn test_batch_rules_pass_through() {
    let messages = Messages::default();
    let rules = batch_rules(parse_batch(r#"["swap seats", "  hum  "]"#, &messages), &messages)
        .unwrap();
    assert_eq!(rules, vec!["swap seats", "hum"]);
}
