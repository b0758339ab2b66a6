//! Interactive REPL for GLITCH.
//!
//! Launch with `glitch play` (or just `glitch`) to enter interactive mode.
//! Type `/help` for available commands, Tab for completion.

use std::path::Path;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use tokio::sync::broadcast;

use glitch::{
    is_supported_format, BatchOutcome, KnownGame, Messages, Phase, PhotoPayload, RuleSupplier, SessionConfig,
    SupplierEvent, SupplierSnapshot, Vibe,
};

use crate::config::{game_keys, history_path, vibe_keys};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/game", "Pick a game, or type any game name"),
    ("/photo", "Attach a photo of the board (off to remove)"),
    ("/vibe", "Set the vibe (chaotic, drinking, funny)"),
    ("/strict", "Require the model to recognise the game (on|off)"),
    ("/start", "Start a session with the current choices"),
    ("/next", "Reveal the next rule (or just press Enter)"),
    ("/auto", "Reveal rules on a random timer (on|off)"),
    ("/status", "Show queue and session state"),
    ("/home", "End the session and go back"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

const CARD_WIDTH: usize = 36;

/// REPL helper for tab completion.
#[derive(Default)]
struct GlitchHelper;

fn word_pairs<'a>(words: impl Iterator<Item = &'a str>, prefix: &str) -> Vec<Pair> {
    words
        .filter(|w| w.starts_with(prefix))
        .map(|w| Pair {
            display: w.to_string(),
            replacement: format!("{w} "),
        })
        .collect()
}

fn image_files(prefix: &str) -> Vec<Pair> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(".") {
        for entry in entries.flatten() {
            let path = entry.path();
            if is_supported_format(&path) {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    files.push(name.to_string());
                }
            }
        }
    }
    files.sort();
    word_pairs(files.iter().map(String::as_str), prefix)
}

impl Completer for GlitchHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<10} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        let args = args.trim_start();
        let prefix_start = input.len() - args.len();

        let matches = match cmd {
            "/game" => word_pairs(KnownGame::ALL.iter().map(|g| g.key()), args),
            "/vibe" => word_pairs(Vibe::ALL.iter().map(|v| v.key()), args),
            "/auto" | "/strict" => word_pairs(["on", "off"].into_iter(), args),
            "/photo" => image_files(args),
            _ => return Ok((pos, Vec::new())),
        };
        Ok((prefix_start, matches))
    }
}

impl Hinter for GlitchHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for GlitchHelper {}
impl Validator for GlitchHelper {}
impl Helper for GlitchHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Choices made on the home screen, applied on `/start`.
struct ReplState {
    draft: SessionConfig,
}

impl ReplState {
    fn new(initial: Option<SessionConfig>) -> Self {
        Self {
            draft: initial.unwrap_or_default(),
        }
    }
}

/// Run the interactive REPL.
///
/// Blocks the calling thread; call it from `block_in_place` when inside the
/// runtime, since the supplier spawns its timers there.
pub fn run(supplier: &RuleSupplier, initial: Option<SessionConfig>) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[35m\u{25c9}\x1b[0m \x1b[1mglitch v{}\x1b[0m \x1b[90m\u{2014} house rules nobody asked for\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Pick a \x1b[36m/game\x1b[0m, then \x1b[36m/start\x1b[0m. \x1b[90mEnter\x1b[0m deals a card, \x1b[90m/exit\x1b[0m quits."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<GlitchHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(GlitchHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = history_path();
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState::new(initial);
    let prompt = " \x1b[35mglitch>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    cmd_next(supplier);
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Game over.");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "game" => cmd_game(args, supplier, &mut state),
                    "photo" => cmd_photo(args, supplier, &mut state),
                    "vibe" => cmd_vibe(args, &mut state),
                    "strict" => cmd_strict(args, &mut state),
                    "start" => cmd_start(supplier, &state),
                    "next" | "n" => cmd_next(supplier),
                    "auto" => cmd_auto(args, supplier),
                    "status" => cmd_status(supplier, &state),
                    "home" => {
                        supplier.reset();
                        eprintln!("  Back home. Your choices are kept.");
                    }
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Game over.");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    supplier.reset();
    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(Path::new(".")));
    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<12} {desc}");
    }
    eprintln!();
    eprintln!("  Games: {}", game_keys());
    eprintln!("  Tip: Tab completes commands, games, vibes and image files.");
    eprintln!();
}

/// A quick-pick key selects that game; anything else is a typed name.
fn cmd_game(args: &str, supplier: &RuleSupplier, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /game <{}|any name>", game_keys().replace(", ", "|"));
        return;
    }
    let draft = &mut state.draft;
    draft.photo = None;
    match KnownGame::from_key(args) {
        Some(game) => {
            draft.game = Some(game);
            draft.custom_name = Some(supplier.messages().game_name(game).to_string());
        }
        None => {
            draft.game = None;
            draft.custom_name = Some(args.to_string());
        }
    }
    supplier.dismiss_unknown_game();
    eprintln!(
        "  Game: \x1b[1m{}\x1b[0m",
        draft.game_name(supplier.messages())
    );
}

fn cmd_photo(args: &str, supplier: &RuleSupplier, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /photo <image file> | /photo off");
        return;
    }
    let draft = &mut state.draft;
    if args == "off" {
        draft.photo = None;
        supplier.dismiss_unknown_game();
        eprintln!("  Photo removed.");
        return;
    }
    match PhotoPayload::from_file(args) {
        Ok(photo) => {
            draft.photo = Some(photo);
            draft.game = None;
            draft.custom_name = None;
            supplier.dismiss_unknown_game();
            eprintln!("  Photo attached: {args}");
        }
        Err(e) => eprintln!("  Cannot use photo: {e}"),
    }
}

fn cmd_vibe(args: &str, state: &mut ReplState) {
    match Vibe::from_key(args) {
        Some(vibe) => {
            state.draft.vibe = vibe;
            eprintln!("  Vibe: {}", vibe.key());
        }
        None => eprintln!("  Usage: /vibe <{}>", vibe_keys().replace(", ", "|")),
    }
}

fn cmd_strict(args: &str, state: &mut ReplState) {
    match parse_switch(args) {
        Some(on) => {
            state.draft.require_recognition = on;
            eprintln!("  Strict recognition: {}", if on { "on" } else { "off" });
        }
        None => eprintln!("  Usage: /strict on|off"),
    }
}

fn cmd_start(supplier: &RuleSupplier, state: &ReplState) {
    match supplier.start(state.draft.clone()) {
        Ok(()) => eprintln!(
            "  \x1b[90mGenerating rules for {}...\x1b[0m",
            state.draft.game_name(supplier.messages())
        ),
        Err(_) => eprintln!("  Pick a /game or attach a /photo first."),
    }
}

fn cmd_next(supplier: &RuleSupplier) {
    let snap = supplier.snapshot();
    if snap.phase != Phase::Playing {
        eprintln!("  No game running. Pick a /game and /start.");
        return;
    }
    if !supplier.next() {
        eprintln!("  \x1b[90mRecharging...\x1b[0m");
    }
}

fn cmd_auto(args: &str, supplier: &RuleSupplier) {
    match parse_switch(args) {
        Some(on) => {
            supplier.set_auto_mode(on);
            eprintln!("  Auto mode: {}", if on { "on" } else { "off" });
        }
        None => eprintln!("  Usage: /auto on|off"),
    }
}

fn cmd_status(supplier: &RuleSupplier, state: &ReplState) {
    let snap = supplier.snapshot();
    eprintln!();
    eprintln!(
        "  Game:      {}",
        state.draft.game_name(supplier.messages())
    );
    eprintln!("  Vibe:      {}", state.draft.vibe.key());
    eprintln!("  Photo:     {}", if state.draft.has_photo() { "yes" } else { "no" });
    for line in status_lines(&snap) {
        eprintln!("  {line}");
    }
    eprintln!();
}

fn status_lines(snap: &SupplierSnapshot) -> Vec<String> {
    let phase = match snap.phase {
        Phase::Home => "home",
        Phase::Loading => "loading",
        Phase::Playing => "playing",
    };
    let mut lines = vec![
        format!("Phase:     {phase}"),
        format!("Queued:    {}", snap.queue_len),
        format!("Fetching:  {}", if snap.fetching { "yes" } else { "no" }),
        format!("Cooldown:  {}", if snap.cooling_down { "yes" } else { "no" }),
    ];
    match snap.auto_delay_ms {
        Some(ms) if snap.auto_mode => lines.push(format!("Auto:      on (next in ~{}s)", ms / 1000)),
        _ => lines.push(format!("Auto:      {}", if snap.auto_mode { "on" } else { "off" })),
    }
    lines.push(format!("Revealed:  {}", snap.reveals));
    if snap.unknown_game {
        lines.push("Warning:   the model did not recognise the last game".to_string());
    }
    lines
}

fn parse_switch(args: &str) -> Option<bool> {
    match args.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Print supplier events until the supplier goes away.
pub async fn render_events(mut events: broadcast::Receiver<SupplierEvent>, messages: Messages) {
    loop {
        match events.recv().await {
            Ok(event) => render_event(&event, &messages),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Event renderer skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn render_event(event: &SupplierEvent, messages: &Messages) {
    match event {
        SupplierEvent::Ready { queued } => {
            eprintln!("\r  \x1b[32m\u{25cf}\x1b[0m {queued} rules ready. Press Enter to deal.");
        }
        SupplierEvent::UnknownGame => {
            eprintln!("\r  \x1b[33m!\x1b[0m {}", messages.unknown_game);
        }
        SupplierEvent::FetchFailed { initial, message } => {
            let what = if *initial { "Fetch failed" } else { "Refill failed" };
            eprintln!("\r  \x1b[90m{what}: {message}\x1b[0m");
        }
        SupplierEvent::Revealed { rule, from_queue } => {
            eprintln!();
            let colour = if *from_queue { "\x1b[1m" } else { "\x1b[90m" };
            for line in render_card(rule, CARD_WIDTH) {
                eprintln!("  {colour}{line}\x1b[0m");
            }
        }
        SupplierEvent::Glitch => {
            eprint!("\x07");
            eprintln!("  \x1b[35m\u{2593}\u{2592}\u{2591} G L I T C H \u{2591}\u{2592}\u{2593}\x1b[0m");
        }
    }
}

/// Rules of a one-shot batch; an unrecognised game is an error.
pub fn batch_rules(outcome: BatchOutcome, messages: &Messages) -> anyhow::Result<Vec<String>> {
    match outcome {
        BatchOutcome::Rules(rules) => Ok(rules),
        BatchOutcome::UnknownGame => anyhow::bail!("{}", messages.unknown_game),
    }
}

/// Box a rule into a card `width` characters wide, word-wrapped.
pub fn render_card(rule: &str, width: usize) -> Vec<String> {
    let inner = width.saturating_sub(4).max(1);
    let mut lines = vec![format!("\u{250c}{}\u{2510}", "\u{2500}".repeat(inner + 2))];
    for text in wrap(rule, inner) {
        let pad = inner - text.chars().count();
        lines.push(format!("\u{2502} {text}{} \u{2502}", " ".repeat(pad)));
    }
    lines.push(format!("\u{2514}{}\u{2518}", "\u{2500}".repeat(inner + 2)));
    lines
}

/// Greedy word wrap by character count; words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for chunk in chars.chunks(width) {
            let chunk: String = chunk.iter().collect();
            let chunk_len = chunk.chars().count();
            if len > 0 && len + 1 + chunk_len > width {
                lines.push(std::mem::take(&mut current));
                len = 0;
            }
            if len > 0 {
                current.push(' ');
                len += 1;
            }
            current.push_str(&chunk);
            len += chunk_len;
        }
    }
    if len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_lines_have_equal_width() {
        let card = render_card(
            "Whoever rolls doubles must narrate their next move like a sports commentator",
            24,
        );
        assert!(card.len() > 3);
        let widths: Vec<usize> = card.iter().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == 24), "{widths:?}");
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let lines = wrap("aaaaaaaaaa bb", 4);
        assert_eq!(lines, vec!["aaaa", "aaaa", "aa", "bb"]);
    }

    #[test]
    fn test_wrap_empty_is_one_blank_line() {
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn test_parse_switch() {
        assert_eq!(parse_switch("ON"), Some(true));
        assert_eq!(parse_switch("off"), Some(false));
        assert_eq!(parse_switch("maybe"), None);
    }

    #[test]
    fn test_status_lines_flag_unknown_game() {
        let snap = SupplierSnapshot {
            phase: Phase::Playing,
            queue_len: 4,
            auto_mode: true,
            auto_delay_ms: Some(61_000),
            unknown_game: true,
            ..Default::default()
        };
        let lines = status_lines(&snap);
        assert!(lines.contains(&"Phase:     playing".to_string()));
        assert!(lines.contains(&"Auto:      on (next in ~61s)".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("Warning:")));
    }
}
