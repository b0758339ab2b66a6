//! GLITCH command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use glitch::{
    choose_model, parse_batch, ClientConfig, GenerationClient, Locale, Messages,
    RuleSource, RuleSupplier, SessionConfig,
};
use glitch_cli::config::{build_session, resolve_api_key, resolve_base_url, API_KEY_ENV};
use glitch_cli::repl;

#[derive(Parser)]
#[command(
    name = "glitch",
    about = "GLITCH — twisted house rules for the board game on your table",
    version
)]
struct Cli {
    /// Generation API key. Also reads GLITCH_API_KEY or ~/.glitch/api_key.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Generation API base URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Interface and rule language (en, he).
    #[arg(long, global = true, default_value = "en")]
    lang: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// What to generate rules for.
#[derive(Args, Default)]
struct Selection {
    /// Quick-pick game (monopoly, taki, catan, poker, rummikub, uno).
    #[arg(short, long)]
    game: Option<String>,

    /// Any other game, by name.
    #[arg(short, long)]
    name: Option<String>,

    /// Photo of the board instead of a name.
    #[arg(short, long)]
    photo: Option<PathBuf>,

    /// Vibe of the rules (chaotic, drinking, funny).
    #[arg(long, default_value = "chaotic")]
    vibe: String,

    /// Invent rules even for games the model does not recognise.
    #[arg(long)]
    lenient: bool,
}

impl Selection {
    fn is_empty(&self) -> bool {
        self.game.is_none() && self.name.is_none() && self.photo.is_none()
    }

    fn build(&self) -> anyhow::Result<SessionConfig> {
        build_session(
            self.game.as_deref(),
            self.name.as_deref(),
            self.photo.as_deref(),
            &self.vibe,
            self.lenient,
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Play interactively (default).
    Play {
        #[command(flatten)]
        selection: Selection,

        /// Start the session immediately.
        #[arg(long)]
        start: bool,
    },

    /// Fetch one batch of rules and print it.
    Rules {
        #[command(flatten)]
        selection: Selection,

        /// Print the batch as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// List available models and show which one would be used.
    Models,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   glitch completions bash > ~/.local/share/bash-completion/completions/glitch
    ///   glitch completions zsh > ~/.zfunc/_glitch
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn locale(lang: &str) -> anyhow::Result<Locale> {
    Locale::from_key(lang).with_context(|| format!("unsupported language '{lang}' (en, he)"))
}

fn client(cli: &Cli, locale: Locale) -> anyhow::Result<GenerationClient> {
    let api_key = resolve_api_key(cli.api_key.as_deref()).with_context(|| {
        format!("no API key: pass --api-key, set {API_KEY_ENV}, or write ~/.glitch/api_key")
    })?;
    let config = ClientConfig::new(api_key)
        .with_base_url(resolve_base_url(cli.base_url.as_deref()))
        .with_locale(locale);
    Ok(GenerationClient::new(config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.take().unwrap_or(Commands::Play {
        selection: Selection::default(),
        start: false,
    });

    match command {
        Commands::Play { selection, start } => {
            let locale = locale(&cli.lang)?;
            let client = Arc::new(client(&cli, locale)?);
            let supplier = RuleSupplier::new(client, Messages::for_locale(locale));

            let initial = if selection.is_empty() {
                None
            } else {
                Some(selection.build()?)
            };
            if start {
                let config = initial.clone().context("--start needs --game, --name or --photo")?;
                supplier.start(config)?;
            }

            let renderer = tokio::spawn(repl::render_events(
                supplier.events(),
                supplier.messages().clone(),
            ));
            tokio::task::block_in_place(|| repl::run(&supplier, initial))?;
            drop(supplier);
            renderer.abort();
        }

        Commands::Rules { selection, json } => {
            let locale = locale(&cli.lang)?;
            let messages = Messages::for_locale(locale);
            let config = selection.build()?;
            let client = client(&cli, locale)?;

            let raw = client.fetch_raw(&config).await?;
            let rules = repl::batch_rules(parse_batch(&raw, &messages), &messages)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                for (i, rule) in rules.iter().enumerate() {
                    println!("{:>2}. {rule}", i + 1);
                }
            }
        }

        Commands::Models => {
            let client = client(&cli, Locale::default())?;
            let names = client.list_models().await?;
            let chosen = choose_model(&names, glitch::DEFAULT_MODEL);
            for name in &names {
                let marker = if *name == chosen { "*" } else { " " };
                println!("{marker} {name}");
            }
            if names.is_empty() {
                println!("No models listed; would use {chosen}");
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "glitch", &mut std::io::stdout());
        }
    }

    Ok(())
}
