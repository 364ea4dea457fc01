use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use echoscape_contracts::chat::{help_text, parse_journal_command, JournalCommand};
use echoscape_contracts::crisis;
use echoscape_contracts::sessions::{
    write_summary, CrisisLog, FileSessionStore, MemorySessionStore, SessionStore,
};
use echoscape_contracts::visual::DELTA_KEYS;
use echoscape_engine::config::EngineConfig;
use echoscape_engine::{EchoEngine, ProcessedMessage};
use serde_json::{json, Value};

const DEFAULT_STORE_PATH: &str = ".echoscape/sessions.json";

#[derive(Debug, Parser)]
#[command(name = "echoscape", version, about = "EchoScape journaling companion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive journal session.
    Chat(ChatArgs),
    /// Analyze one piece of text without storing it.
    Analyze(AnalyzeArgs),
    /// Render the base landscape for a session.
    Visual(VisualArgs),
    /// Render a variant of a session's landscape.
    Reframe(ReframeArgs),
    /// Summarize and close a session.
    Summary(SummaryArgs),
    /// List past sessions, or one session's messages and visuals.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
struct StoreArgs {
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Defaults to `crisis_log.jsonl` next to the store.
    #[arg(long)]
    crisis_log: Option<PathBuf>,
}

impl StoreArgs {
    fn crisis_log_path(&self) -> PathBuf {
        match self.crisis_log.as_ref() {
            Some(path) => path.clone(),
            None => sibling_path(&self.store, "crisis_log.jsonl"),
        }
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Resume an existing session instead of starting a new one.
    #[arg(long)]
    session: Option<String>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    text: String,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct VisualArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    session: String,
}

#[derive(Debug, Parser)]
struct ReframeArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    session: String,
    #[arg(long, requires = "intensity", conflicts_with = "deltas")]
    hope: Option<f64>,
    #[arg(long, requires = "hope")]
    intensity: Option<f64>,
    /// Parameter delta as key=value; repeatable.
    #[arg(long = "delta", value_parser = parse_delta)]
    deltas: Vec<(String, f64)>,
    #[arg(long)]
    base: Option<String>,
    #[arg(long)]
    name: Option<String>,
}

#[derive(Debug, Parser)]
struct SummaryArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    session: String,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,
    #[arg(long)]
    session: Option<String>,
    #[arg(long, default_value_t = 20)]
    limit: usize,
    #[arg(long, default_value_t = 0)]
    offset: usize,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("echoscape error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Analyze(args) => run_analyze(args),
        Command::Visual(args) => run_visual(args),
        Command::Reframe(args) => run_reframe(args),
        Command::Summary(args) => run_summary(args),
        Command::History(args) => run_history(args),
    }
}

fn load_config(events: Option<&PathBuf>) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env()?;
    if let Some(path) = events {
        config.events_path = Some(path.clone());
    }
    for warning in &config.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(config)
}

fn open_engine(args: &StoreArgs) -> Result<EchoEngine<FileSessionStore>> {
    let config = load_config(args.events.as_ref())?;
    let store = FileSessionStore::open(&args.store)
        .with_context(|| format!("failed to open session store {}", args.store.display()))?;
    Ok(EchoEngine::from_config(store, &config).with_crisis_log(CrisisLog::new(args.crisis_log_path())))
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut engine = open_engine(&args.store)?;
    let mut session_id = match args.session {
        Some(id) => {
            if engine.store().get_session(&id)?.is_none() {
                bail!("unknown session: {id}");
            }
            id
        }
        None => engine.store_mut().create_session()?.id,
    };
    if !engine.coach().is_configured() {
        println!("No generative model configured; replies and analysis run in offline mode.");
    }
    println!("EchoScape journal started (session {session_id}). Type /help for commands.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_journal_command(&line) {
            JournalCommand::Noop => {}
            JournalCommand::Help => println!("Commands:\n{}", help_text()),
            JournalCommand::Quit => break,
            JournalCommand::NewSession => {
                session_id = engine.store_mut().create_session()?.id;
                println!("New session {session_id}");
            }
            JournalCommand::Message(text) => match engine.process_message(&session_id, &text)? {
                Some(processed) => print_processed(&processed),
                None => println!("Session {session_id} no longer exists; use /new."),
            },
            JournalCommand::Visual => match engine.generate_visual(&session_id)? {
                Some(visual) => println!("Base visual {}: {}", visual.id, visual.image_url),
                None => println!("Session {session_id} no longer exists; use /new."),
            },
            JournalCommand::Reframe {
                deltas,
                variant_name,
            } => match engine.reframe_visual(&session_id, &deltas, None, variant_name.as_deref()) {
                Ok(Some(visual)) => println!("Reframed visual {}: {}", visual.id, visual.image_url),
                Ok(None) => println!("Session {session_id} no longer exists; use /new."),
                Err(err) => println!("Reframe failed: {err:#}"),
            },
            JournalCommand::Mood { hope, intensity } => {
                match engine.reframe_mood(&session_id, hope, intensity)? {
                    Some(reframe) => println!("{}: {}", reframe.mood.to_prompt(), reframe.image_url),
                    None => println!("Session {session_id} no longer exists; use /new."),
                }
            }
            JournalCommand::History => print_history(engine.store(), &session_id)?,
            JournalCommand::Summary => match engine.summarize_session(&session_id) {
                Ok(summary) => {
                    println!("{}", summary.summary);
                    println!(
                        "Themes: {} | primary emotion: {}",
                        summary.themes.join(", "),
                        summary.primary_emotion
                    );
                    session_id = engine.store_mut().create_session()?.id;
                    println!("Session closed. New session {session_id}");
                }
                Err(err) => println!("Summary failed: {err:#}"),
            },
            JournalCommand::Invalid { command, reason } => println!("/{command}: {reason}"),
            JournalCommand::Unknown(command) => {
                println!("Unknown command /{command}. Type /help for commands.")
            }
        }
    }
    Ok(())
}

fn print_processed(processed: &ProcessedMessage) {
    println!("Echo: {}", processed.assistant_message.content);
    let snapshot = &processed.snapshot;
    println!(
        "  [{} {:.2}{} via {}] {}",
        snapshot.primary_emotion,
        snapshot.intensity,
        snapshot
            .secondary_emotion
            .as_deref()
            .map(|value| format!(", {value}"))
            .unwrap_or_default(),
        processed.analysis_provider.as_deref().unwrap_or("neutral"),
        processed.image_url
    );
    if let Some(reason) = processed.image_fallback_reason.as_deref() {
        println!("  (curated image: {reason})");
    }
}

fn print_history<S: SessionStore>(store: &S, session_id: &str) -> Result<()> {
    let messages = store.list_messages(session_id)?;
    if messages.is_empty() {
        println!("No messages yet.");
    }
    for message in messages {
        println!("{}: {}", message.role, message.content);
    }
    for visual in store.list_visuals(session_id)? {
        let label = visual.variant_name.as_deref().unwrap_or("-");
        println!(
            "visual {} ({:?}, {label}): {}",
            visual.id, visual.kind, visual.image_url
        );
    }
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let config = load_config(args.events.as_ref())?;
    let engine = EchoEngine::from_config(MemorySessionStore::new(), &config);
    let crisis = crisis::evaluate(&args.text);
    let outcome = engine.cascade().run(&args.text, engine.events());
    let report = json!({
        "provider": outcome.provider,
        "stages": engine.cascade().stage_names(),
        "snapshot": outcome.snapshot,
        "emotion_vector": outcome.snapshot.to_vector(),
        "crisis": crisis,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

fn run_visual(args: VisualArgs) -> Result<i32> {
    let mut engine = open_engine(&args.store)?;
    let Some(visual) = engine.generate_visual(&args.session)? else {
        bail!("unknown session: {}", args.session);
    };
    println!("{}", serde_json::to_string_pretty(&visual)?);
    Ok(0)
}

fn run_reframe(args: ReframeArgs) -> Result<i32> {
    let mut engine = open_engine(&args.store)?;
    if let (Some(hope), Some(intensity)) = (args.hope, args.intensity) {
        let Some(reframe) = engine.reframe_mood(&args.session, hope, intensity)? else {
            bail!("unknown session: {}", args.session);
        };
        println!("{}", reframe.image_url);
        return Ok(0);
    }
    if args.deltas.is_empty() {
        bail!("reframe needs --hope/--intensity or at least one --delta key=value");
    }
    let deltas = args.deltas.into_iter().collect::<BTreeMap<_, _>>();
    let Some(visual) = engine.reframe_visual(
        &args.session,
        &deltas,
        args.base.as_deref(),
        args.name.as_deref(),
    )?
    else {
        bail!("unknown session: {}", args.session);
    };
    println!("{}", serde_json::to_string_pretty(&visual)?);
    Ok(0)
}

fn run_summary(args: SummaryArgs) -> Result<i32> {
    let mut engine = open_engine(&args.store)?;
    let summary = engine.summarize_session(&args.session)?;
    if let Some(out) = args.out.as_ref() {
        write_summary(out, &summary)?;
        println!("Summary written to {}", out.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(0)
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let store = FileSessionStore::open(&args.store)?;
    if let Some(session_id) = args.session.as_deref() {
        if store.get_session(session_id)?.is_none() {
            bail!("unknown session: {session_id}");
        }
        print_history(&store, session_id)?;
        return Ok(0);
    }
    let listing = session_listing(&store, args.limit, args.offset)?;
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(0)
}

fn session_listing<S: SessionStore>(store: &S, limit: usize, offset: usize) -> Result<Value> {
    let rows = store
        .list_sessions(limit, offset)?
        .into_iter()
        .map(|session| {
            json!({
                "id": session.id,
                "created_at": session.created_at,
                "ended_at": session.ended_at,
                "primary_emotion": session.primary_emotion,
                "summary": session.summary,
                "crisis_detected": session.crisis_detected,
            })
        })
        .collect::<Vec<_>>();
    Ok(Value::Array(rows))
}

fn parse_delta(raw: &str) -> std::result::Result<(String, f64), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected key=value, got '{raw}'"));
    };
    let key = key.trim().to_ascii_lowercase();
    if !DELTA_KEYS.contains(&key.as_str()) {
        return Err(format!("unknown key '{key}' (use {})", DELTA_KEYS.join(", ")));
    }
    match value.trim().parse::<f64>() {
        Ok(number) if number.is_finite() => Ok((key, number)),
        _ => Err(format!("'{value}' is not a number")),
    }
}

fn sibling_path(path: &Path, file_name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use echoscape_contracts::sessions::{FileSessionStore, SessionPatch, SessionStore};

    use super::{parse_delta, session_listing, Cli, Command, DEFAULT_STORE_PATH};

    #[test]
    fn delta_values_are_validated() {
        assert_eq!(parse_delta("Hope=0.4"), Ok(("hope".to_string(), 0.4)));
        assert!(parse_delta("sparkle=1").is_err());
        assert!(parse_delta("warmth=lots").is_err());
        assert!(parse_delta("warmth").is_err());
    }

    #[test]
    fn reframe_accepts_repeated_deltas() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "echoscape",
            "reframe",
            "--session",
            "s1",
            "--delta",
            "hope=0.3",
            "--delta",
            "openness=0.2",
            "--name",
            "brighter",
        ])?;
        let Command::Reframe(args) = cli.command else {
            anyhow::bail!("expected reframe");
        };
        assert_eq!(
            args.deltas,
            vec![("hope".to_string(), 0.3), ("openness".to_string(), 0.2)]
        );
        assert_eq!(args.name.as_deref(), Some("brighter"));
        assert_eq!(args.store.store, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(
            args.store.crisis_log_path(),
            PathBuf::from(".echoscape/crisis_log.jsonl")
        );
        Ok(())
    }

    #[test]
    fn mood_sliders_conflict_with_deltas() {
        let both = Cli::try_parse_from([
            "echoscape", "reframe", "--session", "s1", "--hope", "0.8", "--intensity", "0.2",
            "--delta", "hope=0.1",
        ]);
        assert!(both.is_err());
        let half = Cli::try_parse_from(["echoscape", "reframe", "--session", "s1", "--hope", "0.8"]);
        assert!(half.is_err());
    }

    #[test]
    fn summary_takes_optional_output() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "echoscape",
            "summary",
            "--session",
            "s1",
            "--store",
            "/tmp/journal/sessions.json",
            "--out",
            "/tmp/journal/summary.json",
        ])?;
        let Command::Summary(args) = cli.command else {
            anyhow::bail!("expected summary");
        };
        assert_eq!(args.out, Some(PathBuf::from("/tmp/journal/summary.json")));
        assert_eq!(
            args.store.crisis_log_path(),
            PathBuf::from("/tmp/journal/crisis_log.jsonl")
        );
        Ok(())
    }

    #[test]
    fn history_lists_newest_sessions_first() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("sessions.json");
        let mut store = FileSessionStore::open(&path)?;
        let older = store.create_session()?;
        let newer = store.create_session()?;
        store.update_session(
            &older.id,
            SessionPatch {
                summary: Some("closed".to_string()),
                ..SessionPatch::default()
            },
        )?;

        let store_arg = path.to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "echoscape",
            "history",
            "--store",
            store_arg.as_str(),
            "--limit",
            "5",
        ])?;
        let Command::History(args) = cli.command else {
            anyhow::bail!("expected history");
        };
        assert_eq!((args.limit, args.offset), (5, 0));

        let listing = session_listing(&FileSessionStore::open(&path)?, args.limit, args.offset)?;
        let rows = listing.as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], serde_json::json!(newer.id));
        assert_eq!(rows[1]["summary"], serde_json::json!("closed"));

        let paged = session_listing(&store, 1, 1)?;
        assert_eq!(paged.as_array().map(Vec::len), Some(1));
        Ok(())
    }
}
