use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::unbounded_channel;

use hebrew_trainer::config::{self, Config};
use hebrew_trainer::database::{self, MemoryScoreStore, ScoreStore, SqliteScoreStore};
use hebrew_trainer::diagnostics::TracingDiagnostics;
use hebrew_trainer::logging;
use hebrew_trainer::presentation::ConsolePresenter;
use hebrew_trainer::recognition::{ConsoleMicrophone, ConsoleRecognizer};
use hebrew_trainer::scheduler::{Clock, SystemClock};
use hebrew_trainer::trainer::{
    format_duration, Collaborators, Stage, TrainerOptions, TrainingStateMachine,
};
use hebrew_trainer::words::WordList;

/// Hebrew trainer - read each word aloud, then say what it means
#[derive(Parser)]
#[command(name = "hebrew-trainer", version, about)]
struct Cli {
    /// Config file (defaults to ~/.hebrew-trainer/config.json)
    #[arg(short, long, env = "HEBREW_TRAINER_CONFIG")]
    config: Option<PathBuf>,

    /// JSON word list to practise instead of the configured one
    #[arg(short, long)]
    words: Option<PathBuf>,

    /// Skip the English translation stage
    #[arg(long)]
    hebrew_only: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Don't write a log file
    #[arg(long)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a training run (default)
    Train,
    /// Show the best time and recent runs
    Best {
        /// Number of recent runs to list
        #[arg(short, long, default_value = "5")]
        runs: usize,
    },
    /// Forget the best time
    ResetBest,
}

/// A line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleInput {
    /// Spoken text, heard as final
    Final(String),
    /// `~text`: spoken text still being recognised
    Interim(String),
    /// `:test`
    Simulate,
    /// `:restart`
    Restart,
    /// `:exit`
    Exit,
    /// `:quit`
    Quit,
    Unknown(String),
    Empty,
}

fn parse_input(line: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }
    if let Some(text) = line.strip_prefix('~') {
        return ConsoleInput::Interim(text.trim().to_string());
    }
    if let Some(command) = line.strip_prefix(':') {
        return match command.trim().to_lowercase().as_str() {
            "test" => ConsoleInput::Simulate,
            "restart" => ConsoleInput::Restart,
            "exit" => ConsoleInput::Exit,
            "quit" | "q" => ConsoleInput::Quit,
            other => ConsoleInput::Unknown(other.to_string()),
        };
    }
    ConsoleInput::Final(line.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::get_config_path);
    let mut config = config::load_config(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".into(),
        _ => config.logging.level = "trace".into(),
    }
    if cli.no_log_file {
        config.logging.log_to_file = false;
    }
    if let Ok(Some(path)) = logging::init_logging(&config.logging) {
        tracing::debug!("Logging to {:?}", path);
    }

    match cli.command.unwrap_or(Command::Train) {
        Command::Train => train(cli.words, cli.hebrew_only, config).await,
        Command::Best { runs } => show_best(runs),
        Command::ResetBest => {
            let mut store = SqliteScoreStore::open_default()?;
            store.clear_best_score()?;
            println!("Best time cleared.");
            Ok(())
        }
    }
}

fn show_best(limit: usize) -> anyhow::Result<()> {
    let store = SqliteScoreStore::open_default()?;
    match store.get_best_score()? {
        Some(best) => println!("Best time: {}", format_duration(best)),
        None => println!("No completed runs yet."),
    }

    let runs = store.recent_runs(limit)?;
    if !runs.is_empty() {
        println!("\nRecent runs ({} total):", store.count_runs()?);
        for run in runs {
            println!(
                "  {}  {:>8}  {} words{}{}",
                run.completed_at,
                format_duration(run.elapsed_seconds),
                run.word_count,
                if run.hebrew_only { ", Hebrew only" } else { "" },
                if run.is_new_best { "  (best)" } else { "" },
            );
        }
    }
    Ok(())
}

fn load_words(override_path: Option<PathBuf>, config: &Config) -> anyhow::Result<WordList> {
    match override_path.or_else(|| config.training.word_list_path.clone()) {
        Some(path) => WordList::load(&path)
            .with_context(|| format!("loading word list from {}", path.display())),
        None => Ok(WordList::builtin()),
    }
}

fn open_scores() -> Box<dyn ScoreStore> {
    match SqliteScoreStore::open(&database::get_database_path()) {
        Ok(store) => Box::new(store),
        Err(e) => {
            tracing::error!("Best scores won't be saved: {}", e);
            Box::new(MemoryScoreStore::new())
        }
    }
}

fn print_help() {
    println!("Type what you say and press Enter. Prefix with ~ for a partial result.");
    println!("Commands: :test (answer for me), :restart, :exit, :quit");
}

async fn train(words: Option<PathBuf>, hebrew_only: bool, config: Config) -> anyhow::Result<()> {
    let words = load_words(words, &config)?;
    let mut options = TrainerOptions::from_config(&config);
    options.hebrew_only_mode |= hebrew_only;

    let (tx, mut events) = unbounded_channel();
    let (recognizer, microphone) = ConsoleRecognizer::new(tx);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut machine = TrainingStateMachine::new(
        words,
        Box::new(recognizer),
        Collaborators {
            presenter: Box::new(ConsolePresenter::stdout()),
            scores: open_scores(),
            diagnostics: Arc::new(TracingDiagnostics),
            clock: clock.clone(),
        },
        options,
    )?;

    print_help();
    machine.begin_run();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let wait = machine
            .next_deadline()
            .map(|deadline| Duration::from_millis((deadline - clock.now_ms()).max(0) as u64))
            .unwrap_or(Duration::from_secs(3600));

        tokio::select! {
            Some(event) = events.recv() => machine.handle_recognition_event(event),
            _ = tokio::time::sleep(wait) => machine.tick(),
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                if !handle_input(&mut machine, &microphone, parse_input(&line)) {
                    break;
                }
            }
        }
    }

    machine.exit();
    tracing::info!("Goodbye");
    Ok(())
}

/// Apply one console line; returns false to quit
fn handle_input(
    machine: &mut TrainingStateMachine,
    microphone: &ConsoleMicrophone,
    input: ConsoleInput,
) -> bool {
    match input {
        ConsoleInput::Final(text) | ConsoleInput::Interim(text)
            if machine.stage() == Stage::Complete || machine.stage() == Stage::Start =>
        {
            tracing::debug!("Ignoring {:?} outside a run", text);
            println!("(no run in progress, type :restart)");
        }
        ConsoleInput::Final(text) => {
            if !microphone.hear(&text, true) {
                println!("(not listening yet)");
            }
        }
        ConsoleInput::Interim(text) => {
            if !microphone.hear(&text, false) {
                println!("(not listening yet)");
            }
        }
        ConsoleInput::Simulate => {
            if !machine.simulate_correct_answer() {
                println!("(nothing to answer)");
            }
        }
        ConsoleInput::Restart => machine.restart(),
        ConsoleInput::Exit => {
            machine.exit();
            println!("Run abandoned. Type :restart to begin again or :quit to leave.");
        }
        ConsoleInput::Quit => return false,
        ConsoleInput::Unknown(command) => {
            println!("Unknown command :{}", command);
            print_help();
        }
        ConsoleInput::Empty => {}
    }
    true
}
