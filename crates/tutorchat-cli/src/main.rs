use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tutorchat_contracts::attachments::InlineImage;
use tutorchat_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use tutorchat_contracts::models::ModelRegistry;
use tutorchat_contracts::modes::SupportMode;
use tutorchat_contracts::transcript::{Message, Role};
use tutorchat_engine::attachments::load_image_attachment;
use tutorchat_engine::settings::{masked_key, SettingsStore};
use tutorchat_engine::{EngineOptions, TutorEngine, NO_CREDENTIALS_MESSAGE};

#[derive(Debug, Parser)]
#[command(name = "tutorchat", version, about = "Math tutoring chat in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat loop.
    Chat(ChatArgs),
    /// Ask a single question and print the reply.
    Ask(AskArgs),
    /// Inspect or change the saved settings.
    Settings(SettingsArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "hint")]
    mode: String,
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct SettingsArgs {
    #[arg(long)]
    settings: PathBuf,
    #[command(subcommand)]
    action: SettingsAction,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    Show,
    SetKey {
        key: String,
    },
    ClearKey,
    /// Without a model the preference is removed.
    SetModel {
        model: Option<String>,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tutorchat error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat_native(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask_native(args),
        Command::Settings(args) => run_settings(args),
    }
}

fn engine_options(
    out: &Path,
    events: Option<PathBuf>,
    settings: Option<PathBuf>,
    model: Option<String>,
) -> EngineOptions {
    let mut options = EngineOptions::new(out);
    if let Some(events) = events {
        options.events_path = events;
    }
    if let Some(settings) = settings {
        options.settings_path = settings;
    }
    options.model_override = model.filter(|value| !value.trim().is_empty());
    options
}

fn run_chat_native(args: ChatArgs) -> Result<()> {
    let options = engine_options(&args.out, args.events, args.settings, args.model);
    let mut engine = TutorEngine::new(options)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let result = chat_loop(&mut engine, stdin.lock(), &mut stdout);
    engine.finish()?;
    result
}

#[derive(Debug, Default)]
struct ChatState {
    pending_image: Option<(PathBuf, InlineImage)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Quit,
}

fn chat_loop(engine: &mut TutorEngine, mut input: impl BufRead, out: &mut impl Write) -> Result<()> {
    let mut state = ChatState::default();
    writeln!(out, "Tutor chat started. Type /help for commands.")?;
    if let Some(greeting) = engine.transcript().last() {
        print_message(out, greeting)?;
    }
    if !engine.has_credentials() {
        writeln!(out, "{}", no_key_notice())?;
    }

    let mut line = String::new();
    loop {
        write!(out, "[{}] > ", engine.mode().id())?;
        out.flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if handle_intent(engine, &mut state, &intent, out)? == LoopControl::Quit {
            break;
        }
    }
    Ok(())
}

fn handle_intent(
    engine: &mut TutorEngine,
    state: &mut ChatState,
    intent: &Intent,
    out: &mut impl Write,
) -> Result<LoopControl> {
    match intent.action.as_str() {
        // An empty line sends a pending image on its own.
        "noop" if state.pending_image.is_some() => send_turn(engine, state, "", out)?,
        "noop" => {}
        "help" => {
            writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
        }
        "quit" => return Ok(LoopControl::Quit),
        "set_mode" => match intent.arg("mode") {
            None => writeln!(out, "Current mode: {}", engine.mode().label())?,
            Some(raw) => match raw.parse::<SupportMode>() {
                Ok(mode) => {
                    engine.set_mode(mode);
                    writeln!(out, "Mode set to {} ({})", mode.label(), mode.description())?;
                }
                Err(message) => writeln!(out, "{message}")?,
            },
        },
        "list_modes" => {
            for mode in SupportMode::ALL {
                let marker = if mode == engine.mode() { "*" } else { " " };
                writeln!(out, "{marker} {:<9}{}", mode.id(), mode.description())?;
            }
        }
        "attach_image" => {
            let Some(path) = intent.arg("path") else {
                writeln!(out, "/image requires a path")?;
                return Ok(LoopControl::Continue);
            };
            let path = PathBuf::from(path);
            match load_image_attachment(&path) {
                Ok(image) => {
                    writeln!(
                        out,
                        "Image attached: {} ({}, {} bytes). It will go with your next message.",
                        path.display(),
                        image.media_type(),
                        image.byte_len()
                    )?;
                    state.pending_image = Some((path, image));
                }
                Err(err) => writeln!(out, "{err}")?,
            }
        }
        "drop_image" => match state.pending_image.take() {
            Some((path, _)) => writeln!(out, "Dropped image {}", path.display())?,
            None => writeln!(out, "No image attached")?,
        },
        "send" => {
            let text = intent.prompt.as_deref().unwrap_or_default();
            send_turn(engine, state, text, out)?;
        }
        "report" => {
            writeln!(out, "Generating report...")?;
            match engine.generate_report() {
                Ok(message) => print_message(out, message)?,
                Err(err) if err.is_configuration() => writeln!(out, "{}", no_key_notice())?,
                Err(err) => writeln!(out, "Report failed: {err}")?,
            }
        }
        "export" => {
            let target = intent.arg("path").map(PathBuf::from);
            match engine.export(target.as_deref()) {
                Ok(path) => writeln!(out, "Exported to {}", path.display())?,
                Err(err) => writeln!(out, "Export failed: {err:#}")?,
            }
        }
        "set_key" => match intent.arg("key") {
            None => writeln!(out, "/key requires a value")?,
            Some(key) => match engine.save_api_key(key) {
                Ok(()) => writeln!(out, "API key saved ({})", masked_key(key))?,
                Err(err) => writeln!(out, "Could not save key: {err:#}")?,
            },
        },
        "clear_key" => match engine.clear_api_key() {
            Ok(()) => {
                writeln!(out, "Saved API key removed")?;
                if !engine.has_credentials() {
                    writeln!(out, "{}", no_key_notice())?;
                }
            }
            Err(err) => writeln!(out, "Could not clear key: {err:#}")?,
        },
        "set_model" => match intent.arg("model") {
            None => writeln!(out, "Current model: {}", engine.model())?,
            Some(model) => match engine.set_model(model) {
                Ok(selection) => {
                    if let Some(warning) = selection.warning() {
                        writeln!(out, "{warning}")?;
                    }
                    writeln!(
                        out,
                        "Model set to {} (applies to the next conversation; /clear to start one)",
                        selection.model.name
                    )?;
                }
                Err(err) => writeln!(out, "Could not save model: {err:#}")?,
            },
        },
        "list_models" => {
            let registry = ModelRegistry::new(None);
            for model in registry.list() {
                let marker = if model.name == engine.model() { "*" } else { " " };
                let vision = if model.supports("vision") { " [images]" } else { "" };
                writeln!(out, "{marker} {} - {}{vision}", model.name, model.label)?;
            }
        }
        "show_settings" => print_settings(engine, out)?,
        "clear" => {
            engine.clear_transcript();
            state.pending_image = None;
            writeln!(out, "Conversation cleared.")?;
            if let Some(greeting) = engine.transcript().last() {
                print_message(out, greeting)?;
            }
        }
        "unknown" => {
            let command = intent.arg("command").unwrap_or_default();
            writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
        }
        other => {
            writeln!(out, "Unknown command: {other}")?;
        }
    }
    Ok(LoopControl::Continue)
}

fn send_turn(
    engine: &mut TutorEngine,
    state: &mut ChatState,
    text: &str,
    out: &mut impl Write,
) -> Result<()> {
    let image = state.pending_image.as_ref().map(|(_, image)| image.clone());
    let result = engine.send_message(text, image);
    match result {
        Ok(reply) => {
            print_message(out, reply)?;
            state.pending_image = None;
        }
        Err(err) if err.is_configuration() => writeln!(out, "{}", no_key_notice())?,
        Err(err) => {
            writeln!(out, "{err}")?;
            if state.pending_image.take().is_some() {
                writeln!(out, "The attached image was dropped.")?;
            }
        }
    }
    Ok(())
}

fn run_ask_native(args: AskArgs) -> Result<i32> {
    let mode = match args.mode.parse::<SupportMode>() {
        Ok(mode) => mode,
        Err(message) => {
            eprintln!("{message}");
            return Ok(2);
        }
    };
    let image = match args.image.as_deref().map(load_image_attachment).transpose() {
        Ok(image) => image,
        Err(err) => {
            eprintln!("{err}");
            return Ok(2);
        }
    };
    let options = engine_options(&args.out, args.events, args.settings, args.model);
    let mut engine = TutorEngine::new(options)?;
    engine.set_mode(mode);

    let code = match engine.send_message(&args.prompt, image) {
        Ok(reply) if reply.is_error => {
            eprintln!("{}", reply.text);
            1
        }
        Ok(reply) => {
            println!("{}", reply.text);
            0
        }
        Err(err) => {
            eprintln!("{err}");
            2
        }
    };
    engine.emit_event(
        "ask_finished",
        serde_json::Map::from_iter([("exit_code".to_string(), json!(code))]),
    )?;
    engine.finish()?;
    Ok(code)
}

fn run_settings(args: SettingsArgs) -> Result<i32> {
    let store = SettingsStore::new(&args.settings);
    match args.action {
        SettingsAction::Show => {}
        SettingsAction::SetKey { key } => {
            store.set_api_key(&key)?;
            println!("API key saved ({})", masked_key(&key));
        }
        SettingsAction::ClearKey => {
            store.clear_api_key()?;
            println!("Saved API key removed");
        }
        SettingsAction::SetModel { model } => {
            let settings = store.set_preferred_model(model.as_deref())?;
            match settings.preferred_model() {
                Some(model) => println!("Preferred model set to {model}"),
                None => println!("Preferred model cleared"),
            }
        }
    }
    let settings = store.load()?;
    println!("Settings file: {}", store.path().display());
    println!(
        "API key: {}",
        settings
            .usable_api_key()
            .map(masked_key)
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!(
        "Preferred model: {}",
        settings.preferred_model().unwrap_or("(default)")
    );
    Ok(0)
}

fn print_settings(engine: &TutorEngine, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Settings file: {}", engine.settings_path().display())?;
    match engine.settings() {
        Ok(settings) => {
            writeln!(
                out,
                "Saved API key: {}",
                settings
                    .usable_api_key()
                    .map(masked_key)
                    .unwrap_or_else(|| "(not set)".to_string())
            )?;
            writeln!(
                out,
                "Preferred model: {}",
                settings.preferred_model().unwrap_or("(default)")
            )?;
        }
        Err(err) => writeln!(out, "Settings unreadable: {err:#}")?,
    }
    let slots = engine.credential_slots();
    if slots.is_empty() {
        writeln!(out, "Credentials: none")?;
    } else {
        writeln!(out, "Credentials: {}", slots.join(", "))?;
    }
    writeln!(out, "Model: {}", engine.model())?;
    writeln!(out, "Mode: {}", engine.mode().label())?;
    Ok(())
}

fn print_message(out: &mut impl Write, message: &Message) -> Result<()> {
    let speaker = match (message.role, message.is_error) {
        (Role::User, _) => "you",
        (Role::Model, false) => "tutor",
        (Role::Model, true) => "tutor (error)",
    };
    writeln!(
        out,
        "{speaker} [{}]> {}",
        message.timestamp.format("%H:%M"),
        message.text
    )?;
    Ok(())
}

fn no_key_notice() -> String {
    format!("{NO_CREDENTIALS_MESSAGE} Use /key <api-key> to save one.")
}
