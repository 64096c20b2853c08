//! kiln - turn prompts into runnable projects

mod commands;
mod config;
mod sandbox;
mod server;
mod ui;
mod utils;

use clap::Parser;
use kiln_ai::{Model, TextGenerator, providers::google::GoogleProvider};
use kiln_build::{
    Backend, BuildEvent, BuildSession, DirectBackend, Error, HttpBackend, SandboxHandle, SessionPhase,
};
use std::sync::Arc;

use commands::CommandResult;

/// kiln - build and preview projects from prompts
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First prompt (starts interactive mode with it)
    prompt: Option<String>,

    /// Run the HTTP backend instead of a session
    #[arg(long)]
    serve: bool,

    /// Address for --serve (default: 127.0.0.1:3000)
    #[arg(long)]
    bind: Option<String>,

    /// Use a running `kiln --serve` backend
    #[arg(long)]
    backend_url: Option<String>,

    /// Gemini model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Directory the preview writes projects into
    #[arg(long)]
    workspace: Option<String>,

    /// Build the project without running it
    #[arg(long)]
    no_preview: bool,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("kiln=debug,kiln_build=debug,kiln_ai=debug,kiln_cli=debug")
            .with_writer(std::io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    // Merge config with CLI args (CLI takes precedence)
    let model_id = args
        .model
        .clone()
        .or(cfg.model.clone())
        .unwrap_or_else(|| Model::DEFAULT_ID.to_string());

    if args.serve {
        let bind = args
            .bind
            .clone()
            .or(cfg.bind.clone())
            .unwrap_or_else(|| config::DEFAULT_BIND.to_string());
        let backend = DirectBackend::new(build_generator(&cfg, &model_id));
        return server::serve(&bind, server::AppState::new(Arc::new(backend))).await;
    }

    let backend: Arc<dyn Backend> = match args.backend_url.clone().or(cfg.backend_url.clone()) {
        Some(url) => {
            tracing::info!(url = %url, "using remote backend");
            Arc::new(HttpBackend::new(url))
        }
        None => Arc::new(DirectBackend::new(build_generator(&cfg, &model_id))),
    };

    let preview = !args.no_preview && cfg.preview_enabled();
    let mut session = BuildSession::new(backend);
    if let Some(dir) = &cfg.working_directory {
        session = session.with_working_directory(dir.clone());
    }
    if preview {
        let workspace = args
            .workspace
            .clone()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| cfg.workspace_dir());
        let booter = sandbox::LocalBooter::new(workspace);
        let handle = Arc::new(SandboxHandle::new(Arc::new(booter)));
        session = session.with_sandbox(handle, cfg.preview_config());
    }

    let printer = ui::spawn_event_printer(session.subscribe(), args.verbose);

    let result = if let Some(command) = &args.command {
        run_command(&session, command, preview).await
    } else {
        run_interactive(&session, args.prompt.as_deref(), &model_id).await
    };

    session.shutdown();

    // Let the printer drain the final events
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    printer.abort();
    result
}

/// Gemini generator from the configured key, or exit with a hint
fn build_generator(cfg: &config::Config, model_id: &str) -> Arc<dyn TextGenerator> {
    match cfg.get_api_key() {
        Some(key) => Arc::new(GoogleProvider::new(key, Model::gemini(model_id))),
        None => {
            eprintln!("Error: no API key found.");
            eprintln!(
                "Set GOOGLE_API_KEY (or GEMINI_API_KEY), or add api_keys.google to {}",
                config::Config::config_path().display()
            );
            std::process::exit(1);
        }
    }
}

/// Print errors the session does not report as events
fn report(error: &Error) {
    match error {
        Error::Busy | Error::EmptyPrompt | Error::ShutDown | Error::InvalidPhase { .. } => {
            eprintln!("Error: {}", error.detail())
        }
        _ => {}
    }
}

async fn run_command(session: &BuildSession, prompt: &str, preview: bool) -> anyhow::Result<()> {
    println!("kiln> {}", prompt);
    println!();

    let mut receiver = session.subscribe();
    if let Err(e) = session.start(prompt).await {
        report(&e);
        anyhow::bail!(e.detail());
    }

    print!("{}", ui::render_tree(&session.tree()));

    if !preview || session.tree().is_empty() {
        return Ok(());
    }

    // Keep the dev server alive until interrupted
    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(BuildEvent::PreviewReady { .. }) => {
                    println!("Press Ctrl-C to stop the preview.");
                    let _ = tokio::signal::ctrl_c().await;
                    return Ok(());
                }
                Ok(BuildEvent::PreviewFailed { message, .. }) => anyhow::bail!(message),
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn run_interactive(
    session: &BuildSession,
    first_prompt: Option<&str>,
    model_id: &str,
) -> anyhow::Result<()> {
    use std::io::{self, Write};
    use tokio::io::{AsyncBufReadExt, BufReader};

    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("kiln ({}) session: {}", model_id, &session.id()[..8]);
        eprintln!("Describe the project to build. /help lists commands.");
        eprintln!();
    }

    if let Some(prompt) = first_prompt {
        println!("> {}", prompt);
        send(session, prompt).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            // EOF
            break;
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input, session) {
            match result {
                CommandResult::Reset => match session.reset() {
                    Ok(()) => println!("Project discarded."),
                    Err(e) => eprintln!("Error: {}", e.detail()),
                },
                CommandResult::Message(msg) => println!("{}", msg.trim_end()),
                CommandResult::Exit => break,
                CommandResult::Unknown(cmd) => {
                    eprintln!("Unknown command: /{}. Type /help for available commands.", cmd)
                }
            }
            continue;
        }

        send(session, input).await;
    }

    Ok(())
}

/// Start the project or ask for changes, depending on the phase
async fn send(session: &BuildSession, prompt: &str) {
    let result = match session.phase() {
        SessionPhase::Uninitialized => session.start(prompt).await,
        _ => session.submit(prompt).await,
    };

    match result {
        Ok(count) => println!("[{} steps applied, {} files]", count, session.tree().file_paths().len()),
        Err(e) => report(&e),
    }
}
