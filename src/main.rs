use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use deep_agent_chat::{
    Config,
    api::{self, ApiState, ThreadView},
    chat::{ChatEvent, ChatSession},
    client::GraphApi,
    cli::{
        AuthCommands, Cli, Commands, ConfigCommands, OutputFormat, auth, format_diff,
        format_thread_table, format_todos, format_transcript,
    },
    core::{
        diff::{ConfigDiff, DiffFormat},
        optimizer::Optimizer,
        threads::{history_query, summarize_threads},
    },
};

/// Log file used while the TUI owns the terminal.
const TUI_LOG_FILE: &str = "dac.log";
const UNTITLED: &str = "Untitled thread";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let tui_mode = matches!(cli.command, None | Some(Commands::Chat { .. }));
    if let Err(e) = init_logging(filter, tui_mode) {
        eprintln!("warning: could not open log file: {e}");
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .init();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, or to a file under the data dir when the TUI is active.
fn init_logging(filter: &str, tui_mode: bool) -> anyhow::Result<()> {
    if !tui_mode {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    let dir = Config::data_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(TUI_LOG_FILE))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(assistant) = cli.assistant {
        config.chat.assistant_id = assistant;
    }

    let command = cli.command.unwrap_or(Commands::Chat {
        thread: None,
        debug: false,
    });

    match command {
        Commands::Chat { thread, debug } => {
            config.chat.validate()?;
            let client = Arc::new(config.chat.client()?);
            let (session, events) = ChatSession::new(client, config.chat.assistant_id.clone());

            let optimizer = match config.chat.optimizer_client() {
                Ok(client) => Some(Optimizer::new(Arc::new(client))),
                Err(e) => {
                    tracing::warn!(error = %e, "optimizer disabled");
                    None
                }
            };

            deep_agent_chat::tui::run(&config, session, events, optimizer, thread, debug).await?;
        }

        Commands::Send { message, thread } => {
            config.chat.validate()?;
            send(&config, &message, thread.as_deref()).await?;
        }

        Commands::Threads { format, limit } => {
            config.chat.validate()?;
            let client = config.chat.client()?;
            let mut query = history_query(Some(&config.chat.assistant_id));
            query.limit = u32::try_from(limit).unwrap_or(u32::MAX);
            let threads = client.search_threads(&query).await?;
            let summaries = summarize_threads(&threads, UNTITLED);
            match format {
                OutputFormat::Table => print!("{}", format_thread_table(&summaries)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
            }
        }

        Commands::Show { thread_id, format } => {
            config.chat.validate()?;
            let client = config.chat.client()?;
            let state = client.get_thread_state(&thread_id).await?;
            let view = ThreadView::from_state(thread_id, &state);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
                OutputFormat::Table => print_thread(&view),
            }
        }

        Commands::Diff {
            old,
            new,
            format,
            html,
        } => {
            let diff = ConfigDiff::new(
                &read_config_file(&old)?,
                &read_config_file(&new)?,
                DiffFormat::from(format),
            )?;
            if html {
                println!("{}", serde_json::to_string_pretty(&diff.html_rows())?);
            } else {
                print!("{}", format_diff(&diff));
                let (added, removed) = diff.stats();
                eprintln!("{added} added, {removed} removed");
            }
        }

        Commands::Serve { host, port } => {
            config.chat.validate()?;
            let host = host.unwrap_or_else(|| config.api.host.clone());
            let port = port.unwrap_or(config.api.port);
            let state = ApiState {
                client: Arc::new(config.chat.client()?),
                assistant_id: config.chat.assistant_id.clone(),
                token: config.api.token.clone(),
            };
            api::serve(state, &host, port).await?;
        }

        Commands::Auth { command } => match command {
            AuthCommands::Login(args) => auth::auth_login(args, &config)?,
            AuthCommands::Logout { url } => auth::auth_logout(url, &config)?,
            AuthCommands::Status => auth::auth_status(&config),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let mut shown = config.clone();
                for token in [
                    &mut shown.chat.access_token,
                    &mut shown.chat.optimizer_access_token,
                    &mut shown.api.token,
                ] {
                    if token.is_some() {
                        *token = Some("********".to_string());
                    }
                }
                println!("{}", toml::to_string_pretty(&shown)?);
            }
            ConfigCommands::Path => {
                println!("{}", Config::config_path()?.display());
            }
        },
    }

    Ok(())
}

/// Send one message, wait for the run, and print the conversation.
async fn send(config: &Config, message: &str, thread: Option<&str>) -> anyhow::Result<()> {
    let client = Arc::new(config.chat.client()?);
    let (session, mut events) = ChatSession::new(client, config.chat.assistant_id.clone());

    if let Err(e) = session.refresh_assistant().await {
        tracing::warn!(error = %e, "running without assistant config");
    }
    if let Some(id) = thread {
        session.load_thread(id).await?;
    }
    let seen = session.view().processed_messages().len();

    session.send_message(message).await?;
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::ThreadCreated(id) => eprintln!("thread {id}"),
            ChatEvent::Finished => break,
            ChatEvent::Error(e) => tracing::warn!(error = %e, "run error"),
            ChatEvent::Updated => {}
        }
    }

    let view = session.view();
    let messages = view.processed_messages();
    print!("{}", format_transcript(&messages[seen.min(messages.len())..]));

    if let Some(error) = &view.error {
        anyhow::bail!("run failed: {error}");
    }
    if let Some(interrupt) = &view.interrupt {
        eprintln!(
            "\nwaiting for review: {}. Resume with `dac chat --thread {}`.",
            interrupt.title(),
            session.thread_id().unwrap_or_default()
        );
    }
    Ok(())
}

fn print_thread(view: &ThreadView) {
    println!("thread {}\n", view.thread_id);
    print!("{}", format_transcript(&view.messages));

    let todos: Vec<_> = view
        .todos
        .in_progress
        .iter()
        .chain(&view.todos.pending)
        .chain(&view.todos.completed)
        .cloned()
        .collect();
    if !todos.is_empty() {
        println!("\ntasks");
        print!("{}", format_todos(&todos));
    }
    if !view.files.is_empty() {
        println!("\nfiles");
        for (path, content) in &view.files {
            println!("  {path} ({} lines)", content.lines().count());
        }
    }
    if let Some(interrupt) = &view.interrupt {
        println!("\nwaiting for review: {}", interrupt.title());
    }
}

/// Read a JSON or YAML file. YAML parsing accepts JSON too.
fn read_config_file(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    serde_yaml::from_str(&text).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}
