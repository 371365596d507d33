mod command;
mod files;
mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use backend_http::HttpBackend;
use command::{Command, HELP};
use config::ConfigStore;
use core_orchestrator::{QuickAction, SubmitOutcome, Workspace, WorkspaceOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let mut data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.push("docuchat");
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir: {err}");
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    if let Err(err) = run() {
        error!("docuchat exited with error: {err:#}");
        eprintln!("docuchat: {err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let config_store = ConfigStore::from_default_location()?;
    let config = config_store
        .load_or_init()
        .with_context(|| format!("failed to load {}", config_store.path().display()))?
        .with_env_overrides();
    let base_url = config.backend_url()?;
    let backend = HttpBackend::new(&base_url, config.request_timeout())?;
    info!(%base_url, "backend configured");

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    let workspace = Workspace::new(
        Arc::new(backend),
        WorkspaceOptions {
            request_timeout: config.request_timeout(),
            greeting: config.chat.greeting.clone(),
        },
    );
    runtime.block_on(session(&workspace))
}

async fn session(workspace: &Workspace) -> Result<()> {
    for message in workspace.chat().history() {
        println!("{}", render::message(&message));
    }
    if let Err(err) = workspace.refresh().await {
        warn!("initial document listing failed: {err}");
        println!("could not load documents: {err}");
    }
    println!("type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        match command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                // Ctrl-C drops the in-flight command and leaves the session.
                let finished =
                    unless_interrupted(execute(workspace, command), tokio::signal::ctrl_c()).await;
                if !finished {
                    info!("command interrupted");
                    println!("interrupted");
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => println!("{err}"),
        }
    }

    workspace.close();
    println!("bye");
    Ok(())
}

/// Runs `command` to completion unless `interrupt` resolves first, in which
/// case the command future is dropped. Returns whether the command finished.
async fn unless_interrupted<I: Future>(command: impl Future<Output = ()>, interrupt: I) -> bool {
    tokio::select! {
        () = command => true,
        _ = interrupt => false,
    }
}

async fn execute(workspace: &Workspace, command: Command) {
    match command {
        Command::Docs => print_documents(workspace),
        Command::Refresh => match workspace.refresh().await {
            Ok(_) => print_documents(workspace),
            Err(err) => println!("refresh failed: {err}"),
        },
        Command::Upload(paths) => upload(workspace, &paths).await,
        Command::Use(id) => match workspace.set_active(id.as_deref()) {
            Ok(()) => match id {
                Some(id) => println!("questions now go to {id}"),
                None => println!("questions now go to all documents"),
            },
            Err(err) => println!("{err}"),
        },
        Command::Ask(question) => print_outcome(&workspace.chat().submit(&question).await),
        Command::Summarize => {
            print_outcome(&workspace.chat().quick_action(QuickAction::Summarize).await)
        }
        Command::KeyPoints => {
            print_outcome(&workspace.chat().quick_action(QuickAction::KeyPoints).await)
        }
        Command::Search(text) if text.is_empty() => {
            print_outcome(&workspace.chat().quick_action(QuickAction::Search).await)
        }
        Command::Search(text) => print_outcome(&workspace.chat().submit(&text).await),
        Command::Preview(id) => {
            if let Err(err) = workspace.library().load_preview(&id).await {
                println!("{err}");
                return;
            }
            let opened = workspace.preview().open(&id);
            match opened {
                Ok(true) => print_preview(workspace, &id),
                Ok(false) => println!("preview closed"),
                Err(err) => println!("{err}"),
            }
        }
        Command::More(id) => {
            let result = workspace.preview().show_more(&id);
            match result {
                Ok(_) => print_preview(workspace, &id),
                Err(err) => println!("{err}"),
            }
        }
        Command::Less(id) => {
            let result = workspace.preview().show_less(&id);
            match result {
                Ok(_) => print_preview(workspace, &id),
                Err(err) => println!("{err}"),
            }
        }
        Command::Remove(id) => match workspace.delete_document(&id).await {
            Ok(document) => println!("deleted {}", document.name),
            Err(err) => println!("delete failed: {err}"),
        },
        Command::Download { id, dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            match download(workspace, &id, &dir).await {
                Ok(path) => println!("saved {}", path.display()),
                Err(err) => println!("download failed: {err:#}"),
            }
        }
        Command::History => {
            for message in workspace.chat().history() {
                println!("{}", render::message(&message));
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

fn print_outcome(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Answered { answer, .. } | SubmitOutcome::Fallback { answer, .. } => {
            println!("{}", render::message(answer));
        }
        SubmitOutcome::Rejected(reason) => println!("{}", render::rejection(*reason)),
        SubmitOutcome::Cancelled { .. } => println!("cancelled"),
    }
}

fn print_documents(workspace: &Workspace) {
    let registry = workspace.registry();
    if registry.is_empty() {
        println!("no documents yet; `upload <path>` to add one");
        return;
    }
    for document in registry.list() {
        let active = registry.active_id() == Some(document.id.as_str());
        println!("{}", render::document_line(&document, active));
    }
}

fn print_preview(workspace: &Workspace, id: &str) {
    let preview = workspace.preview();
    let rendered = preview.page(id).and_then(|page| {
        let has_more = preview.has_more(id)?;
        let can_show_less = preview.can_show_less(id)?;
        Ok(render::preview(&page, has_more, can_show_less))
    });
    match rendered {
        Ok(text) => println!("{text}"),
        Err(err) => println!("{err}"),
    }
}

/// Files ahead of an unreadable path are still uploaded; the read error is
/// reported where the batch stopped.
async fn upload(workspace: &Workspace, paths: &[PathBuf]) {
    let batch = files::read_batch(paths).await;
    if batch.files.is_empty() {
        if let Some(err) = batch.failure {
            println!("{err:#}");
        }
        return;
    }
    let outcome = workspace.uploads().upload(batch.files).await;
    println!("{}", render::upload_summary(&outcome));
    if !outcome.is_complete() {
        return;
    }
    if let Some(err) = batch.failure {
        warn!("upload batch stopped at an unreadable file: {err:#}");
        println!("upload stopped: {err:#}");
    }
}

async fn download(workspace: &Workspace, id: &str, dir: &Path) -> Result<PathBuf> {
    let file = workspace.library().download(id).await?;
    let name = file
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "document".into());
    let path = dir.join(name);
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    tokio::fs::write(&path, &file.bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "docuchat.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,app_cli=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
