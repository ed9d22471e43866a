use crate::config::ConsoleConfig;
use crate::controller::{run_controller, ControllerOptions, UiCommand};
use crate::host::{HostApi, HttpHost};
use crate::model::{ConsoleEvent, FormFields, JobStatus, ProgressSnapshot};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// Output line routing for the stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "scrapedeck",
    version,
    about = "Control deck for a web scraper / auto-poster host, with optional TUI"
)]
pub struct Cli {
    /// Base URL of the host process API
    #[arg(long)]
    pub host: Option<String>,

    /// Progress polling cadence
    #[arg(long)]
    pub poll_interval: Option<humantime::Duration>,

    /// Run one job and stream progress as text (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run one job and print the final snapshot as JSON (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Account email (falls back to the config file)
    #[arg(long)]
    pub email: Option<String>,

    /// Account password (falls back to the config file)
    #[arg(long)]
    pub password: Option<String>,

    /// Search term for the scrape job
    #[arg(long)]
    pub search_term: Option<String>,

    /// Free-form notes attached to the job
    #[arg(long, default_value = "")]
    pub notes: String,

    /// Number of result pages to scrape
    #[arg(long, default_value_t = 1)]
    pub pages: u32,

    /// Result ordering requested from the host
    #[arg(long, default_value = "relevance")]
    pub sort_by: String,

    /// Date-posted filter (host-defined values)
    #[arg(long, default_value = "")]
    pub date_posted: String,

    /// Location filter
    #[arg(long, default_value = "")]
    pub location: String,

    /// Industry filter
    #[arg(long, default_value = "")]
    pub industry: String,

    /// Title filter
    #[arg(long, default_value = "")]
    pub title: String,

    /// Company filter
    #[arg(long, default_value = "")]
    pub company: String,
}

impl Cli {
    pub fn host_url(&self, config: &ConsoleConfig) -> String {
        self.host
            .clone()
            .or_else(|| config.host.clone())
            .unwrap_or_else(|| "http://127.0.0.1:8321".to_string())
    }

    pub fn controller_options(&self, config: &ConsoleConfig) -> ControllerOptions {
        let mut opts = ControllerOptions::default();
        if let Some(interval) = self.poll_interval.map(Into::into).or(config.poll_interval) {
            opts.poll_interval = interval;
        }
        opts
    }

    /// Collect the start payload. Field names are the host's; values pass
    /// through verbatim.
    pub fn form_fields(&self, config: &ConsoleConfig) -> FormFields {
        let email = self
            .email
            .clone()
            .or_else(|| config.email.clone())
            .unwrap_or_default();
        let password = self
            .password
            .clone()
            .or_else(|| config.password.clone())
            .unwrap_or_default();
        let mut fields = FormFields::new();
        fields.insert("email".into(), email);
        fields.insert("password".into(), password);
        fields.insert("searchTerm".into(), self.search_term.clone().unwrap_or_default());
        fields.insert("notes".into(), self.notes.clone());
        fields.insert("pages".into(), self.pages.to_string());
        fields.insert("sortBy".into(), self.sort_by.clone());
        fields.insert("datePosted".into(), self.date_posted.clone());
        fields.insert("location".into(), self.location.clone());
        fields.insert("industry".into(), self.industry.clone());
        fields.insert("title".into(), self.title.clone());
        fields.insert("company".into(), self.company.clone());
        fields
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text are mutually exclusive"));
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args).await;
        }
    }

    run_headless(args).await
}

/// Mirror state kept by the headless consumer. Log output stays append-only
/// on stderr even though snapshots carry the full history every tick.
struct HeadlessView {
    shown: usize,
    logs: Vec<String>,
    status: JobStatus,
    output_path: Option<String>,
    resume_prompted: bool,
}

impl HeadlessView {
    fn new() -> Self {
        Self {
            shown: 0,
            logs: Vec::new(),
            status: JobStatus::Idle,
            output_path: None,
            resume_prompted: false,
        }
    }

    /// Returns true once a terminal state has been reached.
    fn handle(
        &mut self,
        event: ConsoleEvent,
        out_tx: &mpsc::UnboundedSender<OutputLine>,
        cmd_tx: &mpsc::UnboundedSender<UiCommand>,
    ) -> bool {
        match event {
            ConsoleEvent::LogsReplaced(lines) => {
                if lines.len() < self.shown {
                    self.shown = 0;
                }
                for line in &lines[self.shown..] {
                    let _ = out_tx.send(OutputLine::Stderr(line.clone()));
                }
                self.shown = lines.len();
                self.logs = lines;
            }
            ConsoleEvent::LogLine(line) => {
                let _ = out_tx.send(OutputLine::Stderr(line.clone()));
                self.logs.push(line);
                self.shown = self.logs.len();
            }
            ConsoleEvent::StatusChanged(status) => {
                self.status = status;
            }
            ConsoleEvent::OutputSaved(path) => {
                self.output_path = Some(path);
            }
            ConsoleEvent::OutputCleared => {
                self.output_path = None;
            }
            ConsoleEvent::ResumeVisible(true) => {
                if !self.resume_prompted {
                    self.resume_prompted = true;
                    let _ = out_tx.send(OutputLine::Stderr(
                        "Manual verification required. Finish it in the host browser, then press Enter to resume."
                            .to_string(),
                    ));
                    let cmd_tx = cmd_tx.clone();
                    tokio::spawn(async move {
                        let mut line = String::new();
                        let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
                        if reader.read_line(&mut line).await.is_ok() {
                            let _ = cmd_tx.send(UiCommand::Resume);
                        }
                    });
                }
            }
            ConsoleEvent::ResumeVisible(false) => {
                self.resume_prompted = false;
            }
            ConsoleEvent::SubmitEnabled(true) => return true,
            _ => {}
        }
        false
    }
}

/// One-shot flow shared by --text and --json: start a job through the same
/// controller the TUI uses and consume events until the cycle ends.
async fn run_headless(args: Cli) -> Result<()> {
    let config = crate::config::load_or_warn();
    let fields = args.form_fields(&config);
    if fields
        .get("searchTerm")
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        return Err(anyhow::anyhow!("--search-term is required in --text/--json mode"));
    }

    let host: Arc<dyn HostApi> =
        Arc::new(HttpHost::new(&args.host_url(&config)).context("set up host client")?);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ConsoleEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let controller = tokio::spawn(run_controller(
        host,
        args.controller_options(&config),
        event_tx,
        cmd_rx,
    ));
    let (out_tx, out_handle) = spawn_output_writer();

    cmd_tx
        .send(UiCommand::StartScrape(fields))
        .context("controller unavailable")?;

    let mut view = HeadlessView::new();
    while let Some(event) = event_rx.recv().await {
        if view.handle(event, &out_tx, &cmd_tx) {
            break;
        }
    }
    // The dispatcher may queue a few trailing events (e.g. the error status
    // after a rejected start); drain them before reporting.
    while let Ok(event) = event_rx.try_recv() {
        view.handle(event, &out_tx, &cmd_tx);
    }

    let _ = cmd_tx.send(UiCommand::Quit);
    controller.await.context("controller task failed")??;

    if args.json {
        let snapshot = ProgressSnapshot {
            status: view.status,
            logs: view.logs.clone(),
            output_path: view.output_path.clone(),
        };
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&snapshot)?));
    } else if let Some(path) = &view.output_path {
        let _ = out_tx.send(OutputLine::Stdout(format!("Saved: {path}")));
    } else {
        let _ = out_tx.send(OutputLine::Stderr("No output reported by the host.".to_string()));
    }

    drop(out_tx);
    let _ = out_handle.await;

    if view.status == JobStatus::Error {
        return Err(anyhow::anyhow!("job finished with status error"));
    }
    Ok(())
}
