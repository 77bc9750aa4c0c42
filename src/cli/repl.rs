//! Line-oriented REPL over any async reader/writer pair.

use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use crate::cli::command::{Command, HELP};
use crate::worker::{CancelAck, JobId, JobManager, JobState, ShutdownReport};

const PROMPT: &str = "(flowrun) > ";
const NAME_WIDTH: usize = 18;

/// Interactive session driving a `JobManager`.
///
/// Never blocks on a job: every command returns as soon as the manager
/// answers, except `wait` which is bounded by its timeout.
pub struct Repl<R, W> {
    manager: Arc<JobManager>,
    lines: Lines<R>,
    out: W,
}

impl<R, W> Repl<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(manager: Arc<JobManager>, input: R, output: W) -> Self {
        Self {
            manager,
            lines: input.lines(),
            out: output,
        }
    }

    /// Read commands until `exit` or end of input, then shut the manager
    /// down.
    pub async fn run(mut self) -> io::Result<ShutdownReport> {
        loop {
            let Some(line) = self.prompt(PROMPT).await? else {
                self.say("").await?;
                break;
            };
            if self.dispatch(Command::parse(&line)).await?.is_break() {
                break;
            }
        }

        self.say("Stopping all jobs and exiting...").await?;
        let report = self.manager.shutdown().await;
        if !report.is_clean() {
            let stuck: Vec<&str> = report.stuck.iter().map(JobId::as_str).collect();
            self.say(format!(
                "Jobs that did not stop in time: {}",
                stuck.join(", ")
            ))
            .await?;
        }
        Ok(report)
    }

    async fn dispatch(&mut self, command: Command) -> io::Result<ControlFlow<()>> {
        match command {
            Command::Empty => {}
            Command::List => self.list_workflows().await?,
            Command::Start { workflow } => self.start(&workflow).await?,
            Command::Jobs => self.jobs().await?,
            Command::Logs { job_id } => self.logs(JobId::from(job_id)).await?,
            Command::Kill { job_id } => self.kill(JobId::from(job_id)).await?,
            Command::Wait { job_id, timeout } => self.wait(JobId::from(job_id), timeout).await?,
            Command::Create => self.create().await?,
            Command::Help => self.say(HELP).await?,
            Command::Exit => return Ok(ControlFlow::Break(())),
            Command::Usage(usage) => self.say(format!("Usage: {usage}")).await?,
            Command::Unknown(word) => {
                self.say(format!(
                    "Unknown command '{word}'. Type 'help' for a list of commands."
                ))
                .await?
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn list_workflows(&mut self) -> io::Result<()> {
        let names = self.manager.workflows().list().await;
        if names.is_empty() {
            return self.say("No workflows defined.").await;
        }
        self.say("Available workflows:").await?;
        for name in names {
            self.say(format!(" - {name}")).await?;
        }
        Ok(())
    }

    async fn start(&mut self, workflow: &str) -> io::Result<()> {
        match self.manager.start(workflow).await {
            Ok(id) => {
                self.say(format!(
                    "Job started! ID: {id} (type 'jobs' to view status)"
                ))
                .await
            }
            Err(e) => self.say(format!("Error: {e}")).await,
        }
    }

    async fn jobs(&mut self) -> io::Result<()> {
        let jobs = self.manager.list().await;
        if jobs.is_empty() {
            return self.say("No jobs found.").await;
        }
        self.say(format!(
            "{:<10} {:<20} {:<12} {:<10}",
            "ID", "NAME", "STATUS", "STARTED"
        ))
        .await?;
        self.say("-".repeat(55)).await?;
        for job in jobs {
            let name: String = job.workflow_name.chars().take(NAME_WIDTH).collect();
            let started = job.started_at.with_timezone(&Local).format("%H:%M:%S");
            self.say(format!(
                "{:<10} {:<20} {:<12} {:<10}",
                job.id.as_str(),
                name,
                job.state.to_string(),
                started.to_string()
            ))
            .await?;
        }

        let s = self.manager.summary().await;
        self.say(format!(
            "{} jobs: {} pending, {} running, {} completed, {} failed, {} cancelled",
            s.total, s.pending, s.running, s.completed, s.failed, s.cancelled
        ))
        .await
    }

    async fn logs(&mut self, id: JobId) -> io::Result<()> {
        let snapshot = match self.manager.get(&id).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.say(format!("Error: {e}")).await,
        };
        let logs = match self.manager.get_logs(&id).await {
            Ok(logs) => logs,
            Err(e) => return self.say(format!("Error: {e}")).await,
        };

        self.say(format!(
            "--- Logs for job {} ({}) [{}] ---",
            snapshot.id, snapshot.workflow_name, snapshot.state
        ))
        .await?;
        for entry in &logs {
            self.say(entry.to_string()).await?;
        }
        if snapshot.state == JobState::Failed {
            if let Some(error) = &snapshot.error {
                self.say(format!("error: {error}")).await?;
            }
        }
        self.say("-".repeat(42)).await
    }

    async fn kill(&mut self, id: JobId) -> io::Result<()> {
        match self.manager.cancel(&id).await {
            Ok(CancelAck::Requested) => {
                self.say(format!("Cancellation requested for job {id}.")).await
            }
            Ok(CancelAck::AlreadyRequested) => {
                self.say(format!("Cancellation already requested for job {id}."))
                    .await
            }
            Err(e) => self.say(format!("Error: {e}")).await,
        }
    }

    async fn wait(&mut self, id: JobId, timeout: Duration) -> io::Result<()> {
        match self.manager.wait(&id, timeout).await {
            Ok(snapshot) if snapshot.state.is_terminal() => {
                self.say(format!("Job {id} finished: {}", snapshot.state)).await
            }
            Ok(snapshot) => {
                self.say(format!(
                    "Job {id} still {} after {}s.",
                    snapshot.state,
                    timeout.as_secs()
                ))
                .await
            }
            Err(e) => self.say(format!("Error: {e}")).await,
        }
    }

    /// Prompt for a workflow name, then for steps until `done` or end of
    /// input.
    async fn create(&mut self) -> io::Result<()> {
        let Some(name) = self.prompt("Enter workflow name: ").await? else {
            return Ok(());
        };
        self.say("Enter steps (type 'done' to finish):").await?;

        let mut steps = Vec::new();
        loop {
            let prompt = format!("Step {}: ", steps.len() + 1);
            let Some(step) = self.prompt(&prompt).await? else {
                break;
            };
            if step.trim().eq_ignore_ascii_case("done") {
                break;
            }
            if !step.trim().is_empty() {
                steps.push(step);
            }
        }

        match self.manager.workflows().add(&name, steps).await {
            Ok(()) => {
                self.say(format!("Workflow '{}' created.", name.trim()))
                    .await
            }
            Err(e) => self.say(format!("Error: {e}")).await,
        }
    }

    async fn prompt(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.out.write_all(prompt.as_bytes()).await?;
        self.out.flush().await?;
        self.lines.next_line().await
    }

    async fn say(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        self.out.write_all(text.as_ref().as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }
}
