//! Command parsing for the interactive session.

use std::time::Duration;

use crate::config::MAX_TIMEOUT_SECS;

/// Default for `wait <id>` when no timeout is given.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(60);

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Empty,
    List,
    Start { workflow: String },
    Jobs,
    Logs { job_id: String },
    Kill { job_id: String },
    Wait { job_id: String, timeout: Duration },
    /// Interactive workflow definition; the name and steps are prompted for.
    Create,
    Help,
    Exit,
    /// Known command with missing or malformed arguments.
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    /// Parse one input line. Command words are case-insensitive; arguments
    /// are kept as typed.
    pub fn parse(line: &str) -> Command {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Command::Empty;
        };
        let args: Vec<&str> = parts.collect();

        match word.to_lowercase().as_str() {
            "list" => Command::List,
            "jobs" => Command::Jobs,
            "create" => Command::Create,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            "start" => match args.first() {
                Some(name) => Command::Start {
                    workflow: name.to_string(),
                },
                None => Command::Usage("start <workflow_name>"),
            },
            "logs" => match args.first() {
                Some(id) => Command::Logs {
                    job_id: id.to_string(),
                },
                None => Command::Usage("logs <job_id>"),
            },
            "kill" => match args.first() {
                Some(id) => Command::Kill {
                    job_id: id.to_string(),
                },
                None => Command::Usage("kill <job_id>"),
            },
            "wait" => parse_wait(&args),
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// `wait <job_id> [secs]`
fn parse_wait(args: &[&str]) -> Command {
    const USAGE: &str = "wait <job_id> [seconds]";
    let Some(id) = args.first() else {
        return Command::Usage(USAGE);
    };
    let timeout = match args.get(1) {
        None => DEFAULT_WAIT,
        Some(secs) => match secs.parse::<u64>() {
            Ok(secs) if secs <= MAX_TIMEOUT_SECS => Duration::from_secs(secs),
            _ => return Command::Usage(USAGE),
        },
    };
    Command::Wait {
        job_id: id.to_string(),
        timeout,
    }
}

/// Command summary printed by `help` and at startup.
pub const HELP: &str = "\
Commands:
  start <workflow_name>   Run a workflow in the background
  list                    List available workflows
  jobs                    Show status of background jobs
  logs <job_id>           View logs for a job
  kill <job_id>           Stop a running job
  wait <job_id> [secs]    Block until a job finishes (default 60s)
  create                  Define a new workflow
  help                    Show this summary
  exit                    Stop all jobs and quit";
