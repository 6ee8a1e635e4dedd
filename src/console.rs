//! Interactive operator console.
//!
//! Commands are registered explicitly in a [`CommandRegistry`]. Each declares
//! a positional parameter schema; input tokens are coerced against it, and
//! missing trailing parameters fall back to their declared defaults.
//!
//! | Command | Parameters | Action |
//! |---------|------------|--------|
//! | `check` | | run a revision check now |
//! | `rc` | `cadence: str` | reschedule the recurring check (`6h`, `30m`) |
//! | `status` | | show last-checked records and the cache |
//! | `help` | | list commands |
//! | `exit` | `wait: bool = false` | shut down, optionally waiting for a run |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use crate::cache::ArtifactCache;
use crate::scheduler::{Cadence, JobScheduler};
use crate::state::StateStore;
use crate::status;

// ═══════════════════════════════════════════════════════════════════════
// Parameter schema
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Str,
    Bool,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Int => f.write_str("int"),
            ParamKind::Str => f.write_str("str"),
            ParamKind::Bool => f.write_str("bool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::Str(v) => f.write_str(v),
            ArgValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// One positional parameter. `default: None` makes it required.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Option<ArgValue>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, default: ArgValue) -> Self {
        Self {
            name,
            kind,
            default: Some(default),
        }
    }

    fn coerce(&self, token: &str) -> Result<ArgValue> {
        match self.kind {
            ParamKind::Int => token
                .parse()
                .map(ArgValue::Int)
                .map_err(|_| anyhow!("{}: expected an integer, got '{}'", self.name, token)),
            ParamKind::Bool => match token.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(ArgValue::Bool(true)),
                "false" | "no" | "0" => Ok(ArgValue::Bool(false)),
                _ => bail!("{}: expected true or false, got '{}'", self.name, token),
            },
            ParamKind::Str => Ok(ArgValue::Str(token.to_string())),
        }
    }
}

/// Parsed arguments, in schema order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<(&'static str, ArgValue)>,
}

impl Args {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.get(name) {
            Some(ArgValue::Int(v)) => Ok(*v),
            _ => bail!("missing int argument '{}'", name),
        }
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(ArgValue::Str(v)) => Ok(v),
            _ => bail!("missing str argument '{}'", name),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Some(ArgValue::Bool(v)) => Ok(*v),
            _ => bail!("missing bool argument '{}'", name),
        }
    }
}

/// Coerce positional `tokens` against `params`.
///
/// Surplus tokens are an error, as is a missing required parameter.
pub fn parse_args(params: &[ParamSpec], tokens: &[&str]) -> Result<Args> {
    if tokens.len() > params.len() {
        bail!(
            "expected at most {} argument(s), got {}",
            params.len(),
            tokens.len()
        );
    }

    let mut values = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let value = match tokens.get(i) {
            Some(token) => param.coerce(token)?,
            None => param
                .default
                .clone()
                .ok_or_else(|| anyhow!("missing required argument '{}'", param.name))?,
        };
        values.push((param.name, value));
    }
    Ok(Args { values })
}

// ═══════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════

/// What console commands can act on.
pub struct ConsoleContext {
    pub scheduler: Arc<JobScheduler>,
    pub state: StateStore,
    pub cache: ArtifactCache,
}

/// A console command with a declared parameter schema.
#[async_trait]
pub trait ConsoleCommand: Send + Sync {
    /// Lowercase name typed by the operator.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, args: Args, ctx: &ConsoleContext) -> Result<()>;
}

/// Result of [`CommandRegistry::dispatch`].
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Blank input.
    Empty,
    /// No command with that name.
    Unknown(String),
    /// The command ran (successfully or not; errors are reported).
    Handled(String),
}

const HELP: &str = "help";

pub struct CommandRegistry {
    commands: Vec<Box<dyn ConsoleCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Registry with `check`, `rc`, `status` and `exit`. `help` is answered
    /// by every registry.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CheckCommand));
        registry.register(Box::new(RescheduleCommand));
        registry.register(Box::new(StatusCommand));
        registry.register(Box::new(ExitCommand));
        registry
    }

    /// Register a command, replacing any existing one with the same name.
    pub fn register(&mut self, command: Box<dyn ConsoleCommand>) {
        self.commands.retain(|c| c.name() != command.name());
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Box<dyn ConsoleCommand>] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&dyn ConsoleCommand> {
        let name = name.to_ascii_lowercase();
        self.commands
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Parse and run one line of operator input.
    pub async fn dispatch(&self, line: &str, ctx: &ConsoleContext) -> Dispatch {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            return Dispatch::Empty;
        };
        if name.eq_ignore_ascii_case(HELP) {
            print!("{}", self.help_text());
            return Dispatch::Handled(HELP.to_string());
        }
        let Some(command) = self.find(name) else {
            return Dispatch::Unknown(name.to_string());
        };

        let tokens: Vec<&str> = tokens.collect();
        let params = command.params();
        let result = match parse_args(&params, &tokens) {
            Ok(args) => command.execute(args, ctx).await,
            Err(e) => Err(anyhow!("{} (usage: {})", e, usage(command))),
        };
        if let Err(e) = result {
            error!(command = command.name(), error = %e, "command failed");
            println!("[Error] {}", e);
        }
        Dispatch::Handled(command.name().to_string())
    }

    /// One line per registered command, then `help`.
    pub fn help_text(&self) -> String {
        let mut out = String::new();
        for command in &self.commands {
            out.push_str(&format!(
                "  {:<28} {}\n",
                usage(command.as_ref()),
                command.description()
            ));
        }
        out.push_str(&format!("  {:<28} {}\n", HELP, "List console commands"));
        out
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn usage(command: &dyn ConsoleCommand) -> String {
    let mut out = command.name().to_string();
    for param in command.params() {
        match &param.default {
            Some(default) => {
                out.push_str(&format!(" [{}: {} = {}]", param.name, param.kind, default))
            }
            None => out.push_str(&format!(" <{}: {}>", param.name, param.kind)),
        }
    }
    out
}

pub struct CheckCommand;

#[async_trait]
impl ConsoleCommand for CheckCommand {
    fn name(&self) -> &str {
        "check"
    }

    fn description(&self) -> &str {
        "Check every environment for a new revision now"
    }

    async fn execute(&self, _args: Args, ctx: &ConsoleContext) -> Result<()> {
        ctx.scheduler.run_once()?;
        println!("Revision check queued.");
        Ok(())
    }
}

pub struct RescheduleCommand;

#[async_trait]
impl ConsoleCommand for RescheduleCommand {
    fn name(&self) -> &str {
        "rc"
    }

    fn description(&self) -> &str {
        "Reschedule the recurring check (e.g. 6h, 30m)"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("cadence", ParamKind::Str)]
    }

    async fn execute(&self, args: Args, ctx: &ConsoleContext) -> Result<()> {
        let cadence: Cadence = args.str("cadence")?.parse()?;
        let next = ctx.scheduler.reschedule(cadence).await?;
        println!(
            "Upcoming Revision Check: {}",
            next.format("%m/%d/%Y %H:%M:%S GMT")
        );
        Ok(())
    }
}

pub struct StatusCommand;

#[async_trait]
impl ConsoleCommand for StatusCommand {
    fn name(&self) -> &str {
        "status"
    }

    fn description(&self) -> &str {
        "Show last-checked revisions and cached artifacts"
    }

    async fn execute(&self, _args: Args, ctx: &ConsoleContext) -> Result<()> {
        let next = ctx.scheduler.next_fire_time().await.ok();
        let report = status::collect(&ctx.state, &ctx.cache)?;
        print!("{}", status::render(&report, next));
        Ok(())
    }
}

pub struct ExitCommand;

#[async_trait]
impl ConsoleCommand for ExitCommand {
    fn name(&self) -> &str {
        "exit"
    }

    fn description(&self) -> &str {
        "Shut down; pass true to let a running check finish first"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::optional(
            "wait",
            ParamKind::Bool,
            ArgValue::Bool(false),
        )]
    }

    async fn execute(&self, args: Args, ctx: &ConsoleContext) -> Result<()> {
        println!("Shutting Down...");
        ctx.scheduler.shutdown(args.bool("wait")?).await;
        Ok(())
    }
}

/// Read commands from stdin until the scheduler is shut down or input ends.
pub async fn run_console(registry: &CommandRegistry, ctx: &ConsoleContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while !ctx.scheduler.is_shutdown() {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if let Dispatch::Unknown(name) = registry.dispatch(&line, ctx).await {
            println!("Unknown command '{}'. Type 'help' for a list.", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{JobContext, ScheduledJob};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn missing_trailing_args_take_defaults() {
        let params = vec![
            ParamSpec::required("cadence", ParamKind::Str),
            ParamSpec::optional("count", ParamKind::Int, ArgValue::Int(3)),
            ParamSpec::optional("wait", ParamKind::Bool, ArgValue::Bool(false)),
        ];

        let args = parse_args(&params, &["6h"]).unwrap();
        assert_eq!(args.str("cadence").unwrap(), "6h");
        assert_eq!(args.int("count").unwrap(), 3);
        assert!(!args.bool("wait").unwrap());

        let args = parse_args(&params, &["6h", "7", "TRUE"]).unwrap();
        assert_eq!(args.int("count").unwrap(), 7);
        assert!(args.bool("wait").unwrap());
    }

    #[test]
    fn rejects_bad_tokens() {
        let params = vec![
            ParamSpec::required("n", ParamKind::Int),
            ParamSpec::optional("wait", ParamKind::Bool, ArgValue::Bool(false)),
        ];
        assert!(parse_args(&params, &[]).is_err());
        assert!(parse_args(&params, &["seven"]).is_err());
        assert!(parse_args(&params, &["7", "maybe"]).is_err());
        assert!(parse_args(&params, &["7", "true", "extra"]).is_err());
    }

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&self, _ctx: JobContext) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn context(tmp: &TempDir, job: Arc<CountingJob>) -> ConsoleContext {
        ConsoleContext {
            scheduler: Arc::new(JobScheduler::start(job, "1h".parse().unwrap())),
            state: StateStore::new(tmp.path().join("last.json")),
            cache: ArtifactCache::new(tmp.path().join("revisions")),
        }
    }

    #[tokio::test]
    async fn dispatch_routes_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let job = Arc::new(CountingJob::default());
        let ctx = context(&tmp, job.clone());
        let registry = CommandRegistry::with_builtins();

        assert_eq!(registry.dispatch("   ", &ctx).await, Dispatch::Empty);
        assert_eq!(
            registry.dispatch("frobnicate", &ctx).await,
            Dispatch::Unknown("frobnicate".to_string())
        );
        assert_eq!(
            registry.dispatch("CHECK", &ctx).await,
            Dispatch::Handled("check".to_string())
        );

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        ctx.scheduler.shutdown(true).await;
    }

    #[tokio::test]
    async fn exit_defaults_to_immediate_shutdown() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, Arc::new(CountingJob::default()));
        let registry = CommandRegistry::with_builtins();

        registry.dispatch("exit", &ctx).await;
        assert!(ctx.scheduler.is_shutdown());
    }

    #[tokio::test]
    async fn bad_usage_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, Arc::new(CountingJob::default()));
        let registry = CommandRegistry::with_builtins();

        assert_eq!(
            registry.dispatch("rc", &ctx).await,
            Dispatch::Handled("rc".to_string())
        );
        assert_eq!(
            registry.dispatch("rc soon", &ctx).await,
            Dispatch::Handled("rc".to_string())
        );
        assert!(!ctx.scheduler.is_shutdown());
        ctx.scheduler.shutdown(false).await;
    }

    #[test]
    fn help_lists_usage_with_defaults() {
        let help = CommandRegistry::with_builtins().help_text();
        assert!(help.contains("rc <cadence: str>"));
        assert!(help.contains("exit [wait: bool = false]"));
        assert!(help.contains("help"));
    }

    struct PurgeCommand;

    #[async_trait]
    impl ConsoleCommand for PurgeCommand {
        fn name(&self) -> &str {
            "purge"
        }

        fn description(&self) -> &str {
            "Discard every cached artifact"
        }

        async fn execute(&self, _args: Args, ctx: &ConsoleContext) -> Result<()> {
            ctx.cache.invalidate_all()?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn help_covers_registered_commands() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, Arc::new(CountingJob::default()));
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(PurgeCommand));

        let help = registry.help_text();
        assert!(help.contains("purge"));
        assert!(help.contains("Discard every cached artifact"));
        assert_eq!(
            registry.dispatch("HELP", &ctx).await,
            Dispatch::Handled("help".to_string())
        );
        ctx.scheduler.shutdown(false).await;
    }
}
