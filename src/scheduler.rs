//! Single-worker job scheduler.
//!
//! A [`JobScheduler`] owns one background task that executes a
//! [`ScheduledJob`] on a fixed [`Cadence`] and on demand. All control goes
//! through a request queue, and the worker awaits each run before starting
//! another, so two runs can never overlap:
//!
//! ```text
//!  console ──run_once──┐
//!  console ──reschedule┼──▶ request queue ──▶ worker ──▶ job.execute()
//!  timer ──────tick────┘                       (one run at a time)
//! ```
//!
//! A tick that falls due while a run is in flight fires as soon as the run
//! finishes. Manual runs requested meanwhile are queued and executed in order.
//! Reschedule and next-fire queries are answered even while a run is active.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Fixed interval between recurring runs, written as `<n>s|m|h|d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence(Duration);

impl Cadence {
    pub fn new(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            bail!("cadence must be greater than zero");
        }
        Ok(Self(interval))
    }

    pub fn interval(&self) -> Duration {
        self.0
    }
}

impl FromStr for Cadence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow!("cadence '{}' needs a unit (s, m, h or d)", s))?;
        let (digits, unit) = s.split_at(split);
        let n: u64 = digits
            .parse()
            .map_err(|_| anyhow!("cadence '{}' must start with a number", s))?;
        let secs = match unit {
            "s" => n,
            "m" => n.saturating_mul(60),
            "h" => n.saturating_mul(3600),
            "d" => n.saturating_mul(86_400),
            other => bail!("unknown cadence unit '{}' (use s, m, h or d)", other),
        };
        Cadence::new(Duration::from_secs(secs))
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        if secs % 86_400 == 0 {
            write!(f, "{}d", secs / 86_400)
        } else if secs % 3600 == 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Recurring,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Recurring => f.write_str("recurring"),
            Trigger::Manual => f.write_str("manual"),
        }
    }
}

/// Passed to every run.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub trigger: Trigger,
    /// When the next recurring run is due.
    pub next_fire_time: Option<DateTime<Utc>>,
}

/// Work the scheduler can run. Errors are the job's to log.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: JobContext);
}

enum Request {
    RunNow,
    Reschedule {
        cadence: Cadence,
        reply: oneshot::Sender<DateTime<Utc>>,
    },
    NextFire {
        reply: oneshot::Sender<DateTime<Utc>>,
    },
    Shutdown,
}

pub struct JobScheduler {
    requests: mpsc::UnboundedSender<Request>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    /// Spawn the worker. The first recurring run is due one `cadence` from now.
    pub fn start(job: Arc<dyn ScheduledJob>, cadence: Cadence) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            job,
            cadence,
            next_fire: Instant::now() + cadence.interval(),
            pending_manual: 0,
            stopping: false,
        };
        let handle = tokio::spawn(worker.run(rx));
        Self {
            requests: tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue an immediate run. The recurring schedule is left untouched.
    pub fn run_once(&self) -> Result<()> {
        self.send(Request::RunNow)
    }

    /// Replace the cadence and return the new next fire time.
    pub async fn reschedule(&self, cadence: Cadence) -> Result<DateTime<Utc>> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Reschedule { cadence, reply })?;
        rx.await.map_err(|_| anyhow!("scheduler is shut down"))
    }

    pub async fn next_fire_time(&self) -> Result<DateTime<Utc>> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::NextFire { reply })?;
        rx.await.map_err(|_| anyhow!("scheduler is shut down"))
    }

    /// Stop the worker.
    ///
    /// With `wait_for_completion` an in-flight run finishes first; otherwise
    /// the worker is aborted where it stands. Queued manual runs are dropped
    /// either way.
    pub async fn shutdown(&self, wait_for_completion: bool) {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        let Some(handle) = handle else {
            return;
        };

        if wait_for_completion {
            let _ = self.requests.send(Request::Shutdown);
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler worker ended abnormally");
            }
        } else {
            handle.abort();
            let _ = handle.await;
        }
        info!("scheduler shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.requests.is_closed()
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| anyhow!("scheduler is shut down"))
    }
}

struct Worker {
    job: Arc<dyn ScheduledJob>,
    cadence: Cadence,
    next_fire: Instant,
    pending_manual: usize,
    stopping: bool,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        debug!(job = self.job.name(), cadence = %self.cadence, "scheduler started");

        while !self.stopping {
            let trigger = if self.pending_manual > 0 {
                self.pending_manual -= 1;
                Trigger::Manual
            } else {
                tokio::select! {
                    _ = sleep_until(self.next_fire) => {
                        self.advance();
                        Trigger::Recurring
                    }
                    request = rx.recv() => {
                        match request {
                            Some(request) => self.handle(request),
                            None => self.stopping = true,
                        }
                        continue;
                    }
                }
            };

            let ctx = JobContext {
                trigger,
                next_fire_time: Some(self.next_fire_utc()),
            };
            debug!(job = self.job.name(), %trigger, "run started");

            let job = Arc::clone(&self.job);
            let run = job.execute(ctx);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    _ = &mut run => break,
                    // A closed queue keeps yielding None; stop polling it.
                    request = rx.recv(), if !self.stopping => match request {
                        Some(request) => self.handle(request),
                        None => self.stopping = true,
                    },
                }
            }
            debug!(job = self.job.name(), %trigger, "run finished");
        }

        rx.close();
        debug!(job = self.job.name(), "scheduler stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::RunNow => self.pending_manual += 1,
            Request::Reschedule { cadence, reply } => {
                self.cadence = cadence;
                self.next_fire = Instant::now() + cadence.interval();
                let next = self.next_fire_utc();
                info!(
                    %cadence,
                    next = %next.format("%m/%d/%Y %H:%M:%S GMT"),
                    "upcoming revision check"
                );
                let _ = reply.send(next);
            }
            Request::NextFire { reply } => {
                let _ = reply.send(self.next_fire_utc());
            }
            Request::Shutdown => {
                self.stopping = true;
                self.pending_manual = 0;
            }
        }
    }

    /// Move `next_fire` past now, skipping slots missed during a long run.
    fn advance(&mut self) {
        let now = Instant::now();
        self.next_fire += self.cadence.interval();
        if self.next_fire <= now {
            self.next_fire = now + self.cadence.interval();
        }
    }

    fn next_fire_utc(&self) -> DateTime<Utc> {
        let remaining = self.next_fire.saturating_duration_since(Instant::now());
        let remaining =
            chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() + remaining
    }
}
