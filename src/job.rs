//! The revision monitor job.
//!
//! One run refreshes the reference definitions (sweeping the cache if they
//! changed), asks every monitored environment for its current revision,
//! extracts and caches catalogs for revisions not seen before, and finally
//! writes the last-checked snapshot.
//!
//! Failures are isolated per environment: a fetch, extraction, or cache-write
//! error is logged and recorded in the [`RunReport`], and the run moves on to
//! the next environment. Only a reference-data failure aborts the run, since
//! no environment can be extracted correctly without it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::ArtifactCache;
use crate::config::Config;
use crate::connector_http::HttpRevisionSource;
use crate::error::{MonitorError, MonitorResult};
use crate::extract::ReferenceCatalogExtractor;
use crate::models::{CachedArtifact, Direction, Environment, LastCheckedRecord, Revision};
use crate::reference::{ReferenceData, ReferenceDataStore, Refresh};
use crate::scheduler::{JobContext, ScheduledJob};
use crate::state::StateStore;
use crate::traits::{CatalogExtractor, RevisionSource};

/// One environment that could not be fully processed in a run.
#[derive(Debug)]
pub struct EnvironmentFailure {
    pub environment: Environment,
    /// Set when the revision was fetched and the failure happened afterwards.
    pub revision: Option<Revision>,
    pub error: MonitorError,
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    /// Single timestamp shared by every record of the run.
    pub checked_at: DateTime<Utc>,
    /// The snapshot handed to the state store.
    pub records: Vec<LastCheckedRecord>,
    /// Revisions extracted and cached during this run.
    pub new_revisions: Vec<Revision>,
    pub failures: Vec<EnvironmentFailure>,
    /// Artifact files discarded because the reference data changed.
    pub invalidated: Vec<String>,
    /// Set when the snapshot could not be written.
    pub state_error: Option<MonitorError>,
    /// Next scheduled run, when fired by the scheduler.
    pub next_run: Option<DateTime<Utc>>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "check {}", self.checked_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "  environments recorded: {}", self.records.len())?;
        writeln!(f, "  revision updates found: {}", self.new_revisions.len())?;
        for revision in &self.new_revisions {
            writeln!(f, "    + {}", revision)?;
        }
        if !self.invalidated.is_empty() {
            writeln!(f, "  discarded artifacts: {}", self.invalidated.len())?;
        }
        writeln!(f, "  failures: {}", self.failures.len())?;
        for failure in &self.failures {
            writeln!(
                f,
                "    ! {} ({}): {}",
                failure.environment,
                failure.error.kind(),
                failure.error
            )?;
        }
        match &self.state_error {
            None => writeln!(f, "  state saved: yes")?,
            Some(e) => writeln!(f, "  state saved: no ({})", e)?,
        }
        if let Some(next) = self.next_run {
            writeln!(f, "  upcoming check: {}", next.format("%m/%d/%Y %H:%M:%S GMT"))?;
        }
        Ok(())
    }
}

pub struct RevisionMonitorJob {
    reference: ReferenceDataStore,
    cache: ArtifactCache,
    state: StateStore,
    source: Arc<dyn RevisionSource>,
    extractor: Arc<dyn CatalogExtractor>,
    environments: Vec<Environment>,
}

impl RevisionMonitorJob {
    pub fn new(
        reference: ReferenceDataStore,
        cache: ArtifactCache,
        state: StateStore,
        source: Arc<dyn RevisionSource>,
        extractor: Arc<dyn CatalogExtractor>,
        environments: Vec<Environment>,
    ) -> Self {
        Self {
            reference,
            cache,
            state,
            source,
            extractor,
            environments,
        }
    }

    /// Build a job wired to the HTTP source and the default extractor.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpRevisionSource::new(config.remote.clone())?;
        Ok(Self::new(
            ReferenceDataStore::new(
                &config.storage.reference_source,
                &config.storage.reference_working,
            ),
            ArtifactCache::new(&config.storage.cache_dir),
            StateStore::new(&config.storage.state_file),
            Arc::new(source),
            Arc::new(ReferenceCatalogExtractor),
            config.environments(),
        ))
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub async fn run(&self) -> MonitorResult<RunReport> {
        self.run_at(Utc::now()).await
    }

    /// Run once with `checked_at` as the timestamp of every record.
    pub async fn run_at(&self, checked_at: DateTime<Utc>) -> MonitorResult<RunReport> {
        info!(source = self.source.name(), "updating revisions");

        let refresh = self.reference.refresh().inspect_err(|e| {
            error!(error = %e, "reference data unavailable, run aborted");
        })?;
        let invalidated = self.reconcile_cache(&refresh);

        let mut records = Vec::with_capacity(self.environments.len());
        let mut new_revisions = Vec::new();
        let mut failures = Vec::new();

        for &environment in &self.environments {
            let revision = match self.source.fetch_latest_revision(environment).await {
                Ok(revision) => revision,
                Err(e) => {
                    warn!(%environment, error = %e, "revision check failed, skipping environment");
                    failures.push(EnvironmentFailure {
                        environment,
                        revision: None,
                        error: e,
                    });
                    continue;
                }
            };

            records.push(LastCheckedRecord {
                hotel: environment,
                revision: revision.clone(),
                last_checked: checked_at,
            });

            if self.cache.exists(&revision) {
                debug!(%environment, %revision, "revision already cached");
                continue;
            }

            info!(%environment, %revision, "extracting messages (name, hash, structure)");
            match self.extract_and_cache(&revision, &refresh.data).await {
                Ok(()) => new_revisions.push(revision),
                Err(e) => {
                    warn!(%environment, %revision, error = %e, "extraction abandoned for this run");
                    failures.push(EnvironmentFailure {
                        environment,
                        revision: Some(revision),
                        error: e,
                    });
                }
            }
        }

        let records = self.snapshot(records, &failures);
        let state_error = match self.state.save(&records) {
            Ok(()) => None,
            Err(e) => {
                error!(
                    path = %self.state.path().display(),
                    error = %e,
                    "failed to save last-checked state"
                );
                Some(e)
            }
        };

        info!(
            new = new_revisions.len(),
            failed = failures.len(),
            "revision updates found"
        );

        Ok(RunReport {
            checked_at,
            records,
            new_revisions,
            failures,
            invalidated,
            state_error,
            next_run: None,
        })
    }

    /// Sweep the cache when the definitions changed and move the baseline.
    ///
    /// The baseline only moves after a complete sweep, so leftovers are swept
    /// again on the next run.
    fn reconcile_cache(&self, refresh: &Refresh) -> Vec<String> {
        if !refresh.changed {
            // Bootstrap: seed the baseline when there was none to compare.
            if refresh.baseline.as_deref() != Some(refresh.fingerprint.as_str()) {
                if let Err(e) = self.reference.commit(&refresh.fingerprint) {
                    warn!(error = %e, "failed to record reference fingerprint");
                }
            }
            return Vec::new();
        }

        info!(
            fingerprint = %refresh.fingerprint,
            "reference data changed, discarding cached artifacts"
        );
        let sweep = match self.cache.invalidate_all() {
            Ok(sweep) => sweep,
            Err(e) => {
                error!(error = %e, "cache sweep failed, will retry next run");
                return Vec::new();
            }
        };

        for name in &sweep.removed {
            info!(file = %name, "discarded cached artifact");
        }

        if sweep.is_complete() {
            if let Err(e) = self.reference.commit(&refresh.fingerprint) {
                error!(error = %e, "failed to record reference fingerprint, sweep will repeat");
            }
        } else {
            warn!(
                failed = sweep.failed.len(),
                "cache sweep incomplete, reference baseline kept for retry"
            );
        }
        sweep.removed
    }

    async fn extract_and_cache(
        &self,
        revision: &Revision,
        reference: &ReferenceData,
    ) -> MonitorResult<()> {
        let build = self.source.fetch_build(revision).await?;
        let incoming = self
            .extractor
            .extract(&build, Direction::Incoming, reference)?;
        let outgoing = self
            .extractor
            .extract(&build, Direction::Outgoing, reference)?;

        let artifact = CachedArtifact {
            revision: revision.clone(),
            file_length: build.file_length,
            incoming,
            outgoing,
        };
        self.cache.write(revision, &artifact)?;
        Ok(())
    }

    /// One record per monitored environment, in monitoring order.
    ///
    /// Environments whose revision could not be fetched keep their previous
    /// on-disk record, or are left out if they never had one.
    fn snapshot(
        &self,
        current: Vec<LastCheckedRecord>,
        failures: &[EnvironmentFailure],
    ) -> Vec<LastCheckedRecord> {
        let unchecked: HashSet<Environment> = failures
            .iter()
            .filter(|f| f.revision.is_none())
            .map(|f| f.environment)
            .collect();

        let previous = if unchecked.is_empty() {
            Vec::new()
        } else {
            self.state.load().unwrap_or_else(|e| {
                warn!(error = %e, "previous state unreadable, nothing to carry over");
                Vec::new()
            })
        };

        let mut records = Vec::with_capacity(self.environments.len());
        for environment in &self.environments {
            if let Some(record) = current.iter().find(|r| r.hotel == *environment) {
                records.push(record.clone());
            } else if unchecked.contains(environment) {
                if let Some(record) = previous.iter().find(|r| r.hotel == *environment) {
                    records.push(record.clone());
                }
            }
        }
        records
    }
}

#[async_trait]
impl ScheduledJob for RevisionMonitorJob {
    fn name(&self) -> &str {
        "revision-monitor"
    }

    async fn execute(&self, ctx: JobContext) {
        match self.run().await {
            Ok(mut report) => {
                report.next_run = ctx.next_fire_time;
                if let Some(next) = report.next_run {
                    info!(
                        trigger = %ctx.trigger,
                        next = %next.format("%m/%d/%Y %H:%M:%S GMT"),
                        "upcoming revision check"
                    );
                }
                print!("{}", report);
            }
            Err(e) => error!(trigger = %ctx.trigger, error = %e, "revision check aborted"),
        }
    }
}
