//! Extension traits for revision sources and catalog extractors.
//!
//! The monitor job never talks to the network or decodes a build itself. It
//! goes through these two seams, which lets the HTTP source be swapped for an
//! in-memory one in tests or for a different backend in deployment.
//!
//! ```text
//! ┌─────────────────┐   fetch_latest_revision   ┌──────────────────┐
//! │                 │ ────────────────────────▶ │  RevisionSource  │
//! │ RevisionMonitor │   fetch_build             │  (HTTP, custom)  │
//! │      Job        │ ────────────────────────▶ └──────────────────┘
//! │                 │   extract(build, dir)     ┌──────────────────┐
//! │                 │ ────────────────────────▶ │ CatalogExtractor │
//! └─────────────────┘                           └──────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::MonitorResult;
use crate::models::{Build, Catalog, Direction, Environment, Revision};
use crate::reference::ReferenceData;

/// Supplies revisions and builds for monitored environments.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use harble::error::{MonitorError, MonitorResult};
/// use harble::models::{Build, Environment, Revision};
/// use harble::traits::RevisionSource;
///
/// struct FixedSource;
///
/// #[async_trait]
/// impl RevisionSource for FixedSource {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn fetch_latest_revision(&self, _env: Environment) -> MonitorResult<Revision> {
///         Revision::new("PRODUCTION-201904011212-888653470")
///     }
///
///     async fn fetch_build(&self, revision: &Revision) -> MonitorResult<Build> {
///         Err(MonitorError::Fetch(format!("no build for {}", revision)))
///     }
/// }
/// ```
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// Short name used in logs (e.g. `"http"`).
    fn name(&self) -> &str;

    /// The revision currently deployed to `environment`.
    async fn fetch_latest_revision(&self, environment: Environment) -> MonitorResult<Revision>;

    /// The build for `revision`, decoded into message tables.
    async fn fetch_build(&self, revision: &Revision) -> MonitorResult<Build>;
}

/// Turns a build into a message catalog for one direction.
pub trait CatalogExtractor: Send + Sync {
    fn extract(
        &self,
        build: &Build,
        direction: Direction,
        reference: &ReferenceData,
    ) -> MonitorResult<Catalog>;
}
