//! # Harble
//!
//! Watches the client revisions deployed to each hotel environment and, for
//! every revision not seen before, extracts its message catalog (name, hash
//! and structure per message id) and caches it on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────────┐
//! │ Console  │──▶│ JobScheduler │──▶│ RevisionMonitorJob │
//! │ (stdin)  │   │ (one worker) │   └─────────┬──────────┘
//! └──────────┘   └──────────────┘             │
//!              ┌──────────────────┬───────────┼──────────────┐
//!              ▼                  ▼           ▼              ▼
//!       ┌─────────────┐   ┌─────────────┐ ┌────────┐ ┌───────────────┐
//!       │ Reference   │   │ Artifact    │ │ State  │ │ RevisionSource│
//!       │ Hashes.toml │   │ Cache       │ │ last.  │ │ + Catalog     │
//!       │ + sha256    │   │ <rev>.json  │ │ json   │ │   Extractor   │
//!       └─────────────┘   └─────────────┘ └────────┘ └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harble check                  # run one revision check and exit
//! harble status                 # show last-checked revisions and the cache
//! harble serve                  # scheduler + interactive console
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Failure taxonomy of a run |
//! | [`reference`] | Hash definitions and change detection |
//! | [`cache`] | Revision-keyed artifact cache |
//! | [`state`] | Last-checked snapshot |
//! | [`traits`] | Revision source and extractor seams |
//! | [`extract`] | Default catalog extractor |
//! | [`connector_http`] | HTTP revision source |
//! | [`job`] | The revision monitor job |
//! | [`scheduler`] | Non-overlapping job scheduler |
//! | [`console`] | Operator command registry |
//! | [`status`] | Status overview |

pub mod cache;
pub mod config;
pub mod connector_http;
pub mod console;
pub mod error;
pub mod extract;
pub mod job;
pub mod models;
pub mod reference;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod traits;
