//! Whitelist reconciliation engine for time-limited video approvals.
//!
//! Approvals live in a SQLite store. The engine keeps a plain-text
//! allow-list (one identifier per line) in sync with the set of approvals
//! that have not expired, and tells the proxy to reread it:
//!
//! - [`store`]: durable approval records keyed by identifier
//! - [`resolver`]: pure active-set computation at an evaluation time
//! - [`artifact`]: atomic, durable replacement of the allow-list file
//! - [`reload`]: out-of-process reload signal (e.g. `systemctl reload squid`)
//! - [`engine`]: the single writer that serializes and coalesces cycles
//! - [`lock`]: `flock` exclusion between engines in different processes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tubegate_core::{ApprovalRequest, CommandReload, FileArtifact, Reconciler, SqliteStore};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("tubegate.db".as_ref())?;
//! let engine = Reconciler::new(
//!     Arc::new(store),
//!     FileArtifact::new("/var/lib/youtube-proxy/youtube_whitelist.txt"),
//!     CommandReload::squid(),
//! );
//! engine.startup()?;
//!
//! engine.approve(&ApprovalRequest {
//!     identifier: "dQw4w9WgXcQ".to_string(),
//!     label: Some("Untitled".to_string()),
//!     requester: Some("guest".to_string()),
//!     ttl: Some(Duration::from_secs(24 * 60 * 60)),
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `TUBEGATE_DATABASE` | SQLite database path (default: `tubegate.db`) |
//! | `TUBEGATE_ARTIFACT` | Allow-list path (default: `/var/lib/youtube-proxy/youtube_whitelist.txt`) |
//! | `TUBEGATE_RELOAD_PROGRAM` | Reload command, or `none` |
//! | `TUBEGATE_DEFAULT_TTL` | Approval lifetime, humantime syntax (default: `24h`) |

pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod reload;
pub mod resolver;
pub mod schema;
pub mod store;

pub use artifact::{read_artifact, ArtifactWriter, FileArtifact};
pub use config::{Config, ReloadConfig};
pub use engine::{ApprovalRequest, CycleReport, LastCycle, Reconciler, SweepReport};
pub use error::{
    ArtifactWriteError, ConfigError, CyclePhase, MutationError, ReconcileError, ReloadError,
    StorageError, SweepError,
};
pub use lock::{CycleLock, CycleLockGuard};
pub use reload::{AnyReload, CommandReload, NoReload, ReloadTrigger};
pub use resolver::resolve;
pub use store::{ApprovalRecord, EntryStore, NewApproval, SqliteStore};
