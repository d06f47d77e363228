//! # Stockroom Engine
//!
//! Offline-first replication of an inventory of containers and items between
//! a local document store and a remote REST service.
//!
//! Reads and writes always go to the local store, so the application works
//! without a network. Whenever connectivity is available the
//! [`ReplicationEngine`] runs a cycle:
//!
//! 1. **Probe** the remote; abort the cycle if it does not answer.
//! 2. **Pull** every remote container, then every remote item, overwriting
//!    local copies (the remote wins).
//! 3. **Push** every local record still marked `isSynced = false`, creating or
//!    updating it remotely, and mark it synced once the remote accepted it.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! [`Container`] and [`Item`] are plain serde structs. Local documents use
//! camelCase fields; the remote schema (`_id`, `qty`, `selling_price`,
//! `container_id`) is handled by [`wire`].
//!
//! ### Store
//!
//! [`LocalStore`] is an async document-store contract with change streams.
//! [`MemoryStore`] implements it; [`TypedStore`] adds typed helpers to every
//! store.
//!
//! ### Connectivity
//!
//! [`ConnectivityMonitor`] fans host online/offline signals out to
//! subscribers. The engine starts a full cycle on each Offline -> Online
//! transition.
//!
//! ### Single flight
//!
//! At most one cycle runs at a time. Requests made while a cycle runs are
//! coalesced into one follow-up cycle.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stockroom_engine::{EngineConfig, ItemDraft, Stockroom};
//!
//! # async fn run() -> stockroom_engine::error::Result<()> {
//! let stockroom = Stockroom::connect(EngineConfig::from_env()?).await?;
//!
//! let shop = stockroom.inventory().create_container("Corner Shop").await?;
//! stockroom
//!     .inventory()
//!     .create_item(ItemDraft::new("Widget", 3, 9.99, shop.id.clone()))
//!     .await?;
//!
//! let report = stockroom.engine().sync_now().await;
//! println!("pushed {} records", report.pushed());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod flight;
pub mod inventory;
pub mod record;
pub mod remote;
pub mod replicate;
pub mod snapshot;
pub mod store;
pub mod wire;

// Re-export main types at crate root
pub use config::EngineConfig;
pub use connectivity::{Connectivity, ConnectivityMonitor, Subscription};
pub use context::Stockroom;
pub use error::Error;
pub use inventory::{Inventory, ItemDraft};
pub use record::{Collection, Container, Document, Item, MAX_TEXT_LEN};
pub use remote::{HttpRemote, RemoteService};
pub use replicate::{CycleKind, CycleOutcome, CycleReport, PhaseStats, ReplicationEngine, Trigger};
pub use snapshot::{CacheSnapshot, FallbackCache, RestoreSummary, CACHE_FORMAT_VERSION};
pub use store::{ChangeEvent, ChangeKind, ChangeStream, Filter, LocalStore, MemoryStore, TypedStore};
pub use wire::{RemoteContainer, RemoteItem};

/// Identifier of a container or item.
pub type RecordId = String;
