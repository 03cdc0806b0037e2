//! # media-dl
//!
//! Embeddable download orchestration library with tag-aware volume placement.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Provider-pluggable** - Acquisition strategies (direct HTTP, torrent)
//!   live behind one narrow trait; new methods slot in without touching
//!   orchestration code
//! - **Capacity-aware** - Downloads land on tag-matched volumes with both
//!   physical free space and a virtual budget, re-measured on a timer
//! - **Library-first** - No CLI or HTTP surface, purely a Rust crate for
//!   embedding; request routing and transports are the caller's concern
//! - **Event-driven** - Subscribers receive pushed lifecycle events per
//!   download, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_dl::{
//!     Broadcaster, Config, Database, DownloadManager, Method, VolumeConfig, VolumeManager,
//! };
//!
//! # use std::path::Path;
//! # use async_trait::async_trait;
//! # struct MyEngine;
//! # #[async_trait]
//! # impl media_dl::TorrentEngine for MyEngine {
//! #     async fn add_transfer(
//! #         &self,
//! #         _source: media_dl::TorrentSource,
//! #         _download_dir: &Path,
//! #         _signals: tokio::sync::mpsc::UnboundedSender<media_dl::TorrentSignal>,
//! #     ) -> media_dl::Result<media_dl::TransferId> { unimplemented!() }
//! #     async fn remove_transfer(&self, _id: media_dl::TransferId) -> media_dl::Result<()> { unimplemented!() }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         volumes: vec![VolumeConfig {
//!             name: "primary".to_string(),
//!             root: "/data/primary".into(),
//!             max_size_gb: 500.0,
//!             tags: vec!["media".to_string()],
//!         }],
//!         ..Default::default()
//!     };
//!     config.validate()?;
//!
//!     let volumes = Arc::new(VolumeManager::new(
//!         config.volumes.clone(),
//!         config.monitor.check_interval(),
//!     ));
//!     volumes.initialize().await;
//!
//!     let store = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let broadcaster = Arc::new(Broadcaster::new());
//!     let manager = DownloadManager::new(
//!         &config,
//!         volumes,
//!         broadcaster,
//!         store,
//!         Arc::new(MyEngine),
//!     )
//!     .await?;
//!
//!     let id = manager
//!         .start_download(Method::Direct, "http://host/file.bin", &["media".to_string()])
//!         .await?;
//!     println!("accepted download {id}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-download event fan-out
pub mod events;
/// Filesystem measurement helpers
pub mod fsops;
/// Download orchestration (decomposed into focused submodules)
pub mod manager;
/// Runtime download state machine
pub mod process;
/// Acquisition providers and the torrent engine boundary
pub mod provider;
/// Durable state store
pub mod store;
/// Core types
pub mod types;
/// Volume monitoring and selection
pub mod volume;

// Re-export commonly used types
pub use config::{Config, MonitorConfig, PersistenceConfig, ProvidersConfig, VolumeConfig};
pub use error::{DatabaseError, Error, Result};
pub use events::{Broadcaster, ChannelSink, EventSink, SinkError, SinkEvent, SubscriberId};
pub use manager::DownloadManager;
pub use process::DownloadProcess;
pub use provider::{
    CancellationHandle, DirectProvider, DownloadProvider, ProviderUpdate, TorrentEngine,
    TorrentProvider, TorrentSignal, TorrentSource, TransferId, UpdateSender,
};
pub use store::{Database, RecordChanges, StateStore};
pub use types::{DownloadId, DownloadRecord, DownloadSnapshot, Method, Status};
pub use volume::{VolumeManager, VolumeMonitor, VolumeState};
