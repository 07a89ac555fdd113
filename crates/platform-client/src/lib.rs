//! Orchestration Platform Client
//!
//! The capability the reconciliation core receives at initialization time:
//! create/get/update/delete/list of named resources, server version reporting,
//! and a fire-and-forget event sink.
//!
//! # Example
//!
//! ```no_run
//! use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
//! use platform_client::{KubePlatformClient, PlatformClient};
//!
//! # async fn example() -> Result<(), platform_client::PlatformError> {
//! let client = KubePlatformClient::try_default().await?;
//! let version = client.server_version().await?;
//!
//! let config_maps = ApiResource::from_gvk_with_plural(
//!     &GroupVersionKind::gvk("", "v1", "ConfigMap"),
//!     "configmaps",
//! );
//! let cm = DynamicObject::new("px-versions", &config_maps).within("kube-system");
//! match client.create(&config_maps, &cm).await {
//!     Ok(_) => println!("created on {version}"),
//!     Err(e) if e.is_already_exists() => println!("already there"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod version;
#[path = "trait.rs"]
pub mod platform_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubePlatformClient;
pub use error::PlatformError;
pub use events::{EventSeverity, EventSink, KubeEventSink, NoopEventSink};
pub use platform_trait::PlatformClient;
pub use version::{PlatformVersion, VersionParseError};
#[cfg(feature = "test-util")]
pub use mock::{MockOp, MockPlatformClient, RecordedEvent, RecordingEventSink};
