//! # libbridge
//!
//! Async Rust bridge to the scripting interpreter embedded in a running 3D
//! application.
//!
//! The library launches the application in background mode with a small
//! request server injected into its interpreter, then lets Rust code drive
//! the object graph through typed proxies:
//! - Property reads and writes, method calls, and collection access
//! - Host functions passed as callbacks and invoked from the interpreter
//! - Reentrant calls from inside those callbacks
//! - Local validation of enums, arrays and matrices before anything is sent
//!
//! ## Quick Start
//!
//! ```ignore
//! use libbridge::{Args, Bridge, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::launch().await?;
//!     let data = bridge.root("bpy.data");
//!
//!     let mesh = data.member("meshes").call("new", Args::new().arg("name", "Grid")).await?;
//!     println!("created {:?}", mesh);
//!
//!     bridge.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Typed Proxies
//!
//! ```ignore
//! use libbridge::{Collection, MutableCollection, RemoteObject};
//!
//! libbridge::remote_object! {
//!     pub struct Material;
//! }
//!
//! let materials: MutableCollection<Material> = bridge.wrap("bpy.data.materials");
//! let steel = materials.new(Args::new().arg("name", "Steel")).await?;
//! assert!(steel.same_remote(&materials.by_key("Steel")));
//! ```
//!
//! ## Callbacks
//!
//! ```ignore
//! use libbridge::{Arg, Args, Value};
//!
//! let timers = bridge.root("bpy.app.timers");
//! timers
//!     .call("register", Args::new().arg("function", Arg::callback(|ctx| async move {
//!         let frame = ctx.client().get_integer(&"bpy.context.scene".into(), "frame_current").await?;
//!         Ok(Value::Float(if frame > 100 { -1.0 } else { 0.5 }))
//!     })))
//!     .await?;
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! use std::time::Duration;
//! use libbridge::{Bridge, RequestOrdering};
//!
//! let bridge = Bridge::builder()
//!     .executable("/opt/blender/blender")
//!     .launch_arg("--factory-startup")
//!     .call_timeout(Duration::from_secs(30))
//!     .ordering(RequestOrdering::Serialized)
//!     .start()
//!     .await?;
//! ```

mod callback;
mod client;
mod collection;
pub mod config;
mod error;
pub mod marshal;
mod observer;
mod path;
pub mod protocol;
mod proxy;
pub mod transport;

pub use error::{Error, Result, ValidationError};

// Re-export the main client types at crate root
pub use client::{Bridge, BridgeBuilder, Client};
pub use path::AccessorPath;

// Re-export commonly used config types at crate root
pub use config::{BridgeConfig, BridgeConfigBuilder, ProtocolOptions, RequestOrdering};

// Re-export proxy and value types at crate root
pub use collection::{Collection, MutableCollection};
pub use marshal::{Arg, ArgMap, Args, FromValue, Matrix, Value};
pub use proxy::{Object, RemoteObject};

pub use callback::{Callback, CallbackContext, CallbackId, CallbackRegistry};
pub use observer::{BridgeObserver, LogLevel, LoggingObserver};

// Re-export commonly used protocol types at crate root
pub use protocol::{CloseReason, CorrelationId, Index, Message, RemoteError, Request, Response};
