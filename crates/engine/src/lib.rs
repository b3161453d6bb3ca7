//! # Trellis Engine
//!
//! The runtime underneath a server-driven surface: it resolves declarative
//! bindings into values, keeps scoped state in sync with persistence, turns
//! user gestures into client messages and applies the messages a backend
//! pushes back.
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::{Map, json};
//! use trellis_engine::{PathContext, resolve};
//! use trellis_types::BoundValue;
//!
//! let mut document = Map::new();
//! document.insert("user".into(), json!({"name": "Ada"}));
//!
//! let name = BoundValue::path("user.name");
//! assert_eq!(resolve(&name, &document, &PathContext::new()), Some(json!("Ada")));
//! assert_eq!(resolve(&BoundValue::path("user.email"), &document, &PathContext::new()), None);
//! ```
//!
//! ## Architecture
//!
//! - **`resolve`**: bound-value resolution against any [`ValueSource`]
//! - **`store`**: the three-tier [`DataStore`] and its ordered persistence writer
//! - **`dispatch`**: [`ActionDispatcher`] and the element value ledger
//! - **`reconcile`**: [`Reconciler`], the navigation host seam and the notification bus
//! - **`execution`**: [`ExecutionInvoker`] with the execution elements cache
//! - **`backend`**: the [`ExecutionBackend`] contract with null and HTTP implementations
//! - **`runtime`**: [`SurfaceRuntime`], which wires the above together per surface tree

pub mod backend;
pub mod dispatch;
pub mod execution;
pub mod reconcile;
pub mod resolve;
pub mod runtime;
pub mod store;

pub use backend::{EventStream, ExecutionBackend, ExecutionError, HttpExecutionBackend, NullExecutionBackend};
pub use dispatch::{ActionDispatcher, ActionHandler, ActionRef, ElementValueLedger};
pub use execution::{ElementRequirements, ExecutionElementsCache, ExecutionInvoker, ExecutionTarget, RoutedMessage, SurfaceSnapshot};
pub use reconcile::{
    ComponentSubscription, ElementNotification, NavigateOptions, NavigationHost, NotificationBus, PassthroughHandler, ReconcileOutcome,
    Reconciler,
};
pub use resolve::{ValueSource, resolve, resolve_as_bool, resolve_as_number, resolve_as_string, resolve_or_default};
pub use runtime::{ActionOutcome, SurfaceRuntime, SurfaceRuntimeBuilder};
pub use store::{DataStore, PathContext, StateScope};
