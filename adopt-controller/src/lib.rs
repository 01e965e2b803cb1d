//! Adopted node controller.
//!
//! Converges adopted resources (externally provisioned nodes brought under
//! management) toward their declared state: probes the node API, gathers
//! facts and health, sets up link monitoring and keeps the remote registry in
//! sync. Status is reported through [`conditions::Conditions`] on the
//! resource and through [`events::EventSink`].

pub mod clients;
pub mod conditions;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod resource;
pub mod store;
pub mod sync;

pub use config::{ReconcilerConfig, DEFAULT_FINALIZER};
pub use controller::Controller;
pub use error::{Error, Result};
pub use reconciler::{Action, AdoptionReconciler, ReconcileOutcome, Reconciler, Step, StepResult};
pub use resource::AdoptedResource;
pub use store::{FileStore, MemoryStore, ResourceStore, StoreError};
