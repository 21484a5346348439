// src/lib.rs
//! MongoDB operations for workflow steps.
//!
//! A workflow step hands over loosely typed JSON parameters (filters, updates,
//! pipelines, index definitions). [`coerce`] restores the BSON types JSON cannot
//! carry and [`dispatch`] maps each operation onto the right driver call,
//! producing one uniform [`output::OutputRecord`] stream.
pub mod cli;
pub mod coerce;
pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod items;
pub mod mongo;
pub mod operation;
pub mod output;
pub mod request;
pub mod store;
pub mod template;

pub use context::{ExecutionContext, PairedItem, ParameterExt, WorkItem};
pub use credentials::{check_credentials, CredentialCheck, Credentials};
pub use dispatch::{execute, Dispatcher};
pub use error::{NodeError, Result, StoreError};
pub use operation::{ItemMode, OperationKind};
pub use output::OutputRecord;
pub use store::{DocumentStore, StoreConnector};
