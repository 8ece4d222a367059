//! Domain layer - Pure business logic with no external dependencies
//!
//! This crate contains:
//! - Entities (Device, Association, Command, Scene)
//! - Value Objects (DeviceId, DeviceState, Condition)
//! - Domain Events and the publisher trait
//! - Store interfaces (traits) for the external persistence collaborator
//! - Bridge wire message payloads
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Business rules enforced at domain level
//! - Testable in isolation

pub mod association;
pub mod auth;
pub mod command;
pub mod condition;
pub mod device;
pub mod error;
pub mod event;
pub mod message;
pub mod scene;
pub mod state;
pub mod store;

// Re-export commonly used types
pub use association::{Association, AssociationTarget, AssociationType, MetricMap};
pub use command::{Command, CommandResolution, CommandSource};
pub use device::{Capability, Device, DeviceId, Domain, Protocol};
pub use error::CoreError;
pub use event::CoreEvent;
pub use scene::{Scene, SceneAction, SceneExecution};
pub use state::{DeviceState, StateSource};
