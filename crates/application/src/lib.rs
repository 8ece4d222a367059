//! Application layer - Coordination use cases and workflows

pub mod associations;
pub mod command;
pub mod events;
pub mod health;
pub mod logic;
pub mod registry;
pub mod scene;
pub mod state;

pub use associations::AssociationResolver;
pub use command::{AckTracker, CommandProcessor, CommandSchemaRegistry};
pub use events::{EventHandler, EventRouter, LoggingEventHandler, spawn_state_intake};
pub use health::{BridgeHealth, BridgeHealthRegistry};
pub use logic::{EvalContext, HouseMode, StateView, SunProvider, evaluate};
pub use registry::{DeviceQuery, DeviceRegistry};
pub use scene::{SceneEngine, SceneTriggerHandler};
pub use state::{StateChange, StateListener, StateManager};
