pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::ClientConfig;
pub use crate::core::conversation::{ConversationOrchestrator, ConversationSnapshot};
pub use crate::core::gateway::{Gateway, GatewayError, HttpGateway};
pub use crate::core::poller::PollingController;
pub use crate::core::workflow::{WorkflowOrchestrator, WorkflowSnapshot};
