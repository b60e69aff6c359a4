//! Expose a set of callable operations to an LLM chat service and let the
//! model invoke them mid-conversation.
//!
//! Register commands against a [`FunctionRegistry`], hand the registry to a
//! [`GptCommandsClient`], and stream replies; when the model emits a function
//! call the client dispatches it and feeds the result back into the
//! conversation until the model produces a final, call-free reply.

pub mod client;
pub mod config;
pub mod core;
pub mod registry;
pub mod schema;

pub use client::GptCommandsClient;
pub use client::message::{Message, Role};
pub use client::transport::{ApiClient, ChatTransport};
pub use config::ClientConfig;
pub use core::error::GptError;
pub use registry::{CommandArgs, CommandResult, FunctionRegistry, RegistryBuilder};
pub use schema::{ParamType, RecordType};
