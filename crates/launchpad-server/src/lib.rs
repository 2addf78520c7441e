//! Launchpad Server
//!
//! Request entrypoint for the orchestrator. [`RequestHandler`] serves the
//! tagged [`Request`] actions and answers with an [`Envelope`]; [`app`]
//! wires configuration to the production adapters.

pub mod app;
pub mod envelope;
pub mod handler;
pub mod request;

pub use app::{build_handler, build_handler_with_store, Ports};
pub use envelope::{Envelope, ErrorBody};
pub use handler::{RequestHandler, SessionView};
pub use request::Request;
