//! Client for the texture-generation backend.
//!
//! [`orchestrator::GenerationOrchestrator`] drives the generate / modify /
//! finalize lifecycle on top of [`api::JobApi`], which speaks to the backend
//! through an [`transport::HttpTransport`]. Authentication state lives in
//! [`session::AuthSession`] and is refreshed transparently by
//! [`auth::AuthenticatedClient`].

pub mod api;
pub mod auth;
pub mod auth_api;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod poller;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;
