//! Client library for the Scrutin election backend.
//!
//! Two halves mirror the two audiences of the service: the authenticated
//! administration surface (sessions, elections, candidates, voter rosters,
//! token distribution, results) and the anonymous ballot flow a voting link
//! drives. HTTP specifics live behind [`api::ApiClient`]; the session layer
//! owns token refresh so callers never handle a 401 themselves.

pub mod admin;
pub mod api;
pub mod ballot;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod results;
pub mod session;

pub use api::ApiClient;
pub use error::ApiError;
pub use session::SessionManager;
