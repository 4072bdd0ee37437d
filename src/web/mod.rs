//! Web interface module
//!
//! Exposes the score queries as a JSON REST API. Handlers only translate
//! between HTTP and `ScoreQueries`; they never touch index structures.

mod handlers;
mod server;

pub use handlers::{ApiError, GenericResponse};
pub use server::{router, run_web_server};
