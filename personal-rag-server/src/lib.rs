//! `personal-rag-server` exposes a [`personal_rag::PersonalizedRag`] over HTTP.
//! Questions go to `POST /ask`, rebuilds to `POST /reindex`.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, ServerConfig, app_router, run_server};
