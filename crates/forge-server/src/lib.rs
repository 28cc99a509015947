//! Rigforge HTTP surface and command line
//!
//! `POST /generate` runs the whole pipeline for a prompt and answers with the
//! finished GLB; `GET /models/{id}` serves a stored run.

#![allow(missing_docs)]

pub mod app;
pub mod cli;
pub mod logging;
pub mod routes;

pub use app::{build_state, serve, warm_up};
pub use routes::{routes, AppState};
