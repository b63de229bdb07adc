//! Study Recommender Backend Library
//!
//! Exposes the authentication core (token codec, session store, auth
//! service) and the HTTP surface built on it. The binary wires config,
//! logging and the session maintenance task.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod maintenance;
pub mod middleware;
