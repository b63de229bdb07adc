//! Authentication Module
//! Token codec, user and refresh-session storage, the auth service and its
//! HTTP endpoints and role gate.

pub mod api;
pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod service;
pub mod session_store;
pub mod user_store;

pub use api::AuthState;
pub use errors::AuthError;
pub use jwt::{TokenCodec, TokenLifetimes};
pub use middleware::{require_roles, RoleGate};
pub use models::{Identity, UserRole};
pub use service::AuthService;
pub use session_store::SessionStore;
pub use user_store::UserStore;
