pub mod routes;

pub use routes::{cors_layer, create_router};
