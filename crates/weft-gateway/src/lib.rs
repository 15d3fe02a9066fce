mod auth;
mod error;
mod middleware;
mod routes;
mod server;
mod state;

pub use error::ApiError;
pub use server::{router, GatewayServer};
pub use state::AppState;
