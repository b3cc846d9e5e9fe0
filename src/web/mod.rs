//! Dashboard web server
//!
//! Serves the evaluate/analytics page, a rendered gap report per run and the
//! JSON API both pages use.

mod handlers;
mod server;
mod state;

pub use server::start_server;
pub use state::AppState;
