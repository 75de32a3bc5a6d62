//! Gateway assembly: route table and server lifecycle

mod router;
mod server;

pub use router::{AppState, create_router};
pub use server::Gateway;
