pub mod entity_handlers;
pub mod handlers;
pub mod routes;
pub mod user_extractor;

pub use routes::*;
