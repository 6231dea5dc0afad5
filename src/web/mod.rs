pub mod app;
pub mod routes;
pub mod secrets;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
