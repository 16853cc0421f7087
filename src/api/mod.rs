pub mod episodes;
pub mod state;

pub use episodes::episode_routes;
pub use state::AppState;
