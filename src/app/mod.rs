pub mod config;
pub mod credentials;
pub mod state;

pub use config::AppConfig;
pub use credentials::Credentials;
pub use state::AppState;
