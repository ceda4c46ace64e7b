mod config;
mod error;
mod models;
mod store;

pub use config::RestConfig;
pub use error::RestDaoError;
pub use store::RestPremiereStore;
