pub mod credential;
pub mod error;
pub mod fault;
pub mod manager;
pub mod store;
pub mod token_cache;
pub mod transport;
