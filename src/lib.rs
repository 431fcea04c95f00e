// Library for tests to access modules

pub mod api_client;
pub mod collector_repo;
pub mod company_deleter;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod flusher;
pub mod model_setup;
pub mod models;
pub mod publisher;
pub mod version;
