// Library for tests to access modules

pub mod config;
pub mod cycle;
pub mod gate;
pub mod models;
pub mod scheduler;
pub mod sources;
pub mod table_store;
pub mod vault;
pub mod version;
pub mod writer;
