pub mod config;
pub mod engine;
pub mod errors;
pub mod images;
pub mod model;
pub mod providers;
pub mod storage;
