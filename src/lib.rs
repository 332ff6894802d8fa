pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod network;
pub mod normalize;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod snapshot;
pub mod trend;
