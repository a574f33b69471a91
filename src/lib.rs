pub mod auth;
pub mod clock;
pub mod configuration;
pub mod error;
pub mod identifiers;
pub mod logger;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod records;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod validators;
