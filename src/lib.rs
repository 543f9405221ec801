pub mod codegen;
pub mod config;
pub mod judge;
pub mod language;
pub mod limiter;
pub mod routes;
pub mod sandbox;
pub mod schema;
pub mod web_server;
