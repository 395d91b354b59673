//! REST API server: crawl job dispatch, price history queries and OpenAPI docs.

pub mod auth;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
