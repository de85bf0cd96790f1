//! API Module
//!
//! HTTP handlers and routing for the admin REST API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Store statistics
//! - `PUT /entries` - Seed an entry
//! - `GET /entries/:key` - Inspect a live entry
//! - `DELETE /entries/:key` - Delete an entry
//! - `POST /worker` - Submit a request envelope to the computation unit
//! - `POST /maintenance` - Run one maintenance pass

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
