// Platform definitions and account statuses
pub mod platform;

// Error taxonomy
pub mod error;

// Encrypted account storage
pub mod accounts;

// OAuth state, provider endpoints and vendor HTTP
pub mod oauth;

// Connection lifecycle
pub mod manager;

// Request identity
pub mod auth;

// HTTP API
pub mod api;

// Service configuration
pub mod config;
