pub mod auth;
pub mod backfill;
pub mod clients;
pub mod config;
pub mod credentials;
pub mod error;
pub mod firestore;
pub mod identity;
