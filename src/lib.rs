//! A minimal peer-to-peer file distribution network: a central tracker maps
//! file names to content-addressed chunk sequences and chunks to the peers
//! seeding them; peer nodes publish files, seed chunks, and fetch chunks
//! directly from one another.

pub mod config;
pub mod errors;
pub mod peer;
pub mod protocol;
pub mod store;
pub mod tracker;
