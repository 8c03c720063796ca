//! Private chatroom server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod bootstrap;
pub mod cert;
pub mod chat;
pub mod config;
pub mod hub;
pub mod moderation;
pub mod registry;
pub mod routes;
pub mod state;
pub mod ws;

mod storage;
