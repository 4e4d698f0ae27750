//! Domain types for the chat domain

pub mod entities;
pub mod state;
pub mod thread;
