//! Shared types for the kiosk workspace: catalog models, decoded chat events,
//! and the render instructions handed back to the transport.

pub mod api;
pub mod events;
pub mod models;
