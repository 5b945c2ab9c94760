//! Shared type definitions for the Misfortune wheel service.
//!
//! This crate is the single source of truth for all types used across the
//! Misfortune workspace: the persisted wheel records, the in-memory wheel
//! state pushed to display clients, and the wire messages exchanged with
//! the wheel client and the chat bot.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`state`] -- Wheel, drink, and per-wheel observable state
//! - [`wire`] -- Messages exchanged over the WebSocket and bot API

pub mod ids;
pub mod state;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use ids::{DrinkId, RegistrationId, UserId, WheelId};
pub use state::{Drink, Wheel, WheelState};
pub use wire::{
    TelegramWheel, TelegramWheelState, TelegramWheels, WheelCredentials, WheelLogin,
    WheelRegistrationInfo,
};
