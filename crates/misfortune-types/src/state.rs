//! Wheel records and the per-wheel observable state.
//!
//! [`Wheel`] is the persisted record; [`WheelState`] is the in-memory value
//! broadcast to connected wheel clients. A `WheelState` is an immutable
//! snapshot: transitions produce a new value via struct-update syntax and
//! the previous value is discarded, never mutated in place, so concurrent
//! readers can hold a snapshot safely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DrinkId, UserId, WheelId};

/// A single drink on a wheel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drink {
    /// Stable identity, assigned at creation.
    pub id: DrinkId,
    /// Display name shown on the wheel.
    pub name: String,
}

impl Drink {
    /// Create a drink with a fresh identity.
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            id: DrinkId::new(),
            name: name.into(),
        }
    }
}

/// A persisted wheel record.
///
/// The live [`WheelState`] is derived from this at registry load time and
/// re-derived on rename or drink mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wheel {
    /// Stable identity.
    pub id: WheelId,
    /// Display name.
    pub name: String,
    /// Owning user.
    pub owner: UserId,
    /// Drinks on the wheel, in display order.
    pub drinks: Vec<Drink>,
}

impl Wheel {
    /// Create a new wheel with a fresh identity and no drinks.
    pub fn create(owner: UserId, name: impl Into<String>) -> Self {
        Self {
            id: WheelId::new(),
            name: name.into(),
            owner,
            drinks: Vec::new(),
        }
    }
}

/// The observable state of one wheel.
///
/// Pushed to connected wheel clients on every committed change. The `code`
/// field is the ephemeral spin capability: the wheel client presents it as
/// a bearer credential when spinning, and it is regenerated on every
/// unlock so each code authorizes exactly one spin/unlock cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelState {
    /// Drinks on the wheel, in display order.
    pub drinks: Vec<Drink>,
    /// Wheel display name.
    pub wheel_name: String,
    /// Ephemeral spin capability code.
    pub code: String,
    /// Owning user.
    pub owner: UserId,
    /// When the drink list was last refreshed, if ever.
    #[serde(default)]
    pub drinks_refreshed_at: Option<DateTime<Utc>>,
    /// Whether a spin is in progress (locked until unlocked by the client).
    #[serde(default)]
    pub is_locked: bool,
    /// Index of the currently selected drink.
    ///
    /// Valid index into `drinks` whenever `drinks` is non-empty; only the
    /// initial empty-wheel state carries the placeholder `0`, and spinning
    /// an empty wheel is rejected before this field is ever read.
    #[serde(default)]
    pub current_drink: usize,
    /// Spin speed requested by the last successful spin.
    #[serde(default)]
    pub speed: f64,
}

impl WheelState {
    /// Derive the initial (unlocked) state for a wheel record.
    pub fn initial(wheel: &Wheel, code: impl Into<String>) -> Self {
        Self {
            drinks: wheel.drinks.clone(),
            wheel_name: wheel.name.clone(),
            code: code.into(),
            owner: wheel.owner,
            drinks_refreshed_at: None,
            is_locked: false,
            current_drink: 0,
            speed: 0.0,
        }
    }

    /// Whether the given user may read or mutate this wheel.
    pub fn is_accessible(&self, user: UserId) -> bool {
        self.owner == user
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn initial_state_is_unlocked_with_wheel_fields() {
        let mut wheel = Wheel::create(UserId(7), "Stammtisch");
        wheel.drinks.push(Drink::create("Korn"));

        let state = WheelState::initial(&wheel, "secret");
        assert!(!state.is_locked);
        assert_eq!(state.wheel_name, "Stammtisch");
        assert_eq!(state.code, "secret");
        assert_eq!(state.drinks.len(), 1);
        assert!(state.is_accessible(UserId(7)));
        assert!(!state.is_accessible(UserId(8)));
    }

    #[test]
    fn state_equality_tracks_all_fields() {
        let wheel = Wheel::create(UserId(1), "A");
        let state = WheelState::initial(&wheel, "c");
        let same = state.clone();
        assert_eq!(state, same);

        let locked = WheelState {
            is_locked: true,
            ..state.clone()
        };
        assert_ne!(state, locked);
    }
}
