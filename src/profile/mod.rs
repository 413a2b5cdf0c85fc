//! Input profile schema and control layout resolution
//!
//! A connected device advertises profile ids; the profile service resolves one
//! of them into an [`InputProfile`] (the WebXR input-profiles JSON shape). From
//! the profile's per-handedness layout we build a validated [`ControlLayout`]:
//! a mapping from control name to the indices of that control in the flat
//! gamepad button/axis arrays.
//!
//! The layout is a tagged variant rather than an ad hoc property bag, so a
//! two-axis control missing one of its indices is rejected at resolution time
//! instead of surfacing as a stale-index warning during polling.

pub mod service;

pub use service::{HttpProfileService, ProfileService, StaticProfileService};

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::device::Handedness;

/// Control name fragment identifying trigger-class controls ("xr-standard-trigger" etc).
pub const TRIGGER_CLASS: &str = "trigger";

/// Control name fragment identifying squeeze-class controls.
pub const SQUEEZE_CLASS: &str = "squeeze";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile fetch failed: {0}")]
    Fetch(String),

    #[error("malformed profile payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("profile {profile_id} has no layout for the {handedness} hand")]
    MissingLayout {
        profile_id: String,
        handedness: Handedness,
    },

    #[error("component {component} has unusable gamepad indices")]
    InvalidComponent { component: String },
}

/// Top level of a WebXR input profile description.
#[derive(Debug, Clone, Deserialize)]
pub struct InputProfile {
    #[serde(rename = "profileId")]
    pub profile_id: String,

    /// Layouts keyed by handedness ("left", "right", "left-right", "none").
    pub layouts: HashMap<String, ProfileLayout>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileLayout {
    pub components: HashMap<String, ProfileComponent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileComponent {
    /// Stable control name. Falls back to the component key when absent.
    #[serde(rename = "rootNodeName")]
    pub root_node_name: Option<String>,

    #[serde(rename = "gamepadIndices")]
    pub gamepad_indices: GamepadIndices,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GamepadIndices {
    pub button: Option<usize>,

    #[serde(rename = "xAxis")]
    pub x_axis: Option<usize>,

    #[serde(rename = "yAxis")]
    pub y_axis: Option<usize>,
}

/// Where a named control lives in the flat hardware arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// A single activation value in the button array (trigger, squeeze, face button).
    Scalar { button: usize },

    /// A pressable two-axis control (touchpad, thumbstick).
    Axes2D {
        button: usize,
        x_axis: usize,
        y_axis: usize,
    },
}

/// Validated mapping from control name to hardware indices for one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlLayout {
    controls: HashMap<String, Control>,
}

impl ControlLayout {
    /// Builds the layout for `handedness` from a resolved profile.
    ///
    /// Layout lookup order follows the input-profiles registry conventions:
    /// the exact hand key first, then the combined and handedness-neutral keys.
    pub fn from_profile(
        profile: &InputProfile,
        handedness: Handedness,
    ) -> Result<Self, ProfileError> {
        let layout = [handedness.profile_key(), "left-right", "left-right-none", "none"]
            .iter()
            .find_map(|key| profile.layouts.get(*key))
            .ok_or_else(|| ProfileError::MissingLayout {
                profile_id: profile.profile_id.clone(),
                handedness,
            })?;

        let mut controls = HashMap::with_capacity(layout.components.len());
        for (key, component) in &layout.components {
            let name = component.root_node_name.as_deref().unwrap_or(key);
            let indices = &component.gamepad_indices;
            let control = match (indices.button, indices.x_axis, indices.y_axis) {
                (Some(button), Some(x_axis), Some(y_axis)) => Control::Axes2D {
                    button,
                    x_axis,
                    y_axis,
                },
                (Some(button), None, None) => Control::Scalar { button },
                _ => {
                    return Err(ProfileError::InvalidComponent {
                        component: key.clone(),
                    })
                }
            };
            controls.insert(name.to_string(), control);
        }
        Ok(Self { controls })
    }

    /// Inserts a control, for layouts built programmatically (tests, fixtures).
    pub fn insert(&mut self, name: &str, control: Control) {
        self.controls.insert(name.to_string(), control);
    }

    pub fn get(&self, name: &str) -> Option<&Control> {
        self.controls.get(name)
    }

    pub fn controls(&self) -> impl Iterator<Item = (&String, &Control)> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// True if any control name contains `class` (e.g. [`TRIGGER_CLASS`]).
    ///
    /// Select handling is only wired up for devices whose layout actually
    /// carries a trigger-class control, squeeze likewise.
    pub fn has_control_class(&self, class: &str) -> bool {
        self.controls.keys().any(|name| name.contains(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERIC_PROFILE: &str = r#"{
        "profileId": "generic-trigger-squeeze-touchpad-thumbstick",
        "layouts": {
            "left-right": {
                "components": {
                    "xr-standard-trigger": {
                        "rootNodeName": "xr_standard_trigger",
                        "gamepadIndices": { "button": 0 }
                    },
                    "xr-standard-squeeze": {
                        "rootNodeName": "xr_standard_squeeze",
                        "gamepadIndices": { "button": 1 }
                    },
                    "xr-standard-touchpad": {
                        "rootNodeName": "xr_standard_touchpad",
                        "gamepadIndices": { "button": 2, "xAxis": 0, "yAxis": 1 }
                    },
                    "xr-standard-thumbstick": {
                        "rootNodeName": "xr_standard_thumbstick",
                        "gamepadIndices": { "button": 3, "xAxis": 2, "yAxis": 3 }
                    }
                }
            }
        }
    }"#;

    fn parse(json: &str) -> InputProfile {
        serde_json::from_str(json).expect("profile fixture parses")
    }

    #[test]
    fn layout_resolves_from_combined_key() {
        let profile = parse(GENERIC_PROFILE);
        let layout = ControlLayout::from_profile(&profile, Handedness::Right).unwrap();
        assert_eq!(layout.len(), 4);
        assert_eq!(
            layout.get("xr_standard_trigger"),
            Some(&Control::Scalar { button: 0 })
        );
        assert_eq!(
            layout.get("xr_standard_thumbstick"),
            Some(&Control::Axes2D {
                button: 3,
                x_axis: 2,
                y_axis: 3
            })
        );
    }

    #[test]
    fn exact_hand_key_wins_over_combined() {
        let json = r#"{
            "profileId": "split-hands",
            "layouts": {
                "right": {
                    "components": {
                        "xr-standard-trigger": { "gamepadIndices": { "button": 5 } }
                    }
                },
                "left-right": {
                    "components": {
                        "xr-standard-trigger": { "gamepadIndices": { "button": 0 } }
                    }
                }
            }
        }"#;
        let layout = ControlLayout::from_profile(&parse(json), Handedness::Right).unwrap();
        assert_eq!(
            layout.get("xr-standard-trigger"),
            Some(&Control::Scalar { button: 5 })
        );
    }

    #[test]
    fn missing_layout_is_an_error() {
        let json = r#"{
            "profileId": "left-only",
            "layouts": {
                "left": {
                    "components": {
                        "xr-standard-trigger": { "gamepadIndices": { "button": 0 } }
                    }
                }
            }
        }"#;
        let err = ControlLayout::from_profile(&parse(json), Handedness::Right).unwrap_err();
        assert!(matches!(err, ProfileError::MissingLayout { .. }));
    }

    #[test]
    fn partial_axis_indices_are_rejected() {
        let json = r#"{
            "profileId": "broken",
            "layouts": {
                "left-right": {
                    "components": {
                        "xr-standard-touchpad": {
                            "gamepadIndices": { "button": 2, "xAxis": 0 }
                        }
                    }
                }
            }
        }"#;
        let err = ControlLayout::from_profile(&parse(json), Handedness::Left).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidComponent { .. }));
    }

    #[test]
    fn control_classes_match_by_name_fragment() {
        let profile = parse(GENERIC_PROFILE);
        let layout = ControlLayout::from_profile(&profile, Handedness::Left).unwrap();
        assert!(layout.has_control_class(TRIGGER_CLASS));
        assert!(layout.has_control_class(SQUEEZE_CLASS));
        assert!(!layout.has_control_class("a-button"));
    }
}
