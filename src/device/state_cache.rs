//! Button/axis state cache
//!
//! [`ButtonStateCache::refresh`] copies, for every named control in a device's
//! layout, the relevant indices out of one hardware snapshot. The whole next
//! state is computed into a scratch map and swapped in at the end, so a stale
//! index after a layout change aborts the cycle without leaving half-updated
//! entries behind.

use std::collections::HashMap;
use thiserror::Error;

use crate::device::GamepadSnapshot;
use crate::profile::{Control, ControlLayout};

#[derive(Debug, Error)]
pub enum StateCacheError {
    #[error("control {control} reads button {index} but the snapshot has {len} buttons")]
    ButtonOutOfRange {
        control: String,
        index: usize,
        len: usize,
    },

    #[error("control {control} reads axis {index} but the snapshot has {len} axes")]
    AxisOutOfRange {
        control: String,
        index: usize,
        len: usize,
    },
}

/// Current value of one named control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlSample {
    /// Activation value in `[0, 1]`.
    Scalar(f32),

    /// Pressable two-axis control: activation plus both axis values.
    Axes2D { value: f32, x_axis: f32, y_axis: f32 },
}

impl ControlSample {
    /// The activation value regardless of control shape.
    pub fn value(&self) -> f32 {
        match self {
            ControlSample::Scalar(value) => *value,
            ControlSample::Axes2D { value, .. } => *value,
        }
    }
}

/// Cached control values for one device, refreshed on the polling cadence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ButtonStateCache {
    samples: HashMap<String, ControlSample>,
}

impl ButtonStateCache {
    /// Rebuilds the cache from one hardware snapshot.
    ///
    /// Either every control in `layout` is refreshed or, on the first bad
    /// index, the cache is left exactly as it was and the error is returned.
    pub fn refresh(
        &mut self,
        layout: &ControlLayout,
        snapshot: &GamepadSnapshot,
    ) -> Result<(), StateCacheError> {
        let mut next = HashMap::with_capacity(layout.len());
        for (name, control) in layout.controls() {
            let sample = match *control {
                Control::Scalar { button } => {
                    ControlSample::Scalar(read_button(snapshot, name, button)?)
                }
                Control::Axes2D {
                    button,
                    x_axis,
                    y_axis,
                } => ControlSample::Axes2D {
                    value: read_button(snapshot, name, button)?,
                    x_axis: read_axis(snapshot, name, x_axis)?,
                    y_axis: read_axis(snapshot, name, y_axis)?,
                },
            };
            next.insert(name.clone(), sample);
        }
        self.samples = next;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ControlSample> {
        self.samples.get(name)
    }

    /// Activation value of a named control, 0.0 when unknown.
    pub fn value(&self, name: &str) -> f32 {
        self.samples.get(name).map(ControlSample::value).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn read_button(
    snapshot: &GamepadSnapshot,
    control: &str,
    index: usize,
) -> Result<f32, StateCacheError> {
    snapshot
        .buttons
        .get(index)
        .copied()
        .ok_or_else(|| StateCacheError::ButtonOutOfRange {
            control: control.to_string(),
            index,
            len: snapshot.buttons.len(),
        })
}

fn read_axis(
    snapshot: &GamepadSnapshot,
    control: &str,
    index: usize,
) -> Result<f32, StateCacheError> {
    snapshot
        .axes
        .get(index)
        .copied()
        .ok_or_else(|| StateCacheError::AxisOutOfRange {
            control: control.to_string(),
            index,
            len: snapshot.axes.len(),
        })
}
