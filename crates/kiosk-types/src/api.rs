use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::models::{MediaRef, UserId};

// -- Bridge requests --

/// What the transport bridge posts for every decoded chat event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub event: Event,
}

// -- Render instructions --

/// How the transport should deliver the message. `Edit` means edit the
/// message the button was pressed on, falling back to `Send` when the
/// platform refuses the edit (e.g. the old message carried media).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Send,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlAction {
    /// Pressing the control sends this event back through the bridge.
    Event { event: Event },
    /// External navigation, handled entirely by the client.
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub label: String,
    pub action: ControlAction,
}

impl Control {
    pub fn event(label: impl Into<String>, event: Event) -> Self {
        Self {
            label: label.into(),
            action: ControlAction::Event { event },
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ControlAction::Url { url: url.into() },
        }
    }
}

/// Short acknowledgement for the triggering event (toast or alert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub text: String,
    pub alert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderInstruction {
    pub delivery: Delivery,
    /// `None` when only an acknowledgement is needed.
    pub text: Option<String>,
    pub media: Option<MediaRef>,
    /// Rows of controls, top to bottom.
    pub controls: Vec<Vec<Control>>,
    pub ack: Option<Ack>,
}
