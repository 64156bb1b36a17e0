//! Outbound message shapes and their platform JSON.
//!
//! The platform enforces hard limits on templates; they are checked here so
//! an oversized message fails before it is sent rather than being rejected
//! by the API.

use serde_json::{Value, json};

use crate::actions::{Action, ActionPayload};

use super::ComposeError;

/// Maximum buttons on a button template or on a single carousel element.
pub const MAX_BUTTONS: usize = 3;

/// Maximum elements in a single carousel message.
pub const MAX_ELEMENTS: usize = 10;

/// A button attached to a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Button {
    /// Sends `payload` back as a postback event when tapped.
    Postback {
        title: String,
        payload: ActionPayload,
    },
    /// Opens a URL.
    Url { title: String, url: String },
}

impl Button {
    /// A button that triggers `action` when tapped.
    pub fn action(title: impl Into<String>, action: &Action) -> Self {
        Button::Postback {
            title: title.into(),
            payload: action.to_payload(),
        }
    }

    pub fn url(title: impl Into<String>, url: impl Into<String>) -> Self {
        Button::Url {
            title: title.into(),
            url: url.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Button::Postback { title, payload } => json!({
                "type": "postback",
                "title": title,
                "payload": payload.encode(),
            }),
            Button::Url { title, url } => json!({
                "type": "web_url",
                "title": title,
                "url": url,
            }),
        }
    }
}

/// One card of a carousel.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub title: String,
    pub subtitle: String,
    /// Opened when the card itself is tapped.
    pub url: Option<String>,
    pub image_url: Option<String>,
    buttons: Vec<Button>,
}

impl Element {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Element {
            title: title.into(),
            subtitle: subtitle.into(),
            url: None,
            image_url: None,
            buttons: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    pub fn add_button(&mut self, button: Button) -> Result<(), ComposeError> {
        if self.buttons.len() == MAX_BUTTONS {
            return Err(ComposeError::TooManyButtons(self.buttons.len() + 1));
        }
        self.buttons.push(button);
        Ok(())
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn to_json(&self) -> Value {
        let mut data = json!({
            "title": self.title,
            "subtitle": self.subtitle,
        });
        if !self.buttons.is_empty() {
            data["buttons"] = Value::Array(self.buttons.iter().map(Button::to_json).collect());
        }
        if let Some(image_url) = &self.image_url {
            data["image_url"] = json!(image_url);
        }
        if let Some(url) = &self.url {
            data["default_action"] = json!({ "type": "web_url", "url": url });
        }
        data
    }
}

/// A message ready to send.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Buttons { text: String, buttons: Vec<Button> },
    Carousel(Vec<Element>),
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text(text.into())
    }

    /// A text message with up to [`MAX_BUTTONS`] buttons.
    pub fn buttons(text: impl Into<String>, buttons: Vec<Button>) -> Result<Self, ComposeError> {
        if buttons.len() > MAX_BUTTONS {
            return Err(ComposeError::TooManyButtons(buttons.len()));
        }
        Ok(OutboundMessage::Buttons {
            text: text.into(),
            buttons,
        })
    }

    /// A carousel of up to [`MAX_ELEMENTS`] elements.
    pub fn carousel(elements: Vec<Element>) -> Result<Self, ComposeError> {
        if elements.len() > MAX_ELEMENTS {
            return Err(ComposeError::TooManyElements(elements.len()));
        }
        Ok(OutboundMessage::Carousel(elements))
    }

    /// The `message` object of a send API request.
    pub fn to_json(&self) -> Value {
        match self {
            OutboundMessage::Text(text) => json!({ "text": text }),
            OutboundMessage::Buttons { text, buttons } => json!({
                "attachment": {
                    "type": "template",
                    "payload": {
                        "template_type": "button",
                        "text": text,
                        "buttons": buttons.iter().map(Button::to_json).collect::<Vec<_>>(),
                    }
                }
            }),
            OutboundMessage::Carousel(elements) => json!({
                "attachment": {
                    "type": "template",
                    "payload": {
                        "template_type": "generic",
                        "sharable": false,
                        "image_aspect_ratio": "square",
                        "elements": elements.iter().map(Element::to_json).collect::<Vec<_>>(),
                    }
                }
            }),
        }
    }

    /// The visible text, for logging and tests. Carousels yield their titles.
    pub fn summary(&self) -> String {
        match self {
            OutboundMessage::Text(text) => text.clone(),
            OutboundMessage::Buttons { text, .. } => text.clone(),
            OutboundMessage::Carousel(elements) => elements
                .iter()
                .map(|e| e.title.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}
