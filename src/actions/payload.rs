//! The postback payload wire format.
//!
//! Buttons carry a JSON object serialized into an opaque string:
//!
//! ```text
//! {"type": "action", "action": "<name>", "args": {"<key>": <primitive>, ...}}
//! ```
//!
//! `args` is omitted when empty. Only flat primitive values are allowed, so
//! that handlers receive plain keyword arguments.

use serde_json::{Map, Value};

use super::ActionError;

/// The `type` tag for routable payloads.
pub const ACTION_TYPE: &str = "action";

/// Flat keyword arguments for an action handler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionArgs(Map<String, Value>);

impl ActionArgs {
    pub fn new() -> Self {
        ActionArgs(Map::new())
    }

    /// Adds an argument. Non-primitive values are rejected at decode time,
    /// so callers should only pass strings, numbers, booleans or null.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a required string argument.
    pub fn require_str(&self, action: &str, name: &'static str) -> Result<&str, ActionError> {
        match self.0.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ActionError::InvalidArgument {
                action: action.to_string(),
                name,
                value: other.to_string(),
            }),
            None => Err(ActionError::MissingArgument {
                action: action.to_string(),
                name,
            }),
        }
    }

    /// Returns a required unsigned integer argument.
    ///
    /// Numeric strings are accepted too: older buttons encoded ids as strings.
    pub fn require_u64(&self, action: &str, name: &'static str) -> Result<u64, ActionError> {
        let invalid = |value: &Value| ActionError::InvalidArgument {
            action: action.to_string(),
            name,
            value: value.to_string(),
        };
        match self.0.get(name) {
            Some(value @ Value::Number(n)) => n.as_u64().ok_or_else(|| invalid(value)),
            Some(value @ Value::String(s)) => s.parse().map_err(|_| invalid(value)),
            Some(other) => Err(invalid(other)),
            None => Err(ActionError::MissingArgument {
                action: action.to_string(),
                name,
            }),
        }
    }

    fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// A decoded `(action, args)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPayload {
    pub action: String,
    pub args: ActionArgs,
}

impl ActionPayload {
    pub fn new(action: impl Into<String>, args: ActionArgs) -> Self {
        ActionPayload {
            action: action.into(),
            args,
        }
    }

    /// Serializes the payload into the string a postback button carries.
    pub fn encode(&self) -> String {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::from(ACTION_TYPE));
        object.insert("action".to_string(), Value::from(self.action.as_str()));
        if !self.args.is_empty() {
            object.insert("args".to_string(), Value::Object(self.args.clone().into_map()));
        }
        Value::Object(object).to_string()
    }

    /// Decodes an opaque postback payload.
    ///
    /// # Errors
    ///
    /// - [`ActionError::Malformed`] if the payload is not a JSON object with a
    ///   string `action`
    /// - [`ActionError::MissingType`] if `type` is absent
    /// - [`ActionError::UnrecognizedType`] if `type` is anything but `"action"`
    /// - [`ActionError::InvalidArguments`] if `args` is not a flat object of primitives
    ///
    /// # Examples
    ///
    /// ```
    /// use confessions_bot::actions::{ActionArgs, ActionPayload};
    ///
    /// let payload = ActionPayload::new("accept_item", ActionArgs::new().with("item_id", 7));
    /// let decoded = ActionPayload::decode(&payload.encode()).unwrap();
    /// assert_eq!(decoded, payload);
    ///
    /// assert!(ActionPayload::decode(r#"{"type":"quick_reply","action":"x"}"#).is_err());
    /// ```
    pub fn decode(payload: &str) -> Result<ActionPayload, ActionError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ActionError::Malformed(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(ActionError::Malformed("payload is not a JSON object".to_string()));
        };

        match object.get("type") {
            None | Some(Value::Null) => return Err(ActionError::MissingType),
            Some(Value::String(t)) if t == ACTION_TYPE => {}
            Some(Value::String(t)) => return Err(ActionError::UnrecognizedType(t.clone())),
            Some(other) => return Err(ActionError::UnrecognizedType(other.to_string())),
        }

        let action = match object.remove("action") {
            Some(Value::String(action)) => action,
            _ => return Err(ActionError::Malformed("missing 'action'".to_string())),
        };

        let args = match object.remove("args") {
            None | Some(Value::Null) => ActionArgs::new(),
            Some(Value::Object(args)) => {
                if let Some((name, _)) = args.iter().find(|(_, v)| !is_primitive(v)) {
                    return Err(ActionError::InvalidArguments(format!(
                        "argument '{}' is not a primitive value",
                        name
                    )));
                }
                ActionArgs(args)
            }
            Some(other) => {
                return Err(ActionError::InvalidArguments(format!(
                    "expected an object, got {}",
                    other
                )));
            }
        };

        Ok(ActionPayload { action, args })
    }
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
