//! Routing of inbound payloads to handler slots.
//!
//! A payload is decoded once, then every recognized field present in it is
//! handed to its own handler, in a fixed order. Fields are independent: a
//! malformed field or a panicking handler is logged and the remaining fields
//! are still delivered.

use crate::error::{Error, Result};
use crate::protocol::{fields, GestureBinding};
use log::{debug, error, info, trace, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
};
use tokio::sync::mpsc::UnboundedSender;

/// Status reply from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Status value, normally `"success"`
    pub status: String,

    /// Accompanying text, if any
    pub message: Option<String>,
}

/// Handler slots for inbound fields.
///
/// Every method has a default, so implementors override only what they
/// need. Handlers run on the client's event loop and must not block.
pub trait MessageHandler: Send {
    /// `status` (+ `message`)
    fn on_status(&mut self, status: StatusUpdate) {
        info!(
            "Status: {}",
            status.message.as_deref().unwrap_or(status.status.as_str())
        );
    }

    /// `cameras_disponiveis`
    fn on_cameras(&mut self, _cameras: Vec<String>) {}

    /// `allBinds`
    fn on_binds(&mut self, _binds: HashMap<String, GestureBinding>) {}

    /// `camera_selecionada`
    fn on_selected_camera(&mut self, _camera: String) {}

    /// `frame`, passed through unchanged (including the unavailable sentinel)
    fn on_frame(&mut self, _frame: String) {}

    /// `error`
    fn on_server_error(&mut self, message: String) {
        warn!("Server error: {}", message);
    }

    /// `pong`
    fn on_pong(&mut self) {
        trace!("Received pong");
    }

    /// `customizableState`
    fn on_customizable_state(&mut self, _customizable: bool) {}
}

/// Handler with every slot left at its default
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl MessageHandler for DefaultHandler {}

/// One decoded inbound field
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `status`
    Status(StatusUpdate),

    /// `cameras_disponiveis`
    Cameras(Vec<String>),

    /// `allBinds`
    Binds(HashMap<String, GestureBinding>),

    /// `camera_selecionada`
    SelectedCamera(String),

    /// `frame`
    Frame(String),

    /// `error`
    ServerError(String),

    /// `pong`
    Pong,

    /// `customizableState`
    CustomizableState(bool),
}

impl Inbound {
    /// Wire name of the field
    pub fn field(&self) -> &'static str {
        match self {
            Self::Status(_) => fields::STATUS,
            Self::Cameras(_) => fields::CAMERAS,
            Self::Binds(_) => fields::ALL_BINDS,
            Self::SelectedCamera(_) => fields::SELECTED_CAMERA,
            Self::Frame(_) => fields::FRAME,
            Self::ServerError(_) => fields::ERROR,
            Self::Pong => fields::PONG,
            Self::CustomizableState(_) => fields::CUSTOMIZABLE_STATE,
        }
    }
}

/// Handler forwarding every field over a channel
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: UnboundedSender<Inbound>,
}

impl ChannelHandler {
    /// Create a handler feeding `tx`
    pub fn new(tx: UnboundedSender<Inbound>) -> Self {
        Self { tx }
    }

    fn forward(&self, inbound: Inbound) {
        if self.tx.send(inbound).is_err() {
            trace!("Inbound receiver dropped");
        }
    }
}

impl MessageHandler for ChannelHandler {
    fn on_status(&mut self, status: StatusUpdate) {
        self.forward(Inbound::Status(status));
    }

    fn on_cameras(&mut self, cameras: Vec<String>) {
        self.forward(Inbound::Cameras(cameras));
    }

    fn on_binds(&mut self, binds: HashMap<String, GestureBinding>) {
        self.forward(Inbound::Binds(binds));
    }

    fn on_selected_camera(&mut self, camera: String) {
        self.forward(Inbound::SelectedCamera(camera));
    }

    fn on_frame(&mut self, frame: String) {
        self.forward(Inbound::Frame(frame));
    }

    fn on_server_error(&mut self, message: String) {
        self.forward(Inbound::ServerError(message));
    }

    fn on_pong(&mut self) {
        self.forward(Inbound::Pong);
    }

    fn on_customizable_state(&mut self, customizable: bool) {
        self.forward(Inbound::CustomizableState(customizable));
    }
}

/// What a dispatch pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Fields whose handler ran to completion, in call order
    pub delivered: Vec<&'static str>,

    /// Fields present but with a value of the wrong shape
    pub malformed: Vec<&'static str>,

    /// Fields whose handler panicked
    pub failed: Vec<&'static str>,
}

impl DispatchReport {
    /// Whether no handler was invoked
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }
}

/// Decode `raw` and deliver each recognized field to `handler`.
///
/// Fails only when `raw` is not valid JSON; no handler runs in that case.
pub fn dispatch(raw: &str, handler: &mut dyn MessageHandler) -> Result<DispatchReport> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        error!("Failed to decode inbound message: {}", e);
        Error::from(e)
    })?;

    let mut report = DispatchReport::default();
    let Value::Object(message) = value else {
        debug!("Inbound payload is not an object, nothing to dispatch");
        return Ok(report);
    };

    if let Some(status) = present(&message, fields::STATUS) {
        let update = StatusUpdate {
            status: match status {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            message: message
                .get(fields::MESSAGE)
                .and_then(Value::as_str)
                .map(str::to_owned),
        };
        deliver(&mut report, fields::STATUS, || handler.on_status(update));
    }

    if let Some(cameras) = decode_field::<Vec<String>>(&message, fields::CAMERAS, &mut report) {
        deliver(&mut report, fields::CAMERAS, || handler.on_cameras(cameras));
    }

    if let Some(binds) =
        decode_field::<HashMap<String, GestureBinding>>(&message, fields::ALL_BINDS, &mut report)
    {
        deliver(&mut report, fields::ALL_BINDS, || handler.on_binds(binds));
    }

    if let Some(camera) = decode_field::<String>(&message, fields::SELECTED_CAMERA, &mut report) {
        deliver(&mut report, fields::SELECTED_CAMERA, || {
            handler.on_selected_camera(camera)
        });
    }

    if let Some(frame) = decode_field::<String>(&message, fields::FRAME, &mut report) {
        deliver(&mut report, fields::FRAME, || handler.on_frame(frame));
    }

    if let Some(text) = present(&message, fields::ERROR) {
        let text = match text {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        deliver(&mut report, fields::ERROR, || handler.on_server_error(text));
    }

    if present(&message, fields::PONG).is_some() {
        deliver(&mut report, fields::PONG, || handler.on_pong());
    }

    if let Some(customizable) =
        decode_field::<bool>(&message, fields::CUSTOMIZABLE_STATE, &mut report)
    {
        deliver(&mut report, fields::CUSTOMIZABLE_STATE, || {
            handler.on_customizable_state(customizable)
        });
    }

    Ok(report)
}

/// A field counts as present when its key exists with a non-null value
fn present<'a>(message: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    message.get(field).filter(|value| !value.is_null())
}

fn decode_field<T: DeserializeOwned>(
    message: &Map<String, Value>,
    field: &'static str,
    report: &mut DispatchReport,
) -> Option<T> {
    let value = present(message, field)?;
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            error!("Failed to decode field '{}': {}", field, e);
            report.malformed.push(field);
            None
        }
    }
}

fn deliver(report: &mut DispatchReport, field: &'static str, call: impl FnOnce()) {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => report.delivered.push(field),
        Err(_) => {
            error!("Handler for '{}' panicked", field);
            report.failed.push(field);
        }
    }
}
