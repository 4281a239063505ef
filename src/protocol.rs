//! JSON wire shapes exchanged with the detection server.
//!
//! Every frame is a JSON object in a text message. Outbound requests carry a
//! single field naming the request (plus `sobreescrever` for `saveGesto`);
//! inbound replies carry any number of the recognized fields below.

use crate::error::{Error, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Frame value the server sends when the camera has no image to offer
pub const FRAME_UNAVAILABLE: &str = "ERRO";

/// Inbound field names, in dispatch order
pub mod fields {
    /// Status reply (`"success"`), paired with a `message` text
    pub const STATUS: &str = "status";
    /// Companion text of a status reply
    pub const MESSAGE: &str = "message";
    /// List of camera names
    pub const CAMERAS: &str = "cameras_disponiveis";
    /// Mapping of gesture name to binding
    pub const ALL_BINDS: &str = "allBinds";
    /// Name of the active camera
    pub const SELECTED_CAMERA: &str = "camera_selecionada";
    /// Base64 JPEG frame or [`FRAME_UNAVAILABLE`](super::FRAME_UNAVAILABLE)
    pub const FRAME: &str = "frame";
    /// Server-side error text
    pub const ERROR: &str = "error";
    /// Reply to a heartbeat ping
    pub const PONG: &str = "pong";
    /// Whether a gesture may be customized, reply to `getCustomizableState`
    pub const CUSTOMIZABLE_STATE: &str = "customizableState";
}

/// Key binding attached to a gesture, as listed by `allBinds`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureBinding {
    /// Key or key combination triggered by the gesture
    pub bind: String,

    /// How long the key is held, in seconds
    pub tempo_pressionado: f64,
}

/// Gesture definition sent with `saveGesto`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureDefinition {
    /// Gesture name
    pub nome: String,

    /// Key or key combination to trigger
    pub bind: String,

    /// Toggle the key instead of pressing it
    pub modo_toggle: bool,

    /// Hold duration in seconds
    pub tempo_pressionado: f64,
}

impl GestureDefinition {
    /// Create a new gesture definition
    pub fn new(nome: impl Into<String>, bind: impl Into<String>, tempo_pressionado: f64) -> Self {
        Self {
            nome: nome.into(),
            bind: bind.into(),
            modo_toggle: false,
            tempo_pressionado,
        }
    }

    /// Set toggle mode
    pub fn toggle(mut self, enabled: bool) -> Self {
        self.modo_toggle = enabled;
        self
    }
}

/// Request sent to the server
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// Start the camera detection process
    StartDetection,

    /// Stop the camera detection process
    StopDetection,

    /// Enable crop-hand mode on the running detection
    StartCropHandMode,

    /// Disable crop-hand mode
    StopCropHandMode,

    /// Request every saved binding
    GetAllBinds,

    /// Request one gesture by name
    GetGesture(String),

    /// Request whether a gesture can be customized
    GetCustomizableState(String),

    /// Save a gesture definition
    SaveGesture {
        /// Gesture to store
        gesture: GestureDefinition,
        /// Replace an existing gesture of the same name
        overwrite: bool,
    },

    /// Select the active camera
    SetCamera(String),

    /// Request the active camera
    GetCamera,

    /// Request the available cameras
    GetAvailableCameras,

    /// Request the latest frame
    GetFrame,

    /// Heartbeat probe
    Ping,
}

impl OutboundCommand {
    /// Wire name of the field tagging this command
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartDetection => "startDetection",
            Self::StopDetection => "stopDetection",
            Self::StartCropHandMode => "startCropHandMode",
            Self::StopCropHandMode => "stopCropHandMode",
            Self::GetAllBinds => "getAllBinds",
            Self::GetGesture(_) => "getGesto",
            Self::GetCustomizableState(_) => "getCustomizableState",
            Self::SaveGesture { .. } => "saveGesto",
            Self::SetCamera(_) => "setCamera",
            Self::GetCamera => "getCamera",
            Self::GetAvailableCameras => "getCamerasDisponiveis",
            Self::GetFrame => "getFrame",
            Self::Ping => "ping",
        }
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialize(e.to_string()))
    }
}

impl Serialize for OutboundCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        let tag = self.as_str();
        match self {
            Self::GetGesture(name) | Self::GetCustomizableState(name) | Self::SetCamera(name) => {
                map.serialize_entry(tag, name)?;
            }
            Self::SaveGesture { gesture, overwrite } => {
                map.serialize_entry(tag, gesture)?;
                map.serialize_entry("sobreescrever", overwrite)?;
            }
            _ => map.serialize_entry(tag, &true)?,
        }
        map.end()
    }
}
