//! State consumed by a video/camera presentation layer.
//!
//! [`ViewState`] folds inbound fields into the values a frame view needs and
//! decides what it should show. [`ViewHandler`] keeps one up to date from the
//! client's event loop and publishes snapshots through a `watch` channel.

use crate::dispatcher::{Inbound, MessageHandler};
use crate::protocol::{OutboundCommand, FRAME_UNAVAILABLE};
use log::warn;
use tokio::sync::watch;

/// Prefix turning a base64 JPEG frame into a data URI
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// What the frame view should display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisplay {
    /// Nothing received yet
    Loading,

    /// Camera unavailable or in error
    CameraOff,

    /// Live image as a data URI
    Live(String),
}

/// Presentation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    /// Latest frame as sent by the server
    pub frame: Option<String>,

    /// Active camera
    pub selected_camera: Option<String>,

    /// Cameras offered by the server
    pub cameras: Vec<String>,

    /// No frame received yet
    pub loading: bool,

    /// Last server reply reported a problem
    pub error: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            frame: None,
            selected_camera: None,
            cameras: Vec::new(),
            loading: true,
            error: false,
        }
    }
}

impl ViewState {
    /// Create an empty, loading state
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one inbound field into the state. Returns whether anything changed.
    pub fn apply(&mut self, inbound: Inbound) -> bool {
        match inbound {
            Inbound::Cameras(cameras) => replace(&mut self.cameras, cameras),
            Inbound::SelectedCamera(camera) => replace(&mut self.selected_camera, Some(camera)),
            Inbound::Frame(frame) => {
                let loading = replace(&mut self.loading, false);
                let error = replace(&mut self.error, frame == FRAME_UNAVAILABLE);
                let frame = replace(&mut self.frame, Some(frame));
                loading || error || frame
            }
            Inbound::ServerError(_) => replace(&mut self.error, true),
            Inbound::Status(_)
            | Inbound::Binds(_)
            | Inbound::Pong
            | Inbound::CustomizableState(_) => false,
        }
    }

    /// Whether the latest frame is the unavailable sentinel
    pub fn camera_unavailable(&self) -> bool {
        self.frame.as_deref() == Some(FRAME_UNAVAILABLE)
    }

    /// What the frame view should show
    pub fn display(&self) -> FrameDisplay {
        if self.loading {
            return if self.error {
                FrameDisplay::CameraOff
            } else {
                FrameDisplay::Loading
            };
        }

        match self.frame.as_deref() {
            Some(frame) if frame != FRAME_UNAVAILABLE => {
                FrameDisplay::Live(format!("{}{}", JPEG_DATA_URI_PREFIX, frame))
            }
            _ => FrameDisplay::CameraOff,
        }
    }

    /// Command for the camera selector's change callback
    pub fn camera_change(&mut self, camera: impl Into<String>) -> OutboundCommand {
        let camera = camera.into();
        self.selected_camera = Some(camera.clone());
        OutboundCommand::SetCamera(camera)
    }
}

/// Handler keeping a [`ViewState`] current
#[derive(Debug)]
pub struct ViewHandler {
    tx: watch::Sender<ViewState>,
}

impl ViewHandler {
    /// Create a handler and the receiver observing it
    pub fn channel() -> (Self, watch::Receiver<ViewState>) {
        let (tx, rx) = watch::channel(ViewState::default());
        (Self { tx }, rx)
    }

    fn apply(&self, inbound: Inbound) {
        self.tx.send_if_modified(|state| state.apply(inbound));
    }
}

impl MessageHandler for ViewHandler {
    fn on_cameras(&mut self, cameras: Vec<String>) {
        self.apply(Inbound::Cameras(cameras));
    }

    fn on_selected_camera(&mut self, camera: String) {
        self.apply(Inbound::SelectedCamera(camera));
    }

    fn on_frame(&mut self, frame: String) {
        self.apply(Inbound::Frame(frame));
    }

    fn on_server_error(&mut self, message: String) {
        warn!("Server error: {}", message);
        self.apply(Inbound::ServerError(message));
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
