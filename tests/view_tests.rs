mod common;

use common::{init_logging, MockConnector};
use librascli::{
    view::JPEG_DATA_URI_PREFIX, Client, ConnectionState, FrameDisplay, Inbound,
    OutboundCommand, ViewHandler, ViewState,
};
use tokio::test;

/// Test the initial display
#[test]
async fn test_initial_state() {
    let state = ViewState::new();

    assert!(state.loading);
    assert!(!state.error);
    assert_eq!(state.display(), FrameDisplay::Loading);
}

/// Test a live frame
#[test]
async fn test_live_frame() {
    let mut state = ViewState::new();

    assert!(state.apply(Inbound::Frame("abc".to_string())));
    assert!(!state.loading);
    assert!(!state.camera_unavailable());
    assert_eq!(
        state.display(),
        FrameDisplay::Live(format!("{}abc", JPEG_DATA_URI_PREFIX))
    );

    // The same frame again changes nothing
    assert!(!state.apply(Inbound::Frame("abc".to_string())));
}

/// Test the unavailable sentinel and recovery from it
#[test]
async fn test_camera_unavailable() {
    let mut state = ViewState::new();

    state.apply(Inbound::Frame("ERRO".to_string()));
    assert!(state.error);
    assert!(state.camera_unavailable());
    assert_eq!(state.display(), FrameDisplay::CameraOff);

    state.apply(Inbound::Frame("abc".to_string()));
    assert!(!state.error);
    assert!(matches!(state.display(), FrameDisplay::Live(_)));
}

/// Test a server error before any frame
#[test]
async fn test_error_while_loading() {
    let mut state = ViewState::new();

    assert!(state.apply(Inbound::ServerError("no camera".to_string())));
    assert!(state.loading);
    assert_eq!(state.display(), FrameDisplay::CameraOff);
}

/// Test camera selection
#[test]
async fn test_camera_selection() {
    let mut state = ViewState::new();

    state.apply(Inbound::Cameras(vec!["cam0".to_string(), "cam1".to_string()]));
    state.apply(Inbound::SelectedCamera("cam0".to_string()));
    assert_eq!(state.selected_camera.as_deref(), Some("cam0"));

    let command = state.camera_change("cam1");
    assert_eq!(command, OutboundCommand::SetCamera("cam1".to_string()));
    assert_eq!(state.selected_camera.as_deref(), Some("cam1"));

    // Fields the view has no use for are ignored
    assert!(!state.apply(Inbound::Pong));
}

/// Test the handler publishing state from a live connection
#[test]
async fn test_view_handler() {
    init_logging();
    let (connector, mut peers) = MockConnector::accepting();
    let (handler, mut view) = ViewHandler::channel();
    let client = Client::builder()
        .connector(connector)
        .build_with_handler(handler);

    client.connect().await.unwrap();
    let peer = peers.recv().await.unwrap();
    client.wait_for_state(ConnectionState::Open).await.unwrap();

    peer.send_text(r#"{"cameras_disponiveis": ["cam0"], "camera_selecionada": "cam0"}"#);
    peer.send_text(r#"{"frame": "abc"}"#);

    let state = view
        .wait_for(|state| !state.loading)
        .await
        .unwrap()
        .clone();
    assert_eq!(state.cameras, vec!["cam0".to_string()]);
    assert_eq!(state.selected_camera.as_deref(), Some("cam0"));
    assert_eq!(
        state.display(),
        FrameDisplay::Live(format!("{}abc", JPEG_DATA_URI_PREFIX))
    );

    client.close().await.unwrap();
}
