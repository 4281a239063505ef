use librascli::{
    dispatch, ChannelHandler, GestureBinding, Inbound, MessageHandler, StatusUpdate,
};
use std::collections::HashMap;
use tokio::{sync::mpsc, test};

/// Records every call in order
#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
    panic_on_status: bool,
}

impl MessageHandler for Recorder {
    fn on_status(&mut self, status: StatusUpdate) {
        if self.panic_on_status {
            panic!("status handler failed");
        }
        self.calls.push(format!(
            "status:{}:{}",
            status.status,
            status.message.unwrap_or_default()
        ));
    }

    fn on_cameras(&mut self, cameras: Vec<String>) {
        self.calls.push(format!("cameras:{}", cameras.join(",")));
    }

    fn on_binds(&mut self, binds: HashMap<String, GestureBinding>) {
        let mut names: Vec<_> = binds.keys().cloned().collect();
        names.sort();
        self.calls.push(format!("binds:{}", names.join(",")));
    }

    fn on_selected_camera(&mut self, camera: String) {
        self.calls.push(format!("camera:{}", camera));
    }

    fn on_frame(&mut self, frame: String) {
        self.calls.push(format!("frame:{}", frame));
    }

    fn on_server_error(&mut self, message: String) {
        self.calls.push(format!("error:{}", message));
    }

    fn on_pong(&mut self) {
        self.calls.push("pong".to_string());
    }

    fn on_customizable_state(&mut self, customizable: bool) {
        self.calls.push(format!("customizable:{}", customizable));
    }
}

/// Test a single recognized field
#[test]
async fn test_single_field() {
    let mut handler = Recorder::default();
    let report = dispatch(r#"{"cameras_disponiveis": ["cam0", "cam1"]}"#, &mut handler).unwrap();

    assert_eq!(handler.calls, vec!["cameras:cam0,cam1"]);
    assert_eq!(report.delivered, vec!["cameras_disponiveis"]);
    assert!(report.malformed.is_empty());
    assert!(report.failed.is_empty());
}

/// Test that every present field is delivered in the fixed order
#[test]
async fn test_fields_in_fixed_order() {
    let mut handler = Recorder::default();
    let raw = r#"{
        "customizableState": false,
        "pong": true,
        "frame": "abc",
        "error": "boom",
        "camera_selecionada": "cam1",
        "allBinds": {
            "Ola": {"bind": "a", "tempo_pressionado": 0.5},
            "Tchau": {"bind": "b", "tempo_pressionado": 1}
        },
        "cameras_disponiveis": ["cam1"],
        "message": "Camera alterada",
        "status": "success"
    }"#;

    let report = dispatch(raw, &mut handler).unwrap();

    assert_eq!(
        handler.calls,
        vec![
            "status:success:Camera alterada",
            "cameras:cam1",
            "binds:Ola,Tchau",
            "camera:cam1",
            "frame:abc",
            "error:boom",
            "pong",
            "customizable:false",
        ]
    );
    assert_eq!(report.delivered.len(), 8);
}

/// Test that binding values decode with their hold duration
#[test]
async fn test_binds_decoded() {
    struct Binds(HashMap<String, GestureBinding>);

    impl MessageHandler for Binds {
        fn on_binds(&mut self, binds: HashMap<String, GestureBinding>) {
            self.0 = binds;
        }
    }

    let mut handler = Binds(HashMap::new());
    dispatch(
        r#"{"allBinds": {"Ola": {"bind": "ctrl+a", "tempo_pressionado": 2}}}"#,
        &mut handler,
    )
    .unwrap();

    let binding = &handler.0["Ola"];
    assert_eq!(binding.bind, "ctrl+a");
    assert_eq!(binding.tempo_pressionado, 2.0);
}

/// Test that invalid JSON fails without calling any handler
#[test]
async fn test_invalid_json() {
    let mut handler = Recorder::default();

    assert!(dispatch("{not json", &mut handler).is_err());
    assert!(dispatch("", &mut handler).is_err());
    assert!(handler.calls.is_empty());
}

/// Test payloads that carry nothing to deliver
#[test]
async fn test_nothing_to_deliver() {
    let mut handler = Recorder::default();

    assert!(dispatch("{}", &mut handler).unwrap().is_empty());
    assert!(dispatch(r#"{"unknown": 1}"#, &mut handler).unwrap().is_empty());
    assert!(dispatch("[1, 2]", &mut handler).unwrap().is_empty());
    assert!(dispatch(r#""text""#, &mut handler).unwrap().is_empty());

    // Null counts as absent
    assert!(dispatch(r#"{"frame": null}"#, &mut handler).unwrap().is_empty());
    assert!(handler.calls.is_empty());
}

/// Test that a malformed field is skipped and the others still delivered
#[test]
async fn test_malformed_field_skipped() {
    let mut handler = Recorder::default();
    let report = dispatch(
        r#"{"cameras_disponiveis": "cam0", "frame": "abc"}"#,
        &mut handler,
    )
    .unwrap();

    assert_eq!(handler.calls, vec!["frame:abc"]);
    assert_eq!(report.malformed, vec!["cameras_disponiveis"]);
    assert_eq!(report.delivered, vec!["frame"]);
}

/// Test that a panicking handler does not stop the other fields
#[test]
async fn test_handler_panic_isolated() {
    let mut handler = Recorder {
        panic_on_status: true,
        ..Recorder::default()
    };
    let report = dispatch(r#"{"status": "success", "frame": "abc"}"#, &mut handler).unwrap();

    assert_eq!(handler.calls, vec!["frame:abc"]);
    assert_eq!(report.failed, vec!["status"]);
    assert_eq!(report.delivered, vec!["frame"]);
}

/// Test that the unavailable sentinel passes through unchanged
#[test]
async fn test_frame_sentinel() {
    let mut handler = Recorder::default();
    dispatch(r#"{"frame": "ERRO"}"#, &mut handler).unwrap();

    assert_eq!(handler.calls, vec!["frame:ERRO"]);
}

/// Test status without a message
#[test]
async fn test_status_without_message() {
    let mut handler = Recorder::default();
    dispatch(r#"{"status": "success"}"#, &mut handler).unwrap();

    assert_eq!(handler.calls, vec!["status:success:"]);
}

/// Test the reply to a customizable-state request
#[test]
async fn test_customizable_state() {
    let mut handler = Recorder::default();
    let report = dispatch(r#"{"customizableState": true}"#, &mut handler).unwrap();

    assert_eq!(handler.calls, vec!["customizable:true"]);
    assert_eq!(report.delivered, vec!["customizableState"]);

    // A non-boolean value is malformed
    let report = dispatch(r#"{"customizableState": "yes"}"#, &mut handler).unwrap();
    assert_eq!(report.malformed, vec!["customizableState"]);
    assert_eq!(handler.calls.len(), 1);
}

/// Test that the channel handler forwards the customizable state
#[test]
async fn test_channel_handler_customizable_state() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handler = ChannelHandler::new(tx);

    dispatch(r#"{"customizableState": false}"#, &mut handler).unwrap();

    let inbound = rx.recv().await.unwrap();
    assert_eq!(inbound.field(), "customizableState");
    assert_eq!(inbound, Inbound::CustomizableState(false));
}
