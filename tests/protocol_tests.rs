use librascli::{GestureDefinition, OutboundCommand};
use serde_json::{json, Value};
use tokio::test;

fn encoded(command: OutboundCommand) -> Value {
    serde_json::from_str(&command.encode().unwrap()).unwrap()
}

/// Test flag-only commands
#[test]
async fn test_flag_commands() {
    assert_eq!(encoded(OutboundCommand::StartDetection), json!({"startDetection": true}));
    assert_eq!(encoded(OutboundCommand::StopDetection), json!({"stopDetection": true}));
    assert_eq!(encoded(OutboundCommand::GetAllBinds), json!({"getAllBinds": true}));
    assert_eq!(encoded(OutboundCommand::GetCamera), json!({"getCamera": true}));
    assert_eq!(
        encoded(OutboundCommand::GetAvailableCameras),
        json!({"getCamerasDisponiveis": true})
    );
    assert_eq!(encoded(OutboundCommand::GetFrame), json!({"getFrame": true}));
    assert_eq!(encoded(OutboundCommand::Ping), json!({"ping": true}));
    assert_eq!(
        encoded(OutboundCommand::StartCropHandMode),
        json!({"startCropHandMode": true})
    );
}

/// Test commands carrying a name
#[test]
async fn test_named_commands() {
    assert_eq!(
        encoded(OutboundCommand::GetGesture("Ola".to_string())),
        json!({"getGesto": "Ola"})
    );
    assert_eq!(
        encoded(OutboundCommand::SetCamera("cam1".to_string())),
        json!({"setCamera": "cam1"})
    );
    assert_eq!(
        encoded(OutboundCommand::GetCustomizableState("Ola".to_string())),
        json!({"getCustomizableState": "Ola"})
    );
}

/// Test the save command and its overwrite flag
#[test]
async fn test_save_gesture() {
    let gesture = GestureDefinition::new("Ola", "ctrl+shift+a", 1.5).toggle(true);
    let value = encoded(OutboundCommand::SaveGesture {
        gesture,
        overwrite: false,
    });

    assert_eq!(
        value,
        json!({
            "saveGesto": {
                "nome": "Ola",
                "bind": "ctrl+shift+a",
                "modoToggle": true,
                "tempoPressionado": 1.5
            },
            "sobreescrever": false
        })
    );
}

/// Test that exactly one field tags each command
#[test]
async fn test_single_tag() {
    let commands = [
        OutboundCommand::StartDetection,
        OutboundCommand::GetGesture("x".to_string()),
        OutboundCommand::SetCamera("x".to_string()),
        OutboundCommand::GetFrame,
        OutboundCommand::Ping,
    ];

    for command in commands {
        let tag = command.as_str();
        let value = encoded(command);
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(object.contains_key(tag));
    }
}
