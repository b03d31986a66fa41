use promptseg::engine::inference_engine::OnnxSession;
use promptseg::{ExecutionProvider, Sam, SamError, SessionConfig};

#[test]
fn missing_model_files_fail_to_load() {
    let config = SessionConfig::default();
    let result = Sam::new("no_such_encoder.onnx", "no_such_decoder.onnx", &config);
    match result {
        Err(SamError::Load(message)) => assert!(message.contains("no_such_encoder.onnx")),
        other => panic!("expected a load error, got {:?}", other.err()),
    }
}

#[test]
fn malformed_model_file_fails_to_load() -> anyhow::Result<()> {
    // An existing file with garbage content must fail inside the session
    // builder, not the existence check, and still come back as Load.
    let path = std::env::temp_dir().join("promptseg_not_a_model.onnx");
    std::fs::write(&path, b"this is not an onnx graph")?;

    let config = SessionConfig {
        threads: 2,
        provider: ExecutionProvider::CPU,
    };
    let result = OnnxSession::new(&path, &config);
    std::fs::remove_file(&path)?;

    match result {
        Err(SamError::Load(message)) => {
            assert!(message.contains("promptseg_not_a_model.onnx"))
        }
        Ok(_) => panic!("garbage bytes must not load as a model"),
        Err(other) => panic!("expected a load error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn error_messages_are_self_describing() {
    let error = SamError::InvalidInput("point (0, 0) is outside the open image bounds".into());
    assert!(error.to_string().contains("invalid input"));

    let error = SamError::Load("model file x.onnx not found".into());
    assert!(error.to_string().contains("model load failed"));
}
