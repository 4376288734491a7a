mod common;

use std::path::{Path, PathBuf};

use common::{
    frame_json, gateway, outline_json, split_frames, stage_json, ScriptedTransport,
    SAMPLE_DOCUMENT,
};
use doc_quality_analyzer::orchestrator::AsyncWriteSink;
use doc_quality_analyzer::{App, Config};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "doc_quality_{}_{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config_for(dir: &Path) -> Config {
    Config {
        input_folder: dir.join("in").to_string_lossy().into_owned(),
        output_folder: dir.join("out").to_string_lossy().into_owned(),
        max_concurrent_documents: 1,
        stream: false,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_batch_run_writes_reports_and_counts_failures() {
    let dir = scratch_dir("batch");
    let input = dir.join("in");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("a.txt"), SAMPLE_DOCUMENT).unwrap();
    std::fs::write(input.join("b.md"), SAMPLE_DOCUMENT).unwrap();
    std::fs::write(input.join("empty.md"), "   \n").unwrap();
    std::fs::write(input.join("image.png"), [0u8, 1, 2]).unwrap();

    let transport = ScriptedTransport::new();
    for _ in 0..2 {
        transport.push_completion(&outline_json());
        transport.push_completion(&stage_json("设计"));
        transport.push_completion(&stage_json("逻辑"));
        transport.push_completion(&stage_json("风险"));
    }
    let app = App::with_gateway(config_for(&dir), gateway(transport.clone()));

    let stats = app.run().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.success, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.degraded, 0);
    assert_eq!(transport.request_count(), 8);

    for stem in ["a", "b"] {
        let path = dir.join("out").join(format!("{}.report.json", stem));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["stages"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["degraded"], false);
    }
    assert!(!dir.join("out").join("empty.report.json").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_batch_run_with_empty_folder() {
    let dir = scratch_dir("empty");
    std::fs::create_dir_all(dir.join("in")).unwrap();
    let app = App::with_gateway(config_for(&dir), gateway(ScriptedTransport::new()));

    let stats = app.run().await.unwrap();
    assert_eq!(stats.total, 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_stream_missing_file_sends_error_frame() {
    let dir = scratch_dir("missing");
    let app = App::with_gateway(config_for(&dir), gateway(ScriptedTransport::new()));

    let mut sink = AsyncWriteSink::new(Vec::<u8>::new());
    let result = app.stream_document(&dir.join("nope.txt"), &mut sink).await;
    tokio_test::assert_err!(result);

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let frames = split_frames(&output);
    assert_eq!(frames.len(), 2);
    let error = frame_json(&frames[0]).unwrap();
    assert_eq!(error["stage"], "error");
    assert!(error["error"].as_str().unwrap().contains("nope.txt"));
    assert_eq!(frames[1], "data: [DONE]");

    let _ = std::fs::remove_dir_all(&dir);
}
