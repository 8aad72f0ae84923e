//! End-to-end: logger → processors → formatter → sinks

use logweave_core::config::{ExternalHandlerConfig, LogFormat, OutputTarget};
use logweave_core::{fields_from_json, Config, Fields, LogLevel};
use logweave_output::{Formatter, MemorySink};
use logweave_pipeline::LogPipeline;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn memory_pipeline(config: Config) -> (Arc<LogPipeline>, MemorySink) {
    let sink = MemorySink::new();
    let pipeline = LogPipeline::new(config, Box::new(sink.clone())).unwrap();
    (Arc::new(pipeline), sink)
}

#[test]
fn test_request_lifecycle() {
    let (pipeline, sink) = memory_pipeline(Config::default());
    let mut logger = pipeline.begin_unit();

    logger.initialize("GET", "/api/users", "127.0.0.1", Some("trace-1"));
    let startup = logger
        .log(LogLevel::Info, "STARTUP", "Request initiated", Fields::new(), Fields::new())
        .unwrap();
    let database = logger
        .log(
            LogLevel::Warning,
            "DATABASE",
            "Slow query",
            fields_from_json(json!({"duration_ms": 523.5})),
            Fields::new(),
        )
        .unwrap();

    assert_eq!(startup.req_seq, "0000000001");
    assert_eq!(database.req_seq, "0000000002");
    assert_eq!(startup.trace_id, "trace-1");
    assert_eq!(database.trace_id, "trace-1");
    assert_eq!(database.correlation.path, "/api/users");

    let text = Formatter::new(LogFormat::Text, "logweave");
    let json_formatter = Formatter::new(LogFormat::Json, "logweave");
    for entry in [&startup, &database] {
        let line = text.render(entry).unwrap();
        assert!(line.contains(&format!("trace-1:{}", entry.req_seq)));
        assert!(line.contains(&entry.section));

        let value: serde_json::Value =
            serde_json::from_str(&json_formatter.render(entry).unwrap()).unwrap();
        assert_eq!(value["trace_id"], "trace-1");
        assert_eq!(value["req_seq"], entry.req_seq.as_str());
    }

    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    let written: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    assert_eq!(written["level"], "WARNING");
    assert_eq!(written["context"]["duration_ms"], 523.5);
}

#[test]
fn test_units_are_isolated_across_threads() {
    let (pipeline, _) = memory_pipeline(Config::default());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let mut logger = pipeline.begin_unit();
                logger.initialize("GET", &format!("/unit/{}", i), "127.0.0.1", None);
                let seqs: Vec<String> = (0..3)
                    .map(|_| {
                        logger
                            .log(LogLevel::Info, "TEST", "tick", Fields::new(), Fields::new())
                            .unwrap()
                            .req_seq
                    })
                    .collect();
                (logger.trace_id().to_string(), seqs)
            })
        })
        .collect();

    let results: Vec<(String, Vec<String>)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut trace_ids: Vec<&String> = results.iter().map(|(id, _)| id).collect();
    trace_ids.sort();
    trace_ids.dedup();
    assert_eq!(trace_ids.len(), 4);

    for (_, seqs) in &results {
        assert_eq!(seqs, &vec!["0000000001", "0000000002", "0000000003"]);
    }
}

#[test]
fn test_file_output_is_redacted() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.format = LogFormat::Text;
    config.output.target = OutputTarget::File;
    config.output.path = dir.path().join("app.log").to_string_lossy().to_string();

    let pipeline = Arc::new(LogPipeline::from_config(config).unwrap());
    let mut logger = pipeline.begin_unit();
    logger.initialize("POST", "/login", "10.1.1.1", Some("trace-login"));
    logger.info(
        "AUTH",
        "Login attempt",
        fields_from_json(json!({"email": "ada@example.com", "password": "secret123"})),
    );
    pipeline.flush();

    let file = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().map(|e| e == "log").unwrap_or(false))
        .unwrap();
    let content = std::fs::read_to_string(file).unwrap();

    assert!(content.contains("[trace-login:0000000001] [AUTH] Login attempt"));
    assert!(content.contains("s*******3"));
    assert!(!content.contains("secret123"));
    assert!(!content.contains("ada@example.com"));
}

#[tokio::test]
async fn test_async_shipping_delivers_processed_entries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.output.target = OutputTarget::None;
    config.async_shipping.enabled = true;
    config.async_shipping.batch_size = 2;
    config.external_handlers = vec![ExternalHandlerConfig {
        url: format!("{}/bulk", server.uri()),
        retry_count: 0,
        ..ExternalHandlerConfig::default()
    }];

    let pipeline = Arc::new(LogPipeline::from_config(config).unwrap());
    let mut logger = pipeline.begin_unit();
    logger.initialize("GET", "/orders", "127.0.0.1", Some("trace-ship"));
    logger.info("ORDERS", "listed", fields_from_json(json!({"token": "abcdef"})));
    logger.info("ORDERS", "rendered", Fields::new());
    logger.info("ORDERS", "leftover", Fields::new());

    pipeline.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(first.as_array().unwrap().len(), 2);
    assert_eq!(first[0]["trace_id"], "trace-ship");
    assert_eq!(first[0]["context"]["token"], "a****f");

    let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(second[0]["message"], "leftover");
    assert_eq!(second[0]["req_seq"], "0000000003");
}
