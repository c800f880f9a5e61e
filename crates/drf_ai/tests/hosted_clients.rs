use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use drf_ai::client::ApiClient;
use drf_ai::embeddings::{Embedder, OpenAiEmbedder};
use drf_ai::llm::{OpenAiResponder, Responder};

struct Captured {
    request_line: String,
    authorization: Option<String>,
    body: serde_json::Value,
}

/// Serve exactly one HTTP request on 127.0.0.1 with a canned reply.
fn serve_once(status: &'static str, reply: &'static str) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base_url = format!("http://{}/v1", listener.local_addr().expect("addr"));
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        let mut content_length = 0usize;
        let mut authorization = None;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.trim().parse().unwrap_or(0),
                    "authorization" => authorization = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).expect("body");

        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
            reply.len()
        );
        stream.write_all(response.as_bytes()).expect("write");
        stream.flush().expect("flush");

        // The receiver may already be gone when a test only checks the reply.
        let _ = tx.send(Captured {
            request_line: request_line.trim_end().to_string(),
            authorization,
            body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
        });
    });

    (base_url, rx)
}

#[test]
fn embedder_posts_a_batch_and_restores_input_order() {
    let (base_url, rx) = serve_once(
        "200 OK",
        r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
    );
    let client = ApiClient::new(&base_url, "sk-test").expect("client");
    let embedder = OpenAiEmbedder::new(client, "text-embedding-3-small");

    let out = embedder.embed(&["first", "second"]).expect("embed");
    assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    let req = rx.recv().expect("captured");
    assert_eq!(req.request_line, "POST /v1/embeddings HTTP/1.1");
    assert_eq!(req.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(
        req.body,
        serde_json::json!({"model": "text-embedding-3-small", "input": ["first", "second"]})
    );
}

#[test]
fn embedder_reports_http_failures_verbatim() {
    let (base_url, _rx) = serve_once("429 Too Many Requests", r#"{"error":"quota"}"#);
    let client = ApiClient::new(&base_url, "sk-test").expect("client");
    let embedder = OpenAiEmbedder::new(client, "m");

    let err = embedder.embed_one("text").unwrap_err();
    assert_eq!(err.code, "AI_EMBEDDINGS_FAILED");
    assert!(err.retryable);
    assert_eq!(err.details.as_deref(), Some(r#"status=429; body={"error":"quota"}"#));
}

#[test]
fn embedder_rejects_short_responses() {
    let (base_url, _rx) = serve_once("200 OK", r#"{"data":[{"index":0,"embedding":[1.0]}]}"#);
    let client = ApiClient::new(&base_url, "sk-test").expect("client");
    let embedder = OpenAiEmbedder::new(client, "m");

    let err = embedder.embed(&["a", "b"]).unwrap_err();
    assert_eq!(err.code, "AI_EMBEDDINGS_FAILED");
    assert_eq!(err.details.as_deref(), Some("inputs=2; embeddings=1"));
}

#[test]
fn responder_sends_system_and_user_messages() {
    let (base_url, rx) = serve_once(
        "200 OK",
        r#"{"choices":[{"message":{"role":"assistant","content":"Score: 7"}}]}"#,
    );
    let client = ApiClient::new(&base_url, "sk-test").expect("client");
    let responder = OpenAiResponder::new(client, "gpt-4.1-mini");

    let text = responder.generate("SYSTEM", "PROMPT").expect("generate");
    assert_eq!(text, "Score: 7");

    let req = rx.recv().expect("captured");
    assert_eq!(req.request_line, "POST /v1/chat/completions HTTP/1.1");
    assert_eq!(
        req.body,
        serde_json::json!({
            "model": "gpt-4.1-mini",
            "messages": [
                {"role": "system", "content": "SYSTEM"},
                {"role": "user", "content": "PROMPT"}
            ]
        })
    );
}

#[test]
fn responder_treats_missing_content_as_failure() {
    let (base_url, _rx) = serve_once("200 OK", r#"{"choices":[{"message":{"content":null}}]}"#);
    let client = ApiClient::new(&base_url, "sk-test").expect("client");
    let responder = OpenAiResponder::new(client, "gpt-4.1-mini");

    let err = responder.generate("SYSTEM", "PROMPT").unwrap_err();
    assert_eq!(err.code, "AI_GENERATE_FAILED");
}

#[test]
fn unreachable_endpoint_is_a_transport_failure() {
    // Bind then drop to get a port with nothing listening.
    let port = TcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("addr")
        .port();
    let client = ApiClient::new(&format!("http://127.0.0.1:{port}/v1"), "sk-test").expect("client");
    let responder = OpenAiResponder::new(client, "gpt-4.1-mini");

    let err = responder.generate("SYSTEM", "PROMPT").unwrap_err();
    assert_eq!(err.code, "AI_GENERATE_FAILED");
    assert!(err.retryable);
}
