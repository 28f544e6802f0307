mod integration;

use integration::{upstream_sse, TestApp};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn answer_stream() -> String {
    upstream_sse(&[
        json!({"event": "message", "answer": "A", "conversation_id": "up-1"}),
        json!({"event": "message", "answer": "B", "conversation_id": "up-1"}),
        json!({"event": "agent_message", "answer": "C", "conversation_id": "up-1"}),
        json!({
            "event": "message_end",
            "conversation_id": "up-1",
            "metadata": {
                "usage": {"total_tokens": 128},
                "retriever_resources": [
                    {"document_name": "handbook.pdf", "content": "X", "segment_id": "s-1", "score": 0.91, "position": 1}
                ]
            }
        }),
    ])
}

#[tokio::test]
async fn chat_streams_fragments_then_citations_then_done() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(header("authorization", "Bearer app-hr"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(answer_stream(), "text/event-stream"))
        .mount(&app.upstream)
        .await;

    let reply = app
        .chat("alice", json!({"message": "What does the handbook say?", "knowledgeBaseId": "hr"}))
        .await;

    assert_eq!(reply.status, reqwest::StatusCode::OK);
    let conversation_id = reply.conversation_id.clone().expect("missing X-Conversation-ID");
    assert_eq!(reply.answers(), vec!["A", "B", "C"]);

    let frames = reply.json_frames();
    let tags: Vec<_> = frames.iter().map(|f| f["event"].as_str().unwrap()).collect();
    assert_eq!(tags, vec!["message", "message", "agent_message", "message_end"]);
    let ends: Vec<_> = frames.iter().filter(|f| f["event"] == "message_end").collect();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0]["metadata"]["usage"], json!({"total_tokens": 128}));
    assert_eq!(
        ends[0]["metadata"]["retriever_resources"],
        json!([{
            "source": "handbook.pdf",
            "content": "X",
            "document_name": "handbook.pdf",
            "score": 0.91,
            "segment_id": "s-1",
            "position": 1
        }])
    );
    assert_eq!(frames.last().unwrap()["event"], "message_end");
    assert_eq!(reply.frames.last().map(String::as_str), Some("[DONE]"));

    let cached = app.wait_for_citations("alice", &conversation_id).await;
    assert_eq!(cached["data"]["citations"]["a:1"][0]["content"], "X");
}

#[tokio::test]
async fn follow_up_turn_continues_upstream_session() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(body_partial_json(json!({"conversation_id": "up-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(answer_stream(), "text/event-stream"))
        .expect(1)
        .mount(&app.upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(answer_stream(), "text/event-stream"))
        .mount(&app.upstream)
        .await;

    let first = app
        .chat("alice", json!({"message": "first", "knowledgeBaseId": "hr"}))
        .await;
    let conversation_id = first.conversation_id.clone().unwrap();
    app.wait_for_citations("alice", &conversation_id).await;

    let second = app
        .chat("alice", json!({"message": "second", "conversationId": conversation_id}))
        .await;
    assert_eq!(second.conversation_id.as_deref(), Some(conversation_id.as_str()));
    assert_eq!(second.answers(), vec!["A", "B", "C"]);

    let mut cached = app.citations("alice", &conversation_id).await;
    for _ in 0..50 {
        if cached["data"]["citations"].get("a:2").is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cached = app.citations("alice", &conversation_id).await;
    }
    assert!(cached["data"]["citations"].get("a:1").is_some());
    assert!(cached["data"]["citations"].get("a:2").is_some());
}

#[tokio::test]
async fn upstream_failure_yields_error_then_fallback_content() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&app.upstream)
        .await;

    let reply = app.chat("bob", json!({"message": "hello"})).await;

    assert_eq!(reply.status, reqwest::StatusCode::OK);
    let frames = reply.json_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["event"], "error");
    assert_eq!(frames[1]["event"], "message");
    let fallback = frames[1]["answer"].as_str().unwrap();
    assert!(fallback.starts_with("An error occurred while processing your request:"));
    assert!(fallback.contains("500"));
    assert_eq!(frames[0]["error"], fallback);
    assert_eq!(reply.frames.last().map(String::as_str), Some("[DONE]"));
}

#[tokio::test]
async fn upstream_error_event_mid_stream_ends_turn_with_fallback() {
    let app = TestApp::spawn().await;
    let body = upstream_sse(&[
        json!({"event": "message", "answer": "Partial"}),
        json!({"event": "error", "message": "quota exceeded", "code": "provider_quota"}),
        json!({"event": "message", "answer": "never shown"}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&app.upstream)
        .await;

    let reply = app.chat("bob", json!({"message": "hello"})).await;
    let answers = reply.answers();
    assert_eq!(answers[0], "Partial");
    assert!(answers[1].contains("quota exceeded (provider_quota)"));
    assert!(!reply.raw.contains("never shown"));
}

#[tokio::test]
async fn malformed_upstream_line_does_not_break_the_turn() {
    let app = TestApp::spawn().await;
    let body = format!(
        "data: {}\n\ndata: {{\"event\":\"message\",\"answer\":\n\ndata: {}\n\ndata: [DONE]\n\n",
        json!({"event": "message", "answer": "one "}),
        json!({"event": "message", "answer": "two"}),
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&app.upstream)
        .await;

    let reply = app.chat("carol", json!({"message": "hello"})).await;
    assert_eq!(reply.answers(), vec!["one ", "two"]);
    let frames = reply.json_frames();
    assert_eq!(frames.last().unwrap()["event"], "message_end");
}

#[tokio::test]
async fn inline_citation_tags_are_stripped_and_reported() {
    let app = TestApp::spawn().await;
    let body = upstream_sse(&[
        json!({"event": "message", "answer": "Leave is 20 days.<Cita"}),
        json!({"event": "message", "answer": "tions>{\"source\":\"policy.docx\",\"content\":\"20 days\"}</Citations>"}),
        json!({"event": "message_end"}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&app.upstream)
        .await;

    let reply = app.chat("dave", json!({"message": "leave?"})).await;
    assert_eq!(reply.answers().concat(), "Leave is 20 days.");
    assert!(!reply.raw.contains("Citations"));

    let frames = reply.json_frames();
    let end = frames.iter().find(|f| f["event"] == "message_end").unwrap();
    assert_eq!(end["metadata"]["retriever_resources"][0]["source"], "policy.docx");
}

#[tokio::test]
async fn null_retriever_resources_do_not_fail_the_turn() {
    let app = TestApp::spawn().await;
    let body = upstream_sse(&[
        json!({"event": "message", "answer": "Answer"}),
        json!({"event": "message_end", "metadata": {"retriever_resources": null}}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&app.upstream)
        .await;

    let reply = app.chat("gina", json!({"message": "hello"})).await;
    assert_eq!(reply.answers(), vec!["Answer"]);
    let frames = reply.json_frames();
    assert!(frames.iter().all(|f| f["event"] != "error"));
    assert_eq!(frames.last().unwrap()["metadata"]["retriever_resources"], json!([]));
}

#[tokio::test]
async fn unknown_knowledge_base_falls_back_without_calling_upstream() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.upstream)
        .await;

    let reply = app
        .chat("erin", json!({"message": "hello", "knowledgeBaseId": "finance"}))
        .await;
    let answers = reply.answers();
    assert_eq!(answers.len(), 1);
    assert!(answers[0].contains("finance"));
}

#[tokio::test]
async fn empty_message_is_rejected_before_streaming() {
    let app = TestApp::spawn().await;
    let response = app
        .request(reqwest::Method::POST, "/chat", "frank")
        .json(&json!({"message": "   "}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn another_users_conversation_is_not_found() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(answer_stream(), "text/event-stream"))
        .mount(&app.upstream)
        .await;

    let reply = app.chat("alice", json!({"message": "mine"})).await;
    let conversation_id = reply.conversation_id.unwrap();

    let response = app
        .request(reqwest::Method::POST, "/chat", "mallory")
        .json(&json!({"message": "let me in", "conversationId": conversation_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = app
        .request(
            reqwest::Method::GET,
            &format!("/conversations/{conversation_id}/citations"),
            "mallory",
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
