//! Streaming runner integration tests
//!
//! Fragment ordering and accumulation, the terminal sink sentinel,
//! cooperative cancellation, and mid-stream failure behavior.

mod common;

use chat_thread::{ChatThread, Error, StreamEvent, StreamOutcome, ThreadObserver, ToolSpec};
use common::{MockTransport, test_options};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn thread_with(transport: &Arc<MockTransport>) -> ChatThread {
    ChatThread::with_transport(test_options(), transport.clone())
}

#[tokio::test]
async fn test_stream_accumulates_in_order() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_stream_text(&["Hel", "lo", " world"]);
    let mut thread = thread_with(&transport);
    thread.push_user("say hello");

    let mut events = Vec::new();
    let outcome = thread.run_stream(|event| events.push(event)).await.unwrap();

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(
        events,
        vec![
            StreamEvent::Token("Hel".to_string()),
            StreamEvent::Token("lo".to_string()),
            StreamEvent::Token(" world".to_string()),
            StreamEvent::Done,
        ]
    );

    // The accumulated text landed as one assistant message
    assert_eq!(thread.messages().len(), 2);
    assert_eq!(thread.messages()[1].content(), "Hello world");
    assert_eq!(
        thread.last_result().as_chat().unwrap().content,
        "Hello world"
    );
}

#[tokio::test]
async fn test_stream_request_never_advertises_tools() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_stream_text(&["ok"]);
    let mut thread = thread_with(&transport);

    thread.register_tool_with_handler(ToolSpec::new("noisy", "Unused"), |_| async {
        Ok(json!(null))
    });
    thread.push_user("hi");
    thread.run_stream(|_| {}).await.unwrap();

    let request = transport.last_request();
    assert!(request.stream);
    assert!(request.tools.is_none());
}

#[tokio::test]
async fn test_cancel_from_sink_aborts_without_appending() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_stream_text(&["Hel", "lo", " world"]);
    let mut thread = thread_with(&transport);
    thread.push_user("say hello");

    let handle = thread.cancel_handle();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let outcome = thread
        .run_stream(move |event| {
            sink_events.lock().unwrap().push(event.clone());
            if matches!(event, StreamEvent::Token(_)) {
                handle.cancel();
            }
        })
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Aborted);
    // One fragment was delivered, then the sentinel; nothing was appended
    assert_eq!(
        *events.lock().unwrap(),
        vec![StreamEvent::Token("Hel".to_string()), StreamEvent::Done]
    );
    assert_eq!(thread.messages().len(), 1);
    assert!(thread.last_result().is_none());
}

#[tokio::test]
async fn test_thread_is_usable_after_abort() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_stream_text(&["dropped"]);
    transport.queue_stream_text(&["kept"]);
    let mut thread = thread_with(&transport);
    thread.push_user("go");

    let handle = thread.cancel_handle();
    let outcome = thread
        .run_stream(move |_| handle.cancel())
        .await
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Aborted);

    // The session handle was released; a fresh stream runs normally
    let outcome = thread.run_stream(|_| {}).await.unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(thread.messages()[1].content(), "kept");
}

#[tokio::test]
async fn test_mid_stream_error_propagates_without_sentinel() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_stream(vec![
        Ok("He".to_string()),
        Err(Error::stream("connection reset")),
    ]);
    let mut thread = thread_with(&transport);
    thread.push_user("go");

    let mut events = Vec::new();
    let err = thread
        .run_stream(|event| events.push(event))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Stream(_)));
    // Delivered fragments are not appended and no Done is sent on error
    assert_eq!(events, vec![StreamEvent::Token("He".to_string())]);
    assert_eq!(thread.messages().len(), 1);
}

#[tokio::test]
async fn test_streamed_calls_do_not_touch_token_counters() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_stream_text(&["no", " usage"]);
    let mut thread = thread_with(&transport);
    thread.push_user("go");

    thread.run_stream(|_| {}).await.unwrap();
    assert_eq!(thread.usage().total_tokens, 0);
    assert_eq!(thread.usage().prompt_tokens, 0);
}

#[derive(Default)]
struct FragmentRecorder {
    fragments: Mutex<Vec<String>>,
    totals: Mutex<Vec<String>>,
}

impl ThreadObserver for FragmentRecorder {
    fn on_fragment(&self, fragment: &str) {
        self.fragments.lock().unwrap().push(fragment.to_string());
    }

    fn on_stream_text(&self, total: &str) {
        self.totals.lock().unwrap().push(total.to_string());
    }
}

#[tokio::test]
async fn test_observers_receive_fragments_and_running_total() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_stream_text(&["Hel", "lo"]);
    let mut thread = thread_with(&transport);

    let recorder = Arc::new(FragmentRecorder::default());
    thread.add_observer(recorder.clone());
    thread.push_user("go");
    thread.run_stream(|_| {}).await.unwrap();

    assert_eq!(*recorder.fragments.lock().unwrap(), vec!["Hel", "lo"]);
    assert_eq!(*recorder.totals.lock().unwrap(), vec!["Hel", "Hello"]);
}
