//! Call lifecycle: execution, response parsing, cancellation and callbacks.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert2::{check, let_assert};
use bytes::Bytes;
use courier::{
    Args, Call, Error, MethodAnnotation, MethodDeclaration, ParamAnnotation, Response, Service,
    ServiceDescription, TransportCall, TypeToken,
};
use serde::Deserialize;
use tokio::sync::oneshot;

use common::{CountingText, MockTransport, Reply};

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Problem {
    message: String,
}

fn api(transport: &MockTransport) -> Service {
    let description = ServiceDescription::builder("Users")
        .method(
            MethodDeclaration::new("user", TypeToken::builder::<User>().deserialize().call())
                .annotation(MethodAnnotation::get("users/{id}"))
                .param(TypeToken::display::<u32>(), ParamAnnotation::path("id")),
        )
        .method(
            MethodDeclaration::new("raw", TypeToken::builder::<Bytes>().call())
                .annotation(MethodAnnotation::get("raw")),
        )
        .build()
        .expect("valid service");
    common::courier(transport)
        .create(description)
        .expect("service")
}

fn user_call(service: &Service, id: Option<u32>) -> Call<User> {
    let args = match id {
        Some(id) => Args::new().arg(id),
        None => Args::new().none(),
    };
    service.call("user", args).expect("call")
}

/// Enqueue `call` and wait for its single outcome.
async fn enqueue<T: Send + 'static>(call: &Call<T>) -> courier::Result<Response<T>> {
    let (tx, rx) = oneshot::channel();
    call.enqueue(move |result: courier::Result<Response<T>>| {
        let _ = tx.send(result);
    })
    .expect("enqueued");
    rx.await.expect("callback invoked")
}

// ============================================================================
// Response parsing
// ============================================================================

#[tokio::test]
async fn success_body_is_decoded() {
    let transport = MockTransport::new();
    transport.reply(Reply::json(200, r#"{"id":42,"name":"Alice"}"#));
    let service = api(&transport);

    let response = user_call(&service, Some(42)).execute().await.expect("response");

    check!(response.is_success());
    check!(response.status() == 200);
    check!(
        response.into_body()
            == Some(User {
                id: 42,
                name: "Alice".to_owned()
            })
    );
    check!(transport.last_request().url().as_str() == "http://example.com/api/users/42");
}

#[tokio::test]
async fn bodiless_statuses_skip_the_converter() {
    let transport = MockTransport::new();
    transport
        .reply(Reply::text(204, "not json"))
        .reply(Reply::status(205));
    let service = api(&transport);

    for expected in [204, 205] {
        let response = user_call(&service, Some(1)).execute().await.expect("response");
        check!(response.is_success());
        check!(response.status() == expected);
        check!(response.body().is_none());
    }
}

#[tokio::test]
async fn converter_runs_once_per_decodable_success() {
    let transport = MockTransport::new();
    transport
        .reply(Reply::text(204, "ignored"))
        .reply(Reply::text(205, "ignored"))
        .reply(Reply::text(200, "first"))
        .reply(Reply::text(299, "second"))
        .reply(Reply::text(199, "informational"))
        .reply(Reply::text(300, "choices"));
    let text = CountingText::new();
    let description = ServiceDescription::builder("Texts")
        .method(
            MethodDeclaration::new("text", TypeToken::builder::<String>().call())
                .annotation(MethodAnnotation::get("text")),
        )
        .build()
        .expect("valid service");
    let service = common::builder(&transport)
        .add_converter_factory(text.clone())
        .build()
        .expect("client")
        .create(description)
        .expect("service");
    let text_call = || -> Call<String> { service.call("text", Args::new()).expect("call") };

    for (status, decodes, body) in [
        (204, 0, None),
        (205, 0, None),
        (200, 1, Some("first")),
        (299, 2, Some("second")),
        (199, 2, None),
        (300, 2, None),
    ] {
        let response = text_call().execute().await.expect("response");
        check!(response.status() == status);
        check!(response.body().map(String::as_str) == body);
        check!(text.decodes() == decodes);
    }
    check!(text.lookups() == 1);
}

#[tokio::test]
async fn non_2xx_statuses_buffer_the_error_body() {
    let transport = MockTransport::new();
    transport
        .reply(Reply::json(404, r#"{"message":"no such user"}"#))
        .reply(Reply::text(199, "informational"))
        .reply(Reply::text(300, "choices"));
    let service = api(&transport);

    let response = user_call(&service, Some(7)).execute().await.expect("response");
    check!(!response.is_success());
    check!(response.status() == 404);
    check!(response.body().is_none());
    let_assert!(Some(Ok(problem)) = response.decode_error_body::<Problem>());
    check!(problem.message == "no such user");

    let_assert!(Err(Error::Http { status: 404, .. }) = response.into_result());

    for (status, body) in [(199, "informational"), (300, "choices")] {
        let response = user_call(&service, Some(7)).execute().await.expect("response");
        check!(!response.is_success());
        check!(response.status() == status);
        check!(response.error_body().map(|bytes| bytes.as_ref()) == Some(body.as_bytes()));
    }
}

#[tokio::test]
async fn conversion_failure_is_reported() {
    let transport = MockTransport::new();
    transport.reply(Reply::json(200, r#"{"id":"not a number"}"#));
    let service = api(&transport);

    let result = user_call(&service, Some(1)).execute().await;

    let_assert!(Err(Error::JsonDeserialization { .. }) = result);
}

#[tokio::test]
async fn read_error_wins_over_conversion_error() {
    let transport = MockTransport::new();
    transport.reply(Reply::BrokenBody(Bytes::from_static(br#"{"id":"#)));
    let service = api(&transport);

    let result = user_call(&service, Some(1)).execute().await;

    let_assert!(Err(Error::Connection(message)) = result);
    check!(message == "connection reset");
}

#[tokio::test]
async fn raw_bytes_are_buffered() {
    let transport = MockTransport::new();
    transport.reply(Reply::text(200, "payload"));
    let service = api(&transport);

    let call: Call<Bytes> = service.call("raw", Args::new()).expect("call");
    let response = call.execute().await.expect("response");

    check!(response.into_body() == Some(Bytes::from_static(b"payload")));
}

#[tokio::test]
async fn transport_failure_is_returned() {
    let transport = MockTransport::new();
    transport.reply(Reply::Fail("refused".to_owned()));
    let service = api(&transport);

    let result = user_call(&service, Some(1)).execute().await;

    let_assert!(Err(Error::Connection(message)) = result);
    check!(message == "refused");
}

// ============================================================================
// Single use
// ============================================================================

#[tokio::test]
async fn a_call_executes_once() {
    let transport = MockTransport::new();
    let service = api(&transport);
    let call = user_call(&service, Some(1));

    check!(!call.is_executed());
    let _ = call.execute().await;
    check!(call.is_executed());

    let_assert!(Err(Error::AlreadyExecuted) = call.execute().await);
    let_assert!(Err(Error::AlreadyExecuted) = call.enqueue(|_: courier::Result<Response<User>>| {}));
    check!(transport.calls().len() == 1);
}

#[tokio::test]
async fn clones_are_fresh_calls() {
    let transport = MockTransport::new();
    transport
        .reply(Reply::json(200, r#"{"id":1,"name":"a"}"#))
        .reply(Reply::json(200, r#"{"id":1,"name":"b"}"#));
    let service = api(&transport);

    let call = user_call(&service, Some(1));
    let first = call.execute().await.expect("first");
    let clone = call.clone();
    check!(!clone.is_executed());
    let second = clone.execute().await.expect("second");

    check!(first.into_body().map(|user| user.name) == Some("a".to_owned()));
    check!(second.into_body().map(|user| user.name) == Some("b".to_owned()));
    check!(transport.calls().len() == 2);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancel_before_execution_reaches_the_transport_call() {
    let transport = MockTransport::new();
    transport.reply(Reply::Hang);
    let service = api(&transport);

    let call = user_call(&service, Some(1));
    call.cancel();
    check!(call.is_canceled());

    let_assert!(Err(Error::Canceled) = call.execute().await);
    let calls = transport.calls();
    check!(calls.len() == 1);
    let_assert!(Some(raw) = calls.first());
    check!(raw.is_canceled());
}

#[tokio::test]
async fn cancel_interrupts_an_enqueued_call() {
    let transport = MockTransport::new();
    transport.reply(Reply::Hang);
    let service = api(&transport);

    let call = user_call(&service, Some(1));
    let (tx, rx) = oneshot::channel();
    call.enqueue(move |result: courier::Result<Response<User>>| {
        let _ = tx.send(result);
    })
    .expect("enqueued");

    tokio::time::sleep(Duration::from_millis(10)).await;
    call.cancel();

    let_assert!(Ok(Err(Error::Canceled)) = rx.await);
    check!(call.is_canceled());
}

// ============================================================================
// Enqueue
// ============================================================================

#[tokio::test]
async fn enqueue_delivers_the_response() {
    let transport = MockTransport::new();
    transport.reply(Reply::json(200, r#"{"id":3,"name":"Carol"}"#));
    let service = api(&transport);

    let call = user_call(&service, Some(3));
    let response = enqueue(&call).await.expect("response");

    check!(call.is_executed());
    check!(response.into_body().map(|user| user.id) == Some(3));
}

#[tokio::test]
async fn enqueue_invokes_the_callback_once() {
    let transport = MockTransport::new();
    transport.reply(Reply::Fail("reset".to_owned()));
    let service = api(&transport);

    let invocations = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();
    let counter = Arc::clone(&invocations);
    user_call(&service, Some(1))
        .enqueue(move |result: courier::Result<Response<User>>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(result.is_err());
        })
        .expect("enqueued");

    check!(rx.await == Ok(true));
    tokio::time::sleep(Duration::from_millis(10)).await;
    check!(invocations.load(Ordering::SeqCst) == 1);
}

// ============================================================================
// Creation failures
// ============================================================================

#[tokio::test]
async fn creation_failure_is_replayed() {
    let transport = MockTransport::new();
    let service = api(&transport);
    let call = user_call(&service, None);

    let_assert!(Err(Error::RequestCreation(from_request)) = call.request());
    let_assert!(Err(Error::RequestCreation(from_execute)) = call.execute().await);

    check!(Arc::ptr_eq(&from_request, &from_execute));
    check!(from_execute.to_string().contains("must not be null"));
    check!(transport.requests().is_empty());
}

#[tokio::test]
async fn creation_failure_is_delivered_to_callbacks() {
    let transport = MockTransport::new();
    let service = api(&transport);

    let result = enqueue(&user_call(&service, None)).await;

    let_assert!(Err(Error::RequestCreation(_)) = result);
    check!(transport.calls().is_empty());
}
