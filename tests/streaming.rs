use std::time::{Duration, Instant};

use futures_util::StreamExt;
use notebook_ask::{testing::start_chunked_server, AskRequest, Client, Config};

fn client(base_url: String) -> Client {
    Client::new(Config {
        base_url: Some(base_url),
        ..Default::default()
    })
    .expect("client")
}

#[tokio::test]
async fn first_chunk_arrives_before_body_completes() {
    let base_url = start_chunked_server(
        vec![
            (Duration::from_millis(0), "{\"type\":\"strategy\"}".to_string()),
            (Duration::from_millis(300), "{\"type\":\"answer\"}".to_string()),
        ],
        Some(Duration::from_millis(100)),
    )
    .await;

    let started = Instant::now();
    let mut stream = client(base_url)
        .ask(&AskRequest::new("q", "m"))
        .await
        .expect("stream handle");

    let first = stream.next().await.expect("first chunk").expect("ok chunk");
    assert_eq!(&first[..], b"{\"type\":\"strategy\"}\n");
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "first chunk should not wait for the rest of the body"
    );

    let second = stream.next().await.expect("second chunk").expect("ok chunk");
    assert_eq!(&second[..], b"{\"type\":\"answer\"}\n");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn cancelled_stream_stops_yielding() {
    let base_url = start_chunked_server(
        vec![
            (Duration::from_millis(0), "{\"type\":\"strategy\"}".to_string()),
            (Duration::from_millis(50), "{\"type\":\"answer\"}".to_string()),
        ],
        None,
    )
    .await;

    let mut stream = client(base_url)
        .ask(&AskRequest::new("q", "m"))
        .await
        .expect("stream handle");
    assert!(stream.next().await.expect("first chunk").is_ok());

    stream.cancel();
    assert!(stream.next().await.is_none());
}
