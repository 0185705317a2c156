use bytes::BytesMut;
use rampart::http::request::{Method, Request, RequestBuilder};

#[test]
fn test_request_header_retrieval() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .header("Host", "example.com")
        .header("Content-Type", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_builder_requires_method_and_uri() {
    assert!(RequestBuilder::new().uri("/").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}

#[test]
fn test_request_builder_sets_content_length() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .uri("/api")
        .content(b"payload".to_vec())
        .build()
        .unwrap();

    assert_eq!(req.content_length, 7);
    assert_eq!((req.v_major, req.v_minor), (1, 1));
}

#[test]
fn test_request_path_strips_query() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/search?q=rust")
        .build()
        .unwrap();

    assert_eq!(req.path(), "/search");
}

#[test]
fn test_request_keep_alive_http11_default() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .build()
        .unwrap();

    assert!(req.keep_alive());
}

#[test]
fn test_request_keep_alive_http10_default() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .version(1, 0)
        .build()
        .unwrap();

    assert!(!req.keep_alive());
}

#[test]
fn test_request_connection_close() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .header("Connection", "close")
        .build()
        .unwrap();

    assert!(!req.keep_alive());
}

#[test]
fn test_request_connection_keep_alive_http10() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .version(1, 0)
        .header("Connection", "Keep-Alive")
        .build()
        .unwrap();

    assert!(req.keep_alive());
}

#[test]
fn test_request_web_socket_upgrade_detection() {
    let upgrade = RequestBuilder::new()
        .method(Method::GET)
        .uri("/ws")
        .header("Upgrade", "websocket")
        .header("Connection", "keep-alive, Upgrade")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .build()
        .unwrap();
    assert!(upgrade.is_web_socket_upgrade());

    let missing_key = RequestBuilder::new()
        .method(Method::GET)
        .uri("/ws")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .build()
        .unwrap();
    assert!(!missing_key.is_web_socket_upgrade());
}

#[test]
fn test_request_prepare_and_serialize() {
    let mut req = Request::new();
    req.content = b"abc".to_vec();
    req.prepare(Method::PUT, "/items/1", "api.local:8080");

    let mut buf = BytesMut::new();
    req.to_buffers(&mut buf);
    let text = String::from_utf8(buf.to_vec()).unwrap();

    assert!(text.starts_with("PUT /items/1 HTTP/1.1\r\n"));
    assert!(text.contains("Host: api.local:8080\r\n"));
    assert!(text.contains("Accept: */*\r\n"));
    assert!(text.contains("Content-Length: 3\r\n"));
    assert!(text.ends_with("\r\n\r\nabc"));
}

#[test]
fn test_request_clear() {
    let mut req = RequestBuilder::new()
        .method(Method::POST)
        .uri("/x?a=1")
        .header("Host", "h")
        .content(b"body".to_vec())
        .build()
        .unwrap();
    req.params.push(("a".into(), "1".into()));

    req.clear();

    assert_eq!(req.method, Method::GET);
    assert!(req.uri.is_empty());
    assert!(req.params.is_empty());
    assert!(req.headers.is_empty());
    assert!(req.content.is_empty());
    assert_eq!(req.content_length, 0);
}

#[test]
fn test_method_display() {
    assert_eq!(Method::GET.to_string(), "GET");
    assert_eq!(Method::from_str("PATCH"), Some(Method::PATCH));
    assert_eq!(Method::from_str("BREW"), None);
}
