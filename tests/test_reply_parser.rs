use rampart::http::parser::ParseResult;
use rampart::http::reply::Reply;
use rampart::http::reply_parser::{ReplyContext, ReplyParser};

fn parse_all(input: &[u8]) -> (ParseResult, usize, Reply) {
    let mut reply = Reply::new();
    let mut ctx = ReplyContext::new();
    let (result, consumed) = ReplyParser::parse(&mut reply, &mut ctx, input);
    (result, consumed, reply)
}

#[test]
fn test_parse_reply_with_body() {
    let input = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello";
    let (result, consumed, reply) = parse_all(input);

    assert_eq!(result, ParseResult::Complete);
    assert_eq!(consumed, input.len());
    assert_eq!(reply.status, 200);
    assert_eq!(reply.status_text, "OK");
    assert_eq!((reply.v_major, reply.v_minor), (1, 1));
    assert_eq!(reply.header("content-type"), Some("text/plain"));
    assert_eq!(reply.content, b"hello".to_vec());
}

#[test]
fn test_parse_reply_multiword_status_text() {
    let (result, _, reply) = parse_all(b"HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n");

    assert_eq!(result, ParseResult::Complete);
    assert_eq!(reply.status, 404);
    assert_eq!(reply.status_text, "Not Found");
    assert!(reply.content.is_empty());
}

#[test]
fn test_parse_reply_unknown_status_is_kept() {
    let (result, _, reply) = parse_all(b"HTTP/1.1 299 Whatever\r\nContent-Length: 0\r\n\r\n");

    assert_eq!(result, ParseResult::Complete);
    assert_eq!(reply.status, 299);
    assert_eq!(reply.status_code(), None);
}

#[test]
fn test_parse_reply_across_chunks() {
    let input = b"HTTP/1.1 201 Created\r\nContent-Length: 4\r\n\r\nbody";

    for at in 1..input.len() {
        let mut reply = Reply::new();
        let mut ctx = ReplyContext::new();

        let (first, _) = ReplyParser::parse(&mut reply, &mut ctx, &input[..at]);
        assert_eq!(first, ParseResult::Incomplete, "split at {at}");
        let (second, _) = ReplyParser::parse(&mut reply, &mut ctx, &input[at..]);

        assert_eq!(second, ParseResult::Complete, "split at {at}");
        assert_eq!(reply.status, 201);
        assert_eq!(reply.content, b"body".to_vec());
    }
}

#[test]
fn test_parse_switching_protocols_leaves_trailing_bytes() {
    let input = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n\x81\x02hi";
    let (result, consumed, reply) = parse_all(input);

    assert_eq!(result, ParseResult::Complete);
    assert_eq!(reply.status, 101);
    assert_eq!(reply.content_length, 0);
    assert_eq!(consumed, input.len() - 4);
}

#[test]
fn test_parse_not_modified_has_no_body() {
    let (result, _, reply) = parse_all(b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n");

    assert_eq!(result, ParseResult::Complete);
    assert_eq!(reply.content_length, 0);
}

#[test]
fn test_parse_invalid_replies() {
    let cases: [&[u8]; 4] = [
        b"HTTX/1.1 200 OK\r\n\r\n",
        b"HTTP/1.1 20 OK\r\n\r\n",
        b"HTTP/1.1 2000 OK\r\n\r\n",
        b"HTTP/1.1 200 OK\r\nContent-Length: x\r\n\r\n",
    ];

    for input in cases {
        let (result, _, _) = parse_all(input);
        assert_eq!(result, ParseResult::Invalid, "{:?}", String::from_utf8_lossy(input));
    }
}

#[test]
fn test_reply_without_length_runs_to_end_of_stream() {
    let mut reply = Reply::new();
    let mut ctx = ReplyContext::new();
    ctx.set_read_to_eof(true);

    let head = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nhello";
    let (result, consumed) = ReplyParser::parse(&mut reply, &mut ctx, head);
    assert_eq!(result, ParseResult::Incomplete);
    assert_eq!(consumed, head.len());
    assert!(ctx.until_eof());

    let (result, _) = ReplyParser::parse(&mut reply, &mut ctx, b" world");
    assert_eq!(result, ParseResult::Incomplete);

    assert_eq!(ReplyParser::finish_on_eof(&mut reply, &mut ctx), ParseResult::Complete);
    assert_eq!(reply.content, b"hello world".to_vec());
    assert_eq!(reply.content_length, 11);
}

#[test]
fn test_end_of_stream_before_body_is_invalid() {
    let mut reply = Reply::new();
    let mut ctx = ReplyContext::new();
    ctx.set_read_to_eof(true);

    let (result, _) = ReplyParser::parse(&mut reply, &mut ctx, b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nab");
    assert_eq!(result, ParseResult::Incomplete);
    assert_eq!(ReplyParser::finish_on_eof(&mut reply, &mut ctx), ParseResult::Invalid);
}

#[test]
fn test_reply_over_body_limit_is_invalid() {
    let (result, _, _) = parse_all(b"HTTP/1.1 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\nab");
    assert_eq!(result, ParseResult::Invalid);

    let mut reply = Reply::new();
    let mut ctx = ReplyContext::new();
    ctx.set_read_to_eof(true);
    ctx.set_max_content_length(8);
    let (result, _) = ReplyParser::parse(&mut reply, &mut ctx, b"HTTP/1.1 200 OK\r\n\r\nhello");
    assert_eq!(result, ParseResult::Incomplete);
    let (result, _) = ReplyParser::parse(&mut reply, &mut ctx, b" world");
    assert_eq!(result, ParseResult::Invalid);
}
