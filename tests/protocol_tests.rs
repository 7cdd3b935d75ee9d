//! Codec Tests
//!
//! Tests for control line encoding/decoding and payload framing.

use std::io::Cursor;

use replistore::protocol::{
    decode_line, encode_line, read_message, copy_payload, validate_name, write_message,
    write_payload, Message, Token, MAX_LINE_LEN,
};
use replistore::StoreError;

// =============================================================================
// Line Encoding Tests
// =============================================================================

#[test]
fn test_encode_store() {
    let line = encode_line(&Message::Store {
        name: "report.txt".to_string(),
        size: 2048,
    });
    assert_eq!(line, "STORE report.txt 2048");
}

#[test]
fn test_encode_store_to_lists_ports() {
    let line = encode_line(&Message::StoreTo {
        ports: vec![5001, 5003, 5002],
    });
    assert_eq!(line, "STORE_TO 5001 5003 5002");
}

#[test]
fn test_encode_bare_tokens() {
    assert_eq!(encode_line(&Message::Ack), "ACK");
    assert_eq!(encode_line(&Message::StoreComplete), "STORE_COMPLETE");
    assert_eq!(encode_line(&Message::ErrorLoad), "ERROR_LOAD");
    assert_eq!(
        encode_line(&Message::ErrorFileDoesNotExist { name: None }),
        "ERROR_FILE_DOES_NOT_EXIST"
    );
    assert_eq!(encode_line(&Message::List { names: vec![] }), "LIST");
}

#[test]
fn test_encode_node_missing_file_carries_name() {
    let line = encode_line(&Message::ErrorFileDoesNotExist {
        name: Some("gone".to_string()),
    });
    assert_eq!(line, "ERROR_FILE_DOES_NOT_EXIST gone");
}

// =============================================================================
// Line Decoding Tests
// =============================================================================

#[test]
fn test_decode_load_from() {
    let decoded = decode_line("LOAD_FROM 5002 77").unwrap();
    assert_eq!(decoded, Message::LoadFrom { port: 5002, size: 77 });
}

#[test]
fn test_decode_list_reply() {
    match decode_line("LIST a.txt b.txt").unwrap() {
        Message::List { names } => assert_eq!(names, vec!["a.txt", "b.txt"]),
        other => panic!("Expected LIST, got {:?}", other),
    }
}

#[test]
fn test_decode_collapses_extra_whitespace() {
    let decoded = decode_line("REMOVE   spaced   ").unwrap();
    assert_eq!(decoded, Message::Remove { name: "spaced".to_string() });
}

#[test]
fn test_decode_every_token_round_trips() {
    for token in Token::ALL {
        assert_eq!(Token::parse(token.as_str()), Some(token));
    }
    // Whole-word match only
    assert_eq!(Token::parse("STORE_"), None);
    assert_eq!(Token::parse("store"), None);
}

#[test]
fn test_decode_unknown_token() {
    let result = decode_line("FETCH x");
    assert!(matches!(result, Err(StoreError::MalformedMessage(_))));
}

#[test]
fn test_decode_empty_line() {
    assert!(matches!(decode_line(""), Err(StoreError::MalformedMessage(_))));
    assert!(matches!(decode_line("   "), Err(StoreError::MalformedMessage(_))));
}

#[test]
fn test_decode_wrong_arity() {
    assert!(decode_line("STORE onlyname").is_err());
    assert!(decode_line("LOAD").is_err());
    assert!(decode_line("ACK extra").is_err());
    assert!(decode_line("ERROR_FILE_DOES_NOT_EXIST a b").is_err());
}

#[test]
fn test_decode_bad_numbers() {
    assert!(decode_line("STORE f -1").is_err());
    assert!(decode_line("STORE f lots").is_err());
    assert!(decode_line("JOIN 70000").is_err());
    assert!(decode_line("STORE_TO 5001 x").is_err());
}

#[test]
fn test_validate_name() {
    assert!(validate_name("file.txt").is_ok());
    assert!(validate_name("").is_err());
    assert!(validate_name("two words").is_err());
    assert!(validate_name("tab\there").is_err());
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_write_then_read_message() {
    let mut buf = Vec::new();
    write_message(&mut buf, &Message::Join { port: 4100 }).unwrap();
    write_message(&mut buf, &Message::StoreAck { name: "a".to_string() }).unwrap();
    assert_eq!(buf, b"JOIN 4100\nSTORE_ACK a\n");

    let mut cursor = Cursor::new(buf);
    assert_eq!(read_message(&mut cursor).unwrap(), Message::Join { port: 4100 });
    assert_eq!(
        read_message(&mut cursor).unwrap(),
        Message::StoreAck { name: "a".to_string() }
    );
}

#[test]
fn test_read_message_accepts_crlf() {
    let mut cursor = Cursor::new(b"REMOVE_COMPLETE\r\n".to_vec());
    assert_eq!(read_message(&mut cursor).unwrap(), Message::RemoveComplete);
}

#[test]
fn test_read_message_eof_is_disconnect() {
    let mut cursor = Cursor::new(Vec::new());
    let err = read_message(&mut cursor).unwrap_err();
    assert!(err.is_disconnect());
}

#[test]
fn test_read_message_partial_line_is_disconnect() {
    let mut cursor = Cursor::new(b"STORE_COMP".to_vec());
    let err = read_message(&mut cursor).unwrap_err();
    assert!(err.is_disconnect());
}

#[test]
fn test_read_message_rejects_overlong_line() {
    let mut data = b"LIST ".to_vec();
    data.extend(std::iter::repeat(b'a').take(MAX_LINE_LEN + 10));
    data.push(b'\n');

    let mut cursor = Cursor::new(data);
    assert!(matches!(
        read_message(&mut cursor),
        Err(StoreError::MalformedMessage(_))
    ));
}

#[test]
fn test_overlong_line_tail_is_not_decoded() {
    // The cut falls right before a complete command on the same line
    let mut data = vec![b'x'; MAX_LINE_LEN + 1];
    data.extend_from_slice(b"LIST\n");
    data.extend_from_slice(b"ACK\n");

    let mut cursor = Cursor::new(data);
    assert!(matches!(
        read_message(&mut cursor),
        Err(StoreError::MalformedMessage(_))
    ));
    assert_eq!(read_message(&mut cursor).unwrap(), Message::Ack);
}

#[test]
fn test_overlong_line_at_end_of_stream() {
    let mut data = b"LIST ".to_vec();
    data.extend(std::iter::repeat(b'b').take(MAX_LINE_LEN * 2));

    let mut cursor = Cursor::new(data);
    assert!(matches!(
        read_message(&mut cursor),
        Err(StoreError::MalformedMessage(_))
    ));
    assert!(read_message(&mut cursor).unwrap_err().is_disconnect());
}

#[test]
fn test_read_message_rejects_invalid_utf8() {
    let mut cursor = Cursor::new(b"LIST \xff\xfe\nACK\n".to_vec());
    assert!(matches!(
        read_message(&mut cursor),
        Err(StoreError::MalformedMessage(_))
    ));
    assert_eq!(read_message(&mut cursor).unwrap(), Message::Ack);
}

#[test]
fn test_payload_follows_line() {
    let mut buf = Vec::new();
    write_message(&mut buf, &Message::Ack).unwrap();
    write_payload(&mut buf, b"\x00binary\nbytes").unwrap();
    write_message(&mut buf, &Message::Ack).unwrap();

    let mut cursor = Cursor::new(buf);
    assert_eq!(read_message(&mut cursor).unwrap(), Message::Ack);

    let mut payload = Vec::new();
    assert_eq!(copy_payload(&mut cursor, 13, &mut payload).unwrap(), 13);
    assert_eq!(payload, b"\x00binary\nbytes");
    assert_eq!(read_message(&mut cursor).unwrap(), Message::Ack);
}

#[test]
fn test_truncated_payload() {
    let mut cursor = Cursor::new(b"short".to_vec());
    let mut payload = Vec::new();
    let err = copy_payload(&mut cursor, 10, &mut payload).unwrap_err();
    assert!(err.is_disconnect());
    assert_eq!(payload, b"short");
}

#[test]
fn test_huge_announced_size_only_buffers_what_arrives() {
    let mut cursor = Cursor::new(b"tiny".to_vec());
    let mut payload = Vec::new();
    let err = copy_payload(&mut cursor, u64::MAX, &mut payload).unwrap_err();
    assert!(err.is_disconnect());
    assert_eq!(payload.len(), 4);
    assert!(payload.capacity() < 1024 * 1024);
}

#[test]
fn test_empty_payload() {
    let mut cursor = Cursor::new(Vec::new());
    let mut payload = Vec::new();
    assert_eq!(copy_payload(&mut cursor, 0, &mut payload).unwrap(), 0);
    assert!(payload.is_empty());
}
