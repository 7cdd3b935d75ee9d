//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────┬───┬────────┬───┬────────┬──────┐
//! │  TOKEN   │ ␠ │ arg 1  │ ␠ │ arg N  │  \n  │
//! └──────────┴───┴────────┴───┴────────┴──────┘
//! ```
//!
//! Arguments never contain whitespace. A raw payload of exactly the
//! announced size may follow a `STORE` (client to node, after `ACK`) or
//! answer a `LOAD` (node to client) on the same connection.

use std::fmt::Display;
use std::io::{BufRead, Read, Write};

use crate::error::{Result, StoreError};
use super::{Message, Token};

/// Longest control line accepted (a LIST reply is the long one)
pub const MAX_LINE_LEN: usize = 1024 * 1024;

// =============================================================================
// Line Encoding/Decoding
// =============================================================================

/// Encode a message as a control line, without the trailing newline
pub fn encode_line(message: &Message) -> String {
    let mut line = String::from(message.token().as_str());

    match message {
        Message::Join { port } => push_arg(&mut line, port),
        Message::Store { name, size } => {
            push_arg(&mut line, name);
            push_arg(&mut line, size);
        }
        Message::StoreTo { ports } => ports.iter().for_each(|p| push_arg(&mut line, p)),
        Message::StoreAck { name }
        | Message::Load { name }
        | Message::Reload { name }
        | Message::Remove { name }
        | Message::RemoveAck { name }
        | Message::ErrorStoreFailed { name }
        | Message::ErrorRemoveFailed { name } => push_arg(&mut line, name),
        Message::LoadFrom { port, size } => {
            push_arg(&mut line, port);
            push_arg(&mut line, size);
        }
        Message::List { names } => names.iter().for_each(|n| push_arg(&mut line, n)),
        Message::ErrorFileDoesNotExist { name: Some(name) } => push_arg(&mut line, name),
        Message::Ack
        | Message::StoreComplete
        | Message::ErrorLoad
        | Message::RemoveComplete
        | Message::ErrorNotEnoughDstores
        | Message::ErrorFileAlreadyExists
        | Message::ErrorFileDoesNotExist { name: None } => {}
    }

    line
}

fn push_arg(line: &mut String, arg: &dyn Display) {
    line.push(' ');
    line.push_str(&arg.to_string());
}

/// Decode a control line into a message
pub fn decode_line(line: &str) -> Result<Message> {
    let mut words = line.split_whitespace();
    let head = words
        .next()
        .ok_or_else(|| StoreError::MalformedMessage("empty line".to_string()))?;
    let token = Token::parse(head)
        .ok_or_else(|| StoreError::MalformedMessage(format!("unknown token {:?}", head)))?;
    let args: Vec<&str> = words.collect();

    let message = match token {
        Token::Join => {
            expect_arity(token, &args, 1)?;
            Message::Join { port: parse_num(token, args[0])? }
        }
        Token::Store => {
            expect_arity(token, &args, 2)?;
            Message::Store {
                name: args[0].to_string(),
                size: parse_num(token, args[1])?,
            }
        }
        Token::StoreTo => Message::StoreTo {
            ports: args
                .iter()
                .map(|a| parse_num(token, a))
                .collect::<Result<Vec<u16>>>()?,
        },
        Token::LoadFrom => {
            expect_arity(token, &args, 2)?;
            Message::LoadFrom {
                port: parse_num(token, args[0])?,
                size: parse_num(token, args[1])?,
            }
        }
        Token::StoreAck => Message::StoreAck { name: single_name(token, &args)? },
        Token::Load => Message::Load { name: single_name(token, &args)? },
        Token::Reload => Message::Reload { name: single_name(token, &args)? },
        Token::Remove => Message::Remove { name: single_name(token, &args)? },
        Token::RemoveAck => Message::RemoveAck { name: single_name(token, &args)? },
        Token::ErrorStoreFailed => Message::ErrorStoreFailed { name: single_name(token, &args)? },
        Token::ErrorRemoveFailed => Message::ErrorRemoveFailed { name: single_name(token, &args)? },
        Token::List => Message::List {
            names: args.iter().map(|a| a.to_string()).collect(),
        },
        Token::ErrorFileDoesNotExist => match args.as_slice() {
            [] => Message::ErrorFileDoesNotExist { name: None },
            [name] => Message::ErrorFileDoesNotExist { name: Some(name.to_string()) },
            _ => return Err(arity_error(token, 1, args.len())),
        },
        Token::Ack
        | Token::StoreComplete
        | Token::ErrorLoad
        | Token::RemoveComplete
        | Token::ErrorNotEnoughDstores
        | Token::ErrorFileAlreadyExists => {
            expect_arity(token, &args, 0)?;
            match token {
                Token::Ack => Message::Ack,
                Token::StoreComplete => Message::StoreComplete,
                Token::ErrorLoad => Message::ErrorLoad,
                Token::RemoveComplete => Message::RemoveComplete,
                Token::ErrorNotEnoughDstores => Message::ErrorNotEnoughDstores,
                _ => Message::ErrorFileAlreadyExists,
            }
        }
    };

    Ok(message)
}

/// File names travel as single whitespace-free words
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(StoreError::MalformedMessage(format!(
            "file name {:?} must be a non-empty word",
            name
        )));
    }
    Ok(())
}

fn expect_arity(token: Token, args: &[&str], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(arity_error(token, expected, args.len()));
    }
    Ok(())
}

fn arity_error(token: Token, expected: usize, got: usize) -> StoreError {
    StoreError::MalformedMessage(format!(
        "{} takes {} argument(s), got {}",
        token.as_str(),
        expected,
        got
    ))
}

fn single_name(token: Token, args: &[&str]) -> Result<String> {
    expect_arity(token, args, 1)?;
    Ok(args[0].to_string())
}

fn parse_num<T: std::str::FromStr>(token: Token, arg: &str) -> Result<T> {
    arg.parse().map_err(|_| {
        StoreError::MalformedMessage(format!("{}: invalid number {:?}", token.as_str(), arg))
    })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one control line and decode it
///
/// Blocks until a full line arrives. A closed stream surfaces as an
/// `UnexpectedEof` I/O error. A rejected line is consumed through its
/// newline, so the next read starts on a line boundary.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<Message> {
    let mut line = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut line)?;

    if read == 0 {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    if line.last() != Some(&b'\n') {
        if read > MAX_LINE_LEN {
            discard_line(reader)?;
            return Err(StoreError::MalformedMessage(format!(
                "line exceeds {} bytes",
                MAX_LINE_LEN
            )));
        }
        // Peer closed mid-line
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed mid-line",
        )));
    }

    let line = std::str::from_utf8(&line)
        .map_err(|_| StoreError::MalformedMessage("line is not valid UTF-8".to_string()))?;
    decode_line(line.trim_end_matches(&['\r', '\n'][..]))
}

/// Skip input up to and including the next newline (or end of stream)
fn discard_line<R: BufRead>(reader: &mut R) -> Result<()> {
    loop {
        let (found, used) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

/// Write a message as one newline-terminated line and flush
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let mut line = encode_line(message);
    line.push('\n');
    writer.write_all(line.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Copy exactly `size` raw bytes following a control line into `out`
///
/// Bytes are streamed in buffer-sized chunks; nothing is reserved up
/// front from the announced size. Fewer bytes than announced is a
/// disconnect.
pub fn copy_payload<R: Read, W: Write>(reader: &mut R, size: u64, out: &mut W) -> Result<u64> {
    let got = std::io::copy(&mut reader.by_ref().take(size), out)?;
    if got < size {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("payload truncated: expected {} bytes, got {}", size, got),
        )));
    }
    Ok(got)
}

/// Write raw bytes and flush
pub fn write_payload<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}
