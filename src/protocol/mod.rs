//! Protocol Module
//!
//! Defines the line-oriented wire protocol shared by clients, the
//! controller and storage nodes.
//!
//! ## Control Lines
//! - `JOIN <port>`                   node → controller
//! - `STORE <name> <size>`           client → controller, client → node
//! - `STORE_TO <port>...`            controller → client
//! - `ACK`                           node → client (then raw bytes follow)
//! - `STORE_ACK <name>`              node → controller
//! - `STORE_COMPLETE`                controller → client
//! - `LOAD <name>`                   client → controller, client → node
//! - `LOAD_FROM <port> <size>`       controller → client
//! - `RELOAD <name>`                 client → controller
//! - `REMOVE <name>`                 client → controller, controller → node
//! - `REMOVE_ACK <name>`             node → controller
//! - `REMOVE_COMPLETE`               controller → client
//! - `LIST` / `LIST <name>...`       client ↔ controller
//!
//! ### Error Lines
//! - `ERROR_NOT_ENOUGH_DSTORES`, `ERROR_FILE_ALREADY_EXISTS`,
//!   `ERROR_FILE_DOES_NOT_EXIST [name]`, `ERROR_LOAD`
//! - `ERROR_STORE_FAILED <name>`, `ERROR_REMOVE_FAILED <name>` when a
//!   replication barrier fails

mod message;
mod codec;

pub use message::{Message, Token};
pub use codec::{
    decode_line, encode_line, read_message, copy_payload, validate_name, write_message,
    write_payload, MAX_LINE_LEN,
};
