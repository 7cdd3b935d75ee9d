//! Message definitions
//!
//! Every control line exchanged between clients, the controller and
//! storage nodes, as one closed enum.

/// Leading token of a control line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Join,
    Store,
    StoreTo,
    Ack,
    StoreAck,
    StoreComplete,
    Load,
    LoadFrom,
    Reload,
    ErrorLoad,
    Remove,
    RemoveAck,
    RemoveComplete,
    List,
    ErrorNotEnoughDstores,
    ErrorFileAlreadyExists,
    ErrorFileDoesNotExist,
    ErrorStoreFailed,
    ErrorRemoveFailed,
}

impl Token {
    pub const ALL: [Token; 19] = [
        Token::Join,
        Token::Store,
        Token::StoreTo,
        Token::Ack,
        Token::StoreAck,
        Token::StoreComplete,
        Token::Load,
        Token::LoadFrom,
        Token::Reload,
        Token::ErrorLoad,
        Token::Remove,
        Token::RemoveAck,
        Token::RemoveComplete,
        Token::List,
        Token::ErrorNotEnoughDstores,
        Token::ErrorFileAlreadyExists,
        Token::ErrorFileDoesNotExist,
        Token::ErrorStoreFailed,
        Token::ErrorRemoveFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Token::Join => "JOIN",
            Token::Store => "STORE",
            Token::StoreTo => "STORE_TO",
            Token::Ack => "ACK",
            Token::StoreAck => "STORE_ACK",
            Token::StoreComplete => "STORE_COMPLETE",
            Token::Load => "LOAD",
            Token::LoadFrom => "LOAD_FROM",
            Token::Reload => "RELOAD",
            Token::ErrorLoad => "ERROR_LOAD",
            Token::Remove => "REMOVE",
            Token::RemoveAck => "REMOVE_ACK",
            Token::RemoveComplete => "REMOVE_COMPLETE",
            Token::List => "LIST",
            Token::ErrorNotEnoughDstores => "ERROR_NOT_ENOUGH_DSTORES",
            Token::ErrorFileAlreadyExists => "ERROR_FILE_ALREADY_EXISTS",
            Token::ErrorFileDoesNotExist => "ERROR_FILE_DOES_NOT_EXIST",
            Token::ErrorStoreFailed => "ERROR_STORE_FAILED",
            Token::ErrorRemoveFailed => "ERROR_REMOVE_FAILED",
        }
    }

    /// Exact (whole-word) token lookup
    pub fn parse(word: &str) -> Option<Token> {
        Self::ALL.iter().copied().find(|t| t.as_str() == word)
    }
}

/// A parsed control line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Node announces the port it serves clients on
    Join { port: u16 },

    /// Store request (client to controller, and client to node)
    Store { name: String, size: u64 },

    /// Ports of the nodes chosen to hold a new file
    StoreTo { ports: Vec<u16> },

    /// Node is ready to receive the file bytes
    Ack,

    /// Node persisted a file
    StoreAck { name: String },

    StoreComplete,

    /// Load request (client to controller, and client to node)
    Load { name: String },

    /// Replica to read from and the file size
    LoadFrom { port: u16, size: u64 },

    /// Previous replica failed, try the next one
    Reload { name: String },

    /// No replica left to try
    ErrorLoad,

    /// Remove request (client to controller, and controller to node)
    Remove { name: String },

    /// Node deleted a file
    RemoveAck { name: String },

    RemoveComplete,

    /// List request when empty on the way in, file names on the way out
    List { names: Vec<String> },

    ErrorNotEnoughDstores,

    ErrorFileAlreadyExists,

    /// Bare to clients; nodes append the file name when reporting to the controller
    ErrorFileDoesNotExist { name: Option<String> },

    /// A store barrier failed and was rolled back
    ErrorStoreFailed { name: String },

    /// A remove barrier failed, the file stays mid-remove
    ErrorRemoveFailed { name: String },
}

impl Message {
    /// Get the leading token
    pub fn token(&self) -> Token {
        match self {
            Message::Join { .. } => Token::Join,
            Message::Store { .. } => Token::Store,
            Message::StoreTo { .. } => Token::StoreTo,
            Message::Ack => Token::Ack,
            Message::StoreAck { .. } => Token::StoreAck,
            Message::StoreComplete => Token::StoreComplete,
            Message::Load { .. } => Token::Load,
            Message::LoadFrom { .. } => Token::LoadFrom,
            Message::Reload { .. } => Token::Reload,
            Message::ErrorLoad => Token::ErrorLoad,
            Message::Remove { .. } => Token::Remove,
            Message::RemoveAck { .. } => Token::RemoveAck,
            Message::RemoveComplete => Token::RemoveComplete,
            Message::List { .. } => Token::List,
            Message::ErrorNotEnoughDstores => Token::ErrorNotEnoughDstores,
            Message::ErrorFileAlreadyExists => Token::ErrorFileAlreadyExists,
            Message::ErrorFileDoesNotExist { .. } => Token::ErrorFileDoesNotExist,
            Message::ErrorStoreFailed { .. } => Token::ErrorStoreFailed,
            Message::ErrorRemoveFailed { .. } => Token::ErrorRemoveFailed,
        }
    }
}
