use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::update::Update;

pub type ChatId = i64;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("engine connection closed")]
    ConnectionClosed,
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse { expected: &'static str, actual: String },
    #[error("{message} (code {code})")]
    Engine { code: i32, message: String },
}

/// Session authorization state as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationState {
    WaitTdlibParameters,
    WaitEncryptionKey,
    WaitPhoneNumber,
    WaitCode,
    WaitPassword,
    Ready,
    LoggingOut,
    Closing,
    Closed,
    Other(String),
}

impl AuthorizationState {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "authorizationStateWaitTdlibParameters" => Self::WaitTdlibParameters,
            "authorizationStateWaitEncryptionKey" => Self::WaitEncryptionKey,
            "authorizationStateWaitPhoneNumber" => Self::WaitPhoneNumber,
            "authorizationStateWaitCode" => Self::WaitCode,
            "authorizationStateWaitPassword" => Self::WaitPassword,
            "authorizationStateReady" => Self::Ready,
            "authorizationStateLoggingOut" => Self::LoggingOut,
            "authorizationStateClosing" => Self::Closing,
            "authorizationStateClosed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    /// Pagination key only; never used to sort for display.
    pub order: i64,
}

/// Position in the engine's chat list. Pages start strictly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatCursor {
    pub order: i64,
    pub chat_id: ChatId,
}

impl ChatCursor {
    pub const START: Self = Self {
        order: i64::MAX,
        chat_id: 0,
    };

    pub fn after(chat: &Chat) -> Self {
        Self {
            order: chat.order,
            chat_id: chat.id,
        }
    }
}

/// Command surface of the messaging engine.
///
/// Protocol details such as storage and encryption live behind this trait.
/// The session only issues these calls and drains the update
/// feed returned by [`Engine::subscribe_updates`].
#[async_trait]
pub trait Engine: Send + Sync {
    async fn authorization_state(&self) -> Result<AuthorizationState, EngineError>;

    async fn submit_phone_number(&self, phone_number: &str) -> Result<(), EngineError>;

    async fn submit_code(&self, code: &str) -> Result<(), EngineError>;

    async fn submit_password(&self, password: &str) -> Result<(), EngineError>;

    async fn send_text_message(&self, chat_id: ChatId, text: &str) -> Result<(), EngineError>;

    /// Returns up to `limit` chat ids that follow `cursor`. An empty page
    /// means the list is exhausted.
    async fn chat_page(&self, cursor: ChatCursor, limit: usize) -> Result<Vec<ChatId>, EngineError>;

    async fn chat(&self, chat_id: ChatId) -> Result<Chat, EngineError>;

    fn subscribe_updates(&self, capacity: usize) -> Result<mpsc::Receiver<Update>, EngineError>;
}
