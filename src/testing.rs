use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::engine::{AuthorizationState, Chat, ChatCursor, ChatId, Engine, EngineError};
use crate::protocol::{EXTRA_KEY, TdlibParameters};
use crate::update::Update;

/// In-memory writer for asserting on console output.
#[derive(Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<u8>>>);

impl Transcript {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("transcript lock")).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("transcript lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AuthorizationState,
    PhoneNumber(String),
    Code(String),
    Password(String),
    SendText(ChatId, String),
    ChatPage(ChatCursor, usize),
    Chat(ChatId),
}

pub fn rejected(message: &str) -> EngineError {
    EngineError::Engine {
        code: 400,
        message: message.to_string(),
    }
}

pub fn chat(id: ChatId, title: &str, order: i64) -> Chat {
    Chat {
        id,
        title: title.to_string(),
        order,
    }
}

/// Scripted engine. Authorization states are served in order and the script
/// ends in `Ready`; chat pages are served in order and end in empty pages.
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    states: Mutex<VecDeque<Result<AuthorizationState, EngineError>>>,
    submit_failures: Mutex<VecDeque<EngineError>>,
    pages: Mutex<VecDeque<Vec<ChatId>>>,
    chats: Mutex<HashMap<ChatId, Chat>>,
    send_failure: Mutex<Option<EngineError>>,
    replies: Mutex<VecDeque<Update>>,
    close_feed_after_replies: Mutex<bool>,
    feed: Mutex<Option<mpsc::Sender<Update>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_states(self, states: Vec<Result<AuthorizationState, EngineError>>) -> Self {
        *self.states.lock().expect("states") = states.into();
        self
    }

    pub fn with_submit_failure(self, error: EngineError) -> Self {
        self.submit_failures.lock().expect("failures").push_back(error);
        self
    }

    pub fn with_pages(self, pages: Vec<Vec<Chat>>) -> Self {
        {
            let mut queued = self.pages.lock().expect("pages");
            let mut chats = self.chats.lock().expect("chats");
            for page in pages {
                queued.push_back(page.iter().map(|chat| chat.id).collect());
                for chat in page {
                    chats.insert(chat.id, chat);
                }
            }
        }
        self
    }

    /// Queues a page whose ids have no detail record.
    pub fn with_dangling_page(self, ids: Vec<ChatId>) -> Self {
        self.pages.lock().expect("pages").push_back(ids);
        self
    }

    pub fn with_send_failure(self, error: EngineError) -> Self {
        *self.send_failure.lock().expect("send failure") = Some(error);
        self
    }

    /// Updates pushed into the feed after each successful send.
    pub fn with_replies(self, replies: Vec<Update>, close_feed: bool) -> Self {
        *self.replies.lock().expect("replies") = replies.into();
        *self.close_feed_after_replies.lock().expect("close") = close_feed;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn push_update(&self, update: Update) {
        let feed = self.feed.lock().expect("feed").clone();
        if let Some(feed) = feed {
            feed.try_send(update).expect("feed has room");
        }
    }

    pub fn close_feed(&self) {
        self.feed.lock().expect("feed").take();
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls").push(call);
    }

    fn submission(&self) -> Result<(), EngineError> {
        match self.submit_failures.lock().expect("failures").pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn authorization_state(&self) -> Result<AuthorizationState, EngineError> {
        self.record(Call::AuthorizationState);
        self.states
            .lock()
            .expect("states")
            .pop_front()
            .unwrap_or(Ok(AuthorizationState::Ready))
    }

    async fn submit_phone_number(&self, phone_number: &str) -> Result<(), EngineError> {
        self.record(Call::PhoneNumber(phone_number.to_string()));
        self.submission()
    }

    async fn submit_code(&self, code: &str) -> Result<(), EngineError> {
        self.record(Call::Code(code.to_string()));
        self.submission()
    }

    async fn submit_password(&self, password: &str) -> Result<(), EngineError> {
        self.record(Call::Password(password.to_string()));
        self.submission()
    }

    async fn send_text_message(&self, chat_id: ChatId, text: &str) -> Result<(), EngineError> {
        self.record(Call::SendText(chat_id, text.to_string()));
        if let Some(error) = self.send_failure.lock().expect("send failure").take() {
            return Err(error);
        }
        let replies: Vec<Update> = self.replies.lock().expect("replies").drain(..).collect();
        for reply in replies {
            self.push_update(reply);
        }
        if *self.close_feed_after_replies.lock().expect("close") {
            self.close_feed();
        }
        Ok(())
    }

    async fn chat_page(&self, cursor: ChatCursor, limit: usize) -> Result<Vec<ChatId>, EngineError> {
        self.record(Call::ChatPage(cursor, limit));
        Ok(self
            .pages
            .lock()
            .expect("pages")
            .pop_front()
            .unwrap_or_default())
    }

    async fn chat(&self, chat_id: ChatId) -> Result<Chat, EngineError> {
        self.record(Call::Chat(chat_id));
        self.chats
            .lock()
            .expect("chats")
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| rejected("Chat not found"))
    }

    fn subscribe_updates(&self, capacity: usize) -> Result<mpsc::Receiver<Update>, EngineError> {
        let (sender, receiver) = mpsc::channel(capacity);
        *self.feed.lock().expect("feed") = Some(sender);
        Ok(receiver)
    }
}

pub fn engine_parameters() -> TdlibParameters {
    TdlibParameters {
        use_test_dc: false,
        database_directory: "/tmp/chatping/db".to_string(),
        files_directory: "/tmp/chatping/files".to_string(),
        use_file_database: true,
        use_chat_info_database: true,
        use_message_database: true,
        use_secret_chats: false,
        api_id: 94575,
        api_hash: "a3406de8d171bb422bb6ddf3bbd800e2".to_string(),
        system_language_code: "en".to_string(),
        device_model: "Server".to_string(),
        system_version: "1.0.0".to_string(),
        application_version: "0.1.0".to_string(),
        enable_storage_optimizer: true,
        ignore_file_names: false,
    }
}

/// Copies the request id of `request` onto `body`.
pub fn reply(request: &Value, mut body: Value) -> Value {
    body[EXTRA_KEY] = request[EXTRA_KEY].clone();
    body
}

/// Serves one engine socket on localhost, answering each request with
/// `handler`. Returns the `ws://` URL to connect to.
pub async fn serve<H>(mut handler: H) -> String
where
    H: FnMut(&Value) -> Vec<Value> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let request: Value = serde_json::from_str(&text).expect("json request");
            for response in handler(&request) {
                if ws.send(Message::Text(response.to_string())).await.is_err() {
                    return;
                }
            }
        }
    });
    format!("ws://{addr}")
}
