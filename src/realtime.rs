use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

use crate::engine::{AuthorizationState, Chat, ChatCursor, ChatId, Engine, EngineError};
use crate::protocol::{
    ChatIds, ChatObject, EXTRA_KEY, ErrorObject, ProxyObject, ProxyType, Request, Seconds,
    TdlibParameters, request_id, type_name,
};
use crate::update::Update;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between callers and the socket reader.
#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    feed: Mutex<Option<mpsc::Sender<Update>>>,
    closed: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Value>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn feed(&self) -> MutexGuard<'_, Option<mpsc::Sender<Update>>> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Engine reached over a WebSocket speaking the engine's JSON object protocol.
///
/// One reader task routes responses to their callers by `@extra` id and
/// everything else to the update feed; one writer task owns the socket sink.
pub struct EngineClient {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    parameters: TdlibParameters,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl EngineClient {
    pub async fn connect(url: &str, parameters: TdlibParameters) -> Result<Self, EngineError> {
        let url = Url::parse(url)?;
        let (ws, _) = connect_async(url.as_str()).await?;
        info!(%url, "connected to engine");

        let (mut sink, stream) = ws.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<WsMessage>();
        let shared = Arc::new(Shared::default());

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if let Err(error) = sink.send(message).await {
                    warn!(%error, "failed to write to engine");
                    break;
                }
            }
            let _ = sink.close().await;
        });
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&shared)));

        Ok(Self {
            outgoing,
            shared,
            next_id: AtomicU64::new(1),
            parameters,
            reader,
            writer,
        })
    }

    pub async fn add_proxy(&self, server: &str, port: u16, kind: ProxyType) -> Result<i32, EngineError> {
        let request = Request::AddProxy {
            server: server.to_string(),
            port: i32::from(port),
            enable: true,
            kind,
        };
        let proxy: ProxyObject = self.call_as(request, "proxy").await?;
        Ok(proxy.id)
    }

    /// Round trip to the proxy in seconds.
    pub async fn ping_proxy(&self, proxy_id: i32) -> Result<f64, EngineError> {
        let seconds: Seconds = self.call_as(Request::PingProxy { proxy_id }, "seconds").await?;
        Ok(seconds.seconds)
    }

    /// Asks the engine to close the instance, then stops the socket tasks.
    pub async fn close(&self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.call(Request::Close)).await {
            Ok(Ok(_)) => debug!("engine closed"),
            Ok(Err(error)) => warn!(%error, "engine refused to close"),
            Err(_) => warn!("engine did not acknowledge close"),
        }
        self.reader.abort();
        self.writer.abort();
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.pending().clear();
        self.shared.feed().take();
    }

    async fn call(&self, request: Request) -> Result<Value, EngineError> {
        let name = request.name();
        let mut payload = serde_json::to_value(&request)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Value::Object(map) = &mut payload {
            map.insert(EXTRA_KEY.to_string(), Value::from(id));
        }

        let (sender, receiver) = oneshot::channel();
        self.shared.pending().insert(id, sender);
        if self.shared.closed.load(Ordering::SeqCst)
            || self.outgoing.send(WsMessage::Text(payload.to_string())).is_err()
        {
            self.shared.pending().remove(&id);
            return Err(EngineError::ConnectionClosed);
        }
        debug!(request = name, id, "sent engine request");

        let response = receiver.await.map_err(|_| EngineError::ConnectionClosed)?;
        if type_name(&response) == "error" {
            let error: ErrorObject = serde_json::from_value(response)?;
            return Err(EngineError::Engine {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response)
    }

    async fn call_as<T>(&self, request: Request, expected: &'static str) -> Result<T, EngineError>
    where
        T: DeserializeOwned,
    {
        let response = self.call(request).await?;
        let actual = type_name(&response);
        if actual != expected {
            return Err(EngineError::UnexpectedResponse {
                expected,
                actual: actual.to_string(),
            });
        }
        Ok(serde_json::from_value(response)?)
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[async_trait]
impl Engine for EngineClient {
    /// Answers the bootstrap states (parameters, encryption key) itself, so
    /// callers only see states that need the operator or mean "ready".
    async fn authorization_state(&self) -> Result<AuthorizationState, EngineError> {
        loop {
            let response = self.call(Request::GetAuthorizationState).await?;
            match AuthorizationState::from_type_name(type_name(&response)) {
                AuthorizationState::WaitTdlibParameters => {
                    debug!("sending engine parameters");
                    self.call(Request::SetTdlibParameters {
                        parameters: self.parameters.clone(),
                    })
                    .await?;
                }
                AuthorizationState::WaitEncryptionKey => {
                    self.call(Request::CheckDatabaseEncryptionKey {
                        encryption_key: String::new(),
                    })
                    .await?;
                }
                state => return Ok(state),
            }
        }
    }

    async fn submit_phone_number(&self, phone_number: &str) -> Result<(), EngineError> {
        self.call(Request::SetAuthenticationPhoneNumber {
            phone_number: phone_number.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn submit_code(&self, code: &str) -> Result<(), EngineError> {
        self.call(Request::CheckAuthenticationCode {
            code: code.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn submit_password(&self, password: &str) -> Result<(), EngineError> {
        self.call(Request::CheckAuthenticationPassword {
            password: password.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn send_text_message(&self, chat_id: ChatId, text: &str) -> Result<(), EngineError> {
        self.call(Request::text_message(chat_id, text)).await?;
        Ok(())
    }

    async fn chat_page(&self, cursor: ChatCursor, limit: usize) -> Result<Vec<ChatId>, EngineError> {
        let request = Request::GetChats {
            offset_order: cursor.order.to_string(),
            offset_chat_id: cursor.chat_id,
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
        };
        let page: ChatIds = self.call_as(request, "chats").await?;
        Ok(page.chat_ids)
    }

    async fn chat(&self, chat_id: ChatId) -> Result<Chat, EngineError> {
        let chat: ChatObject = self.call_as(Request::GetChat { chat_id }, "chat").await?;
        Ok(Chat {
            id: chat.id,
            title: chat.title,
            order: chat.order,
        })
    }

    fn subscribe_updates(&self, capacity: usize) -> Result<mpsc::Receiver<Update>, EngineError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(EngineError::ConnectionClosed);
        }
        let (sender, receiver) = mpsc::channel(capacity);
        *self.shared.feed() = Some(sender);
        Ok(receiver)
    }
}

async fn read_loop<S>(mut stream: S, shared: Arc<Shared>)
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                warn!(%error, "engine connection failed");
                break;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => route(value, &shared).await,
            Err(error) => debug!(%error, "skipping malformed engine object"),
        }
    }

    info!("engine connection closed");
    shared.closed.store(true, Ordering::SeqCst);
    // Dropped waiters fail their calls; a dropped sender closes the feed.
    shared.pending().clear();
    shared.feed().take();
}

async fn route(value: Value, shared: &Shared) {
    if let Some(id) = request_id(&value) {
        let waiter = shared.pending().remove(&id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(value);
            }
            None => debug!(id, "response for unknown request"),
        }
        return;
    }

    let feed = shared.feed().clone();
    match feed {
        Some(feed) => {
            if feed.send(Update::from_value(&value)).await.is_err() {
                debug!("update feed receiver dropped");
            }
        }
        None => debug!(kind = type_name(&value), "no update subscriber; dropping update"),
    }
}
