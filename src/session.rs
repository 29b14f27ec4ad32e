use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::{AuthDriver, AuthError};
use crate::commands::CommandLoop;
use crate::console::{Console, ConsoleError};
use crate::engine::{ChatId, Engine, EngineError};
use crate::ping::{Correlator, PingTimer};

pub const DEFAULT_UPDATE_BUFFER: usize = 100;
pub const CHAT_LIST_LIMIT: usize = 1000;
const AUTH_POLL_INTERVAL: Duration = Duration::from_millis(200);
const INTENT_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("console error: {0}")]
    Console(#[from] ConsoleError),
    #[error("command loop failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub chat_id: ChatId,
    pub update_buffer: usize,
    pub chat_list_limit: usize,
    pub auth_poll_interval: Duration,
}

impl SessionSettings {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            update_buffer: DEFAULT_UPDATE_BUFFER,
            chat_list_limit: CHAT_LIST_LIMIT,
            auth_poll_interval: AUTH_POLL_INTERVAL,
        }
    }
}

/// Authorizes, then runs the command loop and the update correlator until
/// the update feed closes or `shutdown` fires.
pub async fn run<E, R>(
    engine: Arc<E>,
    mut console: Console<R>,
    settings: SessionSettings,
    shutdown: CancellationToken,
) -> Result<(), SessionError>
where
    E: Engine + 'static,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let driver = AuthDriver::new(engine.as_ref(), settings.auth_poll_interval);
    match driver.run(&mut console, &shutdown).await {
        Ok(()) => {}
        Err(AuthError::Cancelled) => return Ok(()),
        Err(error) => return Err(error.into()),
    }

    let updates = engine.subscribe_updates(settings.update_buffer)?;
    let (intent_tx, intent_rx) = mpsc::channel(INTENT_BUFFER);
    let output = console.output().clone();
    let session = shutdown.child_token();

    let mut commands = CommandLoop::new(
        Arc::clone(&engine),
        console,
        settings.chat_id,
        intent_tx,
        settings.chat_list_limit,
    );
    let command_shutdown = session.clone();
    let command_task = tokio::spawn(async move { commands.run(&command_shutdown).await });

    Correlator::new(PingTimer::new(settings.chat_id), updates, intent_rx, output)
        .run(session.clone())
        .await;
    debug!("correlator finished; stopping command loop");
    session.cancel();

    command_task.await??;
    Ok(())
}
