use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chats::ChatDirectory;
use crate::console::{Console, ConsoleError};
use crate::engine::{ChatId, Engine};
use crate::ping::{Intent, PING_TEXT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    ChatList,
    SetChat,
}

impl Command {
    /// Exact, case-sensitive match on the trimmed line.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "ping" => Some(Command::Ping),
            "chatlist" => Some(Command::ChatList),
            "setchat" => Some(Command::SetChat),
            _ => None,
        }
    }
}

/// Reads operator commands one line at a time.
///
/// The loop owns the chat directory and the selected chat, so commands run
/// strictly one after another. Changes the correlator needs to see are sent
/// to it as [`Intent`]s.
pub struct CommandLoop<E: ?Sized, R> {
    engine: Arc<E>,
    console: Console<R>,
    selected: ChatId,
    directory: ChatDirectory,
    intents: mpsc::Sender<Intent>,
    chat_list_limit: usize,
}

impl<E, R> CommandLoop<E, R>
where
    E: Engine + ?Sized,
    R: AsyncBufRead + Unpin,
{
    pub fn new(
        engine: Arc<E>,
        console: Console<R>,
        selected: ChatId,
        intents: mpsc::Sender<Intent>,
        chat_list_limit: usize,
    ) -> Self {
        Self {
            engine,
            console,
            selected,
            directory: ChatDirectory::new(),
            intents,
            chat_list_limit,
        }
    }

    #[cfg(test)]
    pub fn selected(&self) -> ChatId {
        self.selected
    }

    #[cfg(test)]
    pub fn directory(&self) -> &ChatDirectory {
        &self.directory
    }

    /// Runs until input ends or `shutdown` fires.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<(), ConsoleError> {
        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                line = self.console.read_line() => line?,
            };
            let Some(line) = line else {
                info!("console input closed; no further commands");
                break;
            };
            let Some(command) = Command::parse(&line) else {
                continue;
            };

            debug!(?command, selected = self.selected, "dispatching command");
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.dispatch(command) => result,
            };
            match result {
                Ok(()) => {}
                Err(ConsoleError::Closed) => {
                    info!("console input closed; no further commands");
                    break;
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), ConsoleError> {
        match command {
            Command::Ping => self.ping().await,
            Command::ChatList => self.chat_list().await,
            Command::SetChat => self.set_chat().await?,
        }
        Ok(())
    }

    async fn ping(&mut self) {
        // The timestamp must reach the correlator before the reply can.
        self.notify(Intent::PingSent(Instant::now())).await;
        if let Err(error) = self
            .engine
            .send_text_message(self.selected, PING_TEXT)
            .await
        {
            self.console
                .output()
                .line(format_args!("Error while sending: {error}"));
        }
    }

    async fn chat_list(&mut self) {
        let output = self.console.output().clone();
        if let Err(error) = self
            .directory
            .fill(self.engine.as_ref(), self.chat_list_limit)
            .await
        {
            output.line(format_args!("Error while loading chats: {error}"));
        }

        debug!(
            chats = self.directory.len(),
            complete = self.directory.is_complete(),
            "chat directory filled"
        );
        output.line(format_args!("got {} chats", self.directory.len()));
        for chat in self.directory.chats() {
            output.line(format_args!("Chat title: {}\tChat id: {}", chat.title, chat.id));
        }
    }

    async fn set_chat(&mut self) -> Result<(), ConsoleError> {
        let answer = self.console.prompt("Enter chat ID:").await?;
        match answer.parse::<ChatId>() {
            Ok(chat_id) => {
                self.selected = chat_id;
                self.notify(Intent::SelectChat(chat_id)).await;
            }
            Err(_) => self.console.output().line("Invalid int64 value"),
        }
        Ok(())
    }

    async fn notify(&mut self, intent: Intent) {
        if self.intents.send(intent).await.is_err() {
            warn!(?intent, "update correlator has stopped");
        }
    }
}
