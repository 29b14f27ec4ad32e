use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};

use dialoguer::Password;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("prompt task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("console input closed")]
    Closed,
}

/// Cloneable handle to the operator-facing output stream.
#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn line(&self, line: impl Display) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(sink, "{line}");
        let _ = sink.flush();
    }

    /// Writes `label` without a line break so the answer follows it.
    pub fn prompt(&self, label: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = write!(sink, "{label}");
        let _ = sink.flush();
    }
}

pub struct Console<R> {
    lines: Lines<R>,
    output: Output,
    mask_secrets: bool,
}

impl Console<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        let mut console = Self::new(BufReader::new(tokio::io::stdin()), Output::stdout());
        console.mask_secrets = io::stdin().is_terminal();
        console
    }
}

impl<R> Console<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, output: Output) -> Self {
        Self {
            lines: reader.lines(),
            output,
            mask_secrets: false,
        }
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Next raw input line, or `None` once input is exhausted.
    pub async fn read_line(&mut self) -> Result<Option<String>, ConsoleError> {
        Ok(self.lines.next_line().await?)
    }

    pub async fn prompt(&mut self, label: &str) -> Result<String, ConsoleError> {
        self.output.prompt(label);
        match self.read_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(ConsoleError::Closed),
        }
    }

    pub async fn prompt_secret(&mut self, label: &str) -> Result<String, ConsoleError> {
        if !self.mask_secrets {
            return self.prompt(label).await;
        }

        let label = label.trim_end().trim_end_matches(':').to_string();
        let secret = tokio::task::spawn_blocking(move || {
            Password::new()
                .with_prompt(label)
                .allow_empty_password(true)
                .interact()
        })
        .await??;
        Ok(secret.trim().to_string())
    }
}
