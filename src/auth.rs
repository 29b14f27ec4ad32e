use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::console::{Console, ConsoleError};
use crate::engine::{AuthorizationState, Engine};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("console error: {0}")]
    Console(#[from] ConsoleError),
    #[error("authorization cancelled")]
    Cancelled,
}

/// Walks the engine's authorization states, asking the operator for each
/// credential, until the session is ready.
pub struct AuthDriver<'a, E: ?Sized> {
    engine: &'a E,
    poll_interval: Duration,
}

impl<'a, E> AuthDriver<'a, E>
where
    E: Engine + ?Sized,
{
    pub fn new(engine: &'a E, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
        }
    }

    pub async fn run<R>(
        &self,
        console: &mut Console<R>,
        shutdown: &CancellationToken,
    ) -> Result<(), AuthError>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let state = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(AuthError::Cancelled),
                state = self.engine.authorization_state() => state,
            };

            match state {
                Ok(AuthorizationState::WaitPhoneNumber) => {
                    let phone = ask(console, "Enter phone: ", false, shutdown).await?;
                    let result = cancellable(shutdown, self.engine.submit_phone_number(&phone)).await?;
                    if let Err(error) = result {
                        console
                            .output()
                            .line(format_args!("Error sending phone number: {error}"));
                    }
                }
                Ok(AuthorizationState::WaitCode) => {
                    let code = ask(console, "Enter code: ", false, shutdown).await?;
                    let result = cancellable(shutdown, self.engine.submit_code(&code)).await?;
                    if let Err(error) = result {
                        console
                            .output()
                            .line(format_args!("Error sending auth code: {error}"));
                    }
                }
                Ok(AuthorizationState::WaitPassword) => {
                    let password = ask(console, "Enter Password: ", true, shutdown).await?;
                    let result = cancellable(shutdown, self.engine.submit_password(&password)).await?;
                    if let Err(error) = result {
                        console
                            .output()
                            .line(format_args!("Error sending auth password: {error}"));
                    }
                }
                Ok(AuthorizationState::Ready) => {
                    console.output().line("Authorization Ready! Let's rock");
                    return Ok(());
                }
                Ok(state) => {
                    debug!(?state, "waiting for an actionable authorization state");
                    self.pause(shutdown).await?;
                }
                Err(error) => {
                    warn!(%error, "failed to query authorization state");
                    self.pause(shutdown).await?;
                }
            }
        }
    }

    async fn pause(&self, shutdown: &CancellationToken) -> Result<(), AuthError> {
        if self.poll_interval.is_zero() {
            return if shutdown.is_cancelled() {
                Err(AuthError::Cancelled)
            } else {
                Ok(())
            };
        }
        cancellable(shutdown, tokio::time::sleep(self.poll_interval)).await
    }
}

async fn ask<R>(
    console: &mut Console<R>,
    label: &str,
    secret: bool,
    shutdown: &CancellationToken,
) -> Result<String, AuthError>
where
    R: AsyncBufRead + Unpin,
{
    let answer = if secret {
        cancellable(shutdown, console.prompt_secret(label)).await?
    } else {
        cancellable(shutdown, console.prompt(label)).await?
    };
    Ok(answer?)
}

async fn cancellable<F>(shutdown: &CancellationToken, future: F) -> Result<F::Output, AuthError>
where
    F: std::future::Future,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(AuthError::Cancelled),
        output = future => Ok(output),
    }
}
