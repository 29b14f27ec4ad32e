use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::console::Output;
use crate::engine::ChatId;
use crate::update::Update;

pub const PING_TEXT: &str = "ping";
pub const PONG_MARKER: &str = "pong";

/// State changes the command loop hands to the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SelectChat(ChatId),
    PingSent(Instant),
}

/// Matches replies in the selected chat against the one outstanding ping.
#[derive(Debug)]
pub struct PingTimer {
    selected: ChatId,
    pending: Option<Instant>,
}

impl PingTimer {
    pub fn new(selected: ChatId) -> Self {
        Self {
            selected,
            pending: None,
        }
    }

    pub fn selected(&self) -> ChatId {
        self.selected
    }

    pub fn pending(&self) -> Option<Instant> {
        self.pending
    }

    pub fn apply(&mut self, intent: Intent) {
        match intent {
            Intent::SelectChat(chat_id) => self.selected = chat_id,
            // A newer ping replaces the older one.
            Intent::PingSent(at) => self.pending = Some(at),
        }
    }

    /// Returns the round trip when `update` answers the pending ping.
    pub fn observe(&mut self, update: &Update, now: Instant) -> Option<Duration> {
        let Update::Chat {
            chat_id,
            last_message_text: Some(text),
        } = update
        else {
            return None;
        };
        if *chat_id != self.selected || !text.contains(PONG_MARKER) {
            return None;
        }
        let sent_at = self.pending.take()?;
        Some(now.saturating_duration_since(sent_at))
    }
}

/// Drains the update feed in arrival order.
pub struct Correlator {
    timer: PingTimer,
    updates: mpsc::Receiver<Update>,
    intents: mpsc::Receiver<Intent>,
    output: Output,
}

impl Correlator {
    pub fn new(
        timer: PingTimer,
        updates: mpsc::Receiver<Update>,
        intents: mpsc::Receiver<Intent>,
        output: Output,
    ) -> Self {
        Self {
            timer,
            updates,
            intents,
            output,
        }
    }

    /// Runs until the feed closes or `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                // Intents go first so a ping recorded before its message was
                // sent is always visible to the reply.
                biased;
                _ = shutdown.cancelled() => break,
                Some(intent) = self.intents.recv() => {
                    self.timer.apply(intent);
                    debug!(
                        selected = self.timer.selected(),
                        ping_pending = self.timer.pending().is_some(),
                        "applied intent"
                    );
                }
                update = self.updates.recv() => match update {
                    Some(update) => self.handle(&update),
                    None => {
                        debug!("update feed closed");
                        break;
                    }
                },
            }
        }
    }

    fn handle(&mut self, update: &Update) {
        if let Update::Authorization(state) = update {
            info!(?state, "authorization state changed");
            return;
        }
        if update.chat_id() != Some(self.timer.selected()) {
            return;
        }
        if let Some(elapsed) = self.timer.observe(update, Instant::now()) {
            self.output.line(format_args!("pong time: {elapsed:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Transcript;

    const SELECTED: ChatId = 860175318;

    fn text_update(chat_id: ChatId, text: &str) -> Update {
        Update::Chat {
            chat_id,
            last_message_text: Some(text.to_string()),
        }
    }

    #[test]
    fn pong_reports_elapsed_once() {
        let mut timer = PingTimer::new(SELECTED);
        let sent = Instant::now();
        timer.apply(Intent::PingSent(sent));

        let reply = text_update(SELECTED, "pong");
        let elapsed = timer.observe(&reply, sent + Duration::from_millis(250));

        assert_eq!(elapsed, Some(Duration::from_millis(250)));
        assert_eq!(timer.pending(), None);
        assert_eq!(timer.observe(&reply, sent + Duration::from_millis(400)), None);
    }

    #[test]
    fn marker_may_appear_inside_text() {
        let mut timer = PingTimer::new(SELECTED);
        let sent = Instant::now();
        timer.apply(Intent::PingSent(sent));

        let elapsed = timer.observe(&text_update(SELECTED, "...pong..."), sent);
        assert_eq!(elapsed, Some(Duration::ZERO));
    }

    #[test]
    fn marker_is_case_sensitive() {
        let mut timer = PingTimer::new(SELECTED);
        let sent = Instant::now();
        timer.apply(Intent::PingSent(sent));

        assert_eq!(timer.observe(&text_update(SELECTED, "PONG"), sent), None);
        assert_eq!(timer.pending(), Some(sent));
    }

    #[test]
    fn other_chats_never_clear_the_ping() {
        let mut timer = PingTimer::new(SELECTED);
        let sent = Instant::now();
        timer.apply(Intent::PingSent(sent));

        assert_eq!(timer.observe(&text_update(SELECTED + 1, "pong"), sent), None);
        assert_eq!(timer.pending(), Some(sent));
    }

    #[test]
    fn pong_without_ping_changes_nothing() {
        let mut timer = PingTimer::new(SELECTED);
        assert_eq!(timer.observe(&text_update(SELECTED, "pong"), Instant::now()), None);
        assert_eq!(timer.pending(), None);
        assert_eq!(timer.selected(), SELECTED);
    }

    #[test]
    fn updates_without_text_are_discarded() {
        let mut timer = PingTimer::new(SELECTED);
        let sent = Instant::now();
        timer.apply(Intent::PingSent(sent));

        let without_text = Update::Chat {
            chat_id: SELECTED,
            last_message_text: None,
        };
        let unrelated = Update::Other {
            kind: "updateUserStatus".to_string(),
        };
        assert_eq!(timer.observe(&without_text, sent), None);
        assert_eq!(timer.observe(&unrelated, sent), None);
        assert_eq!(timer.pending(), Some(sent));
    }

    #[test]
    fn second_ping_overwrites_the_first() {
        let mut timer = PingTimer::new(SELECTED);
        let first = Instant::now();
        let second = first + Duration::from_secs(1);
        timer.apply(Intent::PingSent(first));
        timer.apply(Intent::PingSent(second));

        let elapsed = timer.observe(&text_update(SELECTED, "pong"), second + Duration::from_millis(5));
        assert_eq!(elapsed, Some(Duration::from_millis(5)));
    }

    #[test]
    fn selecting_a_chat_moves_the_filter() {
        let mut timer = PingTimer::new(SELECTED);
        let sent = Instant::now();
        timer.apply(Intent::PingSent(sent));
        timer.apply(Intent::SelectChat(12345));

        assert_eq!(timer.observe(&text_update(SELECTED, "pong"), sent), None);
        assert!(timer.observe(&text_update(12345, "pong"), sent).is_some());
    }

    #[tokio::test]
    async fn correlator_prints_one_line_per_answered_ping() {
        let transcript = Transcript::default();
        let (update_tx, update_rx) = mpsc::channel(100);
        let (intent_tx, intent_rx) = mpsc::channel(8);
        let correlator = Correlator::new(
            PingTimer::new(SELECTED),
            update_rx,
            intent_rx,
            Output::new(transcript.clone()),
        );

        intent_tx
            .send(Intent::PingSent(Instant::now()))
            .await
            .expect("intent");
        update_tx
            .send(text_update(SELECTED + 7, "pong"))
            .await
            .expect("update");
        update_tx.send(text_update(SELECTED, "pong")).await.expect("update");
        update_tx.send(text_update(SELECTED, "pong")).await.expect("update");
        drop(update_tx);

        correlator.run(CancellationToken::new()).await;

        let lines = transcript.lines();
        assert_eq!(lines.len(), 1, "unexpected output: {lines:?}");
        assert!(lines[0].starts_with("pong time: "));
    }

    #[tokio::test]
    async fn correlator_stops_on_shutdown() {
        let (_update_tx, update_rx) = mpsc::channel(1);
        let (_intent_tx, intent_rx) = mpsc::channel(1);
        let correlator = Correlator::new(
            PingTimer::new(SELECTED),
            update_rx,
            intent_rx,
            Output::new(Transcript::default()),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        correlator.run(shutdown).await;
    }
}
