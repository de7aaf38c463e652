use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use crate::arbiter::command::ChatLine;

/// Write half handed to the chat collaborator. Appending is its only power.
#[derive(Debug, Clone)]
pub struct ChatSender {
    tx: broadcast::Sender<ChatLine>,
}

impl ChatSender {
    /// Returns false once the loop has dropped the inbox.
    pub fn push(&self, line: ChatLine) -> bool {
        self.tx.send(line).is_ok()
    }
}

/// Read half owned by the arbiter. Lines queue up between merge windows; once
/// the buffer is full (`capacity` rounded up to a power of two) the oldest
/// are overwritten.
#[derive(Debug)]
pub struct ChatInbox {
    rx: broadcast::Receiver<ChatLine>,
    next_seq: u64,
}

pub fn chat_channel(capacity: usize) -> (ChatSender, ChatInbox) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (ChatSender { tx }, ChatInbox { rx, next_seq: 0 })
}

impl ChatInbox {
    /// Take everything queued so far without waiting, each paired with its
    /// arrival sequence number.
    pub fn drain(&mut self) -> Vec<(u64, ChatLine)> {
        let mut lines = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(line) => {
                    lines.push((self.next_seq, line));
                    self.next_seq += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "chat inbox full, oldest lines dropped");
                    self.next_seq += skipped;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        lines
    }
}
