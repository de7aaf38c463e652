use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::arbiter::command::{ChatCommand, CommandParser};
use crate::arbiter::inbox::ChatInbox;
use crate::arbiter::rate_limit::RateLimiter;
use crate::config::ChatConfig;
use crate::errors::PointClawResult;
use crate::perception::grid::GridMapping;
use crate::planner::types::ResolvedClick;

/// Outcome of one merge window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arbitration {
    pub selected: Option<ChatCommand>,
    /// Commands that failed validation, kept for display.
    pub rejected: Vec<ChatCommand>,
    /// Valid commands that lost to the selected one.
    pub discarded: Vec<ChatCommand>,
}

impl Arbitration {
    pub fn selected_click(&self) -> Option<&ResolvedClick> {
        self.selected.as_ref().and_then(|c| c.resolved.as_ref())
    }
}

/// Validates queued chat commands and picks at most one per merge window.
pub struct CommandArbiter {
    inbox: ChatInbox,
    parser: CommandParser,
    limiter: RateLimiter,
    max_age: Duration,
}

impl CommandArbiter {
    pub fn new(inbox: ChatInbox, config: &ChatConfig) -> PointClawResult<Self> {
        Ok(Self {
            inbox,
            parser: CommandParser::new()?,
            limiter: RateLimiter::new(config.rate_limit, config.rate_window_secs),
            max_age: Duration::seconds(config.max_age_secs.min(i64::MAX as u64) as i64),
        })
    }

    /// Drain the inbox, validate every command, select the latest valid one
    /// (ties go to the later arrival) and discard the rest.
    pub fn arbitrate(&mut self, mapping: &GridMapping, now: DateTime<Utc>) -> Arbitration {
        let mut valid = Vec::new();
        let mut rejected = Vec::new();
        // History this old cannot affect a command young enough to accept.
        self.limiter.prune(now - self.max_age);

        for (seq, line) in self.inbox.drain() {
            let Some(target) = self.parser.parse(&line.text) else {
                continue;
            };
            let mut command = ChatCommand {
                seq,
                source: line.user.clone(),
                raw_text: line.text.clone(),
                target,
                timestamp: line.timestamp,
                valid: false,
                reject_reason: None,
                resolved: None,
            };

            let verdict = self
                .limiter
                .record(&line.user, line.timestamp)
                .map_err(|e| e.to_string())
                .and_then(|()| {
                    if now - line.timestamp > self.max_age {
                        Err(format!("older than {}s", self.max_age.num_seconds()))
                    } else {
                        Ok(())
                    }
                })
                .and_then(|()| target.resolve(mapping).map_err(|e| e.to_string()));

            match verdict {
                Ok((point, cell)) => {
                    command.valid = true;
                    command.resolved = Some(ResolvedClick {
                        point,
                        cell,
                        target,
                        reason: Some(format!("chat: {}", line.user)),
                    });
                    valid.push(command);
                }
                Err(reason) => {
                    command.reject_reason = Some(reason);
                    rejected.push(command);
                }
            }
        }

        let winner = valid
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| (c.timestamp, c.seq))
            .map(|(i, _)| i);
        let selected = winner.map(|i| valid.remove(i));

        Arbitration {
            selected,
            rejected,
            discarded: valid,
        }
    }

    /// Throw away everything queued for a merge window that never ran.
    pub fn discard_pending(&mut self) -> usize {
        self.inbox.drain().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::command::ChatLine;
    use crate::arbiter::inbox::{chat_channel, ChatSender};
    use crate::perception::types::{CropMargins, ScreenPoint, WindowRect};
    use crate::planner::types::ClickTarget;

    fn mapping() -> GridMapping {
        GridMapping::new(WindowRect::new(0, 0, 800, 600), CropMargins::default(), 10, 8).unwrap()
    }

    fn arbiter(rate_limit: u32) -> (ChatSender, CommandArbiter) {
        let (tx, inbox) = chat_channel(64);
        let config = ChatConfig {
            rate_limit,
            ..ChatConfig::default()
        };
        (tx, CommandArbiter::new(inbox, &config).unwrap())
    }

    #[test]
    fn test_later_valid_command_wins() {
        let (tx, mut arbiter) = arbiter(3);
        let now = Utc::now();
        tx.push(ChatLine::new("A", "click 1", now - Duration::seconds(20)));
        tx.push(ChatLine::new("B", "click 2", now - Duration::seconds(5)));

        let result = arbiter.arbitrate(&mapping(), now);
        let selected = result.selected.as_ref().unwrap();
        assert_eq!(selected.source, "B");
        assert_eq!(result.selected_click().unwrap().point, ScreenPoint::new(120, 37));
        assert_eq!(result.discarded.len(), 1);
        assert_eq!(result.discarded[0].source, "A");
    }

    #[test]
    fn test_timestamp_tie_goes_to_later_arrival() {
        let (tx, mut arbiter) = arbiter(3);
        let now = Utc::now();
        tx.push(ChatLine::new("A", "click 1", now));
        tx.push(ChatLine::new("B", "click 2", now));
        let result = arbiter.arbitrate(&mapping(), now);
        assert_eq!(result.selected.unwrap().source, "B");
    }

    #[test]
    fn test_rate_limited_source_never_selected() {
        let (tx, mut arbiter) = arbiter(2);
        let now = Utc::now();
        tx.push(ChatLine::new("polite", "click 5", now - Duration::seconds(30)));
        for i in 0..3 {
            tx.push(ChatLine::new("spammer", format!("click {}", 10 + i), now - Duration::seconds(3 - i)));
        }

        let result = arbiter.arbitrate(&mapping(), now);
        // The spammer's third command is the latest, but it exceeds the limit.
        assert_eq!(result.selected.as_ref().unwrap().target, ClickTarget::Cell { index: 11 });
        assert_eq!(result.rejected.len(), 1);
        assert!(!result.rejected[0].valid);
        assert!(result.rejected[0].reject_reason.as_deref().unwrap().contains("Rate limit"));
    }

    #[test]
    fn test_rate_limit_persists_across_windows() {
        let (tx, mut arbiter) = arbiter(1);
        let now = Utc::now();
        tx.push(ChatLine::new("u", "click 3", now - Duration::seconds(10)));
        assert!(arbiter.arbitrate(&mapping(), now).selected.is_some());

        tx.push(ChatLine::new("u", "click 4", now));
        let second = arbiter.arbitrate(&mapping(), now);
        assert!(second.selected.is_none());
        assert_eq!(second.rejected.len(), 1);
    }

    #[test]
    fn test_out_of_bounds_and_stale_commands_rejected() {
        let (tx, mut arbiter) = arbiter(5);
        let now = Utc::now();
        tx.push(ChatLine::new("a", "click 81", now));
        tx.push(ChatLine::new("b", "click 900,10", now));
        tx.push(ChatLine::new("c", "click 4", now - Duration::seconds(301)));
        tx.push(ChatLine::new("d", "nice play!", now));

        let result = arbiter.arbitrate(&mapping(), now);
        assert!(result.selected.is_none());
        assert_eq!(result.rejected.len(), 3);
        assert!(result.discarded.is_empty());
    }

    #[test]
    fn test_discarded_commands_do_not_reach_next_window() {
        let (tx, mut arbiter) = arbiter(3);
        let now = Utc::now();
        tx.push(ChatLine::new("A", "click 1", now));
        tx.push(ChatLine::new("B", "click 2", now));
        assert_eq!(arbiter.discard_pending(), 2);

        let result = arbiter.arbitrate(&mapping(), now);
        assert!(result.selected.is_none());
        assert!(result.rejected.is_empty());
        // Discarded commands never count against the sender's rate limit.
        tx.push(ChatLine::new("A", "click 3", now));
        assert!(arbiter.arbitrate(&mapping(), now).selected.is_some());
    }

    #[test]
    fn test_empty_inbox() {
        let (_tx, mut arbiter) = arbiter(3);
        let result = arbiter.arbitrate(&mapping(), Utc::now());
        assert!(result.selected.is_none());
        assert!(result.rejected.is_empty());
    }
}
