/// Minimal Twitch IRC reader that feeds chat lines into the arbiter's inbox.
///
/// Runs as its own task. It only ever appends to the inbox; everything else
/// (parsing commands, validation, selection) happens in the loop.
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::arbiter::command::ChatLine;
use crate::arbiter::inbox::ChatSender;
use crate::config::ChatConfig;
use crate::errors::{PointClawError, PointClawResult};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Twitch accepts read-only logins with any `justinfan<digits>` nick.
const ANONYMOUS_NICK: &str = "justinfan31415";

/// Credentials resolved from config / `TWITCH_TOKEN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLogin {
    pub nick: String,
    pub pass: Option<String>,
    pub channel: String,
}

impl IrcLogin {
    pub fn from_config(config: &ChatConfig) -> Self {
        let token = config
            .token
            .clone()
            .or_else(|| std::env::var("TWITCH_TOKEN").ok())
            .filter(|t| !t.trim().is_empty());
        let channel = format!("#{}", config.channel.trim_start_matches('#').to_lowercase());
        match token {
            Some(token) => Self {
                nick: config.nick.to_lowercase(),
                pass: Some(normalize_token(&token)),
                channel,
            },
            None => {
                tracing::info!("no Twitch token configured, joining chat anonymously (read-only)");
                Self {
                    nick: ANONYMOUS_NICK.into(),
                    pass: None,
                    channel,
                }
            }
        }
    }

    fn handshake(&self) -> String {
        let mut out = String::new();
        if let Some(pass) = &self.pass {
            out.push_str(&format!("PASS {pass}\r\n"));
        }
        out.push_str(&format!("NICK {}\r\nJOIN {}\r\n", self.nick, self.channel));
        out
    }
}

/// Ensure the token carries the `oauth:` prefix IRC expects.
pub fn normalize_token(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("oauth:") {
        token.to_string()
    } else {
        format!("oauth:{token}")
    }
}

/// A parsed server line.
#[derive(Debug, PartialEq, Eq)]
pub enum IrcEvent {
    Ping(String),
    Message { user: String, text: String },
    Other,
}

/// Parse one raw IRC line (without the trailing CRLF).
pub fn parse_irc_line(line: &str) -> IrcEvent {
    if let Some(payload) = line.strip_prefix("PING") {
        return IrcEvent::Ping(payload.trim().to_string());
    }
    // Tags (`@badge-info=...`) precede the prefix when the capability is on.
    let line = match line.strip_prefix('@') {
        Some(rest) => rest.split_once(' ').map(|(_, r)| r).unwrap_or(""),
        None => line,
    };
    // :user!user@user.tmi.twitch.tv PRIVMSG #channel :message text
    let Some(rest) = line.strip_prefix(':') else {
        return IrcEvent::Other;
    };
    let Some((prefix, rest)) = rest.split_once(' ') else {
        return IrcEvent::Other;
    };
    let Some(rest) = rest.strip_prefix("PRIVMSG ") else {
        return IrcEvent::Other;
    };
    let Some((_channel, text)) = rest.split_once(" :") else {
        return IrcEvent::Other;
    };
    let user = prefix.split('!').next().unwrap_or(prefix);
    if user.is_empty() {
        return IrcEvent::Other;
    }
    IrcEvent::Message {
        user: user.to_string(),
        text: text.trim_end().to_string(),
    }
}

pub struct TwitchChat {
    server: String,
    login: IrcLogin,
    sender: ChatSender,
}

impl TwitchChat {
    pub fn new(config: &ChatConfig, sender: ChatSender) -> Self {
        Self {
            server: config.server.clone(),
            login: IrcLogin::from_config(config),
            sender,
        }
    }

    /// Connect, read and reconnect until cancelled or the inbox is gone.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                result = self.session(&cancel) => match result {
                    Ok(()) => {
                        tracing::info!("chat reader stopped");
                        return;
                    }
                    Err(e) => tracing::warn!(error = %e, "chat connection lost, reconnecting"),
                },
                _ = cancel.cancelled() => {
                    tracing::info!("chat reader cancelled");
                    return;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// One connection. Ok(()) means stop for good; Err means reconnect.
    async fn session(&self, cancel: &CancellationToken) -> PointClawResult<()> {
        let stream = TcpStream::connect(&self.server).await?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(self.login.handshake().as_bytes()).await?;
        tracing::info!(server = %self.server, channel = %self.login.channel, nick = %self.login.nick, "chat connected");

        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = cancel.cancelled() => return Ok(()),
            };
            let Some(line) = line else {
                return Err(PointClawError::Chat("server closed the connection".into()));
            };

            match parse_irc_line(&line) {
                IrcEvent::Ping(payload) => {
                    writer.write_all(format!("PONG {payload}\r\n").as_bytes()).await?;
                }
                IrcEvent::Message { user, text } => {
                    tracing::debug!(user = %user, text = %text, "chat message");
                    if !self.sender.push(ChatLine::new(user, text, chrono::Utc::now())) {
                        return Ok(());
                    }
                }
                IrcEvent::Other => {
                    if line.contains("Login authentication failed") {
                        return Err(PointClawError::Chat("Twitch rejected the token".into()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::arbiter::inbox::chat_channel;

    #[test]
    fn test_parse_privmsg() {
        let event = parse_irc_line(":alice!alice@alice.tmi.twitch.tv PRIVMSG #pointandclickai :click 42");
        assert_eq!(
            event,
            IrcEvent::Message {
                user: "alice".into(),
                text: "click 42".into()
            }
        );
    }

    #[test]
    fn test_parse_tagged_privmsg_and_ping() {
        let event = parse_irc_line("@badge-info=;color=#FF0000 :bob!bob@bob.tmi.twitch.tv PRIVMSG #c :click (1, 2)");
        assert_eq!(
            event,
            IrcEvent::Message {
                user: "bob".into(),
                text: "click (1, 2)".into()
            }
        );
        assert_eq!(parse_irc_line("PING :tmi.twitch.tv"), IrcEvent::Ping(":tmi.twitch.tv".into()));
        assert_eq!(parse_irc_line(":tmi.twitch.tv 001 nick :Welcome, GLHF!"), IrcEvent::Other);
    }

    #[test]
    fn test_token_normalized() {
        assert_eq!(normalize_token("abc123"), "oauth:abc123");
        assert_eq!(normalize_token("oauth:abc123"), "oauth:abc123");
    }

    #[test]
    fn test_login_handshake() {
        let config = ChatConfig {
            token: Some("secret".into()),
            channel: "#PointAndClickAI".into(),
            nick: "Bot".into(),
            ..ChatConfig::default()
        };
        let login = IrcLogin::from_config(&config);
        assert_eq!(login.handshake(), "PASS oauth:secret\r\nNICK bot\r\nJOIN #pointandclickai\r\n");
    }

    #[tokio::test]
    async fn test_reader_forwards_messages_and_answers_ping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = socket.into_split();
            let mut lines = BufReader::new(reader).lines();
            // PASS, NICK, JOIN
            for _ in 0..3 {
                lines.next_line().await.unwrap();
            }
            writer.write_all(b"PING :tmi.twitch.tv\r\n").await.unwrap();
            let pong = lines.next_line().await.unwrap().unwrap();
            writer
                .write_all(b":carol!carol@carol.tmi.twitch.tv PRIVMSG #c :click 7\r\n")
                .await
                .unwrap();
            pong
        });

        let (tx, mut inbox) = chat_channel(64);
        let config = ChatConfig {
            server: addr.to_string(),
            token: Some("t".into()),
            ..ChatConfig::default()
        };
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(TwitchChat::new(&config, tx).run(cancel.clone()));

        assert_eq!(server.await.unwrap(), "PONG :tmi.twitch.tv");
        let mut drained = Vec::new();
        for _ in 0..100 {
            drained = inbox.drain();
            if !drained.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1.user, "carol");
        assert_eq!(drained[0].1.text, "click 7");

        cancel.cancel();
        reader.await.unwrap();
    }
}
