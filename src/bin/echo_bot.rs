use anyhow::Result;
use chat_client::{RestClient, RtmStartHandshake};
use rtm_bot::bin_common::{load_config_from_env, BinaryRunner, ConfigType, RunConfig};
use rtm_bot::config::BotConfig;
use rtm_bot::logging::init_tracing;
use rtm_bot::shutdown::ShutdownManager;
use rtmsockets::{kinds, ClientEvent, Event, ReactionRegistry, RtmClient};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const ACK_REACTION: &str = "eyes";
const TRACKED_REPLIES: usize = 256;

/// Reaction callbacks for the most recent replies only
///
/// Registering past `limit` unregisters the oldest reply's callback.
struct ReplyTracker {
    registry: Arc<ReactionRegistry>,
    recent: VecDeque<(String, String)>,
    limit: usize,
}

impl ReplyTracker {
    fn new(registry: Arc<ReactionRegistry>, limit: usize) -> Self {
        Self {
            registry,
            recent: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    fn track(&mut self, channel: String, ts: String) {
        let logged_ts = ts.clone();
        self.registry.register(channel.clone(), ts.clone(), move |reaction| {
            info!(
                "Reply {} got :{}: from {}",
                logged_ts,
                reaction.reaction.as_deref().unwrap_or("?"),
                reaction.user.as_deref().unwrap_or("someone")
            );
        });

        self.recent.push_back((channel, ts));
        while self.recent.len() > self.limit {
            if let Some((channel, ts)) = self.recent.pop_front() {
                self.registry.unregister(&channel, &ts);
            }
        }
    }
}

/// Replies to mentions, echoes direct messages
struct EchoBot {
    run_config: RunConfig,
    client: Option<RtmClient>,
    rest: Arc<RestClient>,
    inbox: mpsc::Receiver<Event>,
    shutdown: ShutdownManager,
    tracker: ReplyTracker,
    replies: u64,
}

impl EchoBot {
    async fn handle(&mut self, event: Event) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let self_id = client
            .session()
            .map(|session| session.self_id.clone())
            .unwrap_or_default();

        let Some(reply) = reply_for(&event, &self_id) else {
            return;
        };
        let Some(channel) = event.channel.clone() else {
            return;
        };

        // Direct messages go back over the socket
        if channel.starts_with('D') {
            if let Err(e) = client.send_message(channel.as_str(), reply).await {
                warn!("Failed to queue echo for {}: {}", channel, e);
            }
            self.replies += 1;
            return;
        }

        if let Some(ts) = event.ts.as_deref() {
            if let Err(e) = self.rest.add_reaction(ACK_REACTION, &channel, ts).await {
                debug!("Could not add :{}: to {}: {}", ACK_REACTION, ts, e);
            }
        }

        match self.rest.post_message(&channel, &reply).await {
            Ok(posted) => {
                self.replies += 1;
                self.tracker.track(posted.channel, posted.ts);
            }
            Err(e) => warn!("Failed to post reply in {}: {}", channel, e),
        }
    }

    fn log_status(&self) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        while let Some(event) = client.try_recv_event() {
            match event {
                ClientEvent::HandshakeFailed(reason) => warn!("Handshake failed: {}", reason),
                other => info!("Session event: {:?}", other),
            }
        }

        let metrics = client.metrics();
        info!(
            "State: {:?} | sent: {} | received: {} | reconnects: {} | replies: {}",
            client.connection_state(),
            metrics.frames_sent,
            metrics.frames_received,
            metrics.reconnect_count,
            self.replies
        );
    }
}

impl BinaryRunner for EchoBot {
    async fn run(&mut self) -> Result<()> {
        let mut status = tokio::time::interval(Duration::from_secs(
            self.run_config.status_interval_secs,
        ));
        status.tick().await;
        let token = self.shutdown.token();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = self.inbox.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = status.tick() => self.log_status(),
            }
        }

        if let Some(client) = self.client.take() {
            client.shutdown().await?;
        }
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        Some(format!("Replies sent: {}", self.replies))
    }
}

/// Text to send back for an inbound event, if any
///
/// Plain messages that mention `self_id` are answered with the rest of
/// the text; messages in direct conversations are echoed whole.
fn reply_for(event: &Event, self_id: &str) -> Option<String> {
    if event.kind != kinds::MESSAGE || event.sub_type.is_some() {
        return None;
    }
    if event.user.as_deref() == Some(self_id) {
        return None;
    }
    let text = event.text.as_deref()?.trim();
    let channel = event.channel.as_deref()?;

    let mention = format!("<@{}>", self_id);
    if !self_id.is_empty() && text.contains(&mention) {
        let rest = text.replace(&mention, "");
        let rest = rest.trim().trim_start_matches(':').trim();
        return Some(if rest.is_empty() {
            "You rang?".to_string()
        } else {
            rest.to_string()
        });
    }

    if channel.starts_with('D') && !text.is_empty() {
        return Some(text.to_string());
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config_path = load_config_from_env(ConfigType::Bot);
    let config = BotConfig::load(&config_path)?;

    info!("Configuration loaded:");
    info!("  API base: {}", config.api.base_url);
    info!("  Origin: {}", config.api.origin);
    info!("  Heartbeat: {}s", config.session.heartbeat_interval_secs);

    let rest = Arc::new(RestClient::new(config.api.base_url.clone(), config.token.clone()));
    let handshake = RtmStartHandshake::new(Arc::clone(&rest)).mpim_aware(config.api.mpim_aware);

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let (tx, inbox) = mpsc::channel(config.consumers.capacity);
    let client = config
        .client_builder(handshake)
        .channel("echo", tx)
        .shutdown_token(shutdown.token())
        .start()
        .await?;

    if let Some(session) = client.session() {
        info!(
            "Connected as {} with {} conversations",
            session.self_id,
            session.directory.conversation_count()
        );
    }

    let tracker = ReplyTracker::new(Arc::clone(client.reactions()), TRACKED_REPLIES);
    let mut bot = EchoBot {
        run_config: RunConfig::new("Echo Bot").with_status_interval(60),
        client: Some(client),
        rest,
        inbox,
        shutdown,
        tracker,
        replies: 0,
    };
    bot.execute().await
}
