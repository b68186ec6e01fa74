//! Redis pub/sub subscriber for inbound lifecycle events.
//!
//! One task per channel. A dropped connection is logged and the channel is
//! resubscribed after `resubscribe_delay_secs`; messages published while
//! disconnected are lost (pub/sub has no replay).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RedisSettings;
use crate::models::EventKind;
use crate::tracker::TokenTracker;

pub struct EventSubscriber {
    client: redis::Client,
    settings: RedisSettings,
    tracker: Arc<TokenTracker>,
}

impl EventSubscriber {
    pub fn new(client: redis::Client, settings: RedisSettings, tracker: Arc<TokenTracker>) -> Self {
        Self {
            client,
            settings,
            tracker,
        }
    }

    fn channels(&self) -> [(EventKind, String); 3] {
        [
            (EventKind::Burn, self.settings.burns_channel.clone()),
            (EventKind::NewPair, self.settings.new_pairs_channel.clone()),
            (EventKind::Swap, self.settings.swaps_channel.clone()),
        ]
    }

    /// Start one subscription task per channel.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        self.channels()
            .into_iter()
            .map(|(kind, channel)| {
                let subscriber = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { subscriber.run_channel(kind, channel, shutdown).await })
            })
            .collect()
    }

    async fn run_channel(&self, kind: EventKind, channel: String, shutdown: CancellationToken) {
        let delay = Duration::from_secs(self.settings.resubscribe_delay_secs);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.consume(kind, &channel) => {
                    if let Err(e) = result {
                        error!("Subscription to {} failed: {:#}", channel, e);
                    }
                }
            }

            warn!("Resubscribing to {} in {:?}", channel, delay);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Subscriber for {} stopped", channel);
    }

    async fn consume(&self, kind: EventKind, channel: &str) -> Result<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("Failed to open pub/sub connection")?;
        pubsub
            .subscribe(channel)
            .await
            .with_context(|| format!("Failed to subscribe to {}", channel))?;

        info!("Subscribed to {} ({} events)", channel, kind.as_str());

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Unreadable payload on {}: {}", channel, e);
                    continue;
                },
            };

            match kind {
                // Enrichment is RPC bound; keep it off the channel loop
                EventKind::NewPair => {
                    let tracker = self.tracker.clone();
                    tokio::spawn(async move { tracker.dispatch(kind, &payload).await });
                },
                _ => self.tracker.dispatch(kind, &payload).await,
            }
        }

        bail!("Message stream for {} ended", channel)
    }
}
