//! Invalidation broadcaster.
//!
//! A poke tells subscribed devices that new data may exist so they pull
//! early. Pokes carry no payload and may be lost; clients still converge on
//! their next timer- or reconnect-driven pull.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tessera_protocol::ProgressKey;
use tokio::sync::broadcast;
use tracing::trace;

/// Default per-channel buffer of undelivered pokes.
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Name of a poke channel, `poke/<user>/<puzzle>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PokeChannel(String);

impl PokeChannel {
    /// Channel for changes to one progress row.
    pub fn for_progress(key: &ProgressKey) -> Self {
        Self(format!("poke/{}/{}", key.user_id, key.puzzle_id))
    }

    /// Returns the channel name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PokeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Best-effort publisher of pokes.
pub trait PokeBroadcaster: Send + Sync {
    /// Publishes a poke. Never fails the caller.
    fn poke(&self, channel: &PokeChannel);
}

/// Broadcaster that drops every poke.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcaster;

impl PokeBroadcaster for NoopBroadcaster {
    fn poke(&self, channel: &PokeChannel) {
        trace!(%channel, "poke dropped, no broadcaster");
    }
}

/// In-process broadcaster with one tokio broadcast channel per poke channel.
pub struct ChannelBroadcaster {
    channels: RwLock<HashMap<PokeChannel, broadcast::Sender<PokeChannel>>>,
    capacity: usize,
}

impl ChannelBroadcaster {
    /// Creates a broadcaster with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster buffering up to `capacity` pokes per channel.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to a channel. Each received value is the poked channel.
    pub fn subscribe(&self, channel: &PokeChannel) -> broadcast::Receiver<PokeChannel> {
        self.channels
            .write()
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops channels that have no subscribers left.
    ///
    /// Poking an abandoned channel already closes it; this sweeps channels
    /// that were abandoned and never poked again.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    /// Returns the number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl PokeBroadcaster for ChannelBroadcaster {
    fn poke(&self, channel: &PokeChannel) {
        let abandoned = match self.channels.read().get(channel) {
            Some(sender) => match sender.send(channel.clone()) {
                Ok(receivers) => {
                    trace!(%channel, receivers, "poke sent");
                    false
                }
                Err(_) => true,
            },
            None => {
                trace!(%channel, "poke dropped, no subscribers");
                false
            }
        };
        if abandoned {
            // A subscriber may have joined since the send; only drop empty channels.
            let mut channels = self.channels.write();
            if channels
                .get(channel)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                channels.remove(channel);
            }
            trace!(%channel, "poke dropped, channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(user: &str, puzzle: &str) -> PokeChannel {
        PokeChannel::for_progress(&ProgressKey::new(user.into(), puzzle.into()))
    }

    #[test]
    fn channel_name() {
        assert_eq!(channel("alice", "p1").as_str(), "poke/alice/p1");
    }

    #[tokio::test]
    async fn subscribers_receive_pokes() {
        let broadcaster = ChannelBroadcaster::new();
        let mut rx = broadcaster.subscribe(&channel("alice", "p1"));
        let mut other = broadcaster.subscribe(&channel("alice", "p2"));

        broadcaster.poke(&channel("alice", "p1"));
        assert_eq!(rx.recv().await.unwrap(), channel("alice", "p1"));
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn poke_without_subscribers_is_silent() {
        let broadcaster = ChannelBroadcaster::new();
        broadcaster.poke(&channel("alice", "p1"));
        NoopBroadcaster.poke(&channel("alice", "p1"));
        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[test]
    fn prune_drops_abandoned_channels() {
        let broadcaster = ChannelBroadcaster::new();
        let rx = broadcaster.subscribe(&channel("alice", "p1"));
        let _kept = broadcaster.subscribe(&channel("bob", "p1"));
        drop(rx);
        assert_eq!(broadcaster.prune(), 1);
        assert_eq!(broadcaster.channel_count(), 1);
    }

    #[test]
    fn poking_abandoned_channel_closes_it() {
        let broadcaster = ChannelBroadcaster::new();
        drop(broadcaster.subscribe(&channel("alice", "p1")));
        let _kept = broadcaster.subscribe(&channel("bob", "p1"));
        assert_eq!(broadcaster.channel_count(), 2);

        broadcaster.poke(&channel("alice", "p1"));
        assert_eq!(broadcaster.channel_count(), 1);

        broadcaster.poke(&channel("bob", "p1"));
        assert_eq!(broadcaster.channel_count(), 1);
    }
}
