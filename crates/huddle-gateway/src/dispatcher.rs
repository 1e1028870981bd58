use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_core::EventSink;
use huddle_types::events::ChannelEvent;

/// Why a subscription stopped receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The buffer filled up; the client must catch up with history reads.
    Lagged,
    /// The user lost access to the channel.
    Revoked,
    ChannelDeleted,
    Shutdown,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lagged => "lagged",
            Self::Revoked => "revoked",
            Self::ChannelDeleted => "channel_deleted",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug)]
pub enum Delivery {
    Event(ChannelEvent),
    Ended(EndReason),
}

struct Subscriber {
    user_id: Uuid,
    tx: mpsc::Sender<ChannelEvent>,
    ended: Arc<Mutex<Option<EndReason>>>,
}

impl Subscriber {
    fn end(&self, reason: EndReason) {
        if let Ok(mut ended) = self.ended.lock() {
            ended.get_or_insert(reason);
        }
    }
}

/// Routes committed channel events to live stream subscribers.
///
/// Publishing never waits on a subscriber: each one has a bounded buffer and
/// is dropped when it fills, so a stalled client cannot hold up the rest.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// channel_id -> (subscription id -> subscriber)
    channels: RwLock<HashMap<Uuid, HashMap<Uuid, Subscriber>>>,
    buffer: usize,
}

impl Dispatcher {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                channels: RwLock::new(HashMap::new()),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a subscriber for one channel. Events published after this
    /// returns are delivered; the subscription unregisters itself on drop.
    pub fn subscribe(&self, channel_id: Uuid, user_id: Uuid) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let ended = Arc::new(Mutex::new(None));

        if let Ok(mut channels) = self.inner.channels.write() {
            channels.entry(channel_id).or_default().insert(
                id,
                Subscriber {
                    user_id,
                    tx,
                    ended: ended.clone(),
                },
            );
        }
        debug!("{} subscribed to channel {} ({})", user_id, channel_id, id);

        Subscription {
            id,
            channel_id,
            user_id,
            rx,
            ended,
            dispatcher: self.clone(),
        }
    }

    pub fn publish(&self, event: ChannelEvent) {
        let channel_id = event.channel_id();
        match event {
            ChannelEvent::ChannelDeleted { .. } => {
                self.close_channel(channel_id, EndReason::ChannelDeleted);
            }
            ChannelEvent::MemberRemoved { user_id, .. } => {
                self.revoke(channel_id, user_id);
            }
            event => self.fan_out(channel_id, event),
        }
    }

    fn fan_out(&self, channel_id: Uuid, event: ChannelEvent) {
        let mut dropped = Vec::new();
        {
            let Ok(channels) = self.inner.channels.read() else {
                return;
            };
            let Some(subscribers) = channels.get(&channel_id) else {
                return;
            };
            for (&id, sub) in subscribers {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Subscriber {} on {} fell behind, dropping to resync", sub.user_id, channel_id);
                        sub.end(EndReason::Lagged);
                        dropped.push(id);
                    }
                    Err(TrySendError::Closed(_)) => dropped.push(id),
                }
            }
        }

        if !dropped.is_empty() {
            self.remove(channel_id, |id, _| dropped.contains(&id), None);
        }
    }

    /// End every subscription `user_id` holds on `channel_id`.
    pub fn revoke(&self, channel_id: Uuid, user_id: Uuid) {
        let removed = self.remove(channel_id, |_, sub| sub.user_id == user_id, Some(EndReason::Revoked));
        if removed > 0 {
            info!("Revoked {} stream(s) of {} on {}", removed, user_id, channel_id);
        }
    }

    pub fn close_channel(&self, channel_id: Uuid, reason: EndReason) {
        let removed = self.remove(channel_id, |_, _| true, Some(reason));
        if removed > 0 {
            info!("Closed {} stream(s) on {}: {}", removed, channel_id, reason.as_str());
        }
    }

    /// End every live subscription, e.g. on server shutdown.
    pub fn shutdown(&self) {
        let Ok(mut channels) = self.inner.channels.write() else {
            return;
        };
        let mut count = 0;
        for (_, subscribers) in channels.drain() {
            for (_, sub) in subscribers {
                sub.end(EndReason::Shutdown);
                count += 1;
            }
        }
        info!("Dispatcher shut down, {} stream(s) closed", count);
    }

    pub fn subscriber_count(&self, channel_id: Uuid) -> usize {
        self.inner
            .channels
            .read()
            .map(|channels| channels.get(&channel_id).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    /// Remove matching subscribers. Dropping a sender closes its receiver
    /// once the buffered events are drained.
    fn remove(
        &self,
        channel_id: Uuid,
        matches: impl Fn(Uuid, &Subscriber) -> bool,
        reason: Option<EndReason>,
    ) -> usize {
        let Ok(mut channels) = self.inner.channels.write() else {
            return 0;
        };
        let Some(subscribers) = channels.get_mut(&channel_id) else {
            return 0;
        };

        let ids: Vec<Uuid> = subscribers
            .iter()
            .filter(|(id, sub)| matches(**id, sub))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(sub) = subscribers.remove(id) {
                if let Some(reason) = reason {
                    sub.end(reason);
                }
            }
        }
        if subscribers.is_empty() {
            channels.remove(&channel_id);
        }
        ids.len()
    }
}

impl EventSink for Dispatcher {
    fn publish(&self, event: ChannelEvent) {
        Dispatcher::publish(self, event);
    }
}

/// One live stream's end of the dispatcher.
pub struct Subscription {
    id: Uuid,
    channel_id: Uuid,
    user_id: Uuid,
    rx: mpsc::Receiver<ChannelEvent>,
    ended: Arc<Mutex<Option<EndReason>>>,
    dispatcher: Dispatcher,
}

impl Subscription {
    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    /// Next event, or why the subscription ended. Events buffered before the
    /// end are still delivered first.
    pub async fn recv(&mut self) -> Delivery {
        match self.rx.recv().await {
            Some(event) => Delivery::Event(event),
            None => {
                let reason = self
                    .ended
                    .lock()
                    .ok()
                    .and_then(|ended| *ended)
                    .unwrap_or(EndReason::Shutdown);
                Delivery::Ended(reason)
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let id = self.id;
        self.dispatcher.remove(self.channel_id, |sid, _| sid == id, None);
        debug!("{} unsubscribed from channel {} ({})", self.user_id, self.channel_id, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(channel_id: Uuid) -> ChannelEvent {
        ChannelEvent::ChannelUpdate { channel_id }
    }

    #[tokio::test]
    async fn delivers_only_to_the_channel() {
        let d = Dispatcher::new(8);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sub_a = d.subscribe(a, Uuid::new_v4());
        let mut sub_b = d.subscribe(b, Uuid::new_v4());

        d.publish(update(a));
        assert!(matches!(sub_a.recv().await, Delivery::Event(ChannelEvent::ChannelUpdate { channel_id }) if channel_id == a));

        d.publish(update(b));
        assert!(matches!(sub_b.recv().await, Delivery::Event(_)));
    }

    #[tokio::test]
    async fn full_buffer_drops_subscriber_with_lagged() {
        let d = Dispatcher::new(2);
        let ch = Uuid::new_v4();
        let mut slow = d.subscribe(ch, Uuid::new_v4());
        let mut fast = d.subscribe(ch, Uuid::new_v4());

        d.publish(update(ch));
        d.publish(update(ch));
        assert!(matches!(fast.recv().await, Delivery::Event(_)));
        assert!(matches!(fast.recv().await, Delivery::Event(_)));

        // slow's buffer is full; this publish drops it but still reaches fast.
        d.publish(update(ch));
        assert!(matches!(fast.recv().await, Delivery::Event(_)));
        assert_eq!(d.subscriber_count(ch), 1);

        assert!(matches!(slow.recv().await, Delivery::Event(_)));
        assert!(matches!(slow.recv().await, Delivery::Event(_)));
        assert!(matches!(slow.recv().await, Delivery::Ended(EndReason::Lagged)));
    }

    #[tokio::test]
    async fn member_removal_revokes_only_that_user() {
        let d = Dispatcher::new(8);
        let ch = Uuid::new_v4();
        let (gone, stays) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sub_gone = d.subscribe(ch, gone);
        let _sub_stays = d.subscribe(ch, stays);

        d.publish(ChannelEvent::MemberRemoved { channel_id: ch, user_id: gone });
        assert!(matches!(sub_gone.recv().await, Delivery::Ended(EndReason::Revoked)));
        assert_eq!(d.subscriber_count(ch), 1);
    }

    #[tokio::test]
    async fn delete_closes_channel_and_drop_unregisters() {
        let d = Dispatcher::new(8);
        let ch = Uuid::new_v4();
        let mut sub = d.subscribe(ch, Uuid::new_v4());
        d.publish(ChannelEvent::ChannelDeleted { channel_id: ch });
        assert!(matches!(sub.recv().await, Delivery::Ended(EndReason::ChannelDeleted)));
        assert_eq!(d.subscriber_count(ch), 0);

        let other = d.subscribe(ch, Uuid::new_v4());
        assert_eq!(d.subscriber_count(ch), 1);
        drop(other);
        assert_eq!(d.subscriber_count(ch), 0);
    }
}
