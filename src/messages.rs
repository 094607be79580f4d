//! Per-channel message history with on-demand backfill.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::Result;
use crate::model::{ChannelId, Message, MessageId, MessageUpdate};
use crate::serial::Optional;

/// Which messages to act on, relative to the backlog of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetMessages {
    /// The most recent messages.
    MostRecent,
    /// The messages before the given anchor.
    Before(MessageId),
    /// The messages after the given anchor.
    After(MessageId),
}

/// On-demand message fetches, backed by a REST client.
///
/// The cache calls into this trait when a requested range is not fully
/// covered by the local backlog. Failures are handed back to the caller
/// unchanged, and never alter the cache.
pub trait MessageFetcher {
    /// Get a single message by ID from a given channel.
    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> Result<Message>;

    /// Get messages in the backlog for a given channel.
    ///
    /// The `what` argument should be one of the options in the `GetMessages`
    /// enum, and will determine which messages will be returned. `Before`
    /// and `MostRecent` ranges are expected newest first, `After` ranges
    /// oldest first.
    async fn fetch_messages(
        &self,
        channel: ChannelId,
        what: GetMessages,
        limit: u64,
    ) -> Result<Vec<Message>>;
}

/// An ordered window over the recent messages of a single channel.
///
/// With a capacity of zero the cache stores nothing and every download is
/// delegated to the fetch collaborator; with a non-zero capacity the oldest
/// message is evicted once the window grows past it.
///
/// Message identifiers increase monotonically with creation time, so the
/// window is kept sorted by ID and numeric comparison stands in for
/// chronological comparison throughout.
#[derive(Debug, Clone)]
pub struct MessageCache {
    channel: ChannelId,
    capacity: usize,
    messages: VecDeque<Message>,
}

impl MessageCache {
    /// Create a cache for the given channel holding at most `capacity` messages.
    pub fn new(channel: ChannelId, capacity: usize) -> MessageCache {
        MessageCache {
            channel,
            capacity,
            messages: VecDeque::new(),
        }
    }

    /// The channel this cache belongs to.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// The configured capacity. Zero means pass-through.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of messages currently held.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the window currently holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Insert a newly observed message, evicting the oldest once the window
    /// exceeds its capacity. A message with an already known ID replaces
    /// the stored copy.
    pub fn add(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }

        match self
            .messages
            .binary_search_by_key(&message.id, |message| message.id)
        {
            Ok(index) => self.messages[index] = message,
            Err(index) => self.messages.insert(index, message),
        }
        while self.messages.len() > self.capacity {
            if let Some(evicted) = self.messages.pop_front() {
                trace!("evicting message {} from {}", evicted.id, self.channel);
            }
        }
    }

    /// Look up a message in the local window. Never fetches.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.index_of(id).map(|index| &self.messages[index])
    }

    /// Merge an edit into the stored copy of a message, if it is present.
    pub fn update(&mut self, update: &MessageUpdate) -> Option<&Message> {
        let index = self.index_of(update.id)?;
        let message = &mut self.messages[index];

        if let Optional::Present(ref content) = update.content {
            message.content = content.clone();
        }
        if let Optional::Present(edited) = update.edited_timestamp {
            message.edited_timestamp = edited;
        }
        if let Optional::Present(pinned) = update.pinned {
            message.pinned = pinned;
        }
        Some(&self.messages[index])
    }

    /// Remove a message from the window, returning it if it was present.
    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let index = self.index_of(id)?;
        self.messages.remove(index)
    }

    /// Get a single message, from the window when possible and through the
    /// fetch collaborator otherwise.
    pub async fn download_one<F: MessageFetcher>(
        &self,
        fetcher: &F,
        id: MessageId,
    ) -> Result<Message> {
        if let Some(message) = self.get(id) {
            return Ok(message.clone());
        }
        fetcher.fetch_message(self.channel, id).await
    }

    /// Get a run of messages relative to an anchor.
    ///
    /// The run is served from the window only when the window fully covers
    /// it: the anchor is held locally and `limit` messages exist on the
    /// requested side of it. Anything less delegates the whole range to the
    /// fetch collaborator. Fetched results are not folded back into the
    /// window; doing so could punch holes that a later coverage check would
    /// mistake for complete runs.
    ///
    /// `Before` and `MostRecent` runs come back newest first, `After` runs
    /// oldest first.
    pub async fn download<F: MessageFetcher>(
        &self,
        fetcher: &F,
        what: GetMessages,
        limit: u64,
    ) -> Result<Vec<Message>> {
        if let Some(run) = self.local_run(what, limit) {
            return Ok(run);
        }
        fetcher.fetch_messages(self.channel, what, limit).await
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        self.messages
            .binary_search_by_key(&id, |message| message.id)
            .ok()
    }

    fn local_run(&self, what: GetMessages, limit: u64) -> Option<Vec<Message>> {
        let limit = limit as usize;
        match what {
            GetMessages::MostRecent => {
                if self.messages.len() < limit {
                    return None;
                }
                let newest = self.messages.len() - limit;
                let mut run: Vec<Message> = self.messages.iter().skip(newest).cloned().collect();
                run.reverse();
                Some(run)
            }
            GetMessages::Before(anchor) => {
                let index = self.index_of(anchor)?;
                if index < limit {
                    return None;
                }
                let mut run: Vec<Message> = self
                    .messages
                    .iter()
                    .skip(index - limit)
                    .take(limit)
                    .cloned()
                    .collect();
                run.reverse();
                Some(run)
            }
            GetMessages::After(anchor) => {
                let index = self.index_of(anchor)?;
                if self.messages.len() - index - 1 < limit {
                    return None;
                }
                Some(
                    self.messages
                        .iter()
                        .skip(index + 1)
                        .take(limit)
                        .cloned()
                        .collect(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{User, UserId};
    use chrono::{DateTime, FixedOffset};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHANNEL: ChannelId = ChannelId(5);

    fn when() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2016-03-01T10:00:00Z").unwrap()
    }

    fn message(id: u64) -> Message {
        Message {
            id: MessageId(id),
            channel_id: CHANNEL,
            author: User {
                id: UserId(7),
                name: "author".into(),
                discriminator: 1234,
                avatar: None,
                bot: false,
            },
            content: format!("message {}", id),
            timestamp: when(),
            edited_timestamp: None,
            tts: false,
            pinned: false,
        }
    }

    /// Fetcher that serves a canned backlog and counts how often it is hit.
    struct Backlog {
        messages: Vec<Message>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Backlog {
        fn new(messages: Vec<Message>) -> Backlog {
            Backlog {
                messages,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Backlog {
            Backlog {
                messages: vec![],
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MessageFetcher for Backlog {
        async fn fetch_message(&self, _: ChannelId, message: MessageId) -> Result<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Other("backlog unavailable"));
            }
            self.messages
                .iter()
                .find(|stored| stored.id == message)
                .cloned()
                .ok_or(Error::Other("no such message"))
        }

        async fn fetch_messages(
            &self,
            _: ChannelId,
            _: GetMessages,
            limit: u64,
        ) -> Result<Vec<Message>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Other("backlog unavailable"));
            }
            Ok(self.messages.iter().take(limit as usize).cloned().collect())
        }
    }

    #[test]
    fn eviction_drops_the_oldest_message() {
        let mut cache = MessageCache::new(CHANNEL, 2);
        cache.add(message(1));
        cache.add(message(2));
        cache.add(message(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(MessageId(1)).is_none());
        assert_eq!(cache.get(MessageId(3)).unwrap().id, MessageId(3));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = MessageCache::new(CHANNEL, 0);
        cache.add(message(1));
        assert!(cache.is_empty());
        assert!(cache.get(MessageId(1)).is_none());
    }

    #[test]
    fn remove_returns_the_stored_message() {
        let mut cache = MessageCache::new(CHANNEL, 10);
        cache.add(message(1));

        let removed = cache.remove(MessageId(1)).unwrap();
        assert_eq!(removed.id, MessageId(1));
        assert!(cache.remove(MessageId(1)).is_none());
    }

    #[test]
    fn update_merges_only_present_fields() {
        let mut cache = MessageCache::new(CHANNEL, 10);
        cache.add(message(1));

        let edit = MessageUpdate {
            id: MessageId(1),
            channel_id: CHANNEL,
            content: Optional::Present("edited".into()),
            edited_timestamp: Optional::Present(Some(when())),
            pinned: Optional::Absent,
        };
        let updated = cache.update(&edit).unwrap();
        assert_eq!(updated.content, "edited");
        assert_eq!(updated.edited_timestamp, Some(when()));
        assert!(!updated.pinned);
    }

    #[tokio::test]
    async fn covered_ranges_are_served_locally() {
        let mut cache = MessageCache::new(CHANNEL, 10);
        for id in 1..=5 {
            cache.add(message(id));
        }
        let fetcher = Backlog::new(vec![]);

        let run = cache
            .download(&fetcher, GetMessages::Before(MessageId(4)), 2)
            .await
            .unwrap();
        let ids: Vec<MessageId> = run.iter().map(|message| message.id).collect();
        assert_eq!(ids, vec![MessageId(3), MessageId(2)]);

        let run = cache
            .download(&fetcher, GetMessages::After(MessageId(2)), 2)
            .await
            .unwrap();
        let ids: Vec<MessageId> = run.iter().map(|message| message.id).collect();
        assert_eq!(ids, vec![MessageId(3), MessageId(4)]);

        let run = cache
            .download(&fetcher, GetMessages::MostRecent, 3)
            .await
            .unwrap();
        let ids: Vec<MessageId> = run.iter().map(|message| message.id).collect();
        assert_eq!(ids, vec![MessageId(5), MessageId(4), MessageId(3)]);

        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn uncovered_ranges_delegate_without_merging() {
        let mut cache = MessageCache::new(CHANNEL, 10);
        cache.add(message(4));
        cache.add(message(5));

        let fetcher = Backlog::new(vec![message(3), message(2)]);

        // The anchor is known but the window holds nothing before it.
        let run = cache
            .download(&fetcher, GetMessages::Before(MessageId(4)), 2)
            .await
            .unwrap();
        assert_eq!(run.len(), 2);
        assert_eq!(fetcher.calls(), 1);

        // An unknown anchor always delegates.
        cache
            .download(&fetcher, GetMessages::Before(MessageId(3)), 1)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);

        // Fetched history was not folded into the window.
        assert_eq!(cache.len(), 2);
        assert!(cache.get(MessageId(3)).is_none());
    }

    #[tokio::test]
    async fn fetch_failures_leave_the_cache_untouched() {
        let mut cache = MessageCache::new(CHANNEL, 10);
        cache.add(message(5));

        let fetcher = Backlog::failing();
        let result = cache
            .download(&fetcher, GetMessages::Before(MessageId(5)), 1)
            .await;
        assert!(matches!(result, Err(Error::Other(_))));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(MessageId(5)).unwrap().id, MessageId(5));
    }

    #[tokio::test]
    async fn download_one_prefers_the_window() {
        let mut cache = MessageCache::new(CHANNEL, 10);
        cache.add(message(1));
        let fetcher = Backlog::new(vec![message(2)]);

        let hit = cache.download_one(&fetcher, MessageId(1)).await.unwrap();
        assert_eq!(hit.id, MessageId(1));
        assert_eq!(fetcher.calls(), 0);

        let miss = cache.download_one(&fetcher, MessageId(2)).await.unwrap();
        assert_eq!(miss.id, MessageId(2));
        assert_eq!(fetcher.calls(), 1);
    }
}
