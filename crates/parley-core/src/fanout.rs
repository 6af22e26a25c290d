//! Message fan-out.
//!
//! A send persists the message first, then computes the live-recipient set
//! and pushes to it. Live push is at-most-once and unacknowledged; anyone
//! who misses it reads the message from history on their next fetch.

use crate::ids::{ChannelId, MessageId, SessionId, UserId};
use crate::membership::ChannelMembershipResolver;
use crate::message::{Conversation, MessageBody, MessageError, NewMessage};
use crate::presence::PresenceRegistry;
use crate::session::{Emitter, Session};
use crate::store::{PersistentStore, StoreError};
use parley_protocol::{SendChannelMessage, SendMessage, ServerEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fan-out errors. Push failures are never reported here.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Rejected before anything was persisted.
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] MessageError),

    /// The store failed; nothing was pushed.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Fan-out configuration.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Maximum message content length in bytes.
    pub max_content_length: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_content_length: 64 * 1024,
        }
    }
}

/// Outcome of one send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// The persisted message.
    pub message_id: MessageId,
    /// Number of users the message was addressed to.
    pub targets: usize,
    /// Sessions the push was handed to.
    pub delivered: Vec<SessionId>,
    /// Sessions whose push failed at the transport.
    pub failed: Vec<SessionId>,
    /// Targets with no registered session.
    pub unreachable: Vec<UserId>,
}

impl FanoutReport {
    fn empty(message_id: MessageId) -> Self {
        Self {
            message_id,
            ..Self::default()
        }
    }
}

/// Persists messages and pushes them to the live sessions of their audience.
///
/// Owns the presence registry. Sessions are the only way to mutate it.
pub struct MessageFanoutService<S: ?Sized, E: ?Sized> {
    store: Arc<S>,
    emitter: Arc<E>,
    presence: Arc<PresenceRegistry>,
    resolver: ChannelMembershipResolver<S>,
    config: FanoutConfig,
}

impl<S, E> MessageFanoutService<S, E>
where
    S: PersistentStore + ?Sized,
    E: Emitter + ?Sized,
{
    /// Create a service with default configuration.
    #[must_use]
    pub fn new(store: Arc<S>, emitter: Arc<E>) -> Self {
        Self::with_config(store, emitter, FanoutConfig::default())
    }

    /// Create a service with custom configuration.
    #[must_use]
    pub fn with_config(store: Arc<S>, emitter: Arc<E>, config: FanoutConfig) -> Self {
        info!("Creating fan-out service with config: {:?}", config);
        Self {
            resolver: ChannelMembershipResolver::new(Arc::clone(&store)),
            store,
            emitter,
            presence: Arc::new(PresenceRegistry::new()),
            config,
        }
    }

    /// Start tracking a new transport session.
    #[must_use]
    pub fn open_session(&self, id: SessionId) -> Session {
        Session::open(id, Arc::clone(&self.presence))
    }

    /// The live session for `user_id`, if any.
    #[must_use]
    pub fn lookup(&self, user_id: &UserId) -> Option<SessionId> {
        self.presence.lookup(user_id)
    }

    /// Number of users currently reachable for push.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.presence.len()
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate and send an inbound `sendMessage` request.
    ///
    /// # Errors
    ///
    /// See [`Self::send_direct_message`].
    pub async fn handle_send_message(&self, request: SendMessage) -> Result<FanoutReport, FanoutError> {
        let body = MessageBody::from_parts(request.message_type, request.content, request.file_url)?;
        self.send_direct_message(request.sender.into(), request.recipient.into(), body)
            .await
    }

    /// Validate and send an inbound `sendChannelMessage` request.
    ///
    /// # Errors
    ///
    /// See [`Self::send_channel_message`].
    pub async fn handle_send_channel_message(
        &self,
        request: SendChannelMessage,
    ) -> Result<FanoutReport, FanoutError> {
        let body = MessageBody::from_parts(request.message_type, request.content, request.file_url)?;
        self.send_channel_message(request.channel_id.into(), request.sender.into(), body)
            .await
    }

    /// Persist a direct message and push it to the live sessions of both
    /// parties. Echoing to the sender's session is intentional.
    ///
    /// # Errors
    ///
    /// Fails if the body is too long or the store fails. Push failures are
    /// only recorded in the report.
    pub async fn send_direct_message(
        &self,
        sender: UserId,
        recipient: UserId,
        body: MessageBody,
    ) -> Result<FanoutReport, FanoutError> {
        body.check_length(self.config.max_content_length)?;

        let message_id = self
            .store
            .create_message(NewMessage {
                sender: sender.clone(),
                conversation: Conversation::Direct {
                    recipient: recipient.clone(),
                },
                body,
            })
            .await?;

        let enriched = self.store.get_message_with_profiles(&message_id).await?;
        let event = Arc::new(enriched.into_event());

        let targets = if sender == recipient {
            vec![sender]
        } else {
            vec![sender, recipient]
        };

        let report = self.push(message_id, &targets, event).await;
        debug!(
            message = %report.message_id,
            delivered = report.delivered.len(),
            unreachable = report.unreachable.len(),
            "Direct message fanned out"
        );
        Ok(report)
    }

    /// Persist a channel message, record it on the channel, and push it to
    /// the live sessions of the channel's members and admin as of now.
    ///
    /// The message write, the append and the channel touch are one store
    /// call, so a failure leaves nothing behind. A channel that does not
    /// exist is not an error: the message stays persisted and nobody is
    /// pushed to.
    ///
    /// # Errors
    ///
    /// Fails if the body is too long or the store fails.
    pub async fn send_channel_message(
        &self,
        channel_id: ChannelId,
        sender: UserId,
        body: MessageBody,
    ) -> Result<FanoutReport, FanoutError> {
        body.check_length(self.config.max_content_length)?;

        let write = self
            .store
            .create_channel_message(
                &channel_id,
                NewMessage {
                    sender,
                    conversation: Conversation::Channel {
                        channel_id: channel_id.clone(),
                    },
                    body,
                },
            )
            .await?;
        let message_id = write.message_id;

        if !write.appended {
            warn!(channel = %channel_id, message = %message_id, "Channel not found; no recipients");
            return Ok(FanoutReport::empty(message_id));
        }

        let enriched = self.store.get_message_with_profiles(&message_id).await?;
        let event = Arc::new(enriched.into_event());

        // Resolved after persistence so membership as of broadcast time applies.
        let audience = match self.resolver.resolve(&channel_id).await {
            Ok(audience) => audience,
            Err(e) if e.is_not_found() => {
                warn!(channel = %channel_id, message = %message_id, "Channel vanished before fan-out; no recipients");
                return Ok(FanoutReport::empty(message_id));
            }
            Err(e) => return Err(e.into()),
        };

        let report = self.push(message_id, &audience.targets(), event).await;
        debug!(
            channel = %channel_id,
            message = %report.message_id,
            targets = report.targets,
            delivered = report.delivered.len(),
            "Channel message fanned out"
        );
        Ok(report)
    }

    /// Push `event` to every registered target. A failure on one target
    /// never stops delivery to the others.
    async fn push(
        &self,
        message_id: MessageId,
        targets: &[UserId],
        event: Arc<ServerEvent>,
    ) -> FanoutReport {
        let mut report = FanoutReport {
            targets: targets.len(),
            ..FanoutReport::empty(message_id)
        };

        for user in targets {
            let Some(session) = self.presence.lookup(user) else {
                report.unreachable.push(user.clone());
                continue;
            };

            match self.emitter.emit(&session, Arc::clone(&event)).await {
                Ok(()) => report.delivered.push(session),
                Err(e) => {
                    warn!(user = %user, session = %session, error = %e, event = event.name(), "Push failed");
                    report.failed.push(session);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::User;
    use crate::message::{EnrichedMessage, Message};
    use crate::session::EmitError;
    use crate::store::MemoryStore;
    use crate::Channel;
    use async_trait::async_trait;
    use parley_protocol::{MessageType, Party, ProfileProjection};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records every push; can be told to fail for specific sessions.
    #[derive(Default)]
    struct RecordingEmitter {
        pushes: Mutex<Vec<(SessionId, Arc<ServerEvent>)>>,
        broken: Mutex<HashSet<SessionId>>,
    }

    impl RecordingEmitter {
        fn pushes_to(&self, session: &str) -> Vec<Arc<ServerEvent>> {
            self.pushes
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| s.as_str() == session)
                .map(|(_, e)| Arc::clone(e))
                .collect()
        }

        fn total(&self) -> usize {
            self.pushes.lock().unwrap().len()
        }

        fn break_session(&self, session: &str) {
            self.broken.lock().unwrap().insert(session.into());
        }
    }

    #[async_trait]
    impl Emitter for RecordingEmitter {
        async fn emit(&self, session: &SessionId, event: Arc<ServerEvent>) -> Result<(), EmitError> {
            if self.broken.lock().unwrap().contains(session) {
                return Err(EmitError::SessionClosed(session.clone()));
            }
            self.pushes.lock().unwrap().push((session.clone(), event));
            Ok(())
        }
    }

    /// Delegates to a memory store until told to fail. Channel writes go
    /// through the trait's step-by-step default body.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        down: AtomicBool,
        append_down: AtomicBool,
        delete_after_append: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), StoreError> {
            if self.down.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PersistentStore for FlakyStore {
        async fn create_message(&self, message: NewMessage) -> Result<MessageId, StoreError> {
            self.check()?;
            self.inner.create_message(message).await
        }
        async fn get_message_with_profiles(
            &self,
            id: &MessageId,
        ) -> Result<EnrichedMessage, StoreError> {
            self.check()?;
            self.inner.get_message_with_profiles(id).await
        }
        async fn append_message_to_channel(
            &self,
            channel_id: &ChannelId,
            message_id: &MessageId,
        ) -> Result<(), StoreError> {
            self.check()?;
            if self.append_down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("append timed out".into()));
            }
            self.inner.append_message_to_channel(channel_id, message_id).await?;
            if self.delete_after_append.load(Ordering::SeqCst) {
                self.inner.delete_channel(channel_id).await;
            }
            Ok(())
        }
        async fn touch_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError> {
            self.check()?;
            self.inner.touch_channel(channel_id).await
        }
        async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, StoreError> {
            self.check()?;
            self.inner.get_channel(channel_id).await
        }
        async fn get_user_profile(&self, user_id: &UserId) -> Result<ProfileProjection, StoreError> {
            self.check()?;
            self.inner.get_user_profile(user_id).await
        }
        async fn direct_history(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
            self.check()?;
            self.inner.direct_history(a, b).await
        }
        async fn channel_history(&self, channel_id: &ChannelId) -> Result<Vec<Message>, StoreError> {
            self.check()?;
            self.inner.channel_history(channel_id).await
        }
        async fn user_channels(&self, user_id: &UserId) -> Result<Vec<Channel>, StoreError> {
            self.check()?;
            self.inner.user_channels(user_id).await
        }
        async fn discard_message(&self, id: &MessageId) -> Result<(), StoreError> {
            self.inner.discard_message(id).await
        }
    }

    async fn flaky_setup() -> (
        MessageFanoutService<FlakyStore, RecordingEmitter>,
        Arc<FlakyStore>,
        Arc<RecordingEmitter>,
        Channel,
    ) {
        let store = Arc::new(FlakyStore::default());
        for id in ["u1", "u2"] {
            store
                .inner
                .create_user(User::new(id, format!("{id}@example.com")))
                .await;
        }
        let channel = store
            .inner
            .create_channel("general", vec!["u2".into()], &"u1".into())
            .await
            .unwrap();
        let emitter = Arc::new(RecordingEmitter::default());
        let service = MessageFanoutService::new(Arc::clone(&store), Arc::clone(&emitter));
        (service, store, emitter, channel)
    }

    type Service = MessageFanoutService<MemoryStore, RecordingEmitter>;

    async fn setup(users: &[&str]) -> (Service, Arc<MemoryStore>, Arc<RecordingEmitter>) {
        let store = Arc::new(MemoryStore::new());
        for id in users {
            store
                .create_user(User::new(*id, format!("{id}@example.com")).with_name(*id, "Test"))
                .await;
        }
        let emitter = Arc::new(RecordingEmitter::default());
        let service = MessageFanoutService::new(Arc::clone(&store), Arc::clone(&emitter));
        (service, store, emitter)
    }

    fn text(content: &str) -> MessageBody {
        MessageBody::Text {
            content: content.into(),
        }
    }

    fn connect(service: &Service, user: &str, session: &str) -> Session {
        let mut s = service.open_session(session.into());
        s.handshake(Some(user.into()));
        s
    }

    #[tokio::test]
    async fn test_direct_to_offline_recipient() {
        let (service, store, emitter) = setup(&["u1", "u2"]).await;
        let _s1 = connect(&service, "u1", "s1");

        let report = service
            .send_direct_message("u1".into(), "u2".into(), text("are you there?"))
            .await
            .unwrap();

        assert_eq!(report.delivered, vec![SessionId::from("s1")]);
        assert_eq!(report.unreachable, vec![UserId::from("u2")]);
        assert_eq!(emitter.total(), 1);

        match emitter.pushes_to("s1")[0].as_ref() {
            ServerEvent::MessageReceived(payload) => {
                assert_eq!(payload.id, report.message_id.0);
                assert_eq!(payload.recipient.id(), "u2");
                assert!(matches!(payload.sender, Party::Profile(ref p) if p.id == "u1"));
                assert_eq!(payload.content.as_deref(), Some("are you there?"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // The recipient picks it up from history later.
        let history = store.direct_history(&"u2".into(), &"u1".into()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].recipient(), Some(&UserId::from("u2")));
        assert_eq!(history[0].channel_id(), None);
    }

    #[tokio::test]
    async fn test_direct_reaches_both_parties_once() {
        let (service, store, emitter) = setup(&["u1", "u2"]).await;
        let _s1 = connect(&service, "u1", "s1");
        let _s2 = connect(&service, "u2", "s2");

        let report = service
            .send_direct_message("u1".into(), "u2".into(), text("hello"))
            .await
            .unwrap();

        assert_eq!(report.delivered.len(), 2);
        assert_eq!(emitter.pushes_to("s1").len(), 1);
        assert_eq!(emitter.pushes_to("s2").len(), 1);
        assert_eq!(emitter.pushes_to("s1")[0], emitter.pushes_to("s2")[0]);
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_direct_to_self_pushes_once() {
        let (service, _store, emitter) = setup(&["u1"]).await;
        let _s1 = connect(&service, "u1", "s1");

        let report = service
            .send_direct_message("u1".into(), "u1".into(), text("note to self"))
            .await
            .unwrap();

        assert_eq!(report.targets, 1);
        assert_eq!(emitter.total(), 1);
    }

    #[tokio::test]
    async fn test_channel_reaches_members_and_admin() {
        let (service, store, emitter) = setup(&["u1", "u2", "u3"]).await;
        let channel = store
            .create_channel("general", vec!["u1".into(), "u2".into()], &"u3".into())
            .await
            .unwrap();
        let _s1 = connect(&service, "u1", "s1");
        let _s2 = connect(&service, "u2", "s2");
        let _s3 = connect(&service, "u3", "s3");

        let report = service
            .send_channel_message(channel.id.clone(), "u1".into(), text("standup in 5"))
            .await
            .unwrap();

        assert_eq!(report.targets, 3);
        assert_eq!(report.delivered.len(), 3);
        let first = emitter.pushes_to("s1")[0].clone();
        assert_eq!(emitter.pushes_to("s2")[0], first);
        assert_eq!(emitter.pushes_to("s3")[0], first);
        match first.as_ref() {
            ServerEvent::ChannelMessageReceived(payload) => {
                assert_eq!(payload.channel_id, channel.id.0);
                assert_eq!(payload.content.as_deref(), Some("standup in 5"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let updated = store.get_channel(&channel.id).await.unwrap();
        assert_eq!(updated.messages.len(), channel.messages.len() + 1);
        assert!(updated.updated_at > channel.updated_at);

        let history = store.channel_history(&channel.id).await.unwrap();
        assert_eq!(history[0].channel_id(), Some(&channel.id));
        assert_eq!(history[0].recipient(), None);
    }

    #[tokio::test]
    async fn test_member_added_later_only_gets_later_sends() {
        let (service, store, emitter) = setup(&["u1", "u2", "u3"]).await;
        let channel = store
            .create_channel("general", vec!["u1".into()], &"u1".into())
            .await
            .unwrap();
        let _s2 = connect(&service, "u2", "s2");

        service
            .send_channel_message(channel.id.clone(), "u1".into(), text("before"))
            .await
            .unwrap();
        store.add_channel_member(&channel.id, &"u2".into()).await.unwrap();
        service
            .send_channel_message(channel.id.clone(), "u1".into(), text("after"))
            .await
            .unwrap();

        let received = emitter.pushes_to("s2");
        assert_eq!(received.len(), 1);
        match received[0].as_ref() {
            ServerEvent::ChannelMessageReceived(payload) => {
                assert_eq!(payload.content.as_deref(), Some("after"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        store.remove_channel_member(&channel.id, &"u2".into()).await.unwrap();
        service
            .send_channel_message(channel.id.clone(), "u1".into(), text("gone"))
            .await
            .unwrap();
        assert_eq!(emitter.pushes_to("s2").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_channel_is_no_recipients() {
        let (service, store, emitter) = setup(&["u1"]).await;
        let _s1 = connect(&service, "u1", "s1");

        let report = service
            .send_channel_message("deleted".into(), "u1".into(), text("anyone?"))
            .await
            .unwrap();

        assert_eq!(report.targets, 0);
        assert_eq!(emitter.total(), 0);
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_push_failure_is_isolated() {
        let (service, store, emitter) = setup(&["u1", "u2", "u3"]).await;
        let channel = store
            .create_channel("general", vec!["u1".into(), "u2".into()], &"u3".into())
            .await
            .unwrap();
        let _s1 = connect(&service, "u1", "s1");
        let _s2 = connect(&service, "u2", "s2");
        let _s3 = connect(&service, "u3", "s3");
        emitter.break_session("s2");

        let report = service
            .send_channel_message(channel.id, "u1".into(), text("hi all"))
            .await
            .unwrap();

        assert_eq!(report.failed, vec![SessionId::from("s2")]);
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(emitter.pushes_to("s3").len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_session_gets_nothing() {
        let (service, _store, emitter) = setup(&["u1", "u2"]).await;
        let _old = connect(&service, "u2", "s2-old");
        let _new = connect(&service, "u2", "s2-new");

        service
            .send_direct_message("u1".into(), "u2".into(), text("which tab?"))
            .await
            .unwrap();

        assert!(emitter.pushes_to("s2-old").is_empty());
        assert_eq!(emitter.pushes_to("s2-new").len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_user_is_unreachable() {
        let (service, _store, emitter) = setup(&["u1", "u2"]).await;
        let s2 = connect(&service, "u2", "s2");
        drop(s2);

        let report = service
            .send_direct_message("u1".into(), "u2".into(), text("bye"))
            .await
            .unwrap();

        assert!(report.delivered.is_empty());
        assert_eq!(emitter.total(), 0);
    }

    #[tokio::test]
    async fn test_malformed_rejected_before_persistence() {
        let (service, store, _emitter) = setup(&["u1", "u2"]).await;

        let err = service
            .handle_send_message(SendMessage {
                sender: "u1".into(),
                recipient: "u2".into(),
                content: Some("caption".into()),
                message_type: MessageType::File,
                file_url: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FanoutError::MalformedMessage(MessageError::MissingFileUrl)
        ));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_content_limit() {
        let store = Arc::new(MemoryStore::new());
        let service = MessageFanoutService::with_config(
            Arc::clone(&store),
            Arc::new(RecordingEmitter::default()),
            FanoutConfig {
                max_content_length: 4,
            },
        );

        let err = service
            .send_direct_message("u1".into(), "u2".into(), text("too long"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FanoutError::MalformedMessage(MessageError::ContentTooLong { .. })
        ));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_without_push() {
        let store = Arc::new(FlakyStore::default());
        let emitter = Arc::new(RecordingEmitter::default());
        let service = MessageFanoutService::new(Arc::clone(&store), Arc::clone(&emitter));
        let _s1 = {
            let mut s = service.open_session("s1".into());
            s.handshake(Some("u1".into()));
            s
        };

        store.down.store(true, Ordering::SeqCst);
        let err = service
            .handle_send_channel_message(SendChannelMessage {
                channel_id: "c1".into(),
                sender: "u1".into(),
                content: Some("hello".into()),
                message_type: MessageType::Text,
                file_url: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FanoutError::Persistence(StoreError::Unavailable(_))
        ));
        assert_eq!(emitter.total(), 0);
        assert_eq!(store.inner.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_channel_append_leaves_no_message() {
        let (service, store, emitter, channel) = flaky_setup().await;
        let mut s2 = service.open_session("s2".into());
        s2.handshake(Some("u2".into()));

        store.append_down.store(true, Ordering::SeqCst);
        let err = service
            .send_channel_message(channel.id.clone(), "u1".into(), text("lost"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FanoutError::Persistence(StoreError::Unavailable(_))
        ));
        assert_eq!(emitter.total(), 0);
        assert_eq!(store.inner.message_count().await, 0);
        assert!(store.inner.channel_history(&channel.id).await.unwrap().is_empty());

        // A retry after recovery persists exactly one message.
        store.append_down.store(false, Ordering::SeqCst);
        service
            .send_channel_message(channel.id.clone(), "u1".into(), text("lost"))
            .await
            .unwrap();
        assert_eq!(store.inner.message_count().await, 1);
        assert_eq!(emitter.pushes_to("s2").len(), 1);
    }

    #[tokio::test]
    async fn test_channel_deleted_before_resolve_is_no_recipients() {
        let (service, store, emitter, channel) = flaky_setup().await;
        let mut s2 = service.open_session("s2".into());
        s2.handshake(Some("u2".into()));

        store.delete_after_append.store(true, Ordering::SeqCst);
        let report = service
            .send_channel_message(channel.id.clone(), "u1".into(), text("anyone?"))
            .await
            .unwrap();

        assert_eq!(report.targets, 0);
        assert!(report.delivered.is_empty());
        assert_eq!(emitter.total(), 0);
        assert_eq!(store.inner.message_count().await, 1);
        assert!(store.inner.get_channel(&channel.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_file_message_to_channel() {
        let (service, store, emitter) = setup(&["u1", "u2"]).await;
        let channel = store
            .create_channel("design", vec!["u2".into()], &"u1".into())
            .await
            .unwrap();
        let _s2 = connect(&service, "u2", "s2");

        service
            .handle_send_channel_message(SendChannelMessage {
                channel_id: channel.id.to_string(),
                sender: "u1".into(),
                content: None,
                message_type: MessageType::File,
                file_url: Some("uploads/files/mock.png".into()),
            })
            .await
            .unwrap();

        match emitter.pushes_to("s2")[0].as_ref() {
            ServerEvent::ChannelMessageReceived(payload) => {
                assert_eq!(payload.message_type, MessageType::File);
                assert_eq!(payload.file_url.as_deref(), Some("uploads/files/mock.png"));
                assert_eq!(payload.content, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let history = store.channel_history(&channel.id).await.unwrap();
        assert_eq!(history[0].body.file_url(), Some("uploads/files/mock.png"));
    }

    #[tokio::test]
    async fn test_sends_from_one_sender_persist_in_order() {
        let (service, store, _emitter) = setup(&["u1", "u2"]).await;

        for i in 0..5 {
            service
                .send_direct_message("u1".into(), "u2".into(), text(&format!("msg {i}")))
                .await
                .unwrap();
        }

        let history = store.direct_history(&"u1".into(), &"u2".into()).await.unwrap();
        let contents: Vec<_> = history.iter().filter_map(|m| m.body.content()).collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }
}
