//! Broadcast adapter used by business services
//!
//! Services publish real-time events only after their own writes commit, and
//! only through [`Broadcaster`]; they never see hub internals.

use std::sync::Arc;

use crate::core::envelope::{BroadcastRequest, ChatMessage, Event, PresenceStatus, Scope};
use crate::core::hub::HubHandle;
use crate::error::{Result, RustyHubError};

pub trait Broadcaster: Send + Sync {
    fn broadcast_to_workspace(&self, workspace_id: i64, event: Event) -> Result<()>;

    fn broadcast_to_channel(&self, workspace_id: i64, channel_id: i64, event: Event) -> Result<()>;

    fn broadcast_to_user(&self, workspace_id: i64, user_id: i64, event: Event) -> Result<()>;

    /// Announce a new channel message. A message without a channel is a
    /// direct message and is refused here; use
    /// [`Broadcaster::notify_direct_message`] instead.
    fn notify_message_sent(&self, workspace_id: i64, message: ChatMessage) -> Result<()> {
        let channel_id = channel_of(&message)?;
        self.broadcast_to_channel(workspace_id, channel_id, Event::MessageSent(message))
    }

    fn notify_message_edited(&self, workspace_id: i64, message: ChatMessage) -> Result<()> {
        let channel_id = channel_of(&message)?;
        self.broadcast_to_channel(workspace_id, channel_id, Event::MessageEdited(message))
    }

    fn notify_message_deleted(
        &self,
        workspace_id: i64,
        channel_id: i64,
        message_id: i64,
    ) -> Result<()> {
        self.broadcast_to_channel(
            workspace_id,
            channel_id,
            Event::MessageDeleted {
                message_id,
                channel_id: Some(channel_id),
                conversation_id: None,
            },
        )
    }

    fn notify_status_changed(
        &self,
        workspace_id: i64,
        user_id: i64,
        status: PresenceStatus,
        status_text: Option<String>,
    ) -> Result<()> {
        self.broadcast_to_workspace(
            workspace_id,
            Event::StatusChanged {
                user_id,
                status,
                status_text,
            },
        )
    }

    /// Deliver a direct message to every device of every participant
    fn notify_direct_message(
        &self,
        workspace_id: i64,
        participants: &[i64],
        message: ChatMessage,
    ) -> Result<()> {
        for user_id in participants {
            self.broadcast_to_user(workspace_id, *user_id, Event::MessageSent(message.clone()))?;
        }
        Ok(())
    }

    fn notify_direct_message_edited(
        &self,
        workspace_id: i64,
        participants: &[i64],
        message: ChatMessage,
    ) -> Result<()> {
        for user_id in participants {
            self.broadcast_to_user(workspace_id, *user_id, Event::MessageEdited(message.clone()))?;
        }
        Ok(())
    }

    fn notify_direct_message_deleted(
        &self,
        workspace_id: i64,
        participants: &[i64],
        conversation_id: i64,
        message_id: i64,
    ) -> Result<()> {
        for user_id in participants {
            self.broadcast_to_user(
                workspace_id,
                *user_id,
                Event::MessageDeleted {
                    message_id,
                    channel_id: None,
                    conversation_id: Some(conversation_id),
                },
            )?;
        }
        Ok(())
    }
}

fn channel_of(message: &ChatMessage) -> Result<i64> {
    message.channel_id.ok_or(RustyHubError::NoChannel {
        message_id: message.id,
    })
}

impl Broadcaster for HubHandle {
    fn broadcast_to_workspace(&self, workspace_id: i64, event: Event) -> Result<()> {
        self.broadcast(BroadcastRequest::new(Scope::workspace(workspace_id), event))
    }

    fn broadcast_to_channel(&self, workspace_id: i64, channel_id: i64, event: Event) -> Result<()> {
        self.broadcast(BroadcastRequest::new(
            Scope::channel(workspace_id, channel_id),
            event,
        ))
    }

    fn broadcast_to_user(&self, workspace_id: i64, user_id: i64, event: Event) -> Result<()> {
        self.broadcast(BroadcastRequest::new(Scope::user(workspace_id, user_id), event))
    }
}

pub type SharedBroadcaster = Arc<dyn Broadcaster>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::UserProfile;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBroadcaster {
        sent: Mutex<Vec<(Scope, &'static str)>>,
    }

    impl Broadcaster for RecordingBroadcaster {
        fn broadcast_to_workspace(&self, workspace_id: i64, event: Event) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((Scope::workspace(workspace_id), event.kind()));
            Ok(())
        }

        fn broadcast_to_channel(&self, workspace_id: i64, channel_id: i64, event: Event) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((Scope::channel(workspace_id, channel_id), event.kind()));
            Ok(())
        }

        fn broadcast_to_user(&self, workspace_id: i64, user_id: i64, event: Event) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((Scope::user(workspace_id, user_id), event.kind()));
            Ok(())
        }
    }

    fn message(channel_id: Option<i64>) -> ChatMessage {
        ChatMessage {
            id: 42,
            channel_id,
            conversation_id: channel_id.map_or(Some(7), |_| None),
            thread_id: None,
            author: UserProfile::new(1, "ada"),
            content: "hello".to_string(),
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    #[test]
    fn test_channel_message_goes_to_channel() {
        let recorder = RecordingBroadcaster::default();
        recorder.notify_message_sent(3, message(Some(11))).unwrap();
        recorder.notify_message_deleted(3, 11, 42).unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0], (Scope::channel(3, 11), "message_sent"));
        assert_eq!(sent[1], (Scope::channel(3, 11), "message_deleted"));
    }

    #[test]
    fn test_direct_message_reaches_each_participant() {
        let recorder = RecordingBroadcaster::default();
        recorder
            .notify_direct_message(3, &[1, 2], message(None))
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                (Scope::user(3, 1), "message_sent"),
                (Scope::user(3, 2), "message_sent"),
            ]
        );
    }

    #[test]
    fn test_message_without_channel_is_refused() {
        let recorder = RecordingBroadcaster::default();
        assert!(matches!(
            recorder.notify_message_sent(3, message(None)),
            Err(RustyHubError::NoChannel { message_id: 42 })
        ));
        assert!(matches!(
            recorder.notify_message_edited(3, message(None)),
            Err(RustyHubError::NoChannel { message_id: 42 })
        ));
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_direct_edits_and_deletes_stay_with_participants() {
        let recorder = RecordingBroadcaster::default();
        recorder
            .notify_direct_message_edited(3, &[1, 2], message(None))
            .unwrap();
        recorder
            .notify_direct_message_deleted(3, &[1, 2], 7, 42)
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                (Scope::user(3, 1), "message_edited"),
                (Scope::user(3, 2), "message_edited"),
                (Scope::user(3, 1), "message_deleted"),
                (Scope::user(3, 2), "message_deleted"),
            ]
        );
    }

    #[test]
    fn test_status_change_is_workspace_wide() {
        let recorder = Arc::new(RecordingBroadcaster::default());
        let shared: SharedBroadcaster = recorder.clone();
        shared
            .notify_status_changed(3, 1, PresenceStatus::Online, None)
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(*sent, vec![(Scope::workspace(3), "status_changed")]);
    }

    #[tokio::test]
    async fn test_stopped_hub_reports_unavailable() {
        let (hub, handle) = crate::core::hub::Hub::new(Default::default());
        drop(hub);
        assert!(handle.broadcast_to_workspace(1, Event::Pong).is_err());
        assert!(!handle.is_running());
    }
}
