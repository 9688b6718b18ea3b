use async_trait::async_trait;

use agora_shared::constants::{CHAT_WINDOW, COLLECTION_MESSAGES};
use agora_shared::models::{Message, NewMessage, Record};
use agora_shared::{Query, User};

use super::{open_list, Screen};
use crate::context::AppContext;
use crate::error::SyncError;
use crate::sync_list::{LoadState, SyncList};

/// The community chat room. Reading and writing both require a login.
pub struct ChatRoom {
    ctx: AppContext,
    messages: SyncList<Message>,
}

impl ChatRoom {
    pub fn new(ctx: AppContext) -> Self {
        // Latest window, shown oldest first.
        let messages = ctx
            .list(Query::newest_first(COLLECTION_MESSAGES).limit(CHAT_WINDOW))
            .reverse_loaded();
        Self { ctx, messages }
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.items()
    }

    pub fn list(&self) -> &SyncList<Message> {
        &self.messages
    }

    /// Post `text` to the room. The message shows up once the feed echoes
    /// it back.
    pub async fn send(&mut self, text: &str) -> Result<Message, SyncError> {
        let user = self.ctx.require_user("chat")?;
        self.messages
            .create(
                &user,
                NewMessage {
                    content: text.to_string(),
                },
            )
            .await
    }

    pub fn is_mine(&self, message: &Message) -> bool {
        self.ctx
            .current_user()
            .map_or(false, |user| message.is_owned_by(&user))
    }

    /// Wait for the next message from the feed.
    pub async fn next_message(&mut self) -> Option<&Message> {
        let id = self.messages.next_change().await?;
        self.messages.get(id)
    }
}

#[async_trait]
impl Screen for ChatRoom {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn open(&mut self) -> Result<(), SyncError> {
        self.ctx.require_user("chat")?;
        open_list(&mut self.messages).await
    }

    fn close(&mut self) {
        self.messages.teardown();
    }

    async fn on_identity_change(&mut self, user: Option<&User>) -> Result<(), SyncError> {
        // A room that was never opened stays closed after login.
        if user.is_some() && self.messages.state() == LoadState::Idle {
            return Ok(());
        }
        self.messages.rebind(user).await
    }

    fn poll(&mut self) -> usize {
        self.messages.apply_pending()
    }
}
