use async_trait::async_trait;
use bytes::Bytes;

use agora_shared::constants::{BUCKET_POSTS, COLLECTION_POSTS};
use agora_shared::models::{NewPost, Post};
use agora_shared::{Query, RecordId, User};

use super::{ensure_owner, open_list, resubscribe, Screen};
use crate::context::AppContext;
use crate::error::SyncError;
use crate::sync_list::SyncList;

/// Photo gallery, newest first. Anyone can browse; posting and deleting
/// need a login.
pub struct Gallery {
    ctx: AppContext,
    posts: SyncList<Post>,
}

impl Gallery {
    pub fn new(ctx: AppContext) -> Self {
        let posts = ctx.list(Query::newest_first(COLLECTION_POSTS));
        Self { ctx, posts }
    }

    pub fn posts(&self) -> &[Post] {
        self.posts.items()
    }

    pub fn list(&self) -> &SyncList<Post> {
        &self.posts
    }

    pub async fn post_image(
        &mut self,
        file_name: &str,
        data: Bytes,
        caption: Option<String>,
    ) -> Result<Post, SyncError> {
        let user = self.ctx.require_user("upload photos")?;
        let uploads = self.ctx.uploads();
        let staged = uploads.stage(BUCKET_POSTS, &user, file_name, data)?;

        let post = uploads
            .publish(&mut self.posts, &user, staged, |image_url| NewPost {
                image_url,
                caption,
            })
            .await?;

        self.ctx.notices.success("Photo uploaded!");
        self.posts.refresh().await;
        Ok(post)
    }

    pub async fn delete_post(&mut self, id: RecordId) -> Result<(), SyncError> {
        let user = self.ctx.require_user("delete photos")?;
        ensure_owner(&self.ctx, &self.posts, id, &user, "delete this photo")?;
        self.posts.delete(id).await?;
        self.ctx.notices.success("Photo deleted");
        Ok(())
    }
}

#[async_trait]
impl Screen for Gallery {
    fn name(&self) -> &'static str {
        "gallery"
    }

    async fn open(&mut self) -> Result<(), SyncError> {
        open_list(&mut self.posts).await
    }

    fn close(&mut self) {
        self.posts.teardown();
    }

    async fn on_identity_change(&mut self, _user: Option<&User>) -> Result<(), SyncError> {
        resubscribe(&mut self.posts)
    }

    fn poll(&mut self) -> usize {
        self.posts.apply_pending()
    }
}
