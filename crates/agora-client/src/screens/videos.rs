use async_trait::async_trait;
use bytes::Bytes;

use agora_shared::constants::{BUCKET_VIDEOS, COLLECTION_VIDEOS};
use agora_shared::models::{NewVideo, Video};
use agora_shared::{Query, RecordId, User, ValidationError};

use super::{ensure_owner, open_list, resubscribe, Screen};
use crate::context::AppContext;
use crate::error::SyncError;
use crate::sync_list::SyncList;

pub struct VideoWall {
    ctx: AppContext,
    videos: SyncList<Video>,
}

impl VideoWall {
    pub fn new(ctx: AppContext) -> Self {
        let videos = ctx.list(Query::newest_first(COLLECTION_VIDEOS));
        Self { ctx, videos }
    }

    pub fn videos(&self) -> &[Video] {
        self.videos.items()
    }

    pub fn list(&self) -> &SyncList<Video> {
        &self.videos
    }

    /// Upload a clip. The title is checked before anything is sent.
    pub async fn upload_video(
        &mut self,
        file_name: &str,
        data: Bytes,
        title: &str,
    ) -> Result<Video, SyncError> {
        let user = self.ctx.require_user("upload videos")?;
        if title.trim().is_empty() {
            let err = ValidationError::MissingField("title");
            self.ctx.notices.error("Please add a title", &err);
            return Err(err.into());
        }

        let uploads = self.ctx.uploads();
        let staged = uploads.stage(BUCKET_VIDEOS, &user, file_name, data)?;
        let title = title.to_string();
        let video = uploads
            .publish(&mut self.videos, &user, staged, |video_url| NewVideo {
                video_url,
                title,
            })
            .await?;

        self.ctx.notices.success("Video uploaded!");
        self.videos.refresh().await;
        Ok(video)
    }

    pub async fn delete_video(&mut self, id: RecordId) -> Result<(), SyncError> {
        let user = self.ctx.require_user("delete videos")?;
        ensure_owner(&self.ctx, &self.videos, id, &user, "delete this video")?;
        self.videos.delete(id).await?;
        self.ctx.notices.success("Video deleted");
        Ok(())
    }
}

#[async_trait]
impl Screen for VideoWall {
    fn name(&self) -> &'static str {
        "videos"
    }

    async fn open(&mut self) -> Result<(), SyncError> {
        open_list(&mut self.videos).await
    }

    fn close(&mut self) {
        self.videos.teardown();
    }

    async fn on_identity_change(&mut self, _user: Option<&User>) -> Result<(), SyncError> {
        resubscribe(&mut self.videos)
    }

    fn poll(&mut self) -> usize {
        self.videos.apply_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::ClientConfig;
    use crate::events::{NoticeLevel, Notices};
    use crate::fake::FakeBackend;

    #[tokio::test]
    async fn missing_title_stops_before_upload() {
        let backend = Arc::new(FakeBackend::new());
        backend.sign_in("v@example.org");
        let (notices, mut rx) = Notices::channel();
        let mut wall = VideoWall::new(AppContext::new(
            backend.clone(),
            notices,
            ClientConfig::default(),
        ));

        let err = wall
            .upload_video("clip.mp4", Bytes::from_static(b"mp4"), "  ")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::MissingField("title"))
        ));
        assert_eq!(backend.total_calls(), 0);
        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn upload_then_delete_own_video() {
        let backend = Arc::new(FakeBackend::new());
        backend.sign_in("v@example.org");
        let mut wall = VideoWall::new(AppContext::new(
            backend.clone(),
            Notices::discard(),
            ClientConfig::default(),
        ));
        wall.open().await.unwrap();

        let video = wall
            .upload_video("Clip.MP4", Bytes::from_static(b"mp4"), "Lab demo")
            .await
            .unwrap();
        assert_eq!(video.title, "Lab demo");
        assert!(video.video_url.ends_with(".mp4"));
        assert_eq!(wall.videos().len(), 1);

        wall.delete_video(video.id).await.unwrap();
        assert!(wall.videos().is_empty());
    }
}
