//! User-visible notices (toasts).
//!
//! Controllers never let a failure escape silently: alongside the returned
//! error they emit a [`Notice`] that the presentation layer shows.

use std::fmt::Display;

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

/// Sending half of the notice channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notices {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only logs.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn success(&self, title: impl Into<String>) {
        self.emit(Notice {
            level: NoticeLevel::Success,
            title: title.into(),
            description: None,
        });
    }

    pub fn error(&self, title: impl Into<String>, cause: &dyn Display) {
        self.emit(Notice {
            level: NoticeLevel::Error,
            title: title.into(),
            description: Some(cause.to_string()),
        });
    }

    fn emit(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::debug!(title = %notice.title, "Notice"),
            NoticeLevel::Error => tracing::warn!(
                title = %notice.title,
                description = notice.description.as_deref().unwrap_or_default(),
                "Error notice"
            ),
        }
        if let Some(tx) = &self.tx {
            if tx.send(notice).is_err() {
                tracing::debug!("Notice receiver dropped");
            }
        }
    }
}
