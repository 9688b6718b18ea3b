//! The student hub: doubts with their answers, and shared study materials.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;

use agora_shared::constants::{
    BUCKET_STUDY_MATERIALS, COLLECTION_DOUBTS, COLLECTION_DOUBT_ANSWERS,
    COLLECTION_STUDY_MATERIALS,
};
use agora_shared::models::{
    Doubt, DoubtAnswer, Draft, MaterialKind, NewAnswer, NewDoubt, NewMaterial, Record,
    StudyMaterial,
};
use agora_shared::{Query, RecordId, User};

use super::{ensure_owner, open_list, resubscribe, Screen};
use crate::context::AppContext;
use crate::error::SyncError;
use crate::sync_list::SyncList;

/// Headline counters shown above the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub doubts: usize,
    pub resolved: usize,
    pub materials: usize,
    /// Distinct authors across doubts and materials.
    pub contributors: usize,
}

/// A file attached to a shared material.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub data: Bytes,
}

pub struct StudentHub {
    ctx: AppContext,
    doubts: SyncList<Doubt>,
    materials: SyncList<StudyMaterial>,
    /// Opened on first expand, one list per doubt.
    answers: HashMap<RecordId, SyncList<DoubtAnswer>>,
    expanded: Option<RecordId>,
    subject_filter: Option<String>,
}

impl StudentHub {
    pub fn new(ctx: AppContext) -> Self {
        let doubts = ctx.list(Query::newest_first(COLLECTION_DOUBTS));
        let materials = ctx.list(Query::newest_first(COLLECTION_STUDY_MATERIALS));
        Self {
            ctx,
            doubts,
            materials,
            answers: HashMap::new(),
            expanded: None,
            subject_filter: None,
        }
    }

    pub fn doubts(&self) -> &[Doubt] {
        self.doubts.items()
    }

    pub fn materials(&self) -> &[StudyMaterial] {
        self.materials.items()
    }

    /// Answers of a doubt, if they have been loaded.
    pub fn answers(&self, doubt_id: RecordId) -> Option<&[DoubtAnswer]> {
        self.answers.get(&doubt_id).map(SyncList::items)
    }

    pub fn expanded(&self) -> Option<RecordId> {
        self.expanded
    }

    // -- Subject filter --

    /// `None` (or "all") shows every subject.
    pub fn set_subject_filter(&mut self, subject: Option<&str>) {
        self.subject_filter = subject
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            .map(str::to_string);
    }

    pub fn subject_filter(&self) -> Option<&str> {
        self.subject_filter.as_deref()
    }

    pub fn filtered_doubts(&self) -> Vec<&Doubt> {
        self.doubts
            .items()
            .iter()
            .filter(|d| match &self.subject_filter {
                Some(subject) => d.subject.as_deref() == Some(subject.as_str()),
                None => true,
            })
            .collect()
    }

    pub fn filtered_materials(&self) -> Vec<&StudyMaterial> {
        self.materials
            .items()
            .iter()
            .filter(|m| match &self.subject_filter {
                Some(subject) => &m.subject == subject,
                None => true,
            })
            .collect()
    }

    pub fn stats(&self) -> HubStats {
        let contributors: HashSet<_> = self
            .doubts
            .items()
            .iter()
            .map(Record::author)
            .chain(self.materials.items().iter().map(Record::author))
            .collect();
        HubStats {
            doubts: self.doubts.len(),
            resolved: self.doubts.items().iter().filter(|d| d.is_resolved).count(),
            materials: self.materials.len(),
            contributors: contributors.len(),
        }
    }

    // -- Doubts --

    pub async fn ask(
        &mut self,
        title: &str,
        description: &str,
        subject: Option<&str>,
    ) -> Result<Doubt, SyncError> {
        let user = self.ctx.require_user("post a doubt")?;
        let doubt = self
            .doubts
            .create(
                &user,
                NewDoubt {
                    title: title.to_string(),
                    description: description.to_string(),
                    subject: subject.map(str::to_string),
                },
            )
            .await?;
        self.ctx.notices.success("Doubt posted successfully!");
        self.doubts.refresh().await;
        Ok(doubt)
    }

    /// Expand a doubt, loading its answers the first time; collapse it if
    /// it is already expanded. Returns whether the doubt is now expanded.
    pub async fn toggle_doubt(&mut self, doubt_id: RecordId) -> Result<bool, SyncError> {
        if self.expanded == Some(doubt_id) {
            self.expanded = None;
            return Ok(false);
        }
        self.expanded = Some(doubt_id);
        self.answer_list(doubt_id).await?;
        Ok(true)
    }

    pub async fn mark_resolved(&mut self, doubt_id: RecordId) -> Result<(), SyncError> {
        let user = self.ctx.require_user("resolve doubts")?;
        ensure_owner(&self.ctx, &self.doubts, doubt_id, &user, "resolve this doubt")?;
        if self.doubts.get(doubt_id).map_or(false, |d| d.is_resolved) {
            return Ok(());
        }
        self.doubts
            .update(doubt_id, json!({ "is_resolved": true }))
            .await?;
        self.ctx.notices.success("Doubt marked as resolved!");
        Ok(())
    }

    /// Delete a doubt; its answers go with it.
    pub async fn delete_doubt(&mut self, doubt_id: RecordId) -> Result<(), SyncError> {
        let user = self.ctx.require_user("delete doubts")?;
        ensure_owner(&self.ctx, &self.doubts, doubt_id, &user, "delete this doubt")?;
        self.doubts.delete(doubt_id).await?;
        self.answers.remove(&doubt_id);
        if self.expanded == Some(doubt_id) {
            self.expanded = None;
        }
        self.ctx.notices.success("Doubt deleted");
        Ok(())
    }

    // -- Answers --

    pub async fn answer(
        &mut self,
        doubt_id: RecordId,
        content: &str,
    ) -> Result<DoubtAnswer, SyncError> {
        let user = self.ctx.require_user("answer")?;
        let list = self.answer_list(doubt_id).await?;
        let answer = list
            .create(
                &user,
                NewAnswer {
                    doubt_id,
                    content: content.to_string(),
                },
            )
            .await?;
        list.refresh().await;
        self.ctx.notices.success("Answer posted!");
        Ok(answer)
    }

    /// Mark an answer as the accepted one. Only the doubt's author may.
    pub async fn accept_answer(
        &mut self,
        doubt_id: RecordId,
        answer_id: RecordId,
    ) -> Result<(), SyncError> {
        let user = self.ctx.require_user("accept answers")?;
        ensure_owner(&self.ctx, &self.doubts, doubt_id, &user, "accept an answer")?;
        let list = self.answer_list(doubt_id).await?;
        list.update(answer_id, json!({ "is_accepted": true })).await?;
        self.ctx.notices.success("Answer accepted");
        Ok(())
    }

    async fn answer_list(
        &mut self,
        doubt_id: RecordId,
    ) -> Result<&mut SyncList<DoubtAnswer>, SyncError> {
        match self.answers.entry(doubt_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let query = Query::oldest_first(COLLECTION_DOUBT_ANSWERS)
                    .filter_eq("doubt_id", doubt_id.to_string());
                let mut list = self.ctx.list(query);
                open_list(&mut list).await?;
                tracing::debug!(%doubt_id, count = list.len(), "Answers loaded");
                Ok(entry.insert(list))
            }
        }
    }

    // -- Materials --

    /// Share a study material, uploading `file` first when one is given.
    pub async fn share_material(
        &mut self,
        title: &str,
        description: Option<&str>,
        subject: &str,
        kind: MaterialKind,
        file: Option<Attachment>,
    ) -> Result<StudyMaterial, SyncError> {
        let user = self.ctx.require_user("upload")?;
        let draft = NewMaterial {
            title: title.to_string(),
            description: description.map(str::to_string),
            subject: subject.to_string(),
            material_type: kind,
            file_url: None,
        };
        if let Err(e) = draft.validate() {
            self.ctx.notices.error("Please fill title and subject", &e);
            return Err(e.into());
        }

        let material = match file {
            Some(Attachment { file_name, data }) => {
                let uploads = self.ctx.uploads();
                let staged = uploads.stage(BUCKET_STUDY_MATERIALS, &user, &file_name, data)?;
                uploads
                    .publish(&mut self.materials, &user, staged, |url| NewMaterial {
                        file_url: Some(url),
                        ..draft
                    })
                    .await?
            }
            None => self.materials.create(&user, draft).await?,
        };

        self.ctx.notices.success("Study material shared!");
        self.materials.refresh().await;
        Ok(material)
    }
}

#[async_trait]
impl Screen for StudentHub {
    fn name(&self) -> &'static str {
        "hub"
    }

    async fn open(&mut self) -> Result<(), SyncError> {
        let doubts = open_list(&mut self.doubts).await;
        let materials = open_list(&mut self.materials).await;
        doubts.and(materials)
    }

    fn close(&mut self) {
        self.doubts.teardown();
        self.materials.teardown();
        // Dropping the answer lists releases their subscriptions.
        self.answers.clear();
        self.expanded = None;
    }

    async fn on_identity_change(&mut self, _user: Option<&User>) -> Result<(), SyncError> {
        let mut result = resubscribe(&mut self.doubts).and(resubscribe(&mut self.materials));
        for list in self.answers.values_mut() {
            result = result.and(resubscribe(list));
        }
        result
    }

    fn poll(&mut self) -> usize {
        self.doubts.apply_pending()
            + self.materials.apply_pending()
            + self
                .answers
                .values_mut()
                .map(SyncList::apply_pending)
                .sum::<usize>()
    }
}
