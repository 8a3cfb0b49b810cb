//! Note detail persistence
//!
//! 1:1 extension of a note, sharing its identifier as primary key.
//! Populated only by detail-fetch ingestion.

use anyhow::Result;
use sqlx::{Executor, Sqlite};

/// Note detail row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NoteDetail {
    pub note_id: String,
    pub url: Option<String>,
    pub author_id: Option<String>,
    pub publish_time: Option<String>,
    pub last_updated_time: Option<String>,
    pub model_type: Option<String>,
    pub card_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub comment_count: i64,
    pub liked_count: i64,
    pub share_count: i64,
    pub collected_count: i64,
    pub video_id: Option<String>,
    pub video_url_h264: Option<String>,
    pub video_url_h265: Option<String>,
    pub duration_secs: Option<i64>,
    pub image_list: Option<String>,
    pub tags: Option<String>,
    pub liked: bool,
    pub collected: bool,
}

/// Incoming detail fields; `None` means "not present in this snapshot"
#[derive(Debug, Clone, Default)]
pub struct NoteDetailPatch {
    pub note_id: String,
    pub url: Option<String>,
    pub author_id: Option<String>,
    pub publish_time: Option<String>,
    pub last_updated_time: Option<String>,
    pub model_type: Option<String>,
    pub card_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub comment_count: Option<i64>,
    pub liked_count: Option<i64>,
    pub share_count: Option<i64>,
    pub collected_count: Option<i64>,
    pub video_id: Option<String>,
    pub video_url_h264: Option<String>,
    pub video_url_h265: Option<String>,
    pub duration_secs: Option<i64>,
    pub image_list: Option<String>,
    pub tags: Option<String>,
    pub liked: Option<bool>,
    pub collected: Option<bool>,
}

impl NoteDetail {
    /// Build a fresh row from an incoming snapshot
    pub fn from_patch(patch: NoteDetailPatch) -> Self {
        Self {
            note_id: patch.note_id,
            url: patch.url,
            author_id: patch.author_id,
            publish_time: patch.publish_time,
            last_updated_time: patch.last_updated_time,
            model_type: patch.model_type,
            card_type: patch.card_type,
            title: patch.title,
            description: patch.description,
            comment_count: patch.comment_count.unwrap_or(0),
            liked_count: patch.liked_count.unwrap_or(0),
            share_count: patch.share_count.unwrap_or(0),
            collected_count: patch.collected_count.unwrap_or(0),
            video_id: patch.video_id,
            video_url_h264: patch.video_url_h264,
            video_url_h265: patch.video_url_h265,
            duration_secs: patch.duration_secs,
            image_list: patch.image_list,
            tags: patch.tags,
            liked: patch.liked.unwrap_or(false),
            collected: patch.collected.unwrap_or(false),
        }
    }

    /// Merge incoming non-null fields over this row
    pub fn apply(&mut self, patch: &NoteDetailPatch) {
        if patch.url.is_some() {
            self.url = patch.url.clone();
        }
        if patch.author_id.is_some() {
            self.author_id = patch.author_id.clone();
        }
        if patch.publish_time.is_some() {
            self.publish_time = patch.publish_time.clone();
        }
        if patch.last_updated_time.is_some() {
            self.last_updated_time = patch.last_updated_time.clone();
        }
        if patch.model_type.is_some() {
            self.model_type = patch.model_type.clone();
        }
        if patch.card_type.is_some() {
            self.card_type = patch.card_type.clone();
        }
        if patch.title.is_some() {
            self.title = patch.title.clone();
        }
        if patch.description.is_some() {
            self.description = patch.description.clone();
        }
        if let Some(count) = patch.comment_count {
            self.comment_count = count;
        }
        if let Some(count) = patch.liked_count {
            self.liked_count = count;
        }
        if let Some(count) = patch.share_count {
            self.share_count = count;
        }
        if let Some(count) = patch.collected_count {
            self.collected_count = count;
        }
        if patch.video_id.is_some() {
            self.video_id = patch.video_id.clone();
        }
        if patch.video_url_h264.is_some() {
            self.video_url_h264 = patch.video_url_h264.clone();
        }
        if patch.video_url_h265.is_some() {
            self.video_url_h265 = patch.video_url_h265.clone();
        }
        if patch.duration_secs.is_some() {
            self.duration_secs = patch.duration_secs;
        }
        if patch.image_list.is_some() {
            self.image_list = patch.image_list.clone();
        }
        if patch.tags.is_some() {
            self.tags = patch.tags.clone();
        }
        if let Some(liked) = patch.liked {
            self.liked = liked;
        }
        if let Some(collected) = patch.collected {
            self.collected = collected;
        }
    }
}

/// Insert or update a note detail row
pub async fn upsert_note_detail<'e, E>(db: E, detail: &NoteDetail) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO note_details (
            note_id, url, author_id, publish_time, last_updated_time,
            model_type, card_type, title, description,
            comment_count, liked_count, share_count, collected_count,
            video_id, video_url_h264, video_url_h265, duration_secs,
            image_list, tags, liked, collected, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(note_id) DO UPDATE SET
            url = excluded.url,
            author_id = excluded.author_id,
            publish_time = excluded.publish_time,
            last_updated_time = excluded.last_updated_time,
            model_type = excluded.model_type,
            card_type = excluded.card_type,
            title = excluded.title,
            description = excluded.description,
            comment_count = excluded.comment_count,
            liked_count = excluded.liked_count,
            share_count = excluded.share_count,
            collected_count = excluded.collected_count,
            video_id = excluded.video_id,
            video_url_h264 = excluded.video_url_h264,
            video_url_h265 = excluded.video_url_h265,
            duration_secs = excluded.duration_secs,
            image_list = excluded.image_list,
            tags = excluded.tags,
            liked = excluded.liked,
            collected = excluded.collected,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&detail.note_id)
    .bind(&detail.url)
    .bind(&detail.author_id)
    .bind(&detail.publish_time)
    .bind(&detail.last_updated_time)
    .bind(&detail.model_type)
    .bind(&detail.card_type)
    .bind(&detail.title)
    .bind(&detail.description)
    .bind(detail.comment_count)
    .bind(detail.liked_count)
    .bind(detail.share_count)
    .bind(detail.collected_count)
    .bind(&detail.video_id)
    .bind(&detail.video_url_h264)
    .bind(&detail.video_url_h265)
    .bind(detail.duration_secs)
    .bind(&detail.image_list)
    .bind(&detail.tags)
    .bind(detail.liked)
    .bind(detail.collected)
    .execute(db)
    .await?;

    Ok(())
}

/// Load a detail row by note id
pub async fn load_note_detail<'e, E>(db: E, note_id: &str) -> Result<Option<NoteDetail>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, NoteDetail>(
        r#"
        SELECT note_id, url, author_id, publish_time, last_updated_time,
               model_type, card_type, title, description,
               comment_count, liked_count, share_count, collected_count,
               video_id, video_url_h264, video_url_h265, duration_secs,
               image_list, tags, liked, collected
        FROM note_details
        WHERE note_id = ?
        "#,
    )
    .bind(note_id)
    .fetch_optional(db)
    .await?;

    Ok(row)
}
