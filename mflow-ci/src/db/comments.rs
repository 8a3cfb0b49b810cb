//! Comment and mention persistence
//!
//! Comments form a self-referential tree via `parent_comment_id`;
//! `note_id` is stored un-validated so comment batches can arrive before
//! (or without) their note. Mentions are a join table unique per
//! (comment, mentioned user) pair.

use anyhow::Result;
use sqlx::{Executor, Sqlite};
use std::collections::HashMap;

use crate::db::placeholders;

/// Comment row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub comment_id: String,
    pub note_id: String,
    pub parent_comment_id: Option<String>,
    pub user_id: String,
    pub user_nickname: Option<String>,
    pub user_avatar_url: Option<String>,
    pub user_home_page_url: Option<String>,
    pub content: Option<String>,
    pub like_count: i64,
    pub sub_comment_count: i64,
    pub created_time: Option<String>,
    pub liked: bool,
    pub show_tags: Option<String>,
    pub sub_comment_cursor: Option<String>,
    pub sub_comment_has_more: bool,
}

/// Incoming comment fields; `None` means "not present in this snapshot"
#[derive(Debug, Clone, Default)]
pub struct CommentPatch {
    pub comment_id: String,
    pub note_id: String,
    pub parent_comment_id: Option<String>,
    pub user_id: String,
    pub user_nickname: Option<String>,
    pub user_avatar_url: Option<String>,
    pub user_home_page_url: Option<String>,
    pub content: Option<String>,
    pub like_count: Option<i64>,
    pub sub_comment_count: Option<i64>,
    pub created_time: Option<String>,
    pub liked: Option<bool>,
    pub show_tags: Option<String>,
    pub sub_comment_cursor: Option<String>,
    pub sub_comment_has_more: Option<bool>,
}

/// A user mentioned by a comment
#[derive(Debug, Clone)]
pub struct CommentMention {
    pub comment_id: String,
    pub user_id: String,
    pub user_nickname: Option<String>,
    pub user_home_page_url: Option<String>,
}

impl Comment {
    /// Build a fresh row from an incoming snapshot
    pub fn from_patch(patch: CommentPatch) -> Self {
        Self {
            comment_id: patch.comment_id,
            note_id: patch.note_id,
            parent_comment_id: patch.parent_comment_id,
            user_id: patch.user_id,
            user_nickname: patch.user_nickname,
            user_avatar_url: patch.user_avatar_url,
            user_home_page_url: patch.user_home_page_url,
            content: patch.content,
            like_count: patch.like_count.unwrap_or(0),
            sub_comment_count: patch.sub_comment_count.unwrap_or(0),
            created_time: patch.created_time,
            liked: patch.liked.unwrap_or(false),
            show_tags: patch.show_tags,
            sub_comment_cursor: patch.sub_comment_cursor,
            sub_comment_has_more: patch.sub_comment_has_more.unwrap_or(false),
        }
    }

    /// Merge incoming non-null fields over this row
    pub fn apply(&mut self, patch: &CommentPatch) {
        if !patch.note_id.is_empty() {
            self.note_id = patch.note_id.clone();
        }
        if patch.parent_comment_id.is_some() {
            self.parent_comment_id = patch.parent_comment_id.clone();
        }
        if !patch.user_id.is_empty() {
            self.user_id = patch.user_id.clone();
        }
        if patch.user_nickname.is_some() {
            self.user_nickname = patch.user_nickname.clone();
        }
        if patch.user_avatar_url.is_some() {
            self.user_avatar_url = patch.user_avatar_url.clone();
        }
        if patch.user_home_page_url.is_some() {
            self.user_home_page_url = patch.user_home_page_url.clone();
        }
        if patch.content.is_some() {
            self.content = patch.content.clone();
        }
        if let Some(count) = patch.like_count {
            self.like_count = count;
        }
        if let Some(count) = patch.sub_comment_count {
            self.sub_comment_count = count;
        }
        if patch.created_time.is_some() {
            self.created_time = patch.created_time.clone();
        }
        if let Some(liked) = patch.liked {
            self.liked = liked;
        }
        if patch.show_tags.is_some() {
            self.show_tags = patch.show_tags.clone();
        }
        if patch.sub_comment_cursor.is_some() {
            self.sub_comment_cursor = patch.sub_comment_cursor.clone();
        }
        if let Some(has_more) = patch.sub_comment_has_more {
            self.sub_comment_has_more = has_more;
        }
    }
}

/// Insert or update a comment row
pub async fn upsert_comment<'e, E>(db: E, comment: &Comment) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO comments (
            comment_id, note_id, parent_comment_id, user_id,
            user_nickname, user_avatar_url, user_home_page_url, content,
            like_count, sub_comment_count, created_time, liked,
            show_tags, sub_comment_cursor, sub_comment_has_more,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(comment_id) DO UPDATE SET
            note_id = excluded.note_id,
            parent_comment_id = excluded.parent_comment_id,
            user_id = excluded.user_id,
            user_nickname = excluded.user_nickname,
            user_avatar_url = excluded.user_avatar_url,
            user_home_page_url = excluded.user_home_page_url,
            content = excluded.content,
            like_count = excluded.like_count,
            sub_comment_count = excluded.sub_comment_count,
            created_time = excluded.created_time,
            liked = excluded.liked,
            show_tags = excluded.show_tags,
            sub_comment_cursor = excluded.sub_comment_cursor,
            sub_comment_has_more = excluded.sub_comment_has_more,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&comment.comment_id)
    .bind(&comment.note_id)
    .bind(&comment.parent_comment_id)
    .bind(&comment.user_id)
    .bind(&comment.user_nickname)
    .bind(&comment.user_avatar_url)
    .bind(&comment.user_home_page_url)
    .bind(&comment.content)
    .bind(comment.like_count)
    .bind(comment.sub_comment_count)
    .bind(&comment.created_time)
    .bind(comment.liked)
    .bind(&comment.show_tags)
    .bind(&comment.sub_comment_cursor)
    .bind(comment.sub_comment_has_more)
    .execute(db)
    .await?;

    Ok(())
}

/// Insert or refresh a mention row (unique per comment/user pair)
pub async fn upsert_mention<'e, E>(db: E, mention: &CommentMention) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO comment_mentions (
            comment_id, user_id, user_nickname, user_home_page_url, created_at
        ) VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(comment_id, user_id) DO UPDATE SET
            user_nickname = excluded.user_nickname,
            user_home_page_url = excluded.user_home_page_url
        "#,
    )
    .bind(&mention.comment_id)
    .bind(&mention.user_id)
    .bind(&mention.user_nickname)
    .bind(&mention.user_home_page_url)
    .execute(db)
    .await?;

    Ok(())
}

/// Bulk existence lookup: one query for all ids referenced by a batch
pub async fn load_comments_by_ids<'e, E>(db: E, ids: &[String]) -> Result<HashMap<String, Comment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        r#"
        SELECT comment_id, note_id, parent_comment_id, user_id,
               user_nickname, user_avatar_url, user_home_page_url, content,
               like_count, sub_comment_count, created_time, liked,
               show_tags, sub_comment_cursor, sub_comment_has_more
        FROM comments
        WHERE comment_id IN ({})
        "#,
        placeholders(ids.len())
    );

    let mut query = sqlx::query_as::<_, Comment>(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(db).await?;
    Ok(rows.into_iter().map(|c| (c.comment_id.clone(), c)).collect())
}
