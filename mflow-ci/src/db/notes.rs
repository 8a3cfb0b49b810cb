//! Note persistence
//!
//! Notes are keyed by their external identifier and carry denormalized
//! author display fields (cached copies for read efficiency).

use anyhow::Result;
use sqlx::{Executor, Sqlite};
use std::collections::HashMap;

use crate::db::placeholders;

/// Note row (summary fields; long-form fields live in `note_details`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Note {
    pub note_id: String,
    pub author_id: String,
    pub url: Option<String>,
    pub access_token: Option<String>,
    pub title: Option<String>,
    pub cover_url_preview: Option<String>,
    pub cover_url_default: Option<String>,
    pub cover_width: Option<i64>,
    pub cover_height: Option<i64>,
    pub liked_count: i64,
    pub liked: bool,
    pub card_type: Option<String>,
    pub model_type: Option<String>,
    pub author_nickname: Option<String>,
    pub author_avatar_url: Option<String>,
    pub author_home_page_url: Option<String>,
}

/// Incoming note fields; `None` means "not present in this snapshot"
#[derive(Debug, Clone, Default)]
pub struct NotePatch {
    pub note_id: String,
    pub author_id: String,
    pub url: Option<String>,
    pub access_token: Option<String>,
    pub title: Option<String>,
    pub cover_url_preview: Option<String>,
    pub cover_url_default: Option<String>,
    pub cover_width: Option<i64>,
    pub cover_height: Option<i64>,
    pub liked_count: Option<i64>,
    pub liked: Option<bool>,
    pub card_type: Option<String>,
    pub model_type: Option<String>,
    pub author_nickname: Option<String>,
    pub author_avatar_url: Option<String>,
    pub author_home_page_url: Option<String>,
}

impl Note {
    /// Build a fresh row from an incoming snapshot
    pub fn from_patch(patch: NotePatch) -> Self {
        Self {
            note_id: patch.note_id,
            author_id: patch.author_id,
            url: patch.url,
            access_token: patch.access_token,
            title: patch.title,
            cover_url_preview: patch.cover_url_preview,
            cover_url_default: patch.cover_url_default,
            cover_width: patch.cover_width,
            cover_height: patch.cover_height,
            liked_count: patch.liked_count.unwrap_or(0),
            liked: patch.liked.unwrap_or(false),
            card_type: patch.card_type,
            model_type: patch.model_type,
            author_nickname: patch.author_nickname,
            author_avatar_url: patch.author_avatar_url,
            author_home_page_url: patch.author_home_page_url,
        }
    }

    /// Merge incoming non-null fields over this row
    pub fn apply(&mut self, patch: &NotePatch) {
        if !patch.author_id.is_empty() {
            self.author_id = patch.author_id.clone();
        }
        if patch.url.is_some() {
            self.url = patch.url.clone();
        }
        if patch.access_token.is_some() {
            self.access_token = patch.access_token.clone();
        }
        if patch.title.is_some() {
            self.title = patch.title.clone();
        }
        if patch.cover_url_preview.is_some() {
            self.cover_url_preview = patch.cover_url_preview.clone();
        }
        if patch.cover_url_default.is_some() {
            self.cover_url_default = patch.cover_url_default.clone();
        }
        if patch.cover_width.is_some() {
            self.cover_width = patch.cover_width;
        }
        if patch.cover_height.is_some() {
            self.cover_height = patch.cover_height;
        }
        if let Some(count) = patch.liked_count {
            self.liked_count = count;
        }
        if let Some(liked) = patch.liked {
            self.liked = liked;
        }
        if patch.card_type.is_some() {
            self.card_type = patch.card_type.clone();
        }
        if patch.model_type.is_some() {
            self.model_type = patch.model_type.clone();
        }
        if patch.author_nickname.is_some() {
            self.author_nickname = patch.author_nickname.clone();
        }
        if patch.author_avatar_url.is_some() {
            self.author_avatar_url = patch.author_avatar_url.clone();
        }
        if patch.author_home_page_url.is_some() {
            self.author_home_page_url = patch.author_home_page_url.clone();
        }
    }
}

/// Insert or update a note row
pub async fn upsert_note<'e, E>(db: E, note: &Note) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO notes (
            note_id, author_id, url, access_token, title,
            cover_url_preview, cover_url_default, cover_width, cover_height,
            liked_count, liked, card_type, model_type,
            author_nickname, author_avatar_url, author_home_page_url,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(note_id) DO UPDATE SET
            author_id = excluded.author_id,
            url = excluded.url,
            access_token = excluded.access_token,
            title = excluded.title,
            cover_url_preview = excluded.cover_url_preview,
            cover_url_default = excluded.cover_url_default,
            cover_width = excluded.cover_width,
            cover_height = excluded.cover_height,
            liked_count = excluded.liked_count,
            liked = excluded.liked,
            card_type = excluded.card_type,
            model_type = excluded.model_type,
            author_nickname = excluded.author_nickname,
            author_avatar_url = excluded.author_avatar_url,
            author_home_page_url = excluded.author_home_page_url,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&note.note_id)
    .bind(&note.author_id)
    .bind(&note.url)
    .bind(&note.access_token)
    .bind(&note.title)
    .bind(&note.cover_url_preview)
    .bind(&note.cover_url_default)
    .bind(note.cover_width)
    .bind(note.cover_height)
    .bind(note.liked_count)
    .bind(note.liked)
    .bind(&note.card_type)
    .bind(&note.model_type)
    .bind(&note.author_nickname)
    .bind(&note.author_avatar_url)
    .bind(&note.author_home_page_url)
    .execute(db)
    .await?;

    Ok(())
}

/// Bulk existence lookup: one query for all ids referenced by a batch
pub async fn load_notes_by_ids<'e, E>(db: E, ids: &[String]) -> Result<HashMap<String, Note>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        r#"
        SELECT note_id, author_id, url, access_token, title,
               cover_url_preview, cover_url_default, cover_width, cover_height,
               liked_count, liked, card_type, model_type,
               author_nickname, author_avatar_url, author_home_page_url
        FROM notes
        WHERE note_id IN ({})
        "#,
        placeholders(ids.len())
    );

    let mut query = sqlx::query_as::<_, Note>(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(db).await?;
    Ok(rows.into_iter().map(|n| (n.note_id.clone(), n)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::authors::{upsert_author, Author, AuthorPatch};

    async fn seed_author(pool: &sqlx::SqlitePool, id: &str) {
        let author = Author::from_patch(AuthorPatch {
            author_id: id.to_string(),
            ..Default::default()
        });
        upsert_author(pool, &author).await.expect("seed author");
    }

    #[tokio::test]
    async fn upsert_then_load() {
        let pool = crate::db::test_pool().await;
        seed_author(&pool, "author-1").await;

        let note = Note::from_patch(NotePatch {
            note_id: "note-1".to_string(),
            author_id: "author-1".to_string(),
            title: Some("First sighting".to_string()),
            liked_count: Some(42),
            ..Default::default()
        });
        upsert_note(&pool, &note).await.expect("upsert failed");

        let loaded = load_notes_by_ids(&pool, &["note-1".to_string()])
            .await
            .expect("load failed");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["note-1"].title.as_deref(), Some("First sighting"));
        assert_eq!(loaded["note-1"].liked_count, 42);
        assert!(!loaded["note-1"].liked);
    }

    #[tokio::test]
    async fn missing_author_is_rejected() {
        let pool = crate::db::test_pool().await;

        let note = Note::from_patch(NotePatch {
            note_id: "note-orphan".to_string(),
            author_id: "nobody".to_string(),
            ..Default::default()
        });

        // notes.author_id carries a foreign key; an unstaged author must fail
        assert!(upsert_note(&pool, &note).await.is_err());
    }
}
