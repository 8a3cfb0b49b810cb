//! Author persistence
//!
//! Authors are keyed by their external identifier, updated in place on
//! re-ingestion, and never deleted.

use anyhow::Result;
use sqlx::{Executor, Sqlite};
use std::collections::HashMap;

use crate::db::placeholders;

/// Author row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Author {
    pub author_id: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub home_page_url: Option<String>,
    pub bio: Option<String>,
    pub interaction_count: i64,
    pub ip_location: Option<String>,
    pub platform_uid: Option<String>,
    pub tags: Option<String>,
    pub fan_count: i64,
    pub follow_count: i64,
    pub gender: Option<String>,
}

/// Incoming author fields; `None` means "not present in this snapshot"
#[derive(Debug, Clone, Default)]
pub struct AuthorPatch {
    pub author_id: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub home_page_url: Option<String>,
    pub bio: Option<String>,
    pub interaction_count: Option<i64>,
    pub ip_location: Option<String>,
    pub platform_uid: Option<String>,
    pub tags: Option<String>,
    pub fan_count: Option<i64>,
    pub follow_count: Option<i64>,
    pub gender: Option<String>,
}

impl Author {
    /// Build a fresh row from an incoming snapshot
    pub fn from_patch(patch: AuthorPatch) -> Self {
        Self {
            author_id: patch.author_id,
            nickname: patch.nickname,
            avatar_url: patch.avatar_url,
            home_page_url: patch.home_page_url,
            bio: patch.bio,
            interaction_count: patch.interaction_count.unwrap_or(0),
            ip_location: patch.ip_location,
            platform_uid: patch.platform_uid,
            tags: patch.tags,
            fan_count: patch.fan_count.unwrap_or(0),
            follow_count: patch.follow_count.unwrap_or(0),
            gender: patch.gender,
        }
    }

    /// Merge incoming non-null fields over this row
    pub fn apply(&mut self, patch: &AuthorPatch) {
        if patch.nickname.is_some() {
            self.nickname = patch.nickname.clone();
        }
        if patch.avatar_url.is_some() {
            self.avatar_url = patch.avatar_url.clone();
        }
        if patch.home_page_url.is_some() {
            self.home_page_url = patch.home_page_url.clone();
        }
        if patch.bio.is_some() {
            self.bio = patch.bio.clone();
        }
        if let Some(count) = patch.interaction_count {
            self.interaction_count = count;
        }
        if patch.ip_location.is_some() {
            self.ip_location = patch.ip_location.clone();
        }
        if patch.platform_uid.is_some() {
            self.platform_uid = patch.platform_uid.clone();
        }
        if patch.tags.is_some() {
            self.tags = patch.tags.clone();
        }
        if let Some(count) = patch.fan_count {
            self.fan_count = count;
        }
        if let Some(count) = patch.follow_count {
            self.follow_count = count;
        }
        if patch.gender.is_some() {
            self.gender = patch.gender.clone();
        }
    }
}

/// Insert or update an author row
pub async fn upsert_author<'e, E>(db: E, author: &Author) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO authors (
            author_id, nickname, avatar_url, home_page_url, bio,
            interaction_count, ip_location, platform_uid, tags,
            fan_count, follow_count, gender, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(author_id) DO UPDATE SET
            nickname = excluded.nickname,
            avatar_url = excluded.avatar_url,
            home_page_url = excluded.home_page_url,
            bio = excluded.bio,
            interaction_count = excluded.interaction_count,
            ip_location = excluded.ip_location,
            platform_uid = excluded.platform_uid,
            tags = excluded.tags,
            fan_count = excluded.fan_count,
            follow_count = excluded.follow_count,
            gender = excluded.gender,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&author.author_id)
    .bind(&author.nickname)
    .bind(&author.avatar_url)
    .bind(&author.home_page_url)
    .bind(&author.bio)
    .bind(author.interaction_count)
    .bind(&author.ip_location)
    .bind(&author.platform_uid)
    .bind(&author.tags)
    .bind(author.fan_count)
    .bind(author.follow_count)
    .bind(&author.gender)
    .execute(db)
    .await?;

    Ok(())
}

/// Bulk existence lookup: one query for all ids referenced by a batch
pub async fn load_authors_by_ids<'e, E>(db: E, ids: &[String]) -> Result<HashMap<String, Author>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        r#"
        SELECT author_id, nickname, avatar_url, home_page_url, bio,
               interaction_count, ip_location, platform_uid, tags,
               fan_count, follow_count, gender
        FROM authors
        WHERE author_id IN ({})
        "#,
        placeholders(ids.len())
    );

    let mut query = sqlx::query_as::<_, Author>(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(db).await?;
    Ok(rows.into_iter().map(|a| (a.author_id.clone(), a)).collect())
}
