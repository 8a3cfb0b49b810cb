//! Keyword group persistence
//!
//! A group's uniqueness key is the canonical encoding of its keyword set
//! (deduplicated, sorted, JSON-encoded), so any permutation of the same
//! keywords resolves to the same group.

use anyhow::Result;
use sqlx::{Executor, Sqlite};

/// Keyword group row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordGroup {
    pub group_id: i64,
    pub group_name: String,
    pub keywords: String,
}

/// Canonical uniqueness key for a keyword set.
///
/// Empty or all-blank input degrades to the `default` keyword so the key
/// is never empty.
pub fn canonical_keyword_key(keywords: &[String]) -> String {
    let mut cleaned: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    if cleaned.is_empty() {
        tracing::warn!("Empty keyword list, falling back to 'default'");
        cleaned.push("default".to_string());
    }

    cleaned.sort();
    cleaned.dedup();

    serde_json::to_string(&cleaned).unwrap_or_else(|_| "[\"default\"]".to_string())
}

/// Exact-match lookup by canonical key
pub async fn find_group_by_keywords<'e, E>(db: E, canonical_key: &str) -> Result<Option<KeywordGroup>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, KeywordGroup>(
        "SELECT group_id, group_name, keywords FROM keyword_groups WHERE keywords = ?",
    )
    .bind(canonical_key)
    .fetch_optional(db)
    .await?;

    Ok(row)
}

/// Insert a new group, returning its generated id
pub async fn insert_group<'e, E>(db: E, group_name: &str, canonical_key: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO keyword_groups (group_name, keywords, created_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(group_name)
    .bind(canonical_key)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Associate a note with a group; refreshes the retrieval timestamp when
/// the pair already exists.
pub async fn upsert_membership<'e, E>(db: E, group_id: i64, note_id: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO keyword_group_notes (group_id, note_id, retrieved_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(group_id, note_id) DO UPDATE SET
            retrieved_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(group_id)
    .bind(note_id)
    .execute(db)
    .await?;

    Ok(())
}
