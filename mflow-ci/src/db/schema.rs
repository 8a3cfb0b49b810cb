//! Table definitions for the content store
//!
//! All statements are idempotent (`CREATE TABLE IF NOT EXISTS`) so the
//! schema can be re-applied on every startup. The ingestion pipeline only
//! ever inserts and updates; nothing here is dropped or deleted.

use anyhow::Result;
use sqlx::SqlitePool;

/// Create all content tables if they don't exist
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            author_id TEXT PRIMARY KEY,
            nickname TEXT,
            avatar_url TEXT,
            home_page_url TEXT,
            bio TEXT,
            interaction_count INTEGER NOT NULL DEFAULT 0,
            ip_location TEXT,
            platform_uid TEXT,
            tags TEXT,
            fan_count INTEGER NOT NULL DEFAULT 0,
            follow_count INTEGER NOT NULL DEFAULT 0,
            gender TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            note_id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL REFERENCES authors(author_id),
            url TEXT,
            access_token TEXT,
            title TEXT,
            cover_url_preview TEXT,
            cover_url_default TEXT,
            cover_width INTEGER,
            cover_height INTEGER,
            liked_count INTEGER NOT NULL DEFAULT 0,
            liked INTEGER NOT NULL DEFAULT 0,
            card_type TEXT,
            model_type TEXT,
            author_nickname TEXT,
            author_avatar_url TEXT,
            author_home_page_url TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_details (
            note_id TEXT PRIMARY KEY REFERENCES notes(note_id),
            url TEXT,
            author_id TEXT,
            publish_time TEXT,
            last_updated_time TEXT,
            model_type TEXT,
            card_type TEXT,
            title TEXT,
            description TEXT,
            comment_count INTEGER NOT NULL DEFAULT 0,
            liked_count INTEGER NOT NULL DEFAULT 0,
            share_count INTEGER NOT NULL DEFAULT 0,
            collected_count INTEGER NOT NULL DEFAULT 0,
            video_id TEXT,
            video_url_h264 TEXT,
            video_url_h265 TEXT,
            duration_secs INTEGER,
            image_list TEXT,
            tags TEXT,
            liked INTEGER NOT NULL DEFAULT 0,
            collected INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // note_id intentionally carries no foreign key: comments may arrive
    // for notes that were never ingested and are stored un-validated.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            comment_id TEXT PRIMARY KEY,
            note_id TEXT NOT NULL,
            parent_comment_id TEXT,
            user_id TEXT NOT NULL,
            user_nickname TEXT,
            user_avatar_url TEXT,
            user_home_page_url TEXT,
            content TEXT,
            like_count INTEGER NOT NULL DEFAULT 0,
            sub_comment_count INTEGER NOT NULL DEFAULT 0,
            created_time TEXT,
            liked INTEGER NOT NULL DEFAULT 0,
            show_tags TEXT,
            sub_comment_cursor TEXT,
            sub_comment_has_more INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_note_id ON comments(note_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comment_mentions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            comment_id TEXT NOT NULL REFERENCES comments(comment_id),
            user_id TEXT NOT NULL,
            user_nickname TEXT,
            user_home_page_url TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(comment_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keyword_groups (
            group_id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_name TEXT NOT NULL,
            keywords TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keyword_group_notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES keyword_groups(group_id),
            note_id TEXT NOT NULL REFERENCES notes(note_id),
            retrieved_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(group_id, note_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_discussions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic_name TEXT NOT NULL,
            metric_date TEXT NOT NULL,
            view_count INTEGER NOT NULL DEFAULT 0 CHECK (view_count >= 0),
            discuss_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(topic_name, metric_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Content store schema initialized");

    Ok(())
}
