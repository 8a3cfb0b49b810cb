//! Integration tests for the reconciliation engine
//!
//! Runs the real pipeline against a file-backed store: idempotent
//! re-ingestion, merge-on-update, skip-and-continue, comment trees,
//! same-day topic overwrite, and whole-batch rollback on flush failure.

use mflow_ci::db::init_database_pool;
use mflow_ci::models::{
    AuthorInfoSnapshot, AuthorNotesData, CommentSnapshot, CommentsData, MentionSnapshot,
    NoteDetailData, NoteDetailSnapshot, NoteSnapshot, RequestContext, TopicSnapshot, TopicsData,
};
use mflow_ci::services::reconciler::Reconciler;
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn test_store() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database_pool(&temp_dir.path().join("mflow.db"))
        .await
        .expect("store init failed");
    (temp_dir, pool)
}

fn note(note_id: &str, author_id: &str, liked_count: &str) -> NoteSnapshot {
    NoteSnapshot {
        note_id: note_id.to_string(),
        note_url: Some(format!("https://content.example/notes/{}", note_id)),
        author_user_id: Some(author_id.to_string()),
        author_nick_name: Some(format!("nick-{}", author_id)),
        author_avatar: Some(format!("https://content.example/avatars/{}", author_id)),
        note_display_title: Some(format!("title-{}", note_id)),
        note_liked_count: Some(liked_count.to_string()),
        ..Default::default()
    }
}

fn comment(comment_id: &str, note_id: &str, user_id: &str) -> CommentSnapshot {
    CommentSnapshot {
        comment_id: comment_id.to_string(),
        note_id: note_id.to_string(),
        comment_user_id: user_id.to_string(),
        comment_content: Some(format!("content of {}", comment_id)),
        comment_like_count: Some("1".to_string()),
        comment_create_time: Some("2025-03-01 12:30:00".to_string()),
        ..Default::default()
    }
}

fn search_context(keyword: &str) -> RequestContext {
    let mut req = RequestContext::new();
    req.insert(
        "keywords".to_string(),
        serde_json::Value::String(keyword.to_string()),
    );
    req
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

// ============================================================================
// Search-result reconciliation
// ============================================================================

#[tokio::test]
async fn search_snapshot_creates_authors_and_notes() {
    // Scenario A: two notes from two distinct authors
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let items = vec![note("N1", "A1", "10"), note("N2", "A2", "20")];
    let outcome = reconciler
        .reconcile_search(&search_context("tea"), &items)
        .await
        .expect("reconcile failed");

    assert_eq!(outcome.persisted, vec!["N1".to_string(), "N2".to_string()]);
    assert!(outcome.errors.is_empty());
    assert_eq!(count(&pool, "authors").await, 2);
    assert_eq!(count(&pool, "notes").await, 2);
}

#[tokio::test]
async fn reingest_updates_in_place() {
    // Scenario B: N1's like count changes, N2 untouched
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let first = vec![note("N1", "A1", "10"), note("N2", "A2", "20")];
    reconciler
        .reconcile_search(&search_context("tea"), &first)
        .await
        .unwrap();

    let second = vec![note("N1", "A1", "99"), note("N2", "A2", "20")];
    reconciler
        .reconcile_search(&search_context("tea"), &second)
        .await
        .unwrap();

    assert_eq!(count(&pool, "notes").await, 2);

    let n1_likes: i64 = sqlx::query_scalar("SELECT liked_count FROM notes WHERE note_id = 'N1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    let n2_likes: i64 = sqlx::query_scalar("SELECT liked_count FROM notes WHERE note_id = 'N2'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(n1_likes, 99);
    assert_eq!(n2_likes, 20);
}

#[tokio::test]
async fn identical_snapshot_is_idempotent() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let items = vec![note("N1", "A1", "10"), note("N2", "A1", "20")];
    reconciler
        .reconcile_search(&search_context("tea"), &items)
        .await
        .unwrap();

    let titles_before: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT note_id, title FROM notes ORDER BY note_id")
            .fetch_all(&pool)
            .await
            .unwrap();

    reconciler
        .reconcile_search(&search_context("tea"), &items)
        .await
        .unwrap();

    assert_eq!(count(&pool, "notes").await, 2);
    assert_eq!(count(&pool, "authors").await, 1);
    assert_eq!(count(&pool, "keyword_groups").await, 1);
    assert_eq!(count(&pool, "keyword_group_notes").await, 2);

    let titles_after: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT note_id, title FROM notes ORDER BY note_id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(titles_before, titles_after);
}

#[tokio::test]
async fn malformed_item_is_skipped_rest_persists() {
    // item 2 of 3 lacks an author reference and must not sink the batch
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let mut broken = note("N2", "A2", "5");
    broken.author_user_id = None;

    let items = vec![note("N1", "A1", "1"), broken, note("N3", "A3", "3")];
    let outcome = reconciler
        .reconcile_search(&search_context("tea"), &items)
        .await
        .unwrap();

    assert_eq!(outcome.persisted, vec!["N1".to_string(), "N3".to_string()]);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].id, "N2");
    assert_eq!(count(&pool, "notes").await, 2);

    let missing: Option<String> =
        sqlx::query_scalar("SELECT note_id FROM notes WHERE note_id = 'N2'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn same_keyword_reuses_one_group() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    reconciler
        .reconcile_search(&search_context("hiking"), &[note("N1", "A1", "1")])
        .await
        .unwrap();
    reconciler
        .reconcile_search(&search_context("hiking"), &[note("N1", "A1", "1"), note("N2", "A2", "2")])
        .await
        .unwrap();

    assert_eq!(count(&pool, "keyword_groups").await, 1);
    assert_eq!(count(&pool, "keyword_group_notes").await, 2);
}

#[tokio::test]
async fn duplicate_note_in_one_batch_stages_once() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let items = vec![note("N1", "A1", "10"), note("N1", "A1", "11")];
    let outcome = reconciler
        .reconcile_search(&search_context("tea"), &items)
        .await
        .unwrap();

    // last occurrence wins, no duplicate insert
    assert_eq!(outcome.persisted, vec!["N1".to_string()]);
    assert_eq!(count(&pool, "notes").await, 1);
    let likes: i64 = sqlx::query_scalar("SELECT liked_count FROM notes WHERE note_id = 'N1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(likes, 11);
}

// ============================================================================
// Comment reconciliation
// ============================================================================

#[tokio::test]
async fn comment_tree_persists_with_parent_linkage() {
    // Scenario C: root C1 with children C2, C3
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let mut root = comment("C1", "N1", "U1");
    root.comment_sub_comment_count = Some("2".to_string());
    root.comment_sub = vec![comment("C2", "N1", "U2"), comment("C3", "N1", "U3")];

    let data = CommentsData {
        comments: vec![root],
        cursor: None,
        has_more: Some(false),
    };

    let outcome = reconciler
        .reconcile_comments(&RequestContext::new(), &data)
        .await
        .unwrap();

    assert_eq!(
        outcome.persisted,
        vec!["C1".to_string(), "C2".to_string(), "C3".to_string()]
    );
    assert_eq!(count(&pool, "comments").await, 3);

    let children: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM comments WHERE parent_comment_id = 'C1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(children, 2);

    let declared: i64 =
        sqlx::query_scalar("SELECT sub_comment_count FROM comments WHERE comment_id = 'C1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(declared, 2);
}

#[tokio::test]
async fn comment_mentions_are_stored_once_per_pair() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let mut c = comment("C1", "N1", "U1");
    c.comment_at_users = vec![MentionSnapshot {
        at_user_id: "friend-9".to_string(),
        at_user_nickname: Some("Friend".to_string()),
        at_user_home_page_url: None,
    }];

    let data = CommentsData {
        comments: vec![c],
        cursor: None,
        has_more: Some(false),
    };

    reconciler
        .reconcile_comments(&RequestContext::new(), &data)
        .await
        .unwrap();
    reconciler
        .reconcile_comments(&RequestContext::new(), &data)
        .await
        .unwrap();

    assert_eq!(count(&pool, "comments").await, 1);
    assert_eq!(count(&pool, "comment_mentions").await, 1);
}

#[tokio::test]
async fn comment_for_unknown_note_is_stored_unvalidated() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let data = CommentsData {
        comments: vec![comment("C1", "never-ingested-note", "U1")],
        cursor: None,
        has_more: Some(false),
    };

    let outcome = reconciler
        .reconcile_comments(&RequestContext::new(), &data)
        .await
        .unwrap();

    assert_eq!(outcome.persisted, vec!["C1".to_string()]);
    let note_ref: String =
        sqlx::query_scalar("SELECT note_id FROM comments WHERE comment_id = 'C1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(note_ref, "never-ingested-note");
}

#[tokio::test]
async fn malformed_comment_is_skipped_children_persist() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let mut root = comment("", "N1", "U1"); // missing id fails construction
    root.comment_sub = vec![comment("C2", "N1", "U2")];

    let data = CommentsData {
        comments: vec![root, comment("C3", "N1", "U3")],
        cursor: None,
        has_more: Some(false),
    };

    let outcome = reconciler
        .reconcile_comments(&RequestContext::new(), &data)
        .await
        .unwrap();

    assert_eq!(outcome.persisted, vec!["C2".to_string(), "C3".to_string()]);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(count(&pool, "comments").await, 2);
}

// ============================================================================
// Topic reconciliation
// ============================================================================

#[tokio::test]
async fn same_day_topic_snapshot_overwrites() {
    // Scenario D: second same-day ingestion wins, one row total
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let first = TopicsData {
        topic_list: vec![TopicSnapshot {
            name: "topicA".to_string(),
            view_num: Some(50_000),
            discuss_num: Some(120),
        }],
    };
    let second = TopicsData {
        topic_list: vec![TopicSnapshot {
            name: "topicA".to_string(),
            view_num: Some(70_000),
            discuss_num: Some(150),
        }],
    };

    reconciler
        .reconcile_topics(&RequestContext::new(), &first)
        .await
        .unwrap();
    reconciler
        .reconcile_topics(&RequestContext::new(), &second)
        .await
        .unwrap();

    assert_eq!(count(&pool, "topic_discussions").await, 1);
    let views: i64 =
        sqlx::query_scalar("SELECT view_count FROM topic_discussions WHERE topic_name = 'topicA'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(views, 70_000);
}

#[tokio::test]
async fn flush_failure_rolls_back_whole_batch() {
    // the negative view count violates a table constraint at flush time;
    // nothing from the batch may survive, including the valid sibling
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let data = TopicsData {
        topic_list: vec![
            TopicSnapshot {
                name: "good".to_string(),
                view_num: Some(10_000),
                discuss_num: None,
            },
            TopicSnapshot {
                name: "poisoned".to_string(),
                view_num: Some(-5),
                discuss_num: None,
            },
        ],
    };

    let result = reconciler
        .reconcile_topics(&RequestContext::new(), &data)
        .await;

    assert!(result.is_err());
    assert_eq!(count(&pool, "topic_discussions").await, 0);
}

// ============================================================================
// Note detail and author-notes reconciliation
// ============================================================================

#[tokio::test]
async fn detail_for_unseen_note_creates_note_and_author() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let data = NoteDetailData {
        note: NoteDetailSnapshot {
            note_id: "N1".to_string(),
            author_user_id: Some("A1".to_string()),
            author_nick_name: Some("Ming".to_string()),
            note_display_title: Some("deep dive".to_string()),
            note_desc: Some("long form body".to_string()),
            comment_count: Some("4".to_string()),
            note_image_list: Some(vec!["https://content.example/img/1.jpg".to_string()]),
            ..Default::default()
        },
    };

    let outcome = reconciler
        .reconcile_note_detail(&RequestContext::new(), &data)
        .await
        .unwrap();

    assert_eq!(outcome.persisted, vec!["N1".to_string()]);
    assert_eq!(count(&pool, "authors").await, 1);
    assert_eq!(count(&pool, "notes").await, 1);
    assert_eq!(count(&pool, "note_details").await, 1);

    let description: Option<String> =
        sqlx::query_scalar("SELECT description FROM note_details WHERE note_id = 'N1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(description.as_deref(), Some("long form body"));
}

#[tokio::test]
async fn detail_reingest_merges_nonnull_fields() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let mut data = NoteDetailData {
        note: NoteDetailSnapshot {
            note_id: "N1".to_string(),
            author_user_id: Some("A1".to_string()),
            note_desc: Some("first body".to_string()),
            share_count: Some("3".to_string()),
            ..Default::default()
        },
    };
    reconciler
        .reconcile_note_detail(&RequestContext::new(), &data)
        .await
        .unwrap();

    // second fetch carries a new share count but no description
    data.note.note_desc = None;
    data.note.share_count = Some("9".to_string());
    reconciler
        .reconcile_note_detail(&RequestContext::new(), &data)
        .await
        .unwrap();

    assert_eq!(count(&pool, "note_details").await, 1);
    let (description, shares): (Option<String>, i64) = sqlx::query_as(
        "SELECT description, share_count FROM note_details WHERE note_id = 'N1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(description.as_deref(), Some("first body"));
    assert_eq!(shares, 9);
}

#[tokio::test]
async fn author_notes_snapshot_stores_full_profile() {
    let (_dir, pool) = test_store().await;
    let reconciler = Reconciler::new(pool.clone());

    let data = AuthorNotesData {
        notes: vec![note("N1", "A1", "5"), note("N2", "A1", "6")],
        author_info: AuthorInfoSnapshot {
            user_id: "A1".to_string(),
            nick_name: Some("Ming".to_string()),
            desc: Some("travel notes".to_string()),
            fans: Some("12000".to_string()),
            follows: Some("80".to_string()),
            tags: Some(vec!["travel".to_string(), "food".to_string()]),
            ..Default::default()
        },
        cursor: None,
        has_more: Some(false),
    };

    let outcome = reconciler
        .reconcile_author_notes(&RequestContext::new(), &data)
        .await
        .unwrap();

    assert_eq!(outcome.persisted, vec!["N1".to_string(), "N2".to_string()]);
    assert_eq!(count(&pool, "authors").await, 1);
    assert_eq!(count(&pool, "notes").await, 2);

    let (bio, fans): (Option<String>, i64) =
        sqlx::query_as("SELECT bio, fan_count FROM authors WHERE author_id = 'A1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(bio.as_deref(), Some("travel notes"));
    assert_eq!(fans, 12_000);
}
