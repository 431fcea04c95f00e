// CollectorRepo tests: watermark establish/update, non-metric sequences, security markers

mod common;

use chrono::{TimeDelta, TimeZone, Utc};
use metric_collectors::collector_repo::{CollectorRepo, WriteOutcome};

#[tokio::test]
async fn collector_repo_connect_and_init() {
    let (dir, repo) = common::temp_repo().await;
    // Second init is no-op (IF NOT EXISTS)
    repo.init().await.unwrap();

    let nested = dir.path().join("nested/dir/collectors.db");
    let other = CollectorRepo::connect(nested.to_str().unwrap(), 1).await.unwrap();
    other.init().await.unwrap();
    assert!(nested.exists());
}

#[tokio::test]
async fn establish_inserts_now_minus_period_once() {
    let (_dir, repo) = common::temp_repo().await;
    let now = Utc.with_ymd_and_hms(1997, 8, 29, 2, 14, 0).unwrap()
        + TimeDelta::milliseconds(250);

    assert!(
        repo.query_last_emitted_agg_timestamp("twitter-tweets-volume")
            .await
            .unwrap()
            .is_none()
    );

    let established = repo
        .establish_last_emitted_agg_timestamp_at("twitter-tweets-volume", 300, now)
        .await
        .unwrap();
    assert_eq!(
        established,
        Utc.with_ymd_and_hms(1997, 8, 29, 2, 9, 0).unwrap()
    );

    // Already established: the stored value wins over a later "now".
    let again = repo
        .establish_last_emitted_agg_timestamp_at(
            "twitter-tweets-volume",
            300,
            now + TimeDelta::hours(3),
        )
        .await
        .unwrap();
    assert_eq!(again, established);
}

async fn tracker_rows(path: &str, key: &str) -> i64 {
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", path))
        .await
        .unwrap();
    sqlx::query_scalar("SELECT COUNT(*) FROM emitted_sample_tracker WHERE key = $1")
        .bind(key)
        .fetch_one(&pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn establish_uses_row_written_between_read_and_insert() {
    let (dir, repo) = common::temp_repo().await;
    let path = dir.path().join("collectors.db");
    let path = path.to_str().unwrap();

    // Another writer that always lands its row just before ours.
    let other = sqlx::SqlitePool::connect(&format!("sqlite:{}", path))
        .await
        .unwrap();
    sqlx::query(
        r#"
        CREATE TRIGGER other_writer BEFORE INSERT ON emitted_sample_tracker
        WHEN NEW.sample_ts <> 871000000
        BEGIN
            INSERT OR IGNORE INTO emitted_sample_tracker (key, sample_ts)
            VALUES (NEW.key, 871000000);
        END
        "#,
    )
    .execute(&other)
    .await
    .unwrap();

    let now = Utc.with_ymd_and_hms(2015, 2, 20, 2, 14, 0).unwrap();
    let established = repo
        .establish_last_emitted_agg_timestamp_at("twitter-tweets-volume", 300, now)
        .await
        .unwrap();

    let stored = chrono::DateTime::from_timestamp(871_000_000, 0).unwrap();
    assert_eq!(established, stored);
    assert_eq!(
        repo.query_last_emitted_agg_timestamp("twitter-tweets-volume")
            .await
            .unwrap(),
        Some(stored)
    );
    assert_eq!(tracker_rows(path, "twitter-tweets-volume").await, 1);
}

#[tokio::test]
async fn concurrent_establish_agrees_on_one_row() {
    let (dir, repo) = common::temp_repo().await;
    let path = dir.path().join("collectors.db");
    let path = path.to_str().unwrap();
    let second = CollectorRepo::connect(path, 2).await.unwrap();

    let t = Utc.with_ymd_and_hms(2015, 2, 20, 2, 14, 0).unwrap();
    let (a, b) = tokio::join!(
        repo.establish_last_emitted_agg_timestamp_at("xignite-news", 300, t),
        second.establish_last_emitted_agg_timestamp_at(
            "xignite-news",
            300,
            t + TimeDelta::hours(1)
        ),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a, b);
    assert_eq!(tracker_rows(path, "xignite-news").await, 1);
}

#[tokio::test]
async fn establish_with_wall_clock_is_one_period_back() {
    let (_dir, repo) = common::temp_repo().await;
    let before = Utc::now();
    let established = repo
        .establish_last_emitted_agg_timestamp("xignite-news", 60)
        .await
        .unwrap();
    let lag = before - established;
    assert!(lag >= TimeDelta::seconds(59) && lag <= TimeDelta::seconds(62));
}

#[tokio::test]
async fn update_agg_timestamp_inserts_then_updates() {
    let (_dir, repo) = common::temp_repo().await;
    let t1 = Utc.with_ymd_and_hms(2015, 2, 20, 2, 10, 0).unwrap();
    let t2 = t1 + TimeDelta::minutes(5);

    assert_eq!(
        repo.update_last_emitted_agg_timestamp("series-a", t1).await.unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(
        repo.update_last_emitted_agg_timestamp("series-a", t2).await.unwrap(),
        WriteOutcome::Updated
    );
    assert_eq!(
        repo.query_last_emitted_agg_timestamp("series-a").await.unwrap(),
        Some(t2)
    );
}

#[tokio::test]
async fn update_agg_timestamp_never_moves_backwards() {
    let (_dir, repo) = common::temp_repo().await;
    let t = Utc.with_ymd_and_hms(2015, 2, 20, 2, 10, 0).unwrap();
    repo.update_last_emitted_agg_timestamp("series-b", t).await.unwrap();
    repo.update_last_emitted_agg_timestamp("series-b", t - TimeDelta::hours(1))
        .await
        .unwrap();
    assert_eq!(
        repo.query_last_emitted_agg_timestamp("series-b").await.unwrap(),
        Some(t)
    );
}

#[tokio::test]
async fn non_metric_sequence_upsert() {
    let (_dir, repo) = common::temp_repo().await;
    assert_eq!(
        repo.query_last_emitted_non_metric_sequence("twitter-tweets")
            .await
            .unwrap(),
        None
    );

    assert_eq!(
        repo.update_last_emitted_non_metric_sequence("twitter-tweets", 0)
            .await
            .unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(
        repo.update_last_emitted_non_metric_sequence("twitter-tweets", 42)
            .await
            .unwrap(),
        WriteOutcome::Updated
    );
    assert_eq!(
        repo.query_last_emitted_non_metric_sequence("twitter-tweets")
            .await
            .unwrap(),
        Some(42)
    );

    // Other keys are independent.
    assert_eq!(
        repo.query_last_emitted_non_metric_sequence("xignite-news")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn security_marked_deleted() {
    let (_dir, repo) = common::temp_repo().await;
    repo.upsert_security("IBM", "NYSE").await.unwrap();
    repo.upsert_security("T", "NYSE").await.unwrap();

    assert_eq!(repo.mark_security_deleted("IBM").await.unwrap(), 1);
    assert_eq!(repo.mark_security_deleted("NOPE").await.unwrap(), 0);

    let ibm = repo.get_security("IBM").await.unwrap().unwrap();
    assert!(ibm.deleted);
    let active = repo.list_active_securities().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].symbol, "T");

    // Re-adding clears the marker.
    repo.upsert_security("IBM", "NASDAQ").await.unwrap();
    let ibm = repo.get_security("IBM").await.unwrap().unwrap();
    assert!(!ibm.deleted);
    assert_eq!(ibm.exchange, "NASDAQ");
}
