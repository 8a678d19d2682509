use rapid_sql::{Attribute, Row, SqlError, SqlSession, SqlSessionBuilder, SqlValue};
use std::sync::Arc;

async fn homes_session(builder: SqlSessionBuilder) -> SqlSession {
    builder
        .create_table("homes", |t| {
            t.if_not_exists()
                .field("id", "INTEGER", &[Attribute::PrimaryKey, Attribute::AutoIncrement])
                .field("owner", "TEXT", &[Attribute::NotNull])
                .field("x", "INTEGER", &[]);
        })
        .build()
        .await
        .unwrap()
}

async fn count(session: &SqlSession) -> i64 {
    let rows = session.query("SELECT COUNT(*) AS n FROM homes", &[]).await.unwrap();
    rows[0].try_get::<i64, _>("n").unwrap()
}

#[tokio::test]
async fn test_insert_returns_generated_key() {
    let session = homes_session(SqlSessionBuilder::sqlite_memory().auto_commit()).await;

    let insert = "INSERT INTO homes (owner, x) VALUES (?, ?)";
    assert_eq!(session.execute(insert, &["Steve".into(), 10.into()]).await.unwrap(), 1);
    assert_eq!(session.execute(insert, &["Alex".into(), SqlValue::Null]).await.unwrap(), 2);

    let updated = session
        .execute("UPDATE homes SET x = ? WHERE x IS NULL OR x > ?", &[5.into(), 0.into()])
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let untouched = session
        .execute("DELETE FROM homes WHERE owner = ?", &["Herobrine".into()])
        .await
        .unwrap();
    assert_eq!(untouched, 0);

    let rows = session
        .query("SELECT owner FROM homes WHERE id = ?", &[2.into()])
        .await
        .unwrap();
    assert_eq!(rows[0].try_get::<String, _>("owner").unwrap(), "Alex");
}

#[tokio::test]
async fn test_each_insert_gets_its_own_key() {
    let session = homes_session(SqlSessionBuilder::sqlite_memory()).await;

    let mut ids = Vec::new();
    for owner in ["Steve", "Alex", "Notch"] {
        let id = session
            .execute("INSERT INTO homes (owner) VALUES (?)", &[owner.into()])
            .await
            .unwrap();
        ids.push(id);
    }
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_usable_from_spawned_tasks() {
    let session = Arc::new(homes_session(SqlSessionBuilder::sqlite_memory().auto_commit()).await);

    let writers = (0..4i64)
        .map(|i| {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .execute("INSERT INTO homes (owner, x) VALUES (?, ?)", &["Steve".into(), i.into()])
                    .await
            })
        })
        .collect::<Vec<_>>();

    let mut ids = Vec::new();
    for writer in writers {
        ids.push(writer.await.unwrap().unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(count(&session).await, 4);
}

#[tokio::test]
async fn test_rollback_and_commit() {
    let session = homes_session(SqlSessionBuilder::sqlite_memory()).await;
    assert!(!session.is_auto_commit());

    session
        .execute("INSERT INTO homes (owner) VALUES (?)", &["Steve".into()])
        .await
        .unwrap();
    assert_eq!(count(&session).await, 1);
    session.rollback().await.unwrap();
    assert_eq!(count(&session).await, 0);

    session
        .execute("INSERT INTO homes (owner) VALUES (?)", &["Alex".into()])
        .await
        .unwrap();
    session.commit().await.unwrap();
    session.rollback().await.unwrap();
    assert_eq!(count(&session).await, 1);
}

#[tokio::test]
async fn test_savepoints() {
    let session = homes_session(SqlSessionBuilder::sqlite_memory()).await;

    session
        .execute("INSERT INTO homes (owner) VALUES (?)", &["Steve".into()])
        .await
        .unwrap();
    let savepoint = session.save_state().await.unwrap();
    session
        .execute("INSERT INTO homes (owner) VALUES (?)", &["Alex".into()])
        .await
        .unwrap();
    assert_eq!(count(&session).await, 2);

    session.restore_state(&savepoint).await.unwrap();
    assert_eq!(count(&session).await, 1);
}

#[tokio::test]
async fn test_savepoints_need_transactions() {
    let session = homes_session(SqlSessionBuilder::sqlite_memory().auto_commit()).await;
    assert!(matches!(session.save_state().await, Err(SqlError::AutoCommit)));
    // no-ops
    session.commit().await.unwrap();
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_table_without_fields_fails_build() {
    let result = SqlSessionBuilder::sqlite_memory()
        .create_table("empty", |_| {})
        .build()
        .await;
    assert!(matches!(result, Err(SqlError::NoFields(name)) if name == "empty"));
}

#[tokio::test]
async fn test_file_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("homes.db");

    let session = homes_session(SqlSessionBuilder::sqlite(&path)).await;
    session
        .execute("INSERT INTO homes (owner) VALUES (?)", &["Steve".into()])
        .await
        .unwrap();
    session.commit().await.unwrap();
    session.close().await.unwrap();

    let reopened = homes_session(SqlSessionBuilder::sqlite(&path)).await;
    assert_eq!(count(&reopened).await, 1);

    let err = reopened.execute("INSERT INTO missing VALUES (1)", &[]).await;
    assert!(matches!(err, Err(SqlError::Database(_))));
}
