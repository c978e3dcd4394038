//! Record CRUD through the connector against the in-memory store.

use std::sync::Arc;

use couch_connector::couch_client::{CouchDatabase, CouchServer};
use couch_connector::testing::MemoryServer;
use couch_connector::{Connector, ConnectorSettings, CouchConnector, CouchError, Document};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

fn persons() -> Vec<Document> {
    vec![
        doc(json!({"id": "0", "name": "Charlie", "age": 24})),
        doc(json!({"id": "1", "name": "Mary", "age": 24})),
        doc(json!({"id": "2", "name": "David", "age": 24})),
        doc(json!({"name": "Jason", "age": 44})),
    ]
}

async fn setup() -> (CouchConnector, MemoryServer) {
    let server = MemoryServer::new();
    server.create_database("people").await.unwrap();
    let connector =
        CouchConnector::with_server(ConnectorSettings::new("people"), Arc::new(server.clone()));
    (connector, server)
}

#[tokio::test]
async fn test_create_with_and_without_id() {
    let (connector, _) = setup().await;
    let persons = persons();

    let (id, rev) = connector.create(persons[0].clone()).await.unwrap();
    assert_eq!(id, "0");
    assert!(rev.starts_with("1-"));

    let (id, rev) = connector.create(persons[3].clone()).await.unwrap();
    assert!(!id.is_empty());
    assert!(rev.starts_with("1-"));

    let jason = connector.find_by_id(&id).await.unwrap();
    assert_eq!(jason["name"], json!("Jason"));
    assert_eq!(jason["age"], json!(44));
}

#[tokio::test]
async fn test_create_duplicate_id_conflicts() {
    let (connector, _) = setup().await;
    let persons = persons();

    connector.create(persons[0].clone()).await.unwrap();
    let err = connector.create(persons[0].clone()).await.unwrap_err();
    assert!(matches!(err, CouchError::Conflict(_)));
}

#[tokio::test]
async fn test_numeric_id_becomes_string() {
    let (connector, _) = setup().await;
    let (id, _) = connector
        .create(doc(json!({"_id": 3, "content": "test"})))
        .await
        .unwrap();
    assert_eq!(id, "3");
    assert_eq!(connector.find_by_id("3").await.unwrap()["_id"], json!("3"));
}

#[tokio::test]
async fn test_find_by_id() {
    let (connector, _) = setup().await;
    connector.create(persons()[0].clone()).await.unwrap();

    let charlie = connector.find_by_id("0").await.unwrap();
    assert_eq!(charlie["_id"], json!("0"));
    assert_eq!(charlie["name"], json!("Charlie"));
    assert_eq!(charlie["age"], json!(24));

    let err = connector.find_by_id("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_find_by_ids_skips_missing() {
    let (connector, _) = setup().await;
    let persons = persons();
    connector.create(persons[0].clone()).await.unwrap();
    connector.create(persons[1].clone()).await.unwrap();

    let found = connector
        .find_by_ids(&["0".to_string(), "1".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    let found = connector
        .find_by_ids(&["0".to_string(), "lorem".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], json!("Charlie"));
}

#[tokio::test]
async fn test_find_by_ids_surfaces_other_failures() {
    let server = MemoryServer::new();
    let connector =
        CouchConnector::with_server(ConnectorSettings::new("absent"), Arc::new(server));

    // A missing database is reported as not found for every id.
    let found = connector.find_by_ids(&["0".to_string()]).await.unwrap();
    assert!(found.is_empty());

    let connector = CouchConnector::with_server(
        ConnectorSettings::default(),
        Arc::new(MemoryServer::new()),
    );
    let err = connector.find_by_ids(&["0".to_string()]).await.unwrap_err();
    assert!(matches!(err, CouchError::Configuration(_)));
}

#[tokio::test]
async fn test_destroy_by_id() {
    let (connector, _) = setup().await;
    connector.create(persons()[0].clone()).await.unwrap();

    assert!(connector.destroy_by_id("0").await.unwrap());
    assert!(!connector.destroy_by_id("0").await.unwrap());
    assert!(!connector.destroy_by_id("2").await.unwrap());
}

#[tokio::test]
async fn test_read_modify_write_has_no_conflict() {
    let (connector, _) = setup().await;
    connector.create(persons()[0].clone()).await.unwrap();

    let mut person = connector.find_by_id("0").await.unwrap();
    person.insert("name".to_string(), json!("Charlie II"));
    let (id, rev) = connector.save("0", person).await.unwrap();
    assert_eq!(id, "0");
    assert!(rev.starts_with("2-"));

    // Without a revision the current one is filled in.
    let (_, rev) = connector
        .save("0", doc(json!({"name": "Charlie III", "age": 24})))
        .await
        .unwrap();
    assert!(rev.starts_with("3-"));

    let person = connector.find_by_id("0").await.unwrap();
    assert_eq!(person["name"], json!("Charlie III"));
    assert_eq!(person["age"], json!(24));
}

#[tokio::test]
async fn test_save_creates_missing_record() {
    let (connector, _) = setup().await;
    let (id, rev) = connector.save("1", persons()[1].clone()).await.unwrap();
    assert_eq!(id, "1");
    assert!(rev.starts_with("1-"));

    let mary = connector.find_by_id("1").await.unwrap();
    assert_eq!(mary["name"], json!("Mary"));
    assert!(!mary.contains_key("id"));
}

#[tokio::test]
async fn test_save_with_stale_revision_conflicts() {
    let (connector, _) = setup().await;
    let (_, stale) = connector.create(persons()[0].clone()).await.unwrap();
    connector
        .save("0", doc(json!({"name": "Charlie II"})))
        .await
        .unwrap();

    let err = connector
        .save("0", doc(json!({"_rev": stale, "name": "Charlie III"})))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_destroy_by_where() {
    let (connector, _) = setup().await;
    let persons = persons();
    connector.create(persons[0].clone()).await.unwrap();
    connector.create(persons[1].clone()).await.unwrap();

    let filter = json!({"id": {"inq": ["0", "1"]}});
    let removed = connector.destroy_by_where(Some(&filter)).await.unwrap();
    assert_eq!(removed.count, 2);

    let removed = connector.destroy_by_where(Some(&filter)).await.unwrap();
    assert_eq!(removed.count, 0);
}

#[tokio::test]
async fn test_destroy_by_where_limits() {
    let (connector, _) = setup().await;
    connector.create(persons()[0].clone()).await.unwrap();

    // No clause and unsupported clauses match nothing.
    assert_eq!(connector.destroy_by_where(None).await.unwrap().count, 0);
    let by_name = json!({"name": "Charlie"});
    assert_eq!(connector.destroy_by_where(Some(&by_name)).await.unwrap().count, 0);

    let by_id = json!({"id": "0"});
    assert_eq!(connector.destroy_by_where(Some(&by_id)).await.unwrap().count, 1);
}

#[tokio::test]
async fn test_all_and_destroy_all_ignore_design_docs() {
    let (connector, server) = setup().await;
    for person in persons() {
        connector.create(person).await.unwrap();
    }
    server
        .use_database("people")
        .insert(&doc(json!({"views": {}})), Some("_design/find"))
        .await
        .unwrap();

    let all = connector.all().await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|(id, _)| !id.starts_with("_design/")));

    let removed = connector.destroy_all().await.unwrap();
    assert_eq!(removed.count, 4);
    assert!(connector.all().await.unwrap().is_empty());
    assert_eq!(server.document_count("people").await, Some(1));
}

#[tokio::test]
async fn test_missing_database_name() {
    let connector = CouchConnector::with_server(
        ConnectorSettings::default(),
        Arc::new(MemoryServer::new()),
    );
    let err = connector.connect().await.unwrap_err();
    assert!(matches!(err, CouchError::Configuration(_)));
    assert!(connector.disconnect().await.unwrap());
}
