//! End-to-end namespace/table lifecycle scenarios over the JSON-document backend.

use std::collections::HashMap;
use std::sync::Arc;

use icebox::backend::BackendConfig;
use icebox::error::ErrorKind;
use icebox::io::{MemoryStore, ObjectStore};
use icebox::metadata::update::{MetadataUpdate, Requirement};
use icebox::metadata::{NestedField, Schema, Type};
use icebox::concurrency::RetryPolicy;
use icebox::{Catalog, Namespace, TableIdent};

async fn catalog() -> Catalog {
    let store = Arc::new(MemoryStore::new());
    Catalog::open(
        BackendConfig::Json {
            uri: "catalog.json".to_string(),
            catalog_name: "test".to_string(),
        },
        store,
        "/warehouse",
    )
    .await
    .unwrap()
    .with_retry_policy(RetryPolicy {
        max_attempts: 2,
        base_delay: std::time::Duration::from_millis(1),
    })
}

fn ns(segments: &[&str]) -> Namespace {
    Namespace::new(segments.iter().map(|s| s.to_string()).collect()).unwrap()
}

#[tokio::test]
async fn namespace_properties_lifecycle() {
    let catalog = catalog().await;
    assert_eq!(catalog.list_namespaces(None).await.unwrap(), vec![]);

    catalog
        .create_namespace(&ns(&["a"]), HashMap::from([("owner".to_string(), "u".to_string())]))
        .await
        .unwrap();

    let props = catalog.load_namespace_properties(&ns(&["a"])).await.unwrap();
    assert_eq!(props.properties.get("owner"), Some(&"u".to_string()));

    let summary = catalog
        .update_namespace_properties(
            &ns(&["a"]),
            &["owner".to_string(), "gone".to_string()],
            &HashMap::from([
                ("owner".to_string(), "v".to_string()),
                ("env".to_string(), "test".to_string()),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(summary.removed, vec!["owner".to_string()]);
    assert_eq!(summary.missing, vec!["gone".to_string()]);
    assert!(summary.updated.contains(&"owner".to_string()));
    assert!(summary.updated.contains(&"env".to_string()));

    let props = catalog.load_namespace_properties(&ns(&["a"])).await.unwrap();
    assert_eq!(props.properties.get("owner"), Some(&"v".to_string()));
    assert_eq!(props.properties.get("env"), Some(&"test".to_string()));
}

#[tokio::test]
async fn create_table_metadata_shape() {
    let catalog = catalog().await;
    catalog.create_namespace(&ns(&["a"]), HashMap::new()).await.unwrap();

    let schema = Schema::builder()
        .with_schema_id(0)
        .with_fields(vec![
            NestedField::required(1, "id", Type::long()),
            NestedField::required(2, "name", Type::string()),
        ])
        .build();
    let ident = TableIdent::new(ns(&["a"]), "t").unwrap();
    let metadata = catalog.create_table(&ident, schema).await.unwrap();

    assert_eq!(metadata.format_version, 2);
    assert_eq!(metadata.last_column_id, 2);
    assert_eq!(metadata.schemas[0].fields[0].field_type.canonical_name(), "long");
    assert_eq!(metadata.schemas[0].fields[1].field_type.canonical_name(), "string");
    assert!(metadata.snapshots.is_empty());
    assert_eq!(metadata.current_snapshot_id, None);
    assert_eq!(metadata.default_spec_id, 0);
    assert_eq!(metadata.default_sort_order_id, 0);
    assert_eq!(metadata.last_partition_id, 999);

    let (record, _) = catalog.load_table(&ident).await.unwrap();
    assert!(record.metadata_location.ends_with("v1.metadata.json"));
}

#[tokio::test]
async fn drop_namespace_requires_empty() {
    let catalog = catalog().await;
    catalog.create_namespace(&ns(&["a"]), HashMap::new()).await.unwrap();
    let schema = Schema::builder().with_schema_id(0).build();
    let ident = TableIdent::new(ns(&["a"]), "t").unwrap();
    catalog.create_table(&ident, schema).await.unwrap();

    let err = catalog.drop_namespace(&ns(&["a"])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NamespaceNotEmpty);

    catalog.drop_table(&ident).await.unwrap();
    catalog.drop_namespace(&ns(&["a"])).await.unwrap();
}

#[tokio::test]
async fn rename_table_rejects_cross_namespace() {
    let catalog = catalog().await;
    catalog.create_namespace(&ns(&["a"]), HashMap::new()).await.unwrap();
    catalog.create_namespace(&ns(&["b"]), HashMap::new()).await.unwrap();
    let schema = Schema::builder().with_schema_id(0).build();
    let t = TableIdent::new(ns(&["a"]), "t").unwrap();
    catalog.create_table(&t, schema).await.unwrap();

    let t2 = TableIdent::new(ns(&["a"]), "t2").unwrap();
    catalog.rename_table(&t, &t2).await.unwrap();
    assert!(!catalog.table_exists(&t).await.unwrap());
    assert!(catalog.table_exists(&t2).await.unwrap());

    let cross_ns = TableIdent::new(ns(&["b"]), "t2").unwrap();
    let err = catalog.rename_table(&t2, &cross_ns).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRename);
}

#[tokio::test]
async fn concurrent_commit_exactly_one_wins() {
    let catalog = Arc::new(catalog().await);
    catalog.create_namespace(&ns(&["a"]), HashMap::new()).await.unwrap();
    let schema = Schema::builder().with_schema_id(0).build();
    let ident = TableIdent::new(ns(&["a"]), "t").unwrap();
    catalog.create_table(&ident, schema).await.unwrap();
    let (record, _) = catalog.load_table(&ident).await.unwrap();
    let v1_location = record.metadata_location.clone();

    // Both tasks observe the same committed version and race to advance it;
    // spawning onto separate tasks (rather than awaiting in turn) is what
    // actually exercises the optimistic-concurrency path instead of two
    // serialized commits that never contend for the same pointer.
    let task_a = {
        let catalog = catalog.clone();
        let ident = ident.clone();
        let v1_location = v1_location.clone();
        tokio::spawn(async move {
            catalog
                .commit_table(&ident, &v1_location, &[], vec![MetadataUpdate::NoOp("a".to_string())])
                .await
        })
    };
    let task_b = {
        let catalog = catalog.clone();
        let ident = ident.clone();
        let v1_location = v1_location.clone();
        tokio::spawn(async move {
            catalog
                .commit_table(&ident, &v1_location, &[], vec![MetadataUpdate::NoOp("b".to_string())])
                .await
        })
    };
    let (first, second) = tokio::join!(task_a, task_b);
    let first = first.unwrap();
    let second = second.unwrap();

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let (winner, loser) = if first.is_ok() { (first, second) } else { (second, first) };
    assert_eq!(loser.unwrap_err().kind(), ErrorKind::ConcurrentModification);
    let winner_metadata = winner.unwrap();

    let (record, document) = catalog.load_table(&ident).await.unwrap();
    assert_ne!(record.metadata_location, v1_location);
    assert_eq!(document.metadata_log, winner_metadata.metadata_log);
}

#[tokio::test]
async fn register_table_validates_metadata_then_registers() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let catalog = Catalog::open(
        BackendConfig::Json {
            uri: "catalog.json".to_string(),
            catalog_name: "test".to_string(),
        },
        store.clone(),
        "/warehouse",
    )
    .await
    .unwrap();
    catalog.create_namespace(&ns(&["a"]), HashMap::new()).await.unwrap();
    let ident = TableIdent::new(ns(&["a"]), "r").unwrap();

    let err = catalog
        .register_table(&ident, "/nonexistent.json")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MetadataAbsent);

    // Stage a valid v2 document directly through the writer, as an external
    // process would, then register the catalog entry against it.
    let schema = Schema::builder().with_schema_id(0).build();
    let document = icebox::metadata::MetadataWriter::build_initial_metadata(
        &ident,
        schema,
        "/warehouse",
        0,
    );
    let writer = icebox::metadata::MetadataWriter::new(store);
    writer
        .write_ensuring_dir(&document, "/p/m.json")
        .await
        .unwrap();

    catalog.register_table(&ident, "/p/m.json").await.unwrap();
    let (record, _) = catalog.load_table(&ident).await.unwrap();
    assert_eq!(record.metadata_location, "/p/m.json");
}

#[tokio::test]
async fn list_namespaces_respects_top_level_and_children() {
    let catalog = catalog().await;
    catalog.create_namespace(&ns(&["a"]), HashMap::new()).await.unwrap();
    catalog.create_namespace(&ns(&["a", "b"]), HashMap::new()).await.unwrap();

    let top = catalog.list_namespaces(None).await.unwrap();
    assert_eq!(top, vec![ns(&["a"])]);

    let children = catalog.list_namespaces(Some(&ns(&["a"]))).await.unwrap();
    assert_eq!(children, vec![ns(&["a", "b"])]);
}

#[tokio::test]
async fn commit_requirement_mismatch_is_rejected() {
    let catalog = catalog().await;
    catalog.create_namespace(&ns(&["a"]), HashMap::new()).await.unwrap();
    let schema = Schema::builder().with_schema_id(0).build();
    let ident = TableIdent::new(ns(&["a"]), "t").unwrap();
    catalog.create_table(&ident, schema).await.unwrap();
    let (record, _) = catalog.load_table(&ident).await.unwrap();

    let err = catalog
        .commit_table(
            &ident,
            &record.metadata_location,
            &[Requirement::AssertCurrentSchemaId(7)],
            vec![],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RequirementFailed);
}
