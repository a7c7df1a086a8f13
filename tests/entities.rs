use dataport::dataset::DatasetRef;
use dataport::entities::{fetch_entity, list_entities, EntitySelector};
use dataport::error::DataportError;
use dataport::format::LogicalFormat;
use dataport::remote::EntityRecord;
use serde_json::{json, Map};

mod common;

use common::{test_config, FakeService, FakeStore};

fn record(id: &str) -> EntityRecord {
    let mut extra = Map::new();
    extra.insert("annotated".to_string(), json!(true));
    EntityRecord {
        id: id.to_string(),
        url: format!("https://entities.test/{id}"),
        extra,
    }
}

fn dataset() -> DatasetRef {
    DatasetRef::managed("g1", "d1", 1, LogicalFormat::Prompt)
}

#[test]
fn retries_succeed_iff_within_bound() {
    let retry_times = 3;

    for succeeding_attempt in 1..=4u32 {
        let store = FakeStore::new();
        let entity = record("e1");
        for _ in 1..succeeding_attempt {
            store.queue_text(&entity.url, 503, "busy");
        }
        store.queue_text(&entity.url, 200, "{\"prompt\":\"hi\"}");

        let result = fetch_entity(entity.clone(), &store, retry_times);
        if succeeding_attempt <= retry_times {
            let fetched = result.expect("within retry bound");
            assert_eq!(fetched.content, "{\"prompt\":\"hi\"}");
            assert_eq!(store.state().fetches.len() as u32, succeeding_attempt);
        } else {
            match result.expect_err("beyond retry bound") {
                DataportError::EntityFetch {
                    entity_id,
                    url,
                    attempts,
                    status,
                } => {
                    assert_eq!(entity_id, "e1");
                    assert_eq!(url, entity.url);
                    assert_eq!(attempts, retry_times);
                    assert_eq!(status, 503);
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(store.state().fetches.len() as u32, retry_times);
        }
    }
}

#[test]
fn range_selector_lists_inclusive_page_with_content() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path());
    let service = FakeService::new();
    service.state().entities = (0..6).map(|i| record(&format!("e{i}"))).collect();
    let store = FakeStore::new();
    for i in 2..=4 {
        store.queue_text(&format!("https://entities.test/e{i}"), 200, &format!("body-{i}"));
    }

    let listed = list_entities(
        &dataset(),
        &EntitySelector::Range(2..=4),
        &service,
        &store,
        &config,
    )
    .expect("list");

    assert_eq!(
        service.state().list_requests,
        vec![("d1".to_string(), 2, 3)]
    );
    let ids: Vec<_> = listed.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e2", "e3", "e4"]);
    assert_eq!(listed[0].content, "body-2");

    let as_json = serde_json::to_value(&listed[1]).expect("serialize");
    assert_eq!(as_json["content"], "body-3");
    assert_eq!(as_json["annotated"], true);
    assert!(as_json.get("url").is_none());
}

#[test]
fn offset_selector_lists_one_entity() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path());
    let service = FakeService::new();
    service.state().entities = (0..3).map(|i| record(&format!("e{i}"))).collect();
    let store = FakeStore::new();
    store.queue_text("https://entities.test/e1", 200, "one");

    let listed = list_entities(
        &dataset(),
        &EntitySelector::Offset(1),
        &service,
        &store,
        &config,
    )
    .expect("list");

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, "one");
    assert_eq!(service.state().list_requests[0], ("d1".to_string(), 1, 1));
}

#[test]
fn unsupported_selectors_never_reach_the_service() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path());
    let service = FakeService::new();
    let store = FakeStore::new();

    for selector in [
        EntitySelector::Name("e1".to_string()),
        EntitySelector::Offsets(vec![0, 2]),
    ] {
        let err = list_entities(&dataset(), &selector, &service, &store, &config)
            .expect_err("unsupported");
        assert!(matches!(err, DataportError::UnsupportedOperation(_)));
    }
    assert_eq!(service.calls("list_entities"), 0);
}

#[test]
fn exhausted_retries_fail_the_whole_listing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path());
    config.entity_retry_times = 2;
    let service = FakeService::new();
    service.state().entities = vec![record("ok"), record("broken")];
    let store = FakeStore::new();
    store.queue_text("https://entities.test/ok", 200, "fine");

    let err = list_entities(
        &dataset(),
        &EntitySelector::Range(0..=1),
        &service,
        &store,
        &config,
    )
    .expect_err("broken entity");

    match err {
        DataportError::EntityFetch { url, attempts, status, .. } => {
            assert_eq!(url, "https://entities.test/broken");
            assert_eq!(attempts, 2);
            assert_eq!(status, 404);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
