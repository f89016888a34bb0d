//! Properties of version comparison.

use coursecat_core::{
    CatalogEngine, ChangeType, ComparisonType, ContentValue, EngineConfig, MemoryStore,
    NewCatalog, NewVersion, NoopNotifier, StaticIdentity, VersionId,
};
use serde_json::json;
use std::sync::Arc;

fn engine() -> CatalogEngine {
    CatalogEngine::new(
        Arc::new(MemoryStore::new()),
        EngineConfig::default().with_auto_promote(false),
        Arc::new(StaticIdentity::new("analyst")),
        Arc::new(NoopNotifier),
    )
    .unwrap()
}

fn version(engine: &CatalogEngine, name: &str, content: serde_json::Value) -> VersionId {
    let catalog = engine.create_catalog(NewCatalog::new(name, "ug")).unwrap();
    engine
        .create_draft_version(catalog.id, NewVersion::new(name, ContentValue::from(content)))
        .unwrap()
        .version
        .id
}

fn pair(engine: &CatalogEngine) -> (VersionId, VersionId) {
    let a = version(
        engine,
        "Fall",
        json!({
            "title": "Fall",
            "courses": [
                {"code": "CS101", "credits": 3, "meeting_days": "MWF", "description": "Intro"},
                {"code": "CS201", "credits": 4, "description": "Data structures"}
            ]
        }),
    );
    let b = version(
        engine,
        "Spring",
        json!({
            "title": "Spring",
            "courses": [
                {"code": "CS101", "credits": 4, "meeting_days": "TR", "description": "Intro"},
                {"code": "CS301", "credits": 3, "description": "Algorithms"}
            ],
            "notes": ["new"]
        }),
    );
    (a, b)
}

#[test]
fn test_similarity_is_symmetric() {
    let engine = engine();
    let (a, b) = pair(&engine);

    let ab = engine.compare_versions(a, b).unwrap();
    let ba = engine.compare_versions(b, a).unwrap();

    assert_eq!(ab.similarity, ba.similarity);
    assert_eq!(ab.fields_total, ba.fields_total);
    assert!(ab.similarity > 0.0 && ab.similarity < 100.0);
}

#[test]
fn test_change_types_are_pairwise_inverse() {
    let engine = engine();
    let (a, b) = pair(&engine);

    let ab = engine.compare_versions(a, b).unwrap();
    let ba = engine.compare_versions(b, a).unwrap();

    assert_eq!(ab.details.len(), ba.details.len());
    assert_eq!(ab.added, ba.removed);
    assert_eq!(ab.removed, ba.added);
    assert_eq!(ab.modified, ba.modified);
    for detail in &ab.details {
        let mirror = ba
            .details
            .iter()
            .find(|d| d.path == detail.path)
            .unwrap();
        assert_eq!(mirror.change_type, detail.change_type.inverse());
        assert_eq!(mirror.old_value, detail.new_value);
        assert_eq!(mirror.new_value, detail.old_value);
    }
    assert!(ab
        .details
        .iter()
        .any(|d| d.change_type == ChangeType::Added && d.entity_id == "CS301"));
}

#[test]
fn test_repeat_is_stable_until_forced() {
    let engine = engine();
    let (a, b) = pair(&engine);

    let first = engine.compare_versions(a, b).unwrap();
    let second = engine.compare_versions(a, b).unwrap();
    assert_eq!(first, second);

    let forced = engine.compare(a, b, ComparisonType::Full, true).unwrap();
    assert_eq!(forced.id, first.id);
    assert_eq!(forced.details, first.details);
    assert!(forced.computed_at >= first.computed_at);

    let snapshot = engine.metrics_snapshot();
    assert_eq!(snapshot.comparisons_computed, 2);
    assert_eq!(snapshot.comparison_cache_hits, 1);
}

#[test]
fn test_comparison_types_agree_on_similarity() {
    let engine = engine();
    let (a, b) = pair(&engine);

    let full = engine.compare(a, b, ComparisonType::Full, false).unwrap();
    let summary = engine.compare(a, b, ComparisonType::Summary, false).unwrap();
    let critical = engine
        .compare(a, b, ComparisonType::CriticalOnly, false)
        .unwrap();

    assert_eq!(full.similarity, summary.similarity);
    assert_eq!(full.similarity, critical.similarity);
    assert!(summary.details.is_empty());
    assert!(critical.details.len() < full.details.len());
    assert_ne!(full.id, summary.id);
}

#[test]
fn test_cross_catalog_flag() {
    let engine = engine();
    let (a, b) = pair(&engine);
    assert!(engine.compare_versions(a, b).unwrap().is_cross_catalog);

    let catalog = engine.get_version(a).unwrap().catalog_id;
    let a2 = engine
        .create_draft_version(
            catalog,
            NewVersion::new("again", ContentValue::from(json!({"title": "Fall"}))),
        )
        .unwrap()
        .version
        .id;
    assert!(!engine.compare_versions(a, a2).unwrap().is_cross_catalog);
}

#[test]
fn test_equal_content_is_fully_similar() {
    let engine = engine();
    let content = json!({"title": "Fall", "courses": [{"code": "CS101", "credits": 3}]});
    let a = version(&engine, "One", content.clone());
    let b = version(&engine, "Two", content);

    let comparison = engine.compare_versions(a, b).unwrap();
    assert_eq!(comparison.similarity, 100.0);
    assert!(comparison.is_identical_content());
}
