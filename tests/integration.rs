//! Integration tests for the submodel store.
//!
//! Every test runs against a fresh SQLite file in a temp directory, so no
//! external services are needed.
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//! - `scenario_*` - The reference scenarios (pages, list append, cursors, races)
//! - `happy_*` - Round trips, renames, deletes, value-only, fan-out, cache
//! - `failure_*` - Conflicts and bad requests leave the store untouched

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Notify;

use submodel_store::{
    AasSubmodelElements, AdministrativeInformation, AnnotatedRelationshipElement, BasicEventElement,
    Blob, Capability, DataTypeDefXsd, ElementMeta, Entity, EntityType, File, InMemorySubmodelCache,
    Key, KeyType, LangString, ModellingKind, MultiLanguageProperty, Operation, Property, Range,
    Reference, ReferenceElement, RelationshipElement, StoreConfig, Submodel, SubmodelCache,
    SubmodelElement, SubmodelElementCollection, SubmodelElementList, SubmodelFilter, SubmodelRepository,
    UpdateMode,
};
use submodel_store::model::{Direction, OperationVariable, StateOfEvent};

// =============================================================================
// Helpers
// =============================================================================

async fn open_with(config: impl FnOnce(StoreConfig) -> StoreConfig) -> (SubmodelRepository, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = config(StoreConfig::sqlite(dir.path().join("store.db")));
    let repo = SubmodelRepository::connect(config).await.expect("connect");
    (repo, dir)
}

async fn open() -> (SubmodelRepository, TempDir) {
    open_with(|c| c).await
}

fn prop(id_short: &str, value_type: DataTypeDefXsd, value: &str) -> SubmodelElement {
    SubmodelElement::Property(Property {
        meta: ElementMeta::named(id_short),
        value_type,
        value: Some(value.to_string()),
        value_id: None,
    })
}

fn text(id_short: &str, value: &str) -> SubmodelElement {
    prop(id_short, DataTypeDefXsd::String, value)
}

fn int(id_short: &str, value: &str) -> SubmodelElement {
    prop(id_short, DataTypeDefXsd::Int, value)
}

fn item(value: &str) -> SubmodelElement {
    SubmodelElement::Property(Property {
        meta: ElementMeta::default(),
        value_type: DataTypeDefXsd::Int,
        value: Some(value.to_string()),
        value_id: None,
    })
}

fn collection(id_short: &str, children: Vec<SubmodelElement>) -> SubmodelElement {
    SubmodelElement::SubmodelElementCollection(SubmodelElementCollection {
        meta: ElementMeta::named(id_short),
        value: if children.is_empty() { None } else { Some(children) },
    })
}

fn unnamed_collection(children: Vec<SubmodelElement>) -> SubmodelElement {
    SubmodelElement::SubmodelElementCollection(SubmodelElementCollection {
        meta: ElementMeta::default(),
        value: Some(children),
    })
}

fn list(id_short: &str, type_value: AasSubmodelElements, children: Vec<SubmodelElement>) -> SubmodelElement {
    SubmodelElement::SubmodelElementList(SubmodelElementList {
        meta: ElementMeta::named(id_short),
        order_relevant: Some(true),
        semantic_id_list_element: None,
        type_value_list_element: type_value,
        value_type_list_element: None,
        value: if children.is_empty() { None } else { Some(children) },
    })
}

fn int_list(id_short: &str, values: &[&str]) -> SubmodelElement {
    let mut l = list(id_short, AasSubmodelElements::Property, values.iter().map(|v| item(v)).collect());
    if let SubmodelElement::SubmodelElementList(inner) = &mut l {
        inner.value_type_list_element = Some(DataTypeDefXsd::Int);
    }
    l
}

fn property_value(element: &SubmodelElement) -> Option<String> {
    match element {
        SubmodelElement::Property(p) => p.value.clone(),
        other => panic!("expected a Property, got {:?}", other.model_type()),
    }
}

fn id_shorts(elements: &[SubmodelElement]) -> Vec<String> {
    elements.iter().map(|e| e.id_short().unwrap_or_default().to_string()).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn scenario_a_page_and_nested_read() {
    let (repo, _dir) = open().await;
    let sm = Submodel::new("sm-1").with_elements(vec![
        int("alpha", "1"),
        collection("beta", vec![int("gamma", "2")]),
    ]);
    repo.create_submodel(sm).await.unwrap();

    let page = repo.get_submodel_elements("sm-1", Some(10), None).await.unwrap();
    assert_eq!(id_shorts(&page.items), ["alpha", "beta"]);
    assert!(page.cursor.is_none());

    let gamma = repo.get_submodel_element("sm-1", "beta.gamma").await.unwrap();
    assert_eq!(gamma.id_short(), Some("gamma"));
    assert_eq!(property_value(&gamma).as_deref(), Some("2"));
}

#[tokio::test]
async fn scenario_b_list_append_takes_next_index() {
    let (repo, _dir) = open().await;
    repo.create_submodel(Submodel::new("sm-b").with_elements(vec![int_list("listX", &["10"])]))
        .await
        .unwrap();

    let path = repo.add_submodel_element_at_path("sm-b", "listX", item("11")).await.unwrap();
    assert_eq!(path, "listX[1]");
    let added = repo.get_submodel_element("sm-b", "listX[1]").await.unwrap();
    assert_eq!(property_value(&added).as_deref(), Some("11"));

    // The list only holds Int properties.
    let err = repo
        .add_submodel_element_at_path("sm-b", "listX", text("s", "nope"))
        .await
        .unwrap_err();
    assert!(err.is_bad_request(), "{:?}", err);
}

#[tokio::test]
async fn scenario_c_cursor_pagination() {
    let (repo, _dir) = open().await;
    repo.create_submodel(Submodel::new("sm-c").with_elements(vec![
        int("c", "3"),
        int("a", "1"),
        int("b", "2"),
    ]))
    .await
    .unwrap();

    let first = repo.get_submodel_elements("sm-c", Some(2), None).await.unwrap();
    assert_eq!(id_shorts(&first.items), ["a", "b"]);
    let cursor = first.cursor.expect("a second page");

    let second = repo.get_submodel_elements("sm-c", Some(2), Some(&cursor)).await.unwrap();
    assert_eq!(id_shorts(&second.items), ["c"]);
    assert!(second.cursor.is_none());

    assert!(repo.get_submodel_elements("sm-c", Some(0), None).await.unwrap().items.is_empty());
    assert_eq!(repo.get_submodel_elements("sm-c", Some(-1), None).await.unwrap().items.len(), 3);
    assert!(repo.get_submodel_elements("sm-c", Some(-2), None).await.unwrap_err().is_bad_request());
    assert!(repo.get_submodel_elements("sm-c", Some(2), Some("%%%")).await.unwrap_err().is_bad_request());
}

#[tokio::test]
async fn scenario_d_concurrent_add_same_path() {
    let (repo, _dir) = open().await;
    repo.create_submodel(Submodel::new("sm-d").with_elements(vec![collection("parent", vec![])]))
        .await
        .unwrap();

    let a = repo.clone();
    let b = repo.clone();
    let (ra, rb) = futures::join!(
        a.add_submodel_element_at_path("sm-d", "parent", text("child", "first")),
        b.add_submodel_element_at_path("sm-d", "parent", text("child", "second")),
    );

    let (winner, loser) = match (ra, rb) {
        (Ok(path), Err(e)) => ((path, "first"), e),
        (Err(e), Ok(path)) => ((path, "second"), e),
        other => panic!("expected exactly one winner, got {:?}", other),
    };
    assert!(loser.is_conflict(), "{:?}", loser);
    assert_eq!(winner.0, "parent.child");

    let stored = repo.get_submodel_element("sm-d", "parent.child").await.unwrap();
    assert_eq!(property_value(&stored).as_deref(), Some(winner.1));
}

// =============================================================================
// Round trips
// =============================================================================

fn every_variant() -> Vec<SubmodelElement> {
    let reference = Reference::model(vec![
        Key::new(KeyType::Submodel, "urn:sm:rt"),
        Key::new(KeyType::Property, "a_prop"),
    ]);
    let mut described = ElementMeta::named("a_prop");
    described.description = Some(vec![LangString::new("en", "a property"), LangString::new("de", "Eigenschaft")]);
    described.semantic_id = Some(Reference::global("urn:sem:prop").with_referred(Reference::global("urn:sem:base")));
    described.category = Some("PARAMETER".into());

    vec![
        SubmodelElement::Property(Property {
            meta: described,
            value_type: DataTypeDefXsd::Double,
            value: Some("1.50e3".into()),
            value_id: Some(Reference::global("urn:value")),
        }),
        SubmodelElement::AnnotatedRelationshipElement(AnnotatedRelationshipElement {
            meta: ElementMeta::named("b_annotated"),
            first: reference.clone(),
            second: Reference::global("urn:other"),
            annotations: Some(vec![text("note", "checked")]),
        }),
        SubmodelElement::BasicEventElement(BasicEventElement {
            meta: ElementMeta::named("c_event"),
            observed: reference.clone(),
            direction: Direction::Output,
            state: StateOfEvent::On,
            message_topic: Some("sensors/temp".into()),
            message_broker: None,
            last_update: None,
            min_interval: Some("PT1S".into()),
            max_interval: None,
        }),
        SubmodelElement::Blob(Blob {
            meta: ElementMeta::named("d_blob"),
            content_type: "application/octet-stream".into(),
            value: Some(vec![0, 1, 2, 254, 255]),
        }),
        SubmodelElement::Capability(Capability { meta: ElementMeta::named("e_capability") }),
        SubmodelElement::Entity(Entity {
            meta: ElementMeta::named("f_entity"),
            entity_type: Some(EntityType::SelfManagedEntity),
            global_asset_id: Some("urn:asset:1".into()),
            specific_asset_ids: None,
            statements: Some(vec![text("serial", "SN-1"), int("rpm", "900")]),
        }),
        SubmodelElement::File(File {
            meta: ElementMeta::named("g_file"),
            content_type: "image/png".into(),
            value: Some("/aasx/logo.png".into()),
        }),
        SubmodelElement::SubmodelElementList(SubmodelElementList {
            meta: ElementMeta::named("h_list"),
            order_relevant: Some(true),
            semantic_id_list_element: Some(Reference::global("urn:sem:reading")),
            type_value_list_element: AasSubmodelElements::SubmodelElementCollection,
            value_type_list_element: None,
            value: Some(vec![
                unnamed_collection(vec![int("x", "1"), int("y", "2")]),
                unnamed_collection(vec![int("x", "3")]),
            ]),
        }),
        SubmodelElement::MultiLanguageProperty(MultiLanguageProperty {
            meta: ElementMeta::named("i_mlp"),
            value: Some(vec![LangString::new("en", "motor"), LangString::new("de", "Motor")]),
            value_id: None,
        }),
        SubmodelElement::Operation(Operation {
            meta: ElementMeta::named("j_operation"),
            input_variables: Some(vec![OperationVariable { value: Box::new(int("speed", "0")) }]),
            output_variables: None,
            inoutput_variables: None,
        }),
        SubmodelElement::Range(Range {
            meta: ElementMeta::named("k_range"),
            value_type: DataTypeDefXsd::Int,
            min: Some("0".into()),
            max: Some("100".into()),
        }),
        SubmodelElement::ReferenceElement(ReferenceElement {
            meta: ElementMeta::named("l_reference"),
            value: Some(reference.clone()),
        }),
        SubmodelElement::RelationshipElement(RelationshipElement {
            meta: ElementMeta::named("m_relationship"),
            first: reference,
            second: Reference::global("urn:other"),
        }),
        collection(
            "n_collection",
            vec![collection("deep", vec![collection("deeper", vec![text("leaf", "bottom")])])],
        ),
    ]
}

#[tokio::test]
async fn happy_round_trip_every_variant() {
    let (repo, _dir) = open().await;
    let mut sm = Submodel::new("urn:sm:rt").with_elements(every_variant());
    sm.id_short = Some("RoundTrip".into());
    sm.kind = Some(ModellingKind::Instance);
    sm.semantic_id = Some(Reference::global("urn:sem:submodel"));
    sm.description = Some(vec![LangString::new("en", "round trip")]);
    sm.administration = Some(AdministrativeInformation {
        version: Some("1".into()),
        revision: Some("2".into()),
        ..Default::default()
    });
    repo.create_submodel(sm.clone()).await.unwrap();

    let loaded = repo.get_submodel("urn:sm:rt").await.unwrap();
    assert_eq!(loaded, sm);

    let deep = repo.get_submodel_element("urn:sm:rt", "n_collection.deep.deeper.leaf").await.unwrap();
    assert_eq!(property_value(&deep).as_deref(), Some("bottom"));
    let list_item = repo.get_submodel_element("urn:sm:rt", "h_list[1].x").await.unwrap();
    assert_eq!(property_value(&list_item).as_deref(), Some("3"));

    let mut metadata = sm.clone();
    metadata.submodel_elements = None;
    assert_eq!(repo.get_submodel_metadata("urn:sm:rt").await.unwrap(), metadata);
}

#[tokio::test]
async fn happy_semantic_id_falls_back_to_key_rows() {
    let (repo, _dir) = open().await;
    let semantic = Reference::global("urn:sem:temp").with_referred(Reference::global("urn:sem:quantity"));
    let mut meta = ElementMeta::named("temp");
    meta.semantic_id = Some(semantic.clone());
    let element = SubmodelElement::Property(Property {
        meta,
        value_type: DataTypeDefXsd::Double,
        value: Some("21.5".into()),
        value_id: None,
    });
    let mut sm = Submodel::new("sm-sem").with_elements(vec![element]);
    sm.semantic_id = Some(semantic.clone());
    repo.create_submodel(sm).await.unwrap();

    for table in ["submodel_element_semantic_id_payload", "submodel_semantic_id_payload"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(repo.pool())
            .await
            .unwrap();
    }

    let temp = repo.get_submodel_element("sm-sem", "temp").await.unwrap();
    assert_eq!(temp.meta().semantic_id.as_ref(), Some(&semantic));
    let metadata = repo.get_submodel_metadata("sm-sem").await.unwrap();
    assert_eq!(metadata.semantic_id, Some(semantic));
}

#[tokio::test]
async fn happy_element_references_page() {
    let (repo, _dir) = open().await;
    repo.create_submodel(Submodel::new("sm-ref").with_elements(vec![
        int("a", "1"),
        collection("b", vec![int("inner", "2")]),
    ]))
    .await
    .unwrap();

    let page = repo.get_submodel_element_references("sm-ref", Some(1), None).await.unwrap();
    assert_eq!(
        page.items,
        vec![Reference::model(vec![Key::new(KeyType::Submodel, "sm-ref"), Key::new(KeyType::Property, "a")])]
    );
    let next = repo
        .get_submodel_element_references("sm-ref", Some(1), page.cursor.as_deref())
        .await
        .unwrap();
    assert_eq!(next.items[0].keys[1], Key::new(KeyType::SubmodelElementCollection, "b"));
    assert!(next.cursor.is_none());
}

// =============================================================================
// Renames and deletes
// =============================================================================

fn sensor_submodel() -> Submodel {
    Submodel::new("sm-sensor").with_elements(vec![
        collection("sensor", vec![int("temp", "21"), int_list("readings", &["1", "2"])]),
        collection("sensorBackup", vec![int("temp", "19")]),
    ])
}

#[tokio::test]
async fn happy_rename_cascades_to_descendants() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();

    let renamed = collection("sensorX", vec![int("temp", "21"), int_list("readings", &["1", "2"])]);
    repo.update_submodel_element("sm-sensor", "sensor", renamed, UpdateMode::FullReplace)
        .await
        .unwrap();

    let temp = repo.get_submodel_element("sm-sensor", "sensorX.temp").await.unwrap();
    assert_eq!(property_value(&temp).as_deref(), Some("21"));
    let reading = repo.get_submodel_element("sm-sensor", "sensorX.readings[0]").await.unwrap();
    assert_eq!(property_value(&reading).as_deref(), Some("1"));
    assert!(repo.get_submodel_element("sm-sensor", "sensor.temp").await.unwrap_err().is_not_found());

    let backup = repo.get_submodel_element("sm-sensor", "sensorBackup.temp").await.unwrap();
    assert_eq!(property_value(&backup).as_deref(), Some("19"));
}

#[tokio::test]
async fn happy_list_item_rename_keeps_path() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();

    let mut relabelled = item("1");
    relabelled.meta_mut().id_short = Some("first".into());
    repo.update_submodel_element("sm-sensor", "sensor.readings[0]", relabelled, UpdateMode::FullReplace)
        .await
        .unwrap();

    let reading = repo.get_submodel_element("sm-sensor", "sensor.readings[0]").await.unwrap();
    assert_eq!(reading.id_short(), Some("first"));
}

#[tokio::test]
async fn failure_rename_onto_sibling_changes_nothing() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();
    let before = repo.get_submodel("sm-sensor").await.unwrap();

    let clash = collection("sensorBackup", vec![int("temp", "99")]);
    let err = repo
        .update_submodel_element("sm-sensor", "sensor", clash, UpdateMode::FullReplace)
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);

    assert_eq!(repo.get_submodel("sm-sensor").await.unwrap(), before);
}

#[tokio::test]
async fn happy_delete_list_item_reindexes_siblings() {
    let (repo, _dir) = open().await;
    let items = (0..4)
        .map(|i| unnamed_collection(vec![int("n", &i.to_string())]))
        .collect();
    repo.create_submodel(Submodel::new("sm-del").with_elements(vec![list(
        "l",
        AasSubmodelElements::SubmodelElementCollection,
        items,
    )]))
    .await
    .unwrap();

    repo.delete_submodel_element_at_path("sm-del", "l[1]").await.unwrap();

    for (index, expected) in [(0, "0"), (1, "2"), (2, "3")] {
        let n = repo
            .get_submodel_element("sm-del", &format!("l[{}].n", index))
            .await
            .unwrap();
        assert_eq!(property_value(&n).as_deref(), Some(expected), "l[{}]", index);
    }
    assert!(repo.get_submodel_element("sm-del", "l[3]").await.unwrap_err().is_not_found());

    // The next append lands after the closed gap.
    let path = repo
        .add_submodel_element_at_path("sm-del", "l", unnamed_collection(vec![int("n", "4")]))
        .await
        .unwrap();
    assert_eq!(path, "l[3]");
}

#[tokio::test]
async fn happy_delete_named_subtree() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();

    repo.delete_submodel_element_at_path("sm-sensor", "sensor").await.unwrap();
    assert!(repo.get_submodel_element("sm-sensor", "sensor.readings[1]").await.unwrap_err().is_not_found());
    let page = repo.get_submodel_elements("sm-sensor", None, None).await.unwrap();
    assert_eq!(id_shorts(&page.items), ["sensorBackup"]);

    assert!(repo.delete_submodel_element_at_path("sm-sensor", "sensor").await.unwrap_err().is_not_found());
}

// =============================================================================
// Updates
// =============================================================================

#[tokio::test]
async fn happy_patch_and_full_replace() {
    let (repo, _dir) = open().await;
    let mut meta = ElementMeta::named("speed");
    meta.description = Some(vec![LangString::new("en", "old")]);
    let speed = SubmodelElement::Property(Property {
        meta,
        value_type: DataTypeDefXsd::Int,
        value: Some("10".into()),
        value_id: None,
    });
    repo.create_submodel(Submodel::new("sm-upd").with_elements(vec![speed])).await.unwrap();

    // Patch carrying only a description.
    let mut patch_meta = ElementMeta::default();
    patch_meta.description = Some(vec![LangString::new("en", "new")]);
    let patch = SubmodelElement::Property(Property {
        meta: patch_meta,
        value_type: DataTypeDefXsd::Int,
        value: None,
        value_id: None,
    });
    repo.update_submodel_element("sm-upd", "speed", patch, UpdateMode::Patch).await.unwrap();
    let patched = repo.get_submodel_element("sm-upd", "speed").await.unwrap();
    assert_eq!(patched.meta().description, Some(vec![LangString::new("en", "new")]));
    assert_eq!(property_value(&patched).as_deref(), Some("10"));

    // Full replace without a description clears it.
    repo.update_submodel_element("sm-upd", "speed", int("speed", "20"), UpdateMode::FullReplace)
        .await
        .unwrap();
    let replaced = repo.get_submodel_element("sm-upd", "speed").await.unwrap();
    assert_eq!(replaced.meta().description, None);
    assert_eq!(property_value(&replaced).as_deref(), Some("20"));
}

#[tokio::test]
async fn happy_full_replace_swaps_collection_children() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();

    let replacement = collection("sensor", vec![text("unit", "C")]);
    repo.update_submodel_element("sm-sensor", "sensor", replacement.clone(), UpdateMode::FullReplace)
        .await
        .unwrap();

    assert_eq!(repo.get_submodel_element("sm-sensor", "sensor").await.unwrap(), replacement);
    assert!(repo.get_submodel_element("sm-sensor", "sensor.temp").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn failure_update_cannot_change_model_type() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();
    let err = repo
        .update_submodel_element("sm-sensor", "sensor", text("sensor", "x"), UpdateMode::FullReplace)
        .await
        .unwrap_err();
    assert!(err.is_bad_request(), "{:?}", err);
}

#[tokio::test]
async fn happy_value_only_updates_nested_values() {
    let (repo, _dir) = open().await;
    repo.create_submodel(Submodel::new("sm-val").with_elements(vec![
        collection("sensor", vec![prop("temp", DataTypeDefXsd::Double, "21.5"), text("unit", "C")]),
        SubmodelElement::Operation(Operation {
            meta: ElementMeta::named("op"),
            input_variables: None,
            output_variables: None,
            inoutput_variables: None,
        }),
    ]))
    .await
    .unwrap();

    repo.update_submodel_element_value_only("sm-val", "sensor", &json!({"temp": 22.5, "unit": "K"}))
        .await
        .unwrap();
    assert_eq!(
        repo.get_submodel_element_value("sm-val", "sensor").await.unwrap(),
        json!({"temp": "22.5", "unit": "K"})
    );

    let err = repo
        .update_submodel_element_value_only("sm-val", "op", &json!({}))
        .await
        .unwrap_err();
    assert!(err.is_bad_request(), "{:?}", err);
    let err = repo
        .update_submodel_element_value_only("sm-val", "sensor.temp", &json!({"nested": true}))
        .await
        .unwrap_err();
    assert!(err.is_bad_request(), "{:?}", err);
    let err = repo
        .update_submodel_element_value_only("sm-val", "sensor", &json!({"missing": "1"}))
        .await
        .unwrap_err();
    assert!(err.is_bad_request(), "{:?}", err);
    assert!(repo.get_submodel_element_value("sm-val", "op").await.unwrap_err().is_bad_request());

    // Failed updates rolled back; the earlier value stands.
    assert_eq!(
        repo.get_submodel_element_value("sm-val", "sensor.unit").await.unwrap(),
        json!("K")
    );

    repo.update_submodel_value_only("sm-val", &json!({"sensor": {"unit": "F"}}))
        .await
        .unwrap();
    assert_eq!(repo.get_submodel_element_value("sm-val", "sensor.unit").await.unwrap(), json!("F"));
}

// =============================================================================
// Submodel level
// =============================================================================

#[tokio::test]
async fn failure_duplicates_are_conflicts() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();

    assert!(repo.create_submodel(sensor_submodel()).await.unwrap_err().is_conflict());
    assert!(repo
        .add_submodel_element("sm-sensor", collection("sensor", vec![]))
        .await
        .unwrap_err()
        .is_conflict());
    assert!(repo
        .add_submodel_element_at_path("sm-sensor", "sensor", int("temp", "1"))
        .await
        .unwrap_err()
        .is_conflict());
}

#[tokio::test]
async fn failure_bad_requests() {
    let (repo, _dir) = open().await;
    repo.create_submodel(sensor_submodel()).await.unwrap();

    let cases = [
        repo.add_submodel_element_at_path("sm-sensor", "sensor.temp", int("x", "1")).await,
        repo.add_submodel_element("sm-sensor", int("1bad", "1")).await,
        repo.add_submodel_element("sm-sensor", int("n", "not a number")).await,
        repo.add_submodel_element_at_path("sm-sensor", "sensor..temp", int("x", "1")).await,
    ];
    for result in cases {
        assert!(result.unwrap_err().is_bad_request());
    }
    assert!(repo.get_submodel_element("sm-sensor", "sensor[").await.unwrap_err().is_bad_request());
    assert!(repo.get_submodel_element("missing", "sensor").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn failure_invalid_create_leaves_nothing() {
    let (repo, _dir) = open().await;
    let sm = Submodel::new("sm-bad").with_elements(vec![int("ok", "1"), int("bad", "x")]);
    assert!(repo.create_submodel(sm).await.unwrap_err().is_bad_request());
    assert!(repo.get_submodel("sm-bad").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn happy_put_update_delete_submodel() {
    let (repo, _dir) = open().await;
    let first = Submodel::new("sm-put").with_elements(vec![int("a", "1")]);
    assert!(repo.put_submodel("sm-put", first).await.unwrap());

    let second = Submodel::new("sm-put").with_elements(vec![int("b", "2")]);
    assert!(!repo.put_submodel("sm-put", second.clone()).await.unwrap());
    assert_eq!(repo.get_submodel("sm-put").await.unwrap(), second);

    let mut patch = Submodel::new("sm-put");
    patch.id_short = Some("Patched".into());
    repo.update_submodel("sm-put", patch, UpdateMode::Patch).await.unwrap();
    let patched = repo.get_submodel("sm-put").await.unwrap();
    assert_eq!(patched.id_short.as_deref(), Some("Patched"));
    assert_eq!(id_shorts(patched.elements()), ["b"]);

    let err = repo
        .update_submodel("sm-put", Submodel::new("other"), UpdateMode::FullReplace)
        .await
        .unwrap_err();
    assert!(err.is_bad_request());

    repo.delete_submodel("sm-put").await.unwrap();
    assert!(repo.get_submodel("sm-put").await.unwrap_err().is_not_found());
    assert!(repo.delete_submodel("sm-put").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn happy_get_submodels_fans_out_across_pages() {
    let (repo, _dir) = open_with(|c| StoreConfig { fetch_workers: 2, ..c }).await;
    for i in 0..5 {
        let sm = Submodel::new(format!("urn:sm:{}", i))
            .with_elements(vec![collection("c", vec![int("i", &i.to_string())])]);
        repo.create_submodel(sm).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = repo
            .get_submodels(&SubmodelFilter::default(), Some(2), cursor.as_deref())
            .await
            .unwrap();
        assert!(page.items.len() <= 2);
        for sm in &page.items {
            let i = sm.id.trim_start_matches("urn:sm:").to_string();
            assert_eq!(sm.elements()[0].children().map(|c| c.len()), Some(1));
            seen.push(i);
        }
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(seen, ["0", "1", "2", "3", "4"]);

    let all = SubmodelFilter::default();
    assert!(repo.get_submodels(&all, Some(0), None).await.unwrap().items.is_empty());
    assert!(repo.get_submodels(&all, Some(-2), None).await.unwrap_err().is_bad_request());
}

#[tokio::test]
async fn happy_get_submodels_filters_by_id_short_and_semantic_id() {
    let (repo, _dir) = open().await;
    for (id, id_short, semantic) in [
        ("urn:sm:a", "Nameplate", "urn:sem:plate"),
        ("urn:sm:b", "Nameplate", "urn:sem:other"),
        ("urn:sm:c", "Technical", "urn:sem:plate"),
    ] {
        let mut sm = Submodel::new(id).with_elements(vec![int("x", "1")]);
        sm.id_short = Some(id_short.into());
        sm.semantic_id = Some(Reference::global(semantic).with_referred(Reference::global("urn:sem:base")));
        repo.create_submodel(sm).await.unwrap();
    }
    repo.create_submodel(Submodel::new("urn:sm:d")).await.unwrap();

    let ids = |page: submodel_store::Page<Submodel>| page.items.into_iter().map(|sm| sm.id).collect::<Vec<_>>();

    let by_name = SubmodelFilter::default().with_id_short("Nameplate");
    let page = repo.get_submodels(&by_name, Some(-1), None).await.unwrap();
    assert_eq!(page.items[0].elements().len(), 1);
    assert_eq!(ids(page), ["urn:sm:a", "urn:sm:b"]);

    let by_semantic = SubmodelFilter::default().with_semantic_id("urn:sem:plate");
    assert_eq!(ids(repo.get_submodels(&by_semantic, None, None).await.unwrap()), ["urn:sm:a", "urn:sm:c"]);

    // Only the semantic ID itself counts, not its referred semantic ID
    let by_referred = SubmodelFilter::default().with_semantic_id("urn:sem:base");
    assert!(repo.get_submodels(&by_referred, None, None).await.unwrap().items.is_empty());

    let both = by_name.clone().with_semantic_id("urn:sem:plate");
    assert_eq!(ids(repo.get_submodels(&both, None, None).await.unwrap()), ["urn:sm:a"]);

    // Cursors carry over with the filter applied
    let first = repo.get_submodels(&by_semantic, Some(1), None).await.unwrap();
    assert_eq!(first.items[0].id, "urn:sm:a");
    let second = repo
        .get_submodels(&by_semantic, Some(1), first.cursor.as_deref())
        .await
        .unwrap();
    assert_eq!(second.cursor, None);
    assert_eq!(ids(second), ["urn:sm:c"]);
}

#[tokio::test]
async fn happy_submodel_references() {
    let (repo, _dir) = open().await;
    for i in 0..3 {
        let mut sm = Submodel::new(format!("urn:sm:{}", i));
        sm.id_short = Some(if i == 1 { "Odd".into() } else { "Even".into() });
        repo.create_submodel(sm).await.unwrap();
    }
    let expected = |id: &str| Reference::model(vec![Key::new(KeyType::Submodel, id)]);

    assert_eq!(repo.get_submodel_reference("urn:sm:1").await.unwrap(), expected("urn:sm:1"));

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = repo
            .get_submodel_references(&SubmodelFilter::default(), Some(2), cursor.as_deref())
            .await
            .unwrap();
        seen.extend(page.items);
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(seen, vec![expected("urn:sm:0"), expected("urn:sm:1"), expected("urn:sm:2")]);

    let even = SubmodelFilter::default().with_id_short("Even");
    let page = repo.get_submodel_references(&even, None, None).await.unwrap();
    assert_eq!(page.items, vec![expected("urn:sm:0"), expected("urn:sm:2")]);
}

#[tokio::test]
async fn failure_submodel_reference_lookups() {
    let (repo, _dir) = open().await;
    assert!(repo.get_submodel_reference("urn:sm:none").await.unwrap_err().is_not_found());
    assert!(repo.get_submodel_reference("  ").await.unwrap_err().is_bad_request());
    assert!(repo
        .get_submodel_references(&SubmodelFilter::default(), Some(-2), None)
        .await
        .unwrap_err()
        .is_bad_request());
    assert!(repo
        .get_submodel_references(&SubmodelFilter::default(), None, Some("!!!"))
        .await
        .unwrap_err()
        .is_bad_request());
}

#[tokio::test]
async fn happy_cache_is_invalidated_by_writes() {
    let cache = Arc::new(InMemorySubmodelCache::new());
    let (repo, _dir) = open().await;
    let repo = repo.with_cache(cache.clone());
    repo.create_submodel(sensor_submodel()).await.unwrap();

    let loaded = repo.get_submodel("sm-sensor").await.unwrap();
    assert!(cache.contains("sm-sensor"));
    assert_eq!(repo.get_submodel("sm-sensor").await.unwrap(), loaded);

    repo.add_submodel_element("sm-sensor", int("extra", "1")).await.unwrap();
    assert!(!cache.contains("sm-sensor"));
    let reloaded = repo.get_submodel("sm-sensor").await.unwrap();
    assert_eq!(reloaded.elements().len(), 3);
}

/// Cache whose first conditional fill waits until the test releases it.
struct HeldCache {
    inner: InMemorySubmodelCache,
    hold: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl HeldCache {
    fn new() -> Self {
        Self {
            inner: InMemorySubmodelCache::new(),
            hold: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl SubmodelCache for HeldCache {
    async fn get(&self, id: &str) -> Option<Submodel> {
        self.inner.get(id).await
    }

    async fn put(&self, submodel: &Submodel) {
        self.inner.put(submodel).await
    }

    async fn generation(&self, id: &str) -> u64 {
        self.inner.generation(id).await
    }

    async fn put_if_current(&self, submodel: &Submodel, generation: u64) -> bool {
        if self.hold.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.put_if_current(submodel, generation).await
    }

    async fn invalidate(&self, id: &str) {
        self.inner.invalidate(id).await
    }

    async fn clear(&self) {
        self.inner.clear().await
    }
}

#[tokio::test]
async fn happy_cache_skips_fill_that_raced_a_write() {
    let cache = Arc::new(HeldCache::new());
    let (repo, _dir) = open().await;
    let repo = repo.with_cache(cache.clone());
    repo.create_submodel(sensor_submodel()).await.unwrap();

    // The read finishes against the store, then stalls before filling the cache
    let reader = {
        let repo = repo.clone();
        tokio::spawn(async move { repo.get_submodel("sm-sensor").await })
    };
    cache.entered.notified().await;

    repo.add_submodel_element("sm-sensor", int("late", "1")).await.unwrap();
    cache.release.notify_one();

    let earlier = reader.await.unwrap().unwrap();
    assert_eq!(earlier.elements().len(), 2);
    assert!(!cache.inner.contains("sm-sensor"));

    let current = repo.get_submodel("sm-sensor").await.unwrap();
    assert!(current.elements().iter().any(|e| e.id_short() == Some("late")));
    assert!(cache.inner.contains("sm-sensor"));
    assert_eq!(repo.get_submodel("sm-sensor").await.unwrap(), current);
}
