/// Relationship documents going through the graph in their JSON wire form
mod common;

use common::TestGraph;
use serde_json::json;
use tether_core::{
    document::RelationshipDocument,
    event::EventOrigin,
    graph::{EdgeFlag, Operation},
    TetherError,
};
use test_log::test;

fn apply(t: &mut TestGraph, resource_type: &str, id: &str, field: &str, body: serde_json::Value) {
    try_apply(t, resource_type, id, field, body).unwrap();
}

fn try_apply(
    t: &mut TestGraph,
    resource_type: &str,
    id: &str,
    field: &str,
    body: serde_json::Value,
) -> Result<(), TetherError> {
    let record = t.key(resource_type, id);
    let value: RelationshipDocument = serde_json::from_value(body).unwrap();
    t.graph.update(
        Operation::UpdateRelationship {
            record,
            field: field.to_string(),
            value,
        },
        EventOrigin::Remote,
    )
}

#[test]
fn payload_round_trips_through_the_graph() {
    let mut t = TestGraph::new();
    apply(
        &mut t,
        "post",
        "1",
        "comments",
        json!({
            "data": [{"type": "comment", "id": "1"}, {"type": "comment", "id": "2"}],
            "links": {"related": "/posts/1/comments"},
            "meta": {"total": 2}
        }),
    );

    let post = t.key("post", "1");
    let document = t.graph.get_data(&post, "comments").unwrap().to_refs();
    assert_eq!(
        serde_json::to_value(&document).unwrap(),
        json!({
            "data": [
                {"type": "comment", "id": "1", "lid": t.key("comment", "1").lid().to_string()},
                {"type": "comment", "id": "2", "lid": t.key("comment", "2").lid().to_string()}
            ],
            "links": {"related": "/posts/1/comments"},
            "meta": {"total": 2}
        })
    );

    let comment = t.key("comment", "2");
    let inverse = t.graph.get_data(&comment, "post").unwrap().to_refs();
    assert_eq!(
        serde_json::to_value(&inverse).unwrap()["data"]["id"],
        json!("1")
    );
    t.assert_consistent();
}

#[test]
fn null_single_clears_and_is_reported_as_null() {
    let mut t = TestGraph::new();
    apply(&mut t, "post", "1", "author", json!({"data": {"type": "user", "id": "1"}}));
    apply(&mut t, "post", "1", "author", json!({"data": null}));

    let post = t.key("post", "1");
    let document = t.graph.get_data(&post, "author").unwrap().to_refs();
    assert_eq!(serde_json::to_value(&document).unwrap(), json!({"data": null}));
    assert!(t.remote(&t.key("user", "1"), "posts").is_empty());
    let edge = t.graph.edge(&post, "author").unwrap();
    assert!(edge.has_flag(EdgeFlag::IsEmpty));
    assert!(edge.has_flag(EdgeFlag::HasReceivedData));
}

#[test]
fn absent_data_on_sync_field_counts_as_empty() {
    let mut t = TestGraph::new();
    apply(&mut t, "comment", "1", "post", json!({"links": {"related": "/comments/1/post"}}));

    let comment = t.key("comment", "1");
    let edge = t.graph.edge(&comment, "post").unwrap();
    assert!(edge.has_flag(EdgeFlag::HasReceivedData));
    assert!(edge.has_flag(EdgeFlag::IsEmpty));
    assert!(!edge.has_flag(EdgeFlag::IsStale));
}

#[test]
fn absent_data_on_async_field_marks_links_stale() {
    let mut t = TestGraph::new();
    apply(&mut t, "user", "1", "posts", json!({"links": {"related": "/users/1/posts"}}));

    let user = t.key("user", "1");
    let edge = t.graph.edge(&user, "posts").unwrap();
    assert!(!edge.has_flag(EdgeFlag::HasReceivedData));
    assert!(edge.has_flag(EdgeFlag::IsStale));
    assert_eq!(t.changed(), vec![(user.clone(), "posts".to_string())]);

    // the same link again is not a change, and the edge is still waiting for a refetch
    apply(&mut t, "user", "1", "posts", json!({"links": {"related": {"href": "/users/1/posts"}}}));
    assert!(t.changed().is_empty());
    assert!(t.graph.edge(&user, "posts").unwrap().has_flag(EdgeFlag::IsStale));
}

#[test]
fn mismatched_shapes_are_rejected_before_any_change() {
    let mut t = TestGraph::new();
    let err = try_apply(
        &mut t,
        "post",
        "1",
        "author",
        json!({"data": [{"type": "user", "id": "1"}]}),
    )
    .unwrap_err();
    assert!(matches!(err, TetherError::InvalidPayload { .. }));

    let err = try_apply(
        &mut t,
        "post",
        "1",
        "comments",
        json!({"data": {"type": "comment", "id": "1"}}),
    )
    .unwrap_err();
    assert!(matches!(err, TetherError::InvalidPayload { .. }));

    let err = try_apply(
        &mut t,
        "post",
        "1",
        "comments",
        json!({"data": [{"type": "comment"}]}),
    )
    .unwrap_err();
    assert!(matches!(err, TetherError::InvalidPayload { .. }));

    let post = t.key("post", "1");
    assert!(!t.graph.has(&post, "author"));
    assert!(!t.graph.has(&post, "comments"));
}

#[test]
fn null_collection_is_coerced_to_empty() {
    let mut t = TestGraph::new();
    apply(&mut t, "post", "1", "comments", json!({"data": [{"type": "comment", "id": "1"}]}));
    apply(&mut t, "post", "1", "comments", json!({"data": null}));

    let post = t.key("post", "1");
    let document = t.graph.get_data(&post, "comments").unwrap();
    assert_eq!(serde_json::to_value(document.to_refs()).unwrap(), json!({"data": []}));
    assert!(t.remote(&t.key("comment", "1"), "post").is_empty());
    t.assert_consistent();
}
