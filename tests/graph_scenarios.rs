//! End-to-end scenarios over the relationship graph: mixed local and remote traffic, identity
//! merges arriving through payloads, queued remote flushes and resource lifecycle.
mod common;

use common::{add, remove, set_many, set_one, TestGraph};
use std::{cell::RefCell, collections::BTreeSet, rc::Rc};
use tempfile::TempDir;
use tether_core::{
    config::{ConfigProvider, GraphConfig, TomlConfigProvider},
    document::{Links, RelationshipData, RelationshipDocument},
    event::{EventOrigin, FnNotifier, GraphEvent, NullNotifier},
    graph::{EdgeFlag, Operation, RelationshipGraph},
    identity::{IdentityResolver, KeyCache, ResourceRef},
    schema::implicit_key,
};
use test_log::test;

#[test]
fn symmetry_holds_across_mixed_traffic() {
    let mut t = TestGraph::new();
    let (p1, p2) = (t.key("post", "1"), t.key("post", "2"));
    let (c1, c2, c3) = (t.key("comment", "1"), t.key("comment", "2"), t.key("comment", "3"));
    let (u1, u2) = (t.key("user", "1"), t.key("user", "2"));
    let draft = t.keys.create_local("comment");

    let steps = vec![
        (set_many(&p1, "comments", &[&c1, &c2]), EventOrigin::Remote),
        (set_one(&c3, "post", Some(&p1)), EventOrigin::Local),
        (set_one(&c1, "post", Some(&p2)), EventOrigin::Local),
        (add(&p2, "comments", &[&draft]), EventOrigin::Local),
        (set_one(&p1, "author", Some(&u1)), EventOrigin::Remote),
        (set_one(&p2, "author", Some(&u1)), EventOrigin::Local),
        (set_many(&u2, "posts", &[&p1]), EventOrigin::Local),
        (set_many(&p1, "comments", &[&c2, &c3]), EventOrigin::Remote),
        (remove(&p2, "comments", &[&c1]), EventOrigin::Local),
        (set_one(&p1, "author", Some(&u2)), EventOrigin::Remote),
    ];
    for (operation, origin) in steps {
        let label = operation.to_string();
        t.graph.update(operation, origin).unwrap();
        let errors = t.graph.built_in_test();
        assert!(errors.is_empty(), "after {label}: {errors:#?}");
    }

    assert_eq!(t.local(&p1, "author"), vec![u2.clone()]);
    assert_eq!(t.local(&u2, "posts"), vec![p1.clone()]);
    assert_eq!(t.local(&p2, "comments"), vec![draft.clone()]);
    assert!(t.local(&c1, "post").is_empty());
}

#[test]
fn remote_diff_only_touches_changed_members() {
    let mut t = TestGraph::new();
    let post = t.key("post", "1");
    let (c1, c2, c3, c4) = (
        t.key("comment", "1"),
        t.key("comment", "2"),
        t.key("comment", "3"),
        t.key("comment", "4"),
    );
    t.graph.get_data(&post, "comments").unwrap();
    t.graph
        .update(set_many(&post, "comments", &[&c1, &c2, &c3]), EventOrigin::Remote)
        .unwrap();
    t.changed();

    t.graph
        .update(set_many(&post, "comments", &[&c1, &c3, &c4]), EventOrigin::Remote)
        .unwrap();

    let changed: BTreeSet<_> = t.changed().into_iter().collect();
    let expected: BTreeSet<_> = [
        (post.clone(), "comments".to_string()),
        (c2.clone(), "post".to_string()),
        (c4.clone(), "post".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(changed, expected);
    assert!(t.remote(&c2, "post").is_empty());
    assert_eq!(t.local(&post, "comments"), vec![c1, c3, c4]);
}

#[test]
fn reorder_only_notifies_the_collection() {
    let mut t = TestGraph::new();
    let post = t.key("post", "1");
    let (c1, c2) = (t.key("comment", "1"), t.key("comment", "2"));
    t.graph.get_data(&post, "comments").unwrap();
    t.graph
        .update(set_many(&post, "comments", &[&c1, &c2]), EventOrigin::Remote)
        .unwrap();
    t.changed();

    t.graph
        .update(set_many(&post, "comments", &[&c2, &c1]), EventOrigin::Remote)
        .unwrap();
    assert_eq!(t.changed(), vec![(post.clone(), "comments".to_string())]);
    assert_eq!(t.local(&post, "comments"), vec![c2, c1]);
}

#[test]
fn each_field_is_notified_once_per_operation() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let keys = KeyCache::new();
    let mut graph = RelationshipGraph::new(
        common::blog_schema(),
        keys.clone(),
        FnNotifier(move |event: &GraphEvent| sink.borrow_mut().push(event.clone())),
        GraphConfig::default(),
    );
    let post = keys.resolve_or_create(&ResourceRef::new("post", "1")).unwrap();
    let comments: Vec<_> = (1..=3)
        .map(|i| keys.resolve_or_create(&ResourceRef::new("comment", i.to_string())).unwrap())
        .collect();
    let refs: Vec<_> = comments.iter().collect();

    graph
        .update(set_many(&post, "comments", &refs), EventOrigin::Local)
        .unwrap();
    graph
        .update(add(&post, "comments", &refs), EventOrigin::Local)
        .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 4);
    assert_eq!(
        seen.iter()
            .filter(|event| matches!(event, GraphEvent::RelationshipChanged { key, .. } if *key == post))
            .count(),
        1
    );
}

#[test]
fn payload_reference_merges_unsaved_record() {
    let mut t = TestGraph::new();
    let post = t.key("post", "1");
    let saved = t.key("comment", "5");
    let draft = t.keys.create_local("comment");

    t.graph
        .update(add(&post, "comments", &[&draft]), EventOrigin::Local)
        .unwrap();
    t.graph
        .update(
            Operation::UpdateRelationship {
                record: post.clone(),
                field: "comments".to_string(),
                value: RelationshipDocument::with_data(RelationshipData::Many(vec![
                    ResourceRef {
                        resource_type: "comment".to_string(),
                        id: Some("5".to_string()),
                        lid: Some(draft.lid().to_string()),
                    },
                ])),
            },
            EventOrigin::Remote,
        )
        .unwrap();

    assert_eq!(t.local(&post, "comments"), vec![saved.clone()]);
    assert_eq!(t.remote(&post, "comments"), vec![saved.clone()]);
    assert_eq!(t.local(&saved, "post"), vec![post.clone()]);
    assert!(!t.graph.has_changed(&post, "comments"));
    assert!(t.graph.edges_of(&draft).next().is_none());
    assert!(t.events.try_iter().any(|event| event
        == GraphEvent::IdentityMerged {
            from: draft.clone(),
            into: saved.clone(),
        }));
    t.assert_consistent();
}

#[test]
fn flush_shares_one_transaction() {
    let mut t = TestGraph::new();
    let post = t.key("post", "1");
    let c1 = t.key("comment", "1");

    // One side of the relationship carries data, the other only a link
    t.graph
        .push(Operation::UpdateRelationship {
            record: post.clone(),
            field: "comments".to_string(),
            value: RelationshipDocument::with_data(RelationshipData::Many(vec![
                ResourceRef::new("comment", "1"),
            ])),
        })
        .unwrap();
    t.graph
        .push(Operation::UpdateRelationship {
            record: c1.clone(),
            field: "post".to_string(),
            value: RelationshipDocument::with_links(Links::related("/comments/1/post")),
        })
        .unwrap();
    t.graph.flush_remote_queue().unwrap();

    assert_eq!(t.remote(&post, "comments"), vec![c1.clone()]);
    assert_eq!(t.remote(&c1, "post"), vec![post.clone()]);
    let edge = t.graph.edge(&c1, "post").unwrap();
    assert!(!edge.has_flag(EdgeFlag::IsStale));
    assert!(edge.links().is_some());
    assert_eq!(t.graph.current_transaction(), None);

    // Outside the batch the same kind of link change does mark it stale
    t.changed();
    t.graph
        .update(
            Operation::UpdateRelationship {
                record: c1.clone(),
                field: "post".to_string(),
                value: RelationshipDocument::with_links(Links::related("/comments/1/post?v=2")),
            },
            EventOrigin::Remote,
        )
        .unwrap();
    assert_eq!(t.changed(), vec![(c1.clone(), "post".to_string())]);
    assert!(t.graph.edge(&c1, "post").unwrap().has_flag(EdgeFlag::IsStale));
}

#[test]
fn merging_a_saved_draft_folds_shared_relationships() {
    let mut t = TestGraph::new();
    let draft = t.keys.create_local("post");
    let author = t.key("user", "1");
    let (c1, c2) = (t.key("comment", "1"), t.key("comment", "2"));

    t.graph
        .update(set_one(&draft, "author", Some(&author)), EventOrigin::Local)
        .unwrap();
    t.graph
        .update(add(&draft, "comments", &[&c2]), EventOrigin::Local)
        .unwrap();

    // The saved record is pushed before the save response assigns the draft its id
    let saved = t.key("post", "1");
    t.graph
        .update(
            Operation::UpdateRelationship {
                record: saved.clone(),
                field: "author".to_string(),
                value: RelationshipDocument::with_data(RelationshipData::One(ResourceRef::new(
                    "user", "1",
                ))),
            },
            EventOrigin::Remote,
        )
        .unwrap();
    t.graph
        .update(set_many(&saved, "comments", &[&c1]), EventOrigin::Remote)
        .unwrap();

    // The next payload for the saved record applies the queued merge first
    t.keys.update_id(&draft, "1").unwrap();
    t.graph
        .update(
            Operation::UpdateRelationship {
                record: saved.clone(),
                field: "comments".to_string(),
                value: RelationshipDocument::with_data(RelationshipData::Many(vec![
                    ResourceRef::new("comment", "1"),
                ])),
            },
            EventOrigin::Remote,
        )
        .unwrap();

    assert!(t.graph.edges_of(&draft).next().is_none());
    assert_eq!(t.local(&saved, "author"), vec![author.clone()]);
    assert_eq!(t.local(&author, "posts"), vec![saved.clone()]);
    assert_eq!(t.remote(&saved, "comments"), vec![c1.clone()]);
    assert_eq!(t.local(&saved, "comments"), vec![c1, c2.clone()]);
    assert_eq!(t.local(&c2, "post"), vec![saved]);
    t.assert_consistent();
}

#[test]
fn flush_reports_first_failure_and_applies_the_rest() {
    let mut t = TestGraph::new();
    let post = t.key("post", "1");
    let (c1, c2) = (t.key("comment", "1"), t.key("comment", "2"));

    let stranger = t.key("user", "9");
    t.graph
        .push(remove(&post, "author", &[&stranger]))
        .unwrap();
    t.graph.push(set_many(&post, "comments", &[&c1])).unwrap();
    t.graph.push(set_one(&c2, "post", Some(&post))).unwrap();

    assert!(t.graph.flush_remote_queue().is_err());
    assert_eq!(t.remote(&post, "comments"), vec![c1, c2]);
    t.assert_consistent();
}

#[test]
fn unloading_a_tag_releases_implicit_references() {
    let mut t = TestGraph::new();
    let post = t.key("post", "1");
    let (rust, graphs) = (t.key("tag", "rust"), t.key("tag", "graphs"));

    t.graph
        .update(set_many(&post, "tags", &[&rust, &graphs]), EventOrigin::Remote)
        .unwrap();
    assert!(t.graph.is_releasable(&rust));
    t.graph.get_data(&post, "tags").unwrap();
    t.changed();

    t.graph.unload(&rust);
    assert_eq!(t.local(&post, "tags"), vec![graphs.clone()]);
    assert_eq!(t.remote(&post, "tags"), vec![graphs]);
    assert!(t
        .graph
        .edge(&rust, &implicit_key("post", "tags"))
        .is_some_and(|edge| !edge.holds_data()));
    assert!(t.changed().contains(&(post, "tags".to_string())));
    t.assert_consistent();
}

#[test]
fn unloading_a_sync_member_clears_both_sides() {
    let mut t = TestGraph::new();
    let post = t.key("post", "1");
    let (c1, c2) = (t.key("comment", "1"), t.key("comment", "2"));

    t.graph
        .update(set_many(&post, "comments", &[&c1, &c2]), EventOrigin::Remote)
        .unwrap();
    t.graph.unload(&c1);

    assert_eq!(t.remote(&post, "comments"), vec![c2]);
    let edge = t.graph.edge(&c1, "post").unwrap();
    assert!(!edge.holds_data());
    assert!(edge.has_flag(EdgeFlag::IsStale));
    t.assert_consistent();
}

#[test]
fn config_round_trips_through_toml() {
    let dir = TempDir::new().unwrap();
    let provider = TomlConfigProvider::new(dir.path().join("tether.toml"));
    let config = GraphConfig {
        strict_polymorphism: false,
        reset_on_remote_update: true,
        trace_operations: true,
    };
    provider.set_graph_config(&config).unwrap();

    let graph = RelationshipGraph::from_provider(
        common::blog_schema(),
        KeyCache::new(),
        NullNotifier,
        &provider,
    )
    .unwrap();
    assert_eq!(graph.config(), &config);
}
