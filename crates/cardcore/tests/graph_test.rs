use cardcore::{Graph, GraphError, Node, NodeKind};

#[test]
fn test_mutations_bump_updated_at() {
    let mut graph = Graph::new();
    let before = graph.updated_at;

    let id = graph.add_node(Node::new(NodeKind::Apdu));
    assert!(graph.updated_at >= before);

    let mid = graph.updated_at;
    graph.remove_node(id).unwrap();
    assert!(graph.updated_at >= mid);
}

#[test]
fn test_remove_node_drops_touching_edges() {
    let mut graph = Graph::new();
    let a = graph.add_node(Node::new(NodeKind::Apdu));
    let b = graph.add_node(Node::new(NodeKind::Concat));
    let c = graph.add_node(Node::new(NodeKind::Apdu));
    graph.add_edge(a, b).unwrap();
    graph.add_edge(b, c).unwrap();
    graph.add_edge(a, c).unwrap();

    graph.remove_node(b).unwrap();

    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].source, a);
    assert_eq!(graph.edges[0].target, c);
}

#[test]
fn test_add_edge_requires_both_endpoints() {
    let mut graph = Graph::new();
    let a = graph.add_node(Node::new(NodeKind::Apdu));
    let ghost = uuid::Uuid::new_v4();

    assert!(matches!(
        graph.add_edge(a, ghost),
        Err(GraphError::NodeNotFound(_))
    ));
    assert!(matches!(
        graph.add_edge(ghost, a),
        Err(GraphError::NodeNotFound(_))
    ));
}

#[test]
fn test_update_node_replaces_in_place() {
    let mut graph = Graph::new();
    let node = Node::new(NodeKind::Apdu).with_label("before");
    let id = graph.add_node(node.clone());

    let renamed = node.with_label("after");
    graph.update_node(renamed).unwrap();
    assert_eq!(graph.node(id).unwrap().label, "after");

    let stranger = Node::new(NodeKind::Apdu);
    assert!(matches!(
        graph.update_node(stranger),
        Err(GraphError::NodeNotFound(_))
    ));
}

#[test]
fn test_legacy_runtime_fields_ignored_on_load() {
    // Old files carry per-node scratch state; it must not survive a load
    let json = r#"{
        "nodes": {},
        "edges": [],
        "updatedAt": "2024-01-01T00:00:00Z"
    }"#;
    let graph: Graph = serde_json::from_str(json).unwrap();
    assert!(graph.nodes.is_empty());

    let node_json = r#"{
        "id": "7b1c0a62-9d1e-4f0a-8c3b-2f6f6a0f1d11",
        "kind": "APDU",
        "label": "Select",
        "data": {
            "params": { "CLA": "00", "INS": "A4", "P1": "04", "P2": "00" },
            "response": "9000",
            "executed": true,
            "error": null,
            "processedData": "AABB"
        }
    }"#;
    let node: Node = serde_json::from_str(node_json).unwrap();
    assert_eq!(node.data.params.get("INS").unwrap(), "A4");
    assert!(node.data.pipes.is_empty());
}
