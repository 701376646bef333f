use super::graph::MeshGraph;

/// Order-independent node ids plus link count; content such as status, names
/// or signal opacity is deliberately not part of it.
#[derive(Debug, PartialEq, Eq)]
pub struct Fingerprint<'a> {
    node_ids: Vec<&'a str>,
    link_count: usize,
}

impl<'a> Fingerprint<'a> {
    pub fn of(graph: &'a MeshGraph) -> Self {
        let mut node_ids = graph
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<Vec<_>>();
        node_ids.sort_unstable();

        Self {
            node_ids,
            link_count: graph.links.len(),
        }
    }
}

/// `None` means the candidate is structurally identical to `previous` and the
/// consumer should keep what it already has.
pub fn admit(previous: Option<&MeshGraph>, candidate: MeshGraph) -> Option<MeshGraph> {
    match previous {
        Some(previous) if Fingerprint::of(previous) == Fingerprint::of(&candidate) => None,
        _ => Some(candidate),
    }
}
