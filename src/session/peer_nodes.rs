use serde::Serialize;

use super::student::Student;

/// Students sharing a peer node label. Derived from the roster, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerNode {
    pub name: String,
    pub members: Vec<Student>,
}

/// Groups grouped students by label, in order of first appearance
pub fn peer_nodes(students: &[Student]) -> Vec<PeerNode> {
    let mut nodes: Vec<PeerNode> = Vec::new();

    for student in students {
        let Some(name) = student.peer_node.as_deref() else {
            continue;
        };
        match nodes.iter_mut().find(|node| node.name == name) {
            Some(node) => node.members.push(student.clone()),
            None => nodes.push(PeerNode {
                name: name.to_string(),
                members: vec![student.clone()],
            }),
        }
    }

    nodes
}

/// Case-insensitive search over name and topic; a blank term keeps everyone
pub fn filter_students<'a>(students: &'a [Student], search: &str) -> Vec<&'a Student> {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return students.iter().collect();
    }
    students.iter().filter(|s| s.matches(&needle)).collect()
}
