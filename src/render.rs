//! ASCII tree rendering for a hierarchy.

use crate::models::{Node, RankedEntity};

const GROUP: char = '▣';
const ENTITY: char = '◆';

/// Render root nodes as an ASCII tree, one line per node, with each entity's
/// attribute values.
///
/// Example output:
/// ```text
/// ▣ Mages
/// ├── ◆ Merlin [9 4 7]
/// └── ◆ Morgana [8 6 6]
/// ◆ Arthur [6 9 5]
/// ```
pub fn render_tree(root: &[Node]) -> String {
    let mut output = String::new();
    for node in root {
        match node {
            Node::Group(group) => {
                output.push(GROUP);
                output.push(' ');
                output.push_str(&group.name);
                output.push('\n');
                for (i, entity) in group.items.iter().enumerate() {
                    let branch = if i + 1 == group.items.len() {
                        "└── "
                    } else {
                        "├── "
                    };
                    output.push_str(branch);
                    push_entity(&mut output, entity);
                }
            }
            Node::Entity(entity) => push_entity(&mut output, entity),
        }
    }
    output
}

fn push_entity(output: &mut String, entity: &RankedEntity) {
    output.push(ENTITY);
    output.push(' ');
    output.push_str(&entity.name);
    output.push_str(" [");
    let values: Vec<String> = entity
        .attributes
        .iter()
        .map(|a| format_value(a.value))
        .collect();
    output.push_str(&values.join(" "));
    output.push_str("]\n");
}

/// Whole numbers print without a fraction; others with one decimal.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}
