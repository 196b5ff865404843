//! ASCII tree rendering for the content tree.

use crate::models::{DirectoryExport, FeatureExport};

const PUBLISHED: char = '●';
const UNPUBLISHED: char = '○';

enum Node<'a> {
    Directory(&'a DirectoryExport),
    Feature(&'a FeatureExport),
}

impl<'a> Node<'a> {
    fn label(&self) -> String {
        match self {
            Node::Directory(export) => match &export.directory {
                Some(directory) => format!("{}/", directory.slug),
                None => "/".to_string(),
            },
            Node::Feature(export) => {
                let symbol = if export.feature.is_published() {
                    PUBLISHED
                } else {
                    UNPUBLISHED
                };
                format!(
                    "{} {} [{}]",
                    symbol, export.feature.slug, export.feature.feature_type
                )
            }
        }
    }

    fn children(&self) -> Vec<Node<'a>> {
        match self {
            Node::Directory(export) => children_of(export),
            Node::Feature(export) => export.features.iter().map(Node::Feature).collect(),
        }
    }
}

/// Child directories first, then features.
fn children_of(export: &DirectoryExport) -> Vec<Node<'_>> {
    export
        .directories
        .iter()
        .map(Node::Directory)
        .chain(export.features.iter().map(Node::Feature))
        .collect()
}

/// Render an exported subtree as ASCII art with publication markers.
///
/// Example output:
/// ```text
/// weapons/
/// ├── bows/
/// │   └── arbalests/
/// ├── ● index [Page]
/// └── ○ armoury [Blog]
///     └── ● new-stock [BlogPost]
/// ```
///
/// The synthetic root (`directory: None`) is not printed; its children
/// become the top-level entries.
pub fn render_tree(export: &DirectoryExport) -> String {
    let roots = match &export.directory {
        Some(_) => vec![Node::Directory(export)],
        None => children_of(export),
    };

    let mut output = String::new();
    for node in &roots {
        render_node(&mut output, node, "", false, true);
    }
    output
}

fn render_node(output: &mut String, node: &Node<'_>, prefix: &str, is_last: bool, is_root: bool) {
    if !is_root {
        output.push_str(prefix);
        output.push_str(if is_last { "└── " } else { "├── " });
    }
    output.push_str(&node.label());
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    let children = node.children();
    for (i, child) in children.iter().enumerate() {
        let child_is_last = i == children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}
