//! Graphviz DOT rendering of channel traffic.
//!
//! Every channel becomes a box node. Sends are drawn as edges from an
//! implicit `main` node into the channel, receives as edges back out, each
//! labelled with the operation and its location.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::registry::RegistrySnapshot;

/// Render the snapshot as a DOT digraph.
pub fn render_dot(snapshot: &RegistrySnapshot) -> String {
    let mut dot = String::new();
    dot.push_str("digraph ChannelFlow {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=box, style=filled, fillcolor=lightblue];\n");
    dot.push_str("  edge [color=gray];\n\n");

    for record in snapshot.iter() {
        let _ = writeln!(
            dot,
            "  {} [label=\"{}\\n{}\\n{}\"];",
            quote(&record.name),
            escape(&record.name),
            escape(&record.type_name()),
            escape(&record.declaration.to_string()),
        );
    }

    for record in snapshot.iter() {
        for site in &record.send_sites {
            let _ = writeln!(
                dot,
                "  main -> {} [label=\"send\\n{}\"];",
                quote(&record.name),
                escape(&site.to_string()),
            );
        }
        for site in &record.receive_sites {
            let _ = writeln!(
                dot,
                "  {} -> main [label=\"receive\\n{}\"];",
                quote(&record.name),
                escape(&site.to_string()),
            );
        }
    }

    dot.push_str("}\n");
    dot
}

/// Write the DOT rendering to `path`, creating parent directories.
pub fn write_dot(snapshot: &RegistrySnapshot, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("creating {}: {}", parent.display(), e))?;
        }
    }
    fs::write(path, render_dot(snapshot))
        .map_err(|e| anyhow::anyhow!("writing graph {}: {}", path.display(), e))
}

fn quote(id: &str) -> String {
    format!("\"{}\"", escape(id))
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChannelRegistry, Declaration, Location, UsageKind};
    use tempfile::TempDir;

    fn snapshot() -> RegistrySnapshot {
        let registry = ChannelRegistry::new();
        registry.upsert_declaration(Declaration {
            name: "results".to_string(),
            element_type: "string".to_string(),
            site: Location::new("main.go", 10),
        });
        registry.append_usage("results", UsageKind::Send, Location::new("main.go", 12));
        registry.append_usage("results", UsageKind::Receive, Location::in_select("main.go", 20));
        registry.append_usage("results", UsageKind::PassedTo, Location::new("main.go", 30));
        registry.snapshot()
    }

    #[test]
    fn test_render_dot() {
        let dot = render_dot(&snapshot());

        assert!(dot.starts_with("digraph ChannelFlow {\n  rankdir=LR;"));
        assert!(dot.contains("  \"results\" [label=\"results\\nchan string\\nmain.go:10\"];"));
        assert!(dot.contains("  main -> \"results\" [label=\"send\\nmain.go:12\"];"));
        assert!(dot.contains("  \"results\" -> main [label=\"receive\\nmain.go:20 (select)\"];"));
        assert_eq!(dot.matches("->").count(), 2);
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_render_empty() {
        let dot = render_dot(&RegistrySnapshot::default());
        assert!(!dot.contains("->"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(quote("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_write_dot_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/graphs/flow.dot");
        write_dot(&snapshot(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("digraph ChannelFlow"));
    }
}
