//! Channel pattern extraction.
//!
//! Extraction runs in two steps. `extract_facts` walks one syntax tree in
//! source order and emits every channel-shaped construct it recognizes, with
//! no knowledge of the registry. `apply_facts` replays those facts against
//! the shared registry in the same order, so a usage is only recorded if its
//! name is registered at the moment the fact is applied.
//!
//! Recognized shapes:
//!
//! | Shape            | Go                                  | Fact                |
//! |------------------|-------------------------------------|---------------------|
//! | declaration      | `ch := make(chan T)`, `ch = make(..)` | `Declaration`       |
//! | direct send      | `ch <- v`                           | `Send`              |
//! | direct receive   | `<-ch`                              | `Receive`           |
//! | select case      | `case v := <-ch:`, `case ch <- v:`  | `SelectReceive/Send`|
//! | named result     | `func f() (ch chan T)`              | `ReturnedFrom`      |
//! | parameter        | `func f(ch chan T)`                 | `PassedTo`          |
//!
//! All matching is by identifier name; nothing is scope-resolved.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::trace;
use tree_sitter::Node;

use crate::parser::{line_of, GoParser, ParseError, ParsedFile};
use crate::registry::{ChannelRegistry, Declaration, Location, UsageKind};

/// What kind of channel construct a fact describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactKind {
    Declaration { element_type: String },
    Send,
    Receive,
    SelectSend,
    SelectReceive,
    ReturnedFrom,
    PassedTo,
}

/// One channel construct found in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFact {
    pub name: String,
    pub kind: FactKind,
    /// Line number (1-indexed)
    pub line: usize,
}

/// Outcome of applying one file's facts to the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub declarations: usize,
    pub usages_recorded: usize,
    /// Usages whose name was not registered when they were applied.
    pub usages_dropped: usize,
}

/// Per-file failure. Never fatal to a scan.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Read, parse, extract and apply a single file.
pub fn analyze_file(
    parser: &mut GoParser,
    path: &Path,
    registry: &ChannelRegistry,
) -> Result<FileStats, AnalyzeError> {
    let file = path.to_string_lossy().to_string();
    let source = fs::read(path).map_err(|source| AnalyzeError::Read {
        path: file.clone(),
        source,
    })?;
    let parsed = parser.parse(&file, source)?;
    let facts = extract_facts(&parsed);
    Ok(apply_facts(registry, &parsed.path, facts))
}

/// Walk a parsed file and collect channel facts in source order.
pub fn extract_facts(parsed: &ParsedFile) -> Vec<ChannelFact> {
    Extractor {
        parsed,
        facts: Vec::new(),
        claimed: HashSet::new(),
    }
    .run()
}

/// Apply facts to the registry in order.
pub fn apply_facts(registry: &ChannelRegistry, file: &str, facts: Vec<ChannelFact>) -> FileStats {
    let mut stats = FileStats::default();

    for fact in facts {
        let (kind, site) = match fact.kind {
            FactKind::Declaration { element_type } => {
                registry.upsert_declaration(Declaration {
                    name: fact.name,
                    element_type,
                    site: Location::new(file, fact.line),
                });
                stats.declarations += 1;
                continue;
            }
            FactKind::Send => (UsageKind::Send, Location::new(file, fact.line)),
            FactKind::Receive => (UsageKind::Receive, Location::new(file, fact.line)),
            FactKind::SelectSend => (UsageKind::Send, Location::in_select(file, fact.line)),
            FactKind::SelectReceive => (UsageKind::Receive, Location::in_select(file, fact.line)),
            FactKind::ReturnedFrom => (UsageKind::ReturnedFrom, Location::new(file, fact.line)),
            FactKind::PassedTo => (UsageKind::PassedTo, Location::new(file, fact.line)),
        };

        if registry.append_usage(&fact.name, kind, site) {
            stats.usages_recorded += 1;
        } else {
            trace!(file, line = fact.line, channel = %fact.name, usage = %kind, "unknown channel, usage dropped");
            stats.usages_dropped += 1;
        }
    }

    stats
}

struct Extractor<'a> {
    parsed: &'a ParsedFile,
    facts: Vec<ChannelFact>,
    /// Send statements and receive expressions already recorded as select
    /// cases, keyed by node id.
    claimed: HashSet<usize>,
}

impl<'a> Extractor<'a> {
    fn run(mut self) -> Vec<ChannelFact> {
        let mut cursor = self.parsed.tree.walk();
        loop {
            self.visit(cursor.node());
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return self.facts;
                }
            }
        }
    }

    fn visit(&mut self, node: Node<'a>) {
        match node.kind() {
            "short_var_declaration" | "assignment_statement" => self.visit_assignment(node),
            "send_statement" => self.visit_send(node),
            "unary_expression" => self.visit_receive(node),
            "select_statement" => self.visit_select(node),
            "function_declaration" | "method_declaration" => self.visit_signature(node),
            _ => {}
        }
    }

    fn visit_assignment(&mut self, node: Node<'a>) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };

        let targets = expressions(left);
        for (index, value) in expressions(right).into_iter().enumerate() {
            let Some(element) = made_channel_element(self.parsed, value) else {
                continue;
            };
            let Some(name) = targets.get(index).and_then(|t| self.identifier(*t)) else {
                continue;
            };
            if name == "_" {
                continue;
            }
            let element_type = normalize_type(self.parsed.node_text(element));
            self.push(name, FactKind::Declaration { element_type }, node);
        }
    }

    fn visit_send(&mut self, node: Node<'a>) {
        if self.claimed.contains(&node.id()) {
            return;
        }
        if let Some(name) = node
            .child_by_field_name("channel")
            .and_then(|c| self.identifier(c))
        {
            self.push(name, FactKind::Send, node);
        }
    }

    fn visit_receive(&mut self, node: Node<'a>) {
        if self.claimed.contains(&node.id()) {
            return;
        }
        if let Some(name) = self.received_channel(node) {
            self.push(name, FactKind::Receive, node);
        }
    }

    fn visit_select(&mut self, node: Node<'a>) {
        let cases: Vec<_> = node
            .children(&mut node.walk())
            .filter(|n| n.kind() == "communication_case")
            .collect();

        for case in cases {
            let Some(comm) = case.child_by_field_name("communication") else {
                continue;
            };
            match comm.kind() {
                "send_statement" => {
                    self.claimed.insert(comm.id());
                    if let Some(name) = comm
                        .child_by_field_name("channel")
                        .and_then(|c| self.identifier(c))
                    {
                        self.push(name, FactKind::SelectSend, comm);
                    }
                }
                "receive_statement" => {
                    let Some(right) = comm.child_by_field_name("right") else {
                        continue;
                    };
                    if let Some(name) = self.received_channel(right) {
                        self.claimed.insert(right.id());
                        self.push(name, FactKind::SelectReceive, comm);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_signature(&mut self, node: Node<'a>) {
        if let Some(params) = node.child_by_field_name("parameters") {
            for name in self.channel_typed_names(params) {
                self.push(name, FactKind::PassedTo, node);
            }
        }
        // A bare result type has no names; only a parenthesized list can.
        if let Some(result) = node.child_by_field_name("result") {
            if result.kind() == "parameter_list" {
                for name in self.channel_typed_names(result) {
                    self.push(name, FactKind::ReturnedFrom, node);
                }
            }
        }
    }

    /// Names declared with a channel type in a parameter list.
    fn channel_typed_names(&self, list: Node<'a>) -> Vec<String> {
        let mut names = Vec::new();
        for decl in list.named_children(&mut list.walk()) {
            if decl.kind() != "parameter_declaration" {
                continue;
            }
            let is_channel = decl
                .child_by_field_name("type")
                .is_some_and(|t| t.kind() == "channel_type");
            if !is_channel {
                continue;
            }
            let mut cursor = decl.walk();
            names.extend(
                decl.children_by_field_name("name", &mut cursor)
                    .filter_map(|n| self.identifier(n)),
            );
        }
        names
    }

    /// Channel name of a `<-ident` expression.
    fn received_channel(&self, node: Node<'a>) -> Option<String> {
        if node.kind() != "unary_expression" {
            return None;
        }
        let operator = node.child_by_field_name("operator")?;
        if operator.kind() != "<-" {
            return None;
        }
        self.identifier(node.child_by_field_name("operand")?)
    }

    fn identifier(&self, node: Node<'a>) -> Option<String> {
        (node.kind() == "identifier").then(|| self.parsed.node_text(node).to_string())
    }

    fn push(&mut self, name: String, kind: FactKind, at: Node<'a>) {
        self.facts.push(ChannelFact {
            name,
            kind,
            line: line_of(at),
        });
    }
}

/// Expressions of an `expression_list`, skipping interleaved comments.
fn expressions(list: Node) -> Vec<Node> {
    list.named_children(&mut list.walk())
        .filter(|n| n.kind() != "comment")
        .collect()
}

/// Element type node of a `make(chan T, ...)` call.
fn made_channel_element<'t>(parsed: &ParsedFile, call: Node<'t>) -> Option<Node<'t>> {
    if call.kind() != "call_expression" {
        return None;
    }
    let function = call.child_by_field_name("function")?;
    if function.kind() != "identifier" || parsed.node_text(function) != "make" {
        return None;
    }
    let arguments = call.child_by_field_name("arguments")?;
    let first = arguments
        .named_children(&mut arguments.walk())
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "channel_type" {
        return None;
    }
    first.child_by_field_name("value")
}

fn normalize_type(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
