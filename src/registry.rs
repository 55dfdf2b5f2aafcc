//! Concurrency-safe channel registry.
//!
//! Workers share one `ChannelRegistry`. The name -> record map sits behind a
//! coarse `RwLock` that is only held long enough to insert or look up an
//! entry; every record carries its own `Mutex`, so appends to different
//! channels never contend while appends to the same channel never race.
//! Lock order is always map, then record.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};

/// Source location of a channel operation or declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub file: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Whether the operation is a case of a select statement.
    pub in_select: bool,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            in_select: false,
        }
    }

    /// A location inside a select case.
    pub fn in_select(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            in_select: true,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if self.in_select {
            write!(f, " (select)")?;
        }
        Ok(())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which list of a record a usage lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    Send,
    Receive,
    ReturnedFrom,
    PassedTo,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Send => "send",
            UsageKind::Receive => "receive",
            UsageKind::ReturnedFrom => "returned_from",
            UsageKind::PassedTo => "passed_to",
        }
    }
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A channel construction bound to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub element_type: String,
    pub site: Location,
}

/// Everything known about one channel name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRecord {
    pub name: String,
    pub element_type: String,
    pub declaration: Location,
    pub send_sites: Vec<Location>,
    pub receive_sites: Vec<Location>,
    pub returned_from: Vec<Location>,
    pub passed_to: Vec<Location>,
    pub files_referenced: Vec<String>,
}

impl ChannelRecord {
    fn from_declaration(decl: Declaration) -> Self {
        Self {
            name: decl.name,
            element_type: decl.element_type,
            files_referenced: vec![decl.site.file.clone()],
            declaration: decl.site,
            send_sites: Vec::new(),
            receive_sites: Vec::new(),
            returned_from: Vec::new(),
            passed_to: Vec::new(),
        }
    }

    /// Go spelling of the channel type, e.g. `chan int`.
    pub fn type_name(&self) -> String {
        format!("chan {}", self.element_type)
    }

    pub fn send_count(&self) -> usize {
        self.send_sites.len()
    }

    pub fn receive_count(&self) -> usize {
        self.receive_sites.len()
    }

    fn redeclare(&mut self, decl: Declaration) {
        self.element_type = decl.element_type;
        self.touch(&decl.site.file);
        self.declaration = decl.site;
    }

    fn push(&mut self, kind: UsageKind, site: Location) {
        self.touch(&site.file);
        let sites = match kind {
            UsageKind::Send => &mut self.send_sites,
            UsageKind::Receive => &mut self.receive_sites,
            UsageKind::ReturnedFrom => &mut self.returned_from,
            UsageKind::PassedTo => &mut self.passed_to,
        };
        sites.push(site);
    }

    fn touch(&mut self, file: &str) {
        if !self.files_referenced.iter().any(|f| f == file) {
            self.files_referenced.push(file.to_string());
        }
    }
}

/// Shared registry written by scan workers.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<Mutex<ChannelRecord>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, or point an existing one at a newer declaration.
    ///
    /// Usage lists already accumulated under the name are kept; only the
    /// element type and declaration site move to the newest declaration.
    pub fn upsert_declaration(&self, decl: Declaration) {
        let mut channels = self.channels.write();
        match channels.entry(decl.name.clone()) {
            Entry::Occupied(entry) => entry.get().lock().redeclare(decl),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(ChannelRecord::from_declaration(decl))));
            }
        }
    }

    /// Append a usage to a known channel.
    ///
    /// Returns `false` without touching anything if the name is not
    /// registered yet.
    pub fn append_usage(&self, name: &str, kind: UsageKind, site: Location) -> bool {
        let record = match self.channels.read().get(name) {
            Some(record) => Arc::clone(record),
            None => return false,
        };
        record.lock().push(kind, site);
        true
    }

    /// Whether a channel with this name has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the registry.
    ///
    /// Taking `self` by value means every worker borrow has ended, which is
    /// the completion barrier in type form.
    pub fn snapshot(self) -> RegistrySnapshot {
        let channels = self
            .channels
            .into_inner()
            .into_iter()
            .map(|(name, record)| {
                let record = Arc::try_unwrap(record)
                    .map(Mutex::into_inner)
                    .unwrap_or_else(|shared| shared.lock().clone());
                (name, record)
            })
            .collect();
        RegistrySnapshot { channels }
    }
}

/// Frozen, name-ordered view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    channels: BTreeMap<String, ChannelRecord>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&ChannelRecord> {
        self.channels.get(name)
    }

    /// Records in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelRecord> {
        self.channels.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
