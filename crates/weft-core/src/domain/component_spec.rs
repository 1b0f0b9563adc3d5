use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Value object: content hash identifying a component spec
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentHash(pub String);

impl fmt::Display for ComponentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A computed task node
    Task,
    /// A computed data node
    Data,
    /// The externally-provided deferred node
    Deferred,
}

impl NodeKind {
    /// Lowercase wire/stored form of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Task => "task",
            NodeKind::Data => "data",
            NodeKind::Deferred => "deferred",
        }
    }

    /// Parse the wire form; unknown kinds are structurally invalid
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "task" => Ok(NodeKind::Task),
            "data" => Ok(NodeKind::Data),
            "deferred" => Ok(NodeKind::Deferred),
            other => Err(CoreError::PreconditionInvalid(format!(
                "Unknown node kind: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency or injection path: `[alias...].kind.name`
///
/// Zero aliases means the referenced node is local to the declaring spec;
/// each alias descends one import level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePath {
    /// Import aliases to walk, outermost first
    pub aliases: Vec<String>,

    /// Kind of the referenced node
    pub kind: NodeKind,

    /// Name of the referenced node
    pub name: String,
}

impl NodePath {
    /// Parse a dotted path such as `data.input` or `child.inner.task.run`
    pub fn parse(path: &str) -> Result<Self, CoreError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() < 2 {
            return Err(CoreError::PreconditionInvalid(format!(
                "Path must be [alias...].kind.name: {}",
                path
            )));
        }

        let name = segments[segments.len() - 1];
        let kind = segments[segments.len() - 2];
        let aliases = &segments[..segments.len() - 2];

        if name.is_empty() || aliases.iter().any(|a| a.is_empty()) {
            return Err(CoreError::PreconditionInvalid(format!(
                "Path has an empty segment: {}",
                path
            )));
        }

        Ok(Self {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            kind: NodeKind::parse(kind)?,
            name: name.to_string(),
        })
    }

    /// Whether the path points into the declaring spec itself
    #[inline]
    pub fn is_local(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for alias in &self.aliases {
            write!(f, "{}.", alias)?;
        }
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// Declaration of a task or data node within a component spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDecl {
    /// Node name, unique within its kind per spec
    pub name: String,

    /// Opaque reference handed to whatever computes this node
    pub compute_ref: String,

    /// Paths this node pulls from before it may start
    pub dependencies: Vec<NodePath>,

    /// Paths this node pushes its result into once computed
    pub injections: Vec<NodePath>,
}

/// Declaration of an aliased import of another component spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Alias, unique per declaring spec
    pub alias: String,

    /// Content hash of the imported spec
    pub component_hash: ComponentHash,
}

/// Declaration of a component spec, as handed to registration
///
/// Immutable once registered; identity is the content hash of this
/// declaration's canonical JSON form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDecl {
    /// Human-readable component name
    pub name: String,

    /// Task nodes
    pub tasks: Vec<NodeDecl>,

    /// Data nodes
    pub data: Vec<NodeDecl>,

    /// Name of the single deferred node
    pub deferred: String,

    /// Aliased imports of other registered specs
    pub imports: Vec<ImportDecl>,
}

impl ComponentDecl {
    /// Content hash of this declaration (`blake3:{hex}` of the canonical
    /// JSON serialization)
    pub fn content_hash(&self) -> Result<ComponentHash, CoreError> {
        let canonical = serde_json::to_vec(self)?;
        Ok(ComponentHash(format!(
            "blake3:{}",
            blake3::hash(&canonical).to_hex()
        )))
    }

    /// Validate the declaration's internal structure
    ///
    /// Path targets are checked against the store at registration time;
    /// this only checks what the declaration alone can prove.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() {
            return Err(CoreError::PreconditionRequired("name".to_string()));
        }
        if self.deferred.is_empty() {
            return Err(CoreError::PreconditionRequired("deferred".to_string()));
        }

        // Name uniqueness per kind
        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(CoreError::PreconditionInvalid(format!(
                    "Duplicate task name: {}",
                    task.name
                )));
            }
        }
        let mut data_names = HashSet::new();
        for data in &self.data {
            if !data_names.insert(data.name.as_str()) {
                return Err(CoreError::PreconditionInvalid(format!(
                    "Duplicate data name: {}",
                    data.name
                )));
            }
        }

        // Alias uniqueness
        let mut aliases = HashSet::new();
        for import in &self.imports {
            if import.alias.contains('.') {
                return Err(CoreError::PreconditionInvalid(format!(
                    "Import alias must not contain '.': {}",
                    import.alias
                )));
            }
            if !aliases.insert(import.alias.as_str()) {
                return Err(CoreError::PreconditionInvalid(format!(
                    "Duplicate import alias: {}",
                    import.alias
                )));
            }
        }

        // Node names take part in dotted paths
        for node in self.tasks.iter().chain(self.data.iter()) {
            if node.name.contains('.') {
                return Err(CoreError::PreconditionInvalid(format!(
                    "Node name must not contain '.': {}",
                    node.name
                )));
            }
        }
        if self.deferred.contains('.') {
            return Err(CoreError::PreconditionInvalid(format!(
                "Node name must not contain '.': {}",
                self.deferred
            )));
        }

        // Injections never target deferred nodes
        for node in self.tasks.iter().chain(self.data.iter()) {
            for injection in &node.injections {
                if injection.kind == NodeKind::Deferred {
                    return Err(CoreError::PreconditionInvalid(format!(
                        "Deferred nodes are invalid injection targets: {}",
                        injection
                    )));
                }
            }
        }

        Ok(())
    }

    /// All task/data nodes with their kinds
    pub fn nodes(&self) -> impl Iterator<Item = (NodeKind, &NodeDecl)> {
        self.tasks
            .iter()
            .map(|n| (NodeKind::Task, n))
            .chain(self.data.iter().map(|n| (NodeKind::Data, n)))
    }
}
