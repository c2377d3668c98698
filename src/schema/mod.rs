//! Schema registry - namespaces, relations and permission expressions.
//!
//! The schema is a directed graph: permission expressions reference
//! relations by name, and may reach into another namespace through an
//! arrow (`org->admin`). Loading compiles every expression, validates
//! all references and rejects permissions that depend on themselves
//! through a non-monotone operator. The compiled graph is swapped
//! atomically on reload.

pub mod expression;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::Subject;

pub use expression::Expression;

pub const USER_NAMESPACE: &str = "user";
pub const SERVICE_USER_NAMESPACE: &str = "serviceuser";
pub const ORG_NAMESPACE: &str = "org";
pub const PROJECT_NAMESPACE: &str = "project";
pub const GROUP_NAMESPACE: &str = "group";
pub const PLATFORM_NAMESPACE: &str = "platform";

/// The singleton object id of the platform namespace.
pub const PLATFORM_ID: &str = "platform";

pub const MEMBER_RELATION: &str = "member";
pub const SUPERUSER_RELATION: &str = "superuser";
pub const MEMBERSHIP_PERMISSION: &str = "membership";
pub const ADMIN_PERMISSION: &str = "admin";

/// Whether a namespace carries permissions or only appears as a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Resource,
    Principal,
}

impl Default for NamespaceKind {
    fn default() -> Self {
        NamespaceKind::Resource
    }
}

/// Declarative schema document, loaded from `schema.path` or built in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
    pub namespaces: Vec<NamespaceDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceDef {
    pub name: String,
    #[serde(default)]
    pub kind: NamespaceKind,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub permissions: Vec<PermissionDef>,
}

impl NamespaceDef {
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn permission(&self, name: &str) -> Option<&PermissionDef> {
        self.permissions.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDef {
    pub name: String,
    pub subject_kinds: Vec<SubjectKind>,
}

/// A permitted subject shape for a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectKind {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_relation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionDef {
    pub name: String,
    pub expression: String,
}

/// A validated, compiled schema. Immutable once built.
#[derive(Debug)]
pub struct CompiledSchema {
    document: SchemaDocument,
    namespaces: HashMap<String, usize>,
    permissions: HashMap<(String, String), Expression>,
}

impl CompiledSchema {
    pub fn compile(document: SchemaDocument) -> Result<Self, ServiceError> {
        let mut namespaces = HashMap::new();
        for (idx, ns) in document.namespaces.iter().enumerate() {
            if namespaces.insert(ns.name.clone(), idx).is_some() {
                return Err(ServiceError::Schema(format!(
                    "duplicate namespace {:?}",
                    ns.name
                )));
            }
        }

        let mut permissions = HashMap::new();
        for ns in &document.namespaces {
            let mut seen = HashSet::new();
            for relation in &ns.relations {
                if !seen.insert(relation.name.clone()) {
                    return Err(ServiceError::Schema(format!(
                        "duplicate relation {:?} in namespace {:?}",
                        relation.name, ns.name
                    )));
                }
            }
            for permission in &ns.permissions {
                if !seen.insert(permission.name.clone()) {
                    return Err(ServiceError::Schema(format!(
                        "duplicate declaration {:?} in namespace {:?}",
                        permission.name, ns.name
                    )));
                }
                let expr = Expression::parse(&permission.expression)?;
                permissions.insert((ns.name.clone(), permission.name.clone()), expr);
            }
        }

        let schema = Self {
            document,
            namespaces,
            permissions,
        };
        schema.validate_references()?;
        schema.reject_non_monotone_cycles()?;
        Ok(schema)
    }

    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    pub fn namespace(&self, name: &str) -> Option<&NamespaceDef> {
        self.namespaces
            .get(name)
            .map(|&idx| &self.document.namespaces[idx])
    }

    pub fn relation(&self, namespace: &str, name: &str) -> Option<&RelationDef> {
        self.namespace(namespace).and_then(|ns| ns.relation(name))
    }

    pub fn permission(&self, namespace: &str, name: &str) -> Option<&Expression> {
        self.permissions
            .get(&(namespace.to_string(), name.to_string()))
    }

    /// Whether `name` resolves to a declared relation or to a
    /// permission's implicit grant relation in `namespace`.
    pub fn relation_exists(&self, namespace: &str, name: &str) -> bool {
        self.relation(namespace, name).is_some() || self.permission(namespace, name).is_some()
    }

    fn is_principal(&self, namespace: &str) -> bool {
        self.namespace(namespace)
            .map(|ns| ns.kind == NamespaceKind::Principal)
            .unwrap_or(false)
    }

    /// Subject conformance for tuple inserts.
    ///
    /// Declared relations admit exactly their declared subject kinds.
    /// Permissions act as implicit grant relations: they admit plain
    /// principal subjects and subject sets over declared relations.
    pub fn subject_allowed(&self, namespace: &str, relation: &str, subject: &Subject) -> bool {
        if let Some(def) = self.relation(namespace, relation) {
            return def.subject_kinds.iter().any(|kind| {
                kind.namespace == subject.namespace && kind.sub_relation == subject.sub_relation
            });
        }
        if self.permission(namespace, relation).is_some() {
            return match &subject.sub_relation {
                None => self.is_principal(&subject.namespace),
                Some(sub) => self.relation(&subject.namespace, sub).is_some(),
            };
        }
        false
    }

    fn validate_references(&self) -> Result<(), ServiceError> {
        for ns in &self.document.namespaces {
            for relation in &ns.relations {
                if relation.subject_kinds.is_empty() {
                    return Err(ServiceError::Schema(format!(
                        "relation {:?} in namespace {:?} declares no subject kinds",
                        relation.name, ns.name
                    )));
                }
                for kind in &relation.subject_kinds {
                    let Some(target) = self.namespace(&kind.namespace) else {
                        return Err(ServiceError::Schema(format!(
                            "relation {:?} in namespace {:?} references unknown namespace {:?}",
                            relation.name, ns.name, kind.namespace
                        )));
                    };
                    if let Some(sub) = &kind.sub_relation {
                        if target.relation(sub).is_none() {
                            return Err(ServiceError::Schema(format!(
                                "relation {:?} in namespace {:?} references unknown \
                                 sub-relation {:?} on {:?}",
                                relation.name, ns.name, sub, kind.namespace
                            )));
                        }
                    }
                }
            }
        }
        for ((ns, perm), expr) in &self.permissions {
            self.validate_expression(ns, perm, expr)?;
        }
        Ok(())
    }

    fn validate_expression(
        &self,
        namespace: &str,
        permission: &str,
        expr: &Expression,
    ) -> Result<(), ServiceError> {
        match expr {
            Expression::Relation(name) => {
                if !self.relation_exists(namespace, name) {
                    return Err(ServiceError::Schema(format!(
                        "permission {:?} in namespace {:?} references unknown name {:?}",
                        permission, namespace, name
                    )));
                }
                Ok(())
            }
            Expression::Arrow {
                relation,
                permission: target,
            } => {
                let Some(def) = self.relation(namespace, relation) else {
                    return Err(ServiceError::Schema(format!(
                        "permission {:?} in namespace {:?} traverses unknown relation {:?}",
                        permission, namespace, relation
                    )));
                };
                let resolvable = def
                    .subject_kinds
                    .iter()
                    .any(|kind| self.permission(&kind.namespace, target).is_some());
                if !resolvable {
                    return Err(ServiceError::Schema(format!(
                        "arrow {}->{} in namespace {:?} does not resolve to a declared \
                         permission on any subject namespace",
                        relation, target, namespace
                    )));
                }
                Ok(())
            }
            Expression::Union(branches) | Expression::Intersection(branches) => {
                for branch in branches {
                    self.validate_expression(namespace, permission, branch)?;
                }
                Ok(())
            }
            Expression::Difference(left, right) => {
                self.validate_expression(namespace, permission, left)?;
                self.validate_expression(namespace, permission, right)
            }
        }
    }

    /// Reject permissions that depend on themselves through difference.
    ///
    /// Monotone cycles are legal; the evaluator's visited set terminates
    /// them. A cycle crossing the right side of a difference has no
    /// least fixpoint and is a schema error.
    fn reject_non_monotone_cycles(&self) -> Result<(), ServiceError> {
        let mut index = HashMap::new();
        let mut nodes = Vec::new();
        for (ns, perm) in self.permissions.keys() {
            index.insert((ns.clone(), perm.clone()), nodes.len());
            nodes.push((ns.clone(), perm.clone()));
        }

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut negative_edges: Vec<(usize, usize)> = Vec::new();
        for ((ns, perm), expr) in &self.permissions {
            let from = index[&(ns.clone(), perm.clone())];
            self.collect_edges(ns, expr, false, from, &index, &mut edges, &mut negative_edges);
        }

        let scc = strongly_connected_components(&edges);
        for (from, to) in negative_edges {
            if scc[from] == scc[to] {
                let (ns, perm) = &nodes[from];
                return Err(ServiceError::Schema(format!(
                    "permission {:?} in namespace {:?} depends on itself through a difference",
                    perm, ns
                )));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_edges(
        &self,
        namespace: &str,
        expr: &Expression,
        negative: bool,
        from: usize,
        index: &HashMap<(String, String), usize>,
        edges: &mut Vec<Vec<usize>>,
        negative_edges: &mut Vec<(usize, usize)>,
    ) {
        match expr {
            Expression::Relation(name) => {
                if let Some(&to) = index.get(&(namespace.to_string(), name.clone())) {
                    edges[from].push(to);
                    if negative {
                        negative_edges.push((from, to));
                    }
                }
            }
            Expression::Arrow {
                relation,
                permission,
            } => {
                let Some(def) = self.relation(namespace, relation) else {
                    return;
                };
                for kind in &def.subject_kinds {
                    if let Some(&to) = index.get(&(kind.namespace.clone(), permission.clone())) {
                        edges[from].push(to);
                        if negative {
                            negative_edges.push((from, to));
                        }
                    }
                }
            }
            Expression::Union(branches) | Expression::Intersection(branches) => {
                for branch in branches {
                    self.collect_edges(
                        namespace,
                        branch,
                        negative,
                        from,
                        index,
                        edges,
                        negative_edges,
                    );
                }
            }
            Expression::Difference(left, right) => {
                self.collect_edges(namespace, left, negative, from, index, edges, negative_edges);
                self.collect_edges(namespace, right, true, from, index, edges, negative_edges);
            }
        }
    }
}

/// Tarjan's algorithm; returns the component id of each node.
fn strongly_connected_components(edges: &[Vec<usize>]) -> Vec<usize> {
    struct State<'a> {
        edges: &'a [Vec<usize>],
        index: Vec<Option<usize>>,
        lowlink: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next_index: usize,
        component: Vec<usize>,
        next_component: usize,
    }

    fn visit(state: &mut State<'_>, v: usize) {
        state.index[v] = Some(state.next_index);
        state.lowlink[v] = state.next_index;
        state.next_index += 1;
        state.stack.push(v);
        state.on_stack[v] = true;

        let edges = state.edges;
        for &w in &edges[v] {
            if state.index[w].is_none() {
                visit(state, w);
                state.lowlink[v] = state.lowlink[v].min(state.lowlink[w]);
            } else if state.on_stack[w] {
                state.lowlink[v] = state.lowlink[v].min(state.index[w].unwrap());
            }
        }

        if state.lowlink[v] == state.index[v].unwrap() {
            loop {
                let w = state.stack.pop().unwrap();
                state.on_stack[w] = false;
                state.component[w] = state.next_component;
                if w == v {
                    break;
                }
            }
            state.next_component += 1;
        }
    }

    let n = edges.len();
    let mut state = State {
        edges,
        index: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next_index: 0,
        component: vec![0; n],
        next_component: 0,
    };
    for v in 0..n {
        if state.index[v].is_none() {
            visit(&mut state, v);
        }
    }
    state.component
}

/// Read-mostly registry over the compiled schema.
///
/// Reload swaps the whole graph behind a single writer; readers take a
/// cheap snapshot.
pub struct SchemaRegistry {
    current: RwLock<Arc<CompiledSchema>>,
}

impl SchemaRegistry {
    pub fn new(document: SchemaDocument) -> Result<Self, ServiceError> {
        let compiled = CompiledSchema::compile(document)?;
        Ok(Self {
            current: RwLock::new(Arc::new(compiled)),
        })
    }

    pub fn snapshot(&self) -> Arc<CompiledSchema> {
        self.current.read().expect("schema lock poisoned").clone()
    }

    /// Apply a schema document. Re-applying the current document is a
    /// no-op; returns whether the graph changed.
    pub fn apply(&self, document: SchemaDocument) -> Result<bool, ServiceError> {
        if *self.snapshot().document() == document {
            return Ok(false);
        }
        let compiled = Arc::new(CompiledSchema::compile(document)?);
        *self.current.write().expect("schema lock poisoned") = compiled;
        Ok(true)
    }

    pub fn get_namespace(&self, name: &str) -> Result<NamespaceDef, ServiceError> {
        self.snapshot()
            .namespace(name)
            .cloned()
            .ok_or_else(|| ServiceError::Schema(format!("unknown namespace {:?}", name)))
    }

    pub fn get_permission(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PermissionDef, ServiceError> {
        self.get_namespace(namespace)?
            .permission(name)
            .cloned()
            .ok_or_else(|| {
                ServiceError::Schema(format!(
                    "unknown permission {:?} in namespace {:?}",
                    name, namespace
                ))
            })
    }

    pub fn compile_permission(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Expression, ServiceError> {
        self.snapshot()
            .permission(namespace, name)
            .cloned()
            .ok_or_else(|| {
                ServiceError::Schema(format!(
                    "unknown permission {:?} in namespace {:?}",
                    name, namespace
                ))
            })
    }

    pub fn list_namespaces(&self) -> Vec<String> {
        self.snapshot()
            .document()
            .namespaces
            .iter()
            .map(|ns| ns.name.clone())
            .collect()
    }

    pub fn list_permissions(&self, namespace: &str) -> Result<Vec<PermissionDef>, ServiceError> {
        Ok(self.get_namespace(namespace)?.permissions)
    }
}

fn relation(name: &str, subject_kinds: Vec<SubjectKind>) -> RelationDef {
    RelationDef {
        name: name.to_string(),
        subject_kinds,
    }
}

fn subject(namespace: &str) -> SubjectKind {
    SubjectKind {
        namespace: namespace.to_string(),
        sub_relation: None,
    }
}

fn subject_set(namespace: &str, sub_relation: &str) -> SubjectKind {
    SubjectKind {
        namespace: namespace.to_string(),
        sub_relation: Some(sub_relation.to_string()),
    }
}

fn permission(name: &str, expression: &str) -> PermissionDef {
    PermissionDef {
        name: name.to_string(),
        expression: expression.to_string(),
    }
}

/// The built-in application schema, used when `schema.path` is unset.
pub fn base_schema() -> SchemaDocument {
    SchemaDocument {
        namespaces: vec![
            NamespaceDef {
                name: USER_NAMESPACE.to_string(),
                kind: NamespaceKind::Principal,
                relations: vec![],
                permissions: vec![],
            },
            NamespaceDef {
                name: SERVICE_USER_NAMESPACE.to_string(),
                kind: NamespaceKind::Principal,
                relations: vec![],
                permissions: vec![],
            },
            NamespaceDef {
                name: PLATFORM_NAMESPACE.to_string(),
                kind: NamespaceKind::Resource,
                relations: vec![relation(
                    SUPERUSER_RELATION,
                    vec![subject(USER_NAMESPACE), subject(SERVICE_USER_NAMESPACE)],
                )],
                permissions: vec![permission("administer", SUPERUSER_RELATION)],
            },
            NamespaceDef {
                name: ORG_NAMESPACE.to_string(),
                kind: NamespaceKind::Resource,
                relations: vec![
                    relation(
                        "owner",
                        vec![subject(USER_NAMESPACE), subject(SERVICE_USER_NAMESPACE)],
                    ),
                    relation(
                        MEMBER_RELATION,
                        vec![
                            subject(USER_NAMESPACE),
                            subject(SERVICE_USER_NAMESPACE),
                            subject_set(GROUP_NAMESPACE, MEMBER_RELATION),
                        ],
                    ),
                ],
                permissions: vec![
                    permission(MEMBERSHIP_PERMISSION, "member | owner"),
                    permission(ADMIN_PERMISSION, "owner"),
                ],
            },
            NamespaceDef {
                name: GROUP_NAMESPACE.to_string(),
                kind: NamespaceKind::Resource,
                relations: vec![
                    relation(MEMBER_RELATION, vec![subject(USER_NAMESPACE)]),
                    relation("org", vec![subject(ORG_NAMESPACE)]),
                ],
                permissions: vec![
                    permission(MEMBERSHIP_PERMISSION, "member"),
                    permission(ADMIN_PERMISSION, "org->admin"),
                ],
            },
            NamespaceDef {
                name: PROJECT_NAMESPACE.to_string(),
                kind: NamespaceKind::Resource,
                relations: vec![
                    relation("org", vec![subject(ORG_NAMESPACE)]),
                    relation(
                        "owner",
                        vec![subject(USER_NAMESPACE), subject(SERVICE_USER_NAMESPACE)],
                    ),
                    relation(
                        MEMBER_RELATION,
                        vec![
                            subject(USER_NAMESPACE),
                            subject_set(GROUP_NAMESPACE, MEMBER_RELATION),
                        ],
                    ),
                ],
                permissions: vec![
                    permission(ADMIN_PERMISSION, "owner | org->admin"),
                    permission(MEMBERSHIP_PERMISSION, "member | admin"),
                    permission("view", "membership"),
                    permission("edit", "admin"),
                    permission("delete", "admin"),
                ],
            },
        ],
    }
}
