//! Permission engine - answers authorization queries over the schema
//! registry and the relation store.
//!
//! Evaluation is bottom-up: leaves are tuple lookups, inner nodes
//! combine child sets by set algebra, arrows expand subject tuples and
//! recurse on the target namespace's permission. All reads are grouped
//! by `(object namespace, relation)` and cached for the duration of one
//! query to amortize round-trips.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::{Object, Relation, RelationFilter, Subject};
use crate::schema::{CompiledSchema, Expression, SchemaRegistry};
use crate::store::RelationStore;

/// One subject/permission/object triple for [`PermissionEngine::batch_check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub subject: Subject,
    pub permission: String,
    pub object: Object,
}

/// Per-pair verdict; `batch_check` preserves request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub request: CheckRequest,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    namespace: String,
    object_id: String,
    name: String,
}

type SubjectKey = (String, String, Option<String>);

/// Evaluation state for one engine query.
///
/// `visited` tracks the recursion stack so monotone cycles terminate;
/// `memo` caches completed verdicts; `tuples` holds the grouped reads.
struct EvalContext {
    schema: Arc<CompiledSchema>,
    visited: HashSet<NodeKey>,
    memo: HashMap<(SubjectKey, NodeKey), bool>,
    tuples: HashMap<(String, String), HashMap<String, Vec<Relation>>>,
}

impl EvalContext {
    fn new(schema: Arc<CompiledSchema>) -> Self {
        Self {
            schema,
            visited: HashSet::new(),
            memo: HashMap::new(),
            tuples: HashMap::new(),
        }
    }
}

fn subject_key(subject: &Subject) -> SubjectKey {
    (
        subject.namespace.clone(),
        subject.id.clone(),
        subject.sub_relation.clone(),
    )
}

pub struct PermissionEngine {
    registry: Arc<SchemaRegistry>,
    relations: Arc<dyn RelationStore>,
}

impl PermissionEngine {
    pub fn new(registry: Arc<SchemaRegistry>, relations: Arc<dyn RelationStore>) -> Self {
        Self {
            registry,
            relations,
        }
    }

    /// May `subject` perform `permission` on `object`?
    pub async fn check(
        &self,
        subject: &Subject,
        permission: &str,
        object: &Object,
    ) -> Result<bool, ServiceError> {
        let schema = self.registry.snapshot();
        require_permission(&schema, &object.namespace, permission)?;
        let mut ctx = EvalContext::new(schema);
        self.check_named(&mut ctx, subject, &object.namespace, permission, &object.id)
            .await
    }

    /// Evaluate many pairs, preserving request order. Equal pairs are
    /// fused through the shared memo; a schema error fails the batch.
    pub async fn batch_check(
        &self,
        requests: Vec<CheckRequest>,
    ) -> Result<Vec<CheckResult>, ServiceError> {
        let schema = self.registry.snapshot();
        let mut ctx = EvalContext::new(schema.clone());
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            require_permission(&schema, &request.object.namespace, &request.permission)?;
            ctx.visited.clear();
            let allowed = self
                .check_named(
                    &mut ctx,
                    &request.subject,
                    &request.object.namespace,
                    &request.permission,
                    &request.object.id,
                )
                .await?;
            results.push(CheckResult { request, allowed });
        }
        Ok(results)
    }

    /// All objects of `namespace` on which `subject` holds `permission`.
    pub async fn lookup_resources(
        &self,
        subject: &Subject,
        permission: &str,
        namespace: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let schema = self.registry.snapshot();
        require_permission(&schema, namespace, permission)?;
        let candidates = self.relations.list_object_ids(namespace).await?;
        let mut ctx = EvalContext::new(schema);
        let mut admitted = BTreeSet::new();
        for object_id in candidates {
            ctx.visited.clear();
            if self
                .check_named(&mut ctx, subject, namespace, permission, &object_id)
                .await?
            {
                admitted.insert(object_id);
            }
        }
        Ok(admitted.into_iter().collect())
    }

    /// All subjects of `subject_namespace` holding `permission` on `object`.
    pub async fn lookup_subjects(
        &self,
        subject_namespace: &str,
        object: &Object,
        permission: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let schema = self.registry.snapshot();
        require_permission(&schema, &object.namespace, permission)?;
        let candidates = self.relations.list_subject_ids(subject_namespace).await?;
        let mut ctx = EvalContext::new(schema);
        let mut admitted = BTreeSet::new();
        for subject_id in candidates {
            ctx.visited.clear();
            let subject = Subject::new(subject_namespace, subject_id.clone());
            if self
                .check_named(&mut ctx, &subject, &object.namespace, permission, &object.id)
                .await?
            {
                admitted.insert(subject_id);
            }
        }
        Ok(admitted.into_iter().collect())
    }

    /// Grouped tuple read: fetches the whole `(namespace, relation)`
    /// slice once per query and serves per-object slices from it.
    async fn tuples_for(
        &self,
        ctx: &mut EvalContext,
        namespace: &str,
        relation: &str,
        object_id: &str,
    ) -> Result<Vec<Relation>, ServiceError> {
        let key = (namespace.to_string(), relation.to_string());
        if !ctx.tuples.contains_key(&key) {
            let filter = RelationFilter::object_namespace(namespace).with_relation(relation);
            let rows = self.relations.list(&filter).await?;
            let mut grouped: HashMap<String, Vec<Relation>> = HashMap::new();
            for row in rows {
                grouped.entry(row.object.id.clone()).or_default().push(row);
            }
            ctx.tuples.insert(key.clone(), grouped);
        }
        Ok(ctx
            .tuples
            .get(&key)
            .and_then(|group| group.get(object_id))
            .cloned()
            .unwrap_or_default())
    }

    /// Evaluate a relation or permission name on one object.
    ///
    /// Permissions admit their direct grant tuples in addition to their
    /// declared expression. Re-entering a node already on the recursion
    /// stack admits nothing, which terminates monotone cycles.
    fn check_named<'a>(
        &'a self,
        ctx: &'a mut EvalContext,
        subject: &'a Subject,
        namespace: &'a str,
        name: &'a str,
        object_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, ServiceError>> {
        Box::pin(async move {
            let node = NodeKey {
                namespace: namespace.to_string(),
                object_id: object_id.to_string(),
                name: name.to_string(),
            };
            let memo_key = (subject_key(subject), node.clone());
            if let Some(&cached) = ctx.memo.get(&memo_key) {
                return Ok(cached);
            }
            if !ctx.visited.insert(node.clone()) {
                return Ok(false);
            }

            let schema = ctx.schema.clone();
            let result = if let Some(expr) = schema.permission(namespace, name) {
                let expr = expr.clone();
                match self
                    .check_relation(ctx, subject, namespace, name, object_id)
                    .await
                {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        self.check_expression(ctx, subject, namespace, &expr, object_id)
                            .await
                    }
                    Err(err) => Err(err),
                }
            } else if schema.relation(namespace, name).is_some() {
                self.check_relation(ctx, subject, namespace, name, object_id)
                    .await
            } else {
                Err(ServiceError::Schema(format!(
                    "unknown relation or permission {:?} in namespace {:?}",
                    name, namespace
                )))
            };

            ctx.visited.remove(&node);
            let allowed = result?;
            ctx.memo.insert(memo_key, allowed);
            Ok(allowed)
        })
    }

    /// Tuple lookup leaf: direct subject matches first, then subject-set
    /// recursion.
    fn check_relation<'a>(
        &'a self,
        ctx: &'a mut EvalContext,
        subject: &'a Subject,
        namespace: &'a str,
        relation: &'a str,
        object_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, ServiceError>> {
        Box::pin(async move {
            let tuples = self.tuples_for(ctx, namespace, relation, object_id).await?;
            for tuple in &tuples {
                if tuple.subject == *subject {
                    return Ok(true);
                }
            }
            for tuple in tuples {
                if let Some(sub_relation) = tuple.subject.sub_relation.clone() {
                    if self
                        .check_named(
                            ctx,
                            subject,
                            &tuple.subject.namespace,
                            &sub_relation,
                            &tuple.subject.id,
                        )
                        .await?
                    {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        })
    }

    fn check_expression<'a>(
        &'a self,
        ctx: &'a mut EvalContext,
        subject: &'a Subject,
        namespace: &'a str,
        expr: &'a Expression,
        object_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, ServiceError>> {
        Box::pin(async move {
            match expr {
                Expression::Relation(name) => {
                    self.check_named(ctx, subject, namespace, name, object_id)
                        .await
                }
                Expression::Arrow {
                    relation,
                    permission,
                } => {
                    let tuples = self.tuples_for(ctx, namespace, relation, object_id).await?;
                    let schema = ctx.schema.clone();
                    for tuple in tuples {
                        if schema
                            .permission(&tuple.subject.namespace, permission)
                            .is_none()
                        {
                            continue;
                        }
                        if self
                            .check_named(
                                ctx,
                                subject,
                                &tuple.subject.namespace,
                                permission,
                                &tuple.subject.id,
                            )
                            .await?
                        {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Expression::Union(branches) => {
                    for branch in branches {
                        if self
                            .check_expression(ctx, subject, namespace, branch, object_id)
                            .await?
                        {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Expression::Intersection(branches) => {
                    for branch in branches {
                        if !self
                            .check_expression(ctx, subject, namespace, branch, object_id)
                            .await?
                        {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Expression::Difference(left, right) => {
                    if !self
                        .check_expression(ctx, subject, namespace, left, object_id)
                        .await?
                    {
                        return Ok(false);
                    }
                    Ok(!self
                        .check_expression(ctx, subject, namespace, right, object_id)
                        .await?)
                }
            }
        })
    }
}

fn require_permission(
    schema: &CompiledSchema,
    namespace: &str,
    permission: &str,
) -> Result<(), ServiceError> {
    if schema.namespace(namespace).is_none() {
        return Err(ServiceError::Schema(format!(
            "unknown namespace {:?}",
            namespace
        )));
    }
    if schema.permission(namespace, permission).is_none() {
        return Err(ServiceError::Schema(format!(
            "unknown permission {:?} in namespace {:?}",
            permission, namespace
        )));
    }
    Ok(())
}
