//! Relation tuple model - the ground facts of the permission graph.

use serde::{Deserialize, Serialize};

use crate::models::Principal;

/// The resource side of a relation tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    pub namespace: String,
    pub id: String,
}

impl Object {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

/// The subject side of a relation tuple.
///
/// A subject with a `sub_relation` is a subject set: every subject that
/// holds `sub_relation` on `(namespace, id)` is implied. The wire may
/// serialize an absent sub-relation as an empty string; the domain layer
/// always uses `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub namespace: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_relation: Option<String>,
}

impl Subject {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            sub_relation: None,
        }
    }

    pub fn subject_set(
        namespace: impl Into<String>,
        id: impl Into<String>,
        sub_relation: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            sub_relation: Some(sub_relation.into()),
        }
    }
}

impl From<&Principal> for Subject {
    fn from(principal: &Principal) -> Self {
        Subject::new(principal.namespace.clone(), principal.id.clone())
    }
}

/// A typed subject→object fact. Uniqueness is over the full 6-tuple;
/// tuples are only ever inserted and deleted, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub object: Object,
    pub relation: String,
    pub subject: Subject,
}

impl Relation {
    pub fn new(object: Object, relation: impl Into<String>, subject: Subject) -> Self {
        Self {
            object,
            relation: relation.into(),
            subject,
        }
    }
}

/// Partial tuple pattern used by list and delete.
///
/// `object_ids` accepts a batch so callers can group reads by
/// `(object namespace, relation)` and amortize round-trips.
#[derive(Debug, Clone, Default)]
pub struct RelationFilter {
    pub object_namespace: Option<String>,
    pub object_ids: Vec<String>,
    pub relation: Option<String>,
    pub subject_namespace: Option<String>,
    pub subject_id: Option<String>,
    pub subject_sub_relation: Option<String>,
}

impl RelationFilter {
    pub fn object_namespace(namespace: impl Into<String>) -> Self {
        Self {
            object_namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn object(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_namespace: Some(namespace.into()),
            object_ids: vec![id.into()],
            ..Default::default()
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_subject(mut self, subject: &Subject) -> Self {
        self.subject_namespace = Some(subject.namespace.clone());
        self.subject_id = Some(subject.id.clone());
        self.subject_sub_relation = subject.sub_relation.clone();
        self
    }

    pub fn with_subject_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.subject_namespace = Some(namespace.into());
        self
    }

    /// Whether a tuple matches every set field of the pattern.
    pub fn matches(&self, relation: &Relation) -> bool {
        if let Some(ns) = &self.object_namespace {
            if relation.object.namespace != *ns {
                return false;
            }
        }
        if !self.object_ids.is_empty() && !self.object_ids.contains(&relation.object.id) {
            return false;
        }
        if let Some(name) = &self.relation {
            if relation.relation != *name {
                return false;
            }
        }
        if let Some(ns) = &self.subject_namespace {
            if relation.subject.namespace != *ns {
                return false;
            }
        }
        if let Some(id) = &self.subject_id {
            if relation.subject.id != *id {
                return false;
            }
        }
        if let Some(sub) = &self.subject_sub_relation {
            if relation.subject.sub_relation.as_deref() != Some(sub.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_tuple() -> Relation {
        Relation::new(
            Object::new("org", "o1"),
            "member",
            Subject::new("user", "u1"),
        )
    }

    #[test]
    fn test_filter_matches_partial_pattern() {
        let tuple = member_tuple();
        assert!(RelationFilter::object("org", "o1").matches(&tuple));
        assert!(RelationFilter::object("org", "o1")
            .with_relation("member")
            .matches(&tuple));
        assert!(!RelationFilter::object("org", "o2").matches(&tuple));
        assert!(!RelationFilter::object("org", "o1")
            .with_relation("owner")
            .matches(&tuple));
    }

    #[test]
    fn test_filter_on_subject_set() {
        let tuple = Relation::new(
            Object::new("org", "o1"),
            "member",
            Subject::subject_set("group", "g1", "member"),
        );
        let filter = RelationFilter::object("org", "o1")
            .with_subject(&Subject::subject_set("group", "g1", "member"));
        assert!(filter.matches(&tuple));

        // an unset sub-relation leaves that position unconstrained
        let plain =
            RelationFilter::object("org", "o1").with_subject(&Subject::new("group", "g1"));
        assert!(plain.matches(&tuple));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(RelationFilter::default().matches(&member_tuple()));
    }
}
