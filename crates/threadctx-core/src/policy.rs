//! Policy resolution
//!
//! Turns the three selector lists of a definition into exactly one
//! [`ContextPolicy`] per known category.
//!
//! # Resolution order
//!
//! 1. Aliases are expanded (`Application` names two categories); selectors
//!    naming unknown categories are dropped with a warning.
//! 2. A category, or the `Remaining` wildcard, listed under more than one
//!    policy is a [`ContextError::ConflictingPolicy`].
//! 3. Explicitly named categories get their list's policy.
//! 4. Every category not named anywhere gets the wildcard's policy.
//! 5. Whatever is still unassigned is cleared when its provider has a
//!    default, and left unchanged otherwise.

use crate::context_type::{ContextType, TypeSelector};
use crate::definition::ContextServiceDefinition;
use crate::error::{ContextError, ContextResult};
use crate::registry::ContextRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What a worker observes for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextPolicy {
    /// The capturing thread's value
    Propagated,
    /// The category's cleared value
    Cleared,
    /// Whatever the worker thread already has
    Unchanged,
}

impl ContextPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextPolicy::Propagated => "propagated",
            ContextPolicy::Cleared => "cleared",
            ContextPolicy::Unchanged => "unchanged",
        }
    }

    const ALL: [ContextPolicy; 3] = [
        ContextPolicy::Propagated,
        ContextPolicy::Cleared,
        ContextPolicy::Unchanged,
    ];
}

impl fmt::Display for ContextPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category known to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownType {
    pub context_type: ContextType,
    pub has_default: bool,
}

impl KnownType {
    pub fn new(context_type: ContextType, has_default: bool) -> Self {
        Self {
            context_type,
            has_default,
        }
    }
}

/// One resolved category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub context_type: ContextType,
    pub policy: ContextPolicy,
}

/// One policy per known category, in the order the categories were given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedPolicy {
    entries: Vec<PolicyEntry>,
}

impl ResolvedPolicy {
    /// Resolve a definition against a registry
    pub fn for_registry(
        definition: &ContextServiceDefinition,
        registry: &ContextRegistry,
    ) -> ContextResult<Self> {
        resolve_policies(
            &definition.propagated[..],
            &definition.cleared[..],
            &definition.unchanged[..],
            &registry.known_types(),
        )
    }

    /// Policy of a category
    pub fn get(&self, context_type: &ContextType) -> Option<ContextPolicy> {
        self.entries
            .iter()
            .find(|e| &e.context_type == context_type)
            .map(|e| e.policy)
    }

    /// Policy at a registry position
    pub fn policy_at(&self, index: usize) -> Option<ContextPolicy> {
        self.entries.get(index).map(|e| e.policy)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContextType, ContextPolicy)> {
        self.entries.iter().map(|e| (&e.context_type, e.policy))
    }

    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    /// Categories resolved to `policy`
    pub fn types_with(&self, policy: ContextPolicy) -> Vec<&ContextType> {
        self.entries
            .iter()
            .filter(|e| e.policy == policy)
            .map(|e| &e.context_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve selector lists into a total policy over `known`
///
/// Pure: the same inputs always give the same result.
pub fn resolve_policies<S: AsRef<str>>(
    propagated: &[S],
    cleared: &[S],
    unchanged: &[S],
    known: &[KnownType],
) -> ContextResult<ResolvedPolicy> {
    let known_names: HashSet<&ContextType> = known.iter().map(|k| &k.context_type).collect();

    let mut explicit: HashMap<ContextType, ContextPolicy> = HashMap::new();
    let mut wildcard: Option<ContextPolicy> = None;

    let lists = [propagated, cleared, unchanged];
    for (policy, tokens) in ContextPolicy::ALL.into_iter().zip(lists) {
        for token in tokens {
            let selector = TypeSelector::parse(token.as_ref());
            if selector == TypeSelector::AllRemaining {
                match wildcard {
                    Some(existing) if existing != policy => {
                        return Err(ContextError::ConflictingPolicy {
                            category: TypeSelector::ALL_REMAINING.to_string(),
                        });
                    }
                    _ => wildcard = Some(policy),
                }
                continue;
            }

            for context_type in selector.expand() {
                if !known_names.contains(&context_type) {
                    tracing::warn!(
                        context_type = %context_type,
                        policy = %policy,
                        "Ignoring unknown context type in definition"
                    );
                    continue;
                }
                match explicit.get(&context_type) {
                    Some(existing) if *existing != policy => {
                        return Err(ContextError::ConflictingPolicy {
                            category: context_type.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        explicit.insert(context_type, policy);
                    }
                }
            }
        }
    }

    let entries = known
        .iter()
        .map(|k| {
            let policy = explicit
                .get(&k.context_type)
                .copied()
                .or(wildcard)
                .unwrap_or(if k.has_default {
                    ContextPolicy::Cleared
                } else {
                    ContextPolicy::Unchanged
                });
            PolicyEntry {
                context_type: k.context_type.clone(),
                policy,
            }
        })
        .collect();

    Ok(ResolvedPolicy { entries })
}
