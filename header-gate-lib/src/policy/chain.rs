use std::sync::Arc;

use http::HeaderMap;
use tracing::trace;

use super::registry::build_policy;
use super::{Decision, ExecutionFailure, Phase, Policy};
use crate::config::PolicyAttachment;
use crate::error::Result;

#[derive(Debug, Clone)]
struct ScopedPolicy {
    policy: Arc<dyn Policy>,
    phases: Vec<Phase>,
}

/// Result of running a chain for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainResult {
    Continue,
    Interrupted { policy: &'static str, failure: ExecutionFailure },
}

/// Ordered policies for a route, each scoped to the phases it runs in
#[derive(Debug, Clone, Default)]
pub struct PolicyChain {
    policies: Vec<ScopedPolicy>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from global attachments followed by route attachments
    pub fn from_attachments<'a, I>(attachments: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a PolicyAttachment>,
    {
        let mut chain = Self::new();
        for attachment in attachments {
            chain.push(build_policy(attachment)?, attachment.phases.clone());
        }
        Ok(chain)
    }

    pub fn push(&mut self, policy: Arc<dyn Policy>, phases: Vec<Phase>) {
        self.policies.push(ScopedPolicy { policy, phases });
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Ids of the policies scoped to `phase`, in execution order
    pub fn ids_for(&self, phase: Phase) -> impl Iterator<Item = &'static str> + '_ {
        self.scoped_to(phase).map(|s| s.policy.id())
    }

    fn scoped_to(&self, phase: Phase) -> impl Iterator<Item = &ScopedPolicy> + '_ {
        self.policies.iter().filter(move |s| s.phases.contains(&phase))
    }

    /// Run every policy scoped to `phase` in order, stopping at the first interrupt
    pub fn execute(&self, phase: Phase, headers: &mut HeaderMap) -> ChainResult {
        for scoped in self.scoped_to(phase) {
            let id = scoped.policy.id();
            match scoped.policy.on_phase(phase, headers) {
                Decision::Continue => {
                    trace!(policy = id, %phase, "Policy passed");
                }
                Decision::Interrupt(failure) => {
                    return ChainResult::Interrupted { policy: id, failure };
                }
            }
        }
        ChainResult::Continue
    }
}
