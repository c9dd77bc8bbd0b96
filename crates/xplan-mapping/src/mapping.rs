//! Mappings: pattern plus candidate factory, bound to one platform.

use std::fmt;
use std::sync::Arc;

use xplan_core::prelude::*;

use crate::exec_op::{ExecutionOperator, OperatorTemplate};
use crate::pattern::{SubplanMatch, SubplanPattern};

/// Produces execution-operator candidates for one pattern match.
pub trait CandidateFactory: Send + Sync {
    fn candidates(
        &self,
        plan: &Plan,
        m: &SubplanMatch,
        platform: &PlatformId,
    ) -> Vec<ExecutionOperator>;
}

impl<F> CandidateFactory for F
where
    F: Fn(&Plan, &SubplanMatch, &PlatformId) -> Vec<ExecutionOperator> + Send + Sync,
{
    fn candidates(
        &self,
        plan: &Plan,
        m: &SubplanMatch,
        platform: &PlatformId,
    ) -> Vec<ExecutionOperator> {
        self(plan, m, platform)
    }
}

/// One candidate per template, in template order.
#[derive(Debug, Clone)]
pub struct TemplateFactory {
    templates: Vec<OperatorTemplate>,
}

impl TemplateFactory {
    pub fn new(templates: Vec<OperatorTemplate>) -> Self {
        Self { templates }
    }
}

impl CandidateFactory for TemplateFactory {
    fn candidates(
        &self,
        plan: &Plan,
        m: &SubplanMatch,
        platform: &PlatformId,
    ) -> Vec<ExecutionOperator> {
        self.templates
            .iter()
            .map(|t| ExecutionOperator::for_match(plan, m, platform, t))
            .collect()
    }
}

#[derive(Clone)]
pub struct Mapping {
    pub name: String,
    pub platform: PlatformId,
    pub pattern: SubplanPattern,
    factory: Arc<dyn CandidateFactory>,
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("name", &self.name)
            .field("platform", &self.platform)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl Mapping {
    pub fn new(
        name: impl Into<String>,
        platform: impl Into<PlatformId>,
        pattern: SubplanPattern,
        factory: Arc<dyn CandidateFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            pattern,
            factory,
        }
    }

    /// One logical operator of `kind` realized by `template`.
    pub fn single(
        platform: impl Into<PlatformId>,
        kind: OperatorKind,
        template: OperatorTemplate,
    ) -> Self {
        let platform = platform.into();
        let name = format!("{platform}:{}", template.exec_kind);
        Self::new(
            name,
            platform,
            SubplanPattern::single(kind),
            Arc::new(TemplateFactory::new(vec![template])),
        )
    }

    /// A fused realization of a multi-operator pattern.
    pub fn fused(
        platform: impl Into<PlatformId>,
        pattern: SubplanPattern,
        template: OperatorTemplate,
    ) -> Self {
        let platform = platform.into();
        let name = format!("{platform}:{}", template.exec_kind);
        Self::new(
            name,
            platform,
            pattern,
            Arc::new(TemplateFactory::new(vec![template])),
        )
    }

    pub fn candidates(&self, plan: &Plan, m: &SubplanMatch) -> Vec<ExecutionOperator> {
        self.factory.candidates(plan, m, &self.platform)
    }
}
