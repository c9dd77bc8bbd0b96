//! Platform-bound execution operators.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use xplan_core::prelude::*;

use crate::pattern::SubplanMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecRole {
    /// Realizes one or more logical operators.
    Realization,
    /// Inserted by the optimizer to translate a channel.
    Conversion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecInput {
    /// Logical slot realized by this input; `None` for conversions.
    pub logical: Option<InputRef>,
    /// Channel data kinds this input can consume.
    pub accepts: Vec<DataKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub logical: Option<OutputRef>,
    pub produces: DataKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOperator {
    pub name: String,
    /// Platform-specific implementation kind, matched against
    /// `Platform::hosted_kinds` and cost-model overrides.
    pub exec_kind: String,
    pub platform: PlatformId,
    pub role: ExecRole,
    /// Logical operators realized, in pattern-node order. Empty for conversions.
    pub covers: Vec<OperatorId>,
    pub inputs: Vec<ExecInput>,
    pub outputs: Vec<ExecOutput>,
    /// Transformation descriptors of the covered operators, by operator.
    #[serde(default)]
    pub transforms: BTreeMap<OperatorId, TransformDescriptor>,
}

/// What a mapping emits for each match: an execution kind plus the channel
/// kinds its inputs accept and its outputs produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorTemplate {
    pub exec_kind: String,
    pub accepts: Vec<DataKind>,
    pub produces: DataKind,
}

impl OperatorTemplate {
    pub fn new(exec_kind: impl Into<String>, accepts: Vec<DataKind>, produces: DataKind) -> Self {
        Self {
            exec_kind: exec_kind.into(),
            accepts,
            produces,
        }
    }

    /// Accepts and produces a single kind.
    pub fn uniform(exec_kind: impl Into<String>, kind: DataKind) -> Self {
        Self::new(exec_kind, vec![kind.clone()], kind)
    }
}

impl ExecutionOperator {
    /// Realize `m` on `platform`. Inputs and outputs are the matched
    /// operators' slots that connect to operators outside the match.
    pub fn for_match(
        plan: &Plan,
        m: &SubplanMatch,
        platform: &PlatformId,
        template: &OperatorTemplate,
    ) -> Self {
        let members: BTreeSet<OperatorId> = m.operators.iter().copied().collect();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut transforms = BTreeMap::new();

        for &id in &m.operators {
            let Some(op) = plan.operator(id) else {
                continue;
            };
            if let Some(t) = &op.params.transform {
                transforms.insert(id, t.clone());
            }

            let inbound = plan.inbound_edges(id);
            for slot in 0..op.inputs.len() {
                let producers: Vec<OperatorId> = inbound
                    .iter()
                    .filter(|e| e.consumer.slot == slot)
                    .map(|e| e.producer.op)
                    .collect();
                let internal = !producers.is_empty() && producers.iter().all(|p| members.contains(p));
                if !internal {
                    inputs.push(ExecInput {
                        logical: Some(InputRef { op: id, slot }),
                        accepts: template.accepts.clone(),
                    });
                }
            }

            for slot in 0..op.outputs.len() {
                let out = OutputRef { op: id, slot };
                let internal = plan
                    .channel_from(out)
                    .map(|ch| ch.consumers.iter().any(|c| members.contains(&c.op)))
                    .unwrap_or(false);
                if !internal {
                    outputs.push(ExecOutput {
                        logical: Some(out),
                        produces: template.produces.clone(),
                    });
                }
            }
        }

        let name = m
            .operators
            .iter()
            .filter_map(|id| plan.operator(*id).map(|op| op.name.as_str()))
            .collect::<Vec<_>>()
            .join("+");

        Self {
            name: format!("{}[{}]", template.exec_kind, name),
            exec_kind: template.exec_kind.clone(),
            platform: platform.clone(),
            role: ExecRole::Realization,
            covers: m.operators.clone(),
            inputs,
            outputs,
            transforms,
        }
    }

    /// A conversion operator with one input and one output.
    pub fn conversion(
        name: impl Into<String>,
        platform: PlatformId,
        from: DataKind,
        to: DataKind,
    ) -> Self {
        let name = name.into();
        Self {
            exec_kind: name.clone(),
            name,
            platform,
            role: ExecRole::Conversion,
            covers: Vec::new(),
            inputs: vec![ExecInput {
                logical: None,
                accepts: vec![from],
            }],
            outputs: vec![ExecOutput {
                logical: None,
                produces: to,
            }],
            transforms: BTreeMap::new(),
        }
    }

    pub fn is_conversion(&self) -> bool {
        self.role == ExecRole::Conversion
    }

    pub fn input_for(&self, logical: InputRef) -> Option<usize> {
        self.inputs
            .iter()
            .position(|i| i.logical == Some(logical))
    }

    pub fn output_for(&self, logical: OutputRef) -> Option<usize> {
        self.outputs
            .iter()
            .position(|o| o.logical == Some(logical))
    }

    pub fn covers_operator(&self, op: OperatorId) -> bool {
        self.covers.contains(&op)
    }
}
