//! Operator cost resolution.
//!
//! Lookup order: `(platform, exec kind)`, then `platform`, then the global
//! default. Conversions carry their own cost functions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use xplan_core::cost::{cost_function_decoders, sanitize, LinearCost, SharedCostFunction};
use xplan_core::prelude::*;
use xplan_mapping::ExecutionOperator;

#[derive(Debug, Clone)]
pub struct CostModel {
    default: SharedCostFunction,
    /// False while `default` is still the built-in fallback.
    default_set: bool,
    per_platform: BTreeMap<PlatformId, SharedCostFunction>,
    per_kind: BTreeMap<(PlatformId, String), SharedCostFunction>,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            default_set: false,
            ..Self::new(Arc::new(LinearCost::new(1.0, 1.0, 0.0)))
        }
    }
}

impl CostModel {
    pub fn new(default: SharedCostFunction) -> Self {
        Self {
            default,
            default_set: true,
            per_platform: BTreeMap::new(),
            per_kind: BTreeMap::new(),
        }
    }

    pub fn set_default(&mut self, f: SharedCostFunction) {
        self.default = f;
        self.default_set = true;
    }

    pub fn set_platform_cost(&mut self, p: impl Into<PlatformId>, f: SharedCostFunction) {
        self.per_platform.insert(p.into(), f);
    }

    pub fn set_kind_cost(
        &mut self,
        p: impl Into<PlatformId>,
        exec_kind: impl Into<String>,
        f: SharedCostFunction,
    ) {
        self.per_kind.insert((p.into(), exec_kind.into()), f);
    }

    pub fn resolve(&self, platform: &PlatformId, exec_kind: &str) -> &SharedCostFunction {
        self.per_kind
            .get(&(platform.clone(), exec_kind.to_string()))
            .or_else(|| self.per_platform.get(platform))
            .unwrap_or(&self.default)
    }

    pub fn operator_cost(&self, exec: &ExecutionOperator, input: u64, output: u64) -> f64 {
        sanitize(self.resolve(&exec.platform, &exec.exec_kind).cost(input, output))
    }

    /// Overrides from `other` win, its default included unless it never
    /// set one.
    pub fn merge(&mut self, other: CostModel) {
        if other.default_set {
            self.set_default(other.default);
        }
        self.per_platform.extend(other.per_platform);
        self.per_kind.extend(other.per_kind);
    }

    /// Build from a JSON document:
    ///
    /// ```json
    /// {
    ///   "default":   {"kind": "linear", "per_input": 1.0},
    ///   "platforms": {"java": {"kind": "linear", "fixed": 5.0, "per_input": 0.2}},
    ///   "kinds":     [{"platform": "java", "exec_kind": "java.sort",
    ///                  "cost": {"kind": "nlogn", "factor": 0.01}}]
    /// }
    /// ```
    pub fn from_json(v: &Value) -> Result<Self> {
        let decoders = cost_function_decoders();
        let mut model = match v.get("default") {
            Some(d) => Self::new(decoders.decode(d)?),
            None => Self::default(),
        };
        if let Some(ps) = v.get("platforms") {
            let ps = ps
                .as_object()
                .ok_or_else(|| Error::Codec("'platforms' must be an object".into()))?;
            for (p, f) in ps {
                let f = decoders
                    .decode(f)
                    .map_err(|e| e.with_context(format!("cost for platform '{p}'")))?;
                model.set_platform_cost(p.as_str(), f);
            }
        }
        if let Some(ks) = v.get("kinds") {
            let ks = ks
                .as_array()
                .ok_or_else(|| Error::Codec("'kinds' must be an array".into()))?;
            for k in ks {
                let field = |name: &str| {
                    k.get(name)
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::Codec(format!("kind override missing '{name}'")))
                };
                let platform = field("platform")?;
                let exec_kind = field("exec_kind")?;
                let cost = k
                    .get("cost")
                    .ok_or_else(|| Error::Codec("kind override missing 'cost'".into()))?;
                model.set_kind_cost(platform, exec_kind, decoders.decode(cost)?);
            }
        }
        Ok(model)
    }
}
