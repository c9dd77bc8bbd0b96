//! Plugin ingestion and the shared, read-only optimizer context.

use std::fmt;
use std::sync::Arc;

use xplan_channels::{ChannelConversion, ConversionGraph};
use xplan_core::config::Configuration;
use xplan_core::cost::SharedCostFunction;
use xplan_core::prelude::*;
use xplan_mapping::{Mapping, MappingCatalog};

use crate::cardinality::CardinalityEstimator;
use crate::cost::CostModel;

/// Adjusts configuration defaults on behalf of a plugin.
#[derive(Clone)]
pub struct ConfigureHook(Arc<dyn Fn(&mut Configuration) + Send + Sync>);

impl ConfigureHook {
    pub fn new(f: impl Fn(&mut Configuration) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, config: &mut Configuration) {
        (self.0)(config)
    }
}

impl fmt::Debug for ConfigureHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfigureHook(..)")
    }
}

/// What one platform integration contributes.
#[derive(Debug, Clone, Default)]
pub struct Plugin {
    pub name: String,
    pub platforms: Vec<Platform>,
    pub mappings: Vec<Mapping>,
    pub conversions: Vec<ChannelConversion>,
    pub platform_costs: Vec<(PlatformId, SharedCostFunction)>,
    pub kind_costs: Vec<(PlatformId, String, SharedCostFunction)>,
    pub configure: Option<ConfigureHook>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_platform(mut self, p: Platform) -> Self {
        self.platforms.push(p);
        self
    }

    pub fn with_mapping(mut self, m: Mapping) -> Self {
        self.mappings.push(m);
        self
    }

    pub fn with_conversion(mut self, c: ChannelConversion) -> Self {
        self.conversions.push(c);
        self
    }

    pub fn with_platform_cost(mut self, p: impl Into<PlatformId>, f: SharedCostFunction) -> Self {
        self.platform_costs.push((p.into(), f));
        self
    }

    pub fn with_kind_cost(
        mut self,
        p: impl Into<PlatformId>,
        exec_kind: impl Into<String>,
        f: SharedCostFunction,
    ) -> Self {
        self.kind_costs.push((p.into(), exec_kind.into(), f));
        self
    }

    /// Contribute configuration defaults, e.g. blacklist a platform that
    /// needs an opt-in. Applied by `OptimizerContext::default_configuration`.
    pub fn with_configure(mut self, f: impl Fn(&mut Configuration) + Send + Sync + 'static) -> Self {
        self.configure = Some(ConfigureHook::new(f));
        self
    }

    pub fn required_platforms(&self) -> impl Iterator<Item = &PlatformId> {
        self.platforms.iter().map(|p| &p.id)
    }
}

/// Everything the optimizer reads. Immutable once built and shared across
/// jobs.
#[derive(Debug)]
pub struct OptimizerContext {
    registry: PlatformRegistry,
    catalog: MappingCatalog,
    conversions: ConversionGraph,
    cost_model: CostModel,
    estimator: CardinalityEstimator,
    configure: Vec<(String, ConfigureHook)>,
}

impl OptimizerContext {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &MappingCatalog {
        &self.catalog
    }

    pub fn conversions(&self) -> &ConversionGraph {
        &self.conversions
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn estimator(&self) -> &CardinalityEstimator {
        &self.estimator
    }

    /// Run every plugin's configure hook on `config`, in registration order.
    pub fn configure(&self, config: &mut Configuration) {
        for (_plugin, hook) in &self.configure {
            #[cfg(feature = "tracing")]
            tracing::debug!(plugin = %_plugin, "applying plugin configuration defaults");
            hook.apply(config);
        }
    }

    /// `Configuration::default()` with plugin defaults applied.
    pub fn default_configuration(&self) -> Configuration {
        let mut config = Configuration::default();
        self.configure(&mut config);
        config
    }

    /// Selectable platforms under `provider`.
    pub fn constraints(&self, provider: &PlatformProvider) -> ConstraintSet {
        ConstraintSet::new(provider, &self.registry)
    }
}

#[derive(Debug, Default)]
pub struct ContextBuilder {
    registry: PlatformRegistry,
    catalog: MappingCatalog,
    conversions: ConversionGraph,
    cost_model: CostModel,
    estimator: CardinalityEstimator,
    configure: Vec<(String, ConfigureHook)>,
    plugins: Vec<String>,
}

impl ContextBuilder {
    /// Sole ingestion point for mappings and conversions.
    pub fn register_plugin(&mut self, plugin: Plugin) -> &mut Self {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            plugin = %plugin.name,
            platforms = plugin.platforms.len(),
            mappings = plugin.mappings.len(),
            conversions = plugin.conversions.len(),
            "registering plugin"
        );
        for p in plugin.platforms {
            self.registry.register(p);
        }
        self.catalog.extend(plugin.mappings);
        self.conversions.extend(plugin.conversions);
        for (p, f) in plugin.platform_costs {
            self.cost_model.set_platform_cost(p, f);
        }
        for (p, k, f) in plugin.kind_costs {
            self.cost_model.set_kind_cost(p, k, f);
        }
        if let Some(hook) = plugin.configure {
            self.configure.push((plugin.name.clone(), hook));
        }
        self.plugins.push(plugin.name);
        self
    }

    pub fn register_platform(&mut self, p: Platform) -> &mut Self {
        self.registry.register(p);
        self
    }

    pub fn cost_model(&mut self, m: CostModel) -> &mut Self {
        self.cost_model.merge(m);
        self
    }

    pub fn default_cost(&mut self, f: SharedCostFunction) -> &mut Self {
        self.cost_model.set_default(f);
        self
    }

    pub fn estimator(&mut self, e: CardinalityEstimator) -> &mut Self {
        self.estimator = e;
        self
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn build(&mut self) -> Arc<OptimizerContext> {
        let taken = std::mem::take(self);
        Arc::new(OptimizerContext {
            registry: taken.registry,
            catalog: taken.catalog,
            conversions: taken.conversions,
            cost_model: taken.cost_model,
            estimator: taken.estimator,
            configure: taken.configure,
        })
    }
}
