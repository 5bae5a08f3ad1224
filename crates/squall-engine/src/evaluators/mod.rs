use crate::{EvaluatorRegistry, SharedObservationSource};
use std::sync::Arc;

pub mod builtin;
pub mod poll;

pub use builtin::{
    AlertEvaluator, AuditCorrelationEvaluator, CustomExpressionEvaluator, HealthEvaluator,
    MetricThresholdEvaluator, PriceDivergenceEvaluator, TradingAdaptationEvaluator,
};

/// Builds the production registry with every built-in assertion kind wired
/// to the given observation source.
pub fn builtin_registry(source: SharedObservationSource) -> EvaluatorRegistry {
    let mut registry = EvaluatorRegistry::new();
    registry.register(
        "system_health",
        Arc::new(HealthEvaluator::new(source.clone())),
    );
    registry.register(
        "system_recovery",
        Arc::new(HealthEvaluator::new(source.clone())),
    );
    registry.register(
        "risk_alert",
        Arc::new(AlertEvaluator::new(source.clone(), "active")),
    );
    registry.register(
        "alert_resolution",
        Arc::new(AlertEvaluator::new(source.clone(), "resolved")),
    );
    registry.register(
        "trading_adaptation",
        Arc::new(TradingAdaptationEvaluator::new(source.clone())),
    );
    registry.register(
        "price_divergence",
        Arc::new(PriceDivergenceEvaluator::new(source.clone())),
    );
    registry.register(
        "performance_recovery",
        Arc::new(MetricThresholdEvaluator::new(source.clone())),
    );
    registry.register(
        "audit_correlation",
        Arc::new(AuditCorrelationEvaluator::new(source.clone())),
    );
    registry.register("custom", Arc::new(CustomExpressionEvaluator::new(source)));
    registry
}
