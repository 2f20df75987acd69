use crate::models::{StepResult, TokenUsage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Aggregate figures for one plan run, derived only from step results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    /// Sum of per-step execution times
    pub total_execution_time: Duration,
    pub total_tokens: TokenUsage,
    pub total_cost: f64,
    pub chunked_steps: usize,
    pub fallback_steps: usize,
    /// Successful steps per provider
    pub provider_usage: BTreeMap<String, usize>,
}

impl PlanMetrics {
    pub fn from_results(results: &HashMap<String, StepResult>) -> Self {
        let mut metrics = Self::default();

        for result in results.values() {
            metrics.total_steps += 1;
            if result.success {
                metrics.successful_steps += 1;
            } else {
                metrics.failed_steps += 1;
            }
            metrics.total_execution_time += result.execution_time;
            metrics.total_tokens += result.tokens_used;
            metrics.total_cost += result.cost;
            if result.chunks > 0 {
                metrics.chunked_steps += 1;
            }
            if result.fallback_used {
                metrics.fallback_steps += 1;
            }
            if let (true, Some(provider)) = (result.success, &result.provider) {
                *metrics.provider_usage.entry(provider.clone()).or_default() += 1;
            }
        }

        metrics
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_steps == 0 {
            0.0
        } else {
            self.successful_steps as f64 / self.total_steps as f64
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "{}/{} steps succeeded, {} tokens, ${:.4}, {:.1}s step time",
            self.successful_steps,
            self.total_steps,
            self.total_tokens.total(),
            self.total_cost,
            self.total_execution_time.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_from_results() {
        let mut results = HashMap::new();
        results.insert(
            "a".to_string(),
            StepResult::success("a", "ok")
                .with_tokens(TokenUsage::new(100, 50))
                .with_cost(0.01)
                .with_execution_time(Duration::from_millis(300))
                .with_provider(Some("groq".to_string()), false),
        );
        results.insert(
            "b".to_string(),
            StepResult::success("b", "ok")
                .with_tokens(TokenUsage::new(10, 5))
                .with_cost(0.002)
                .with_execution_time(Duration::from_millis(200))
                .with_provider(Some("deepseek".to_string()), true)
                .with_chunks(3),
        );
        results.insert(
            "c".to_string(),
            StepResult::failure("c", "exhausted").with_execution_time(Duration::from_millis(500)),
        );

        let metrics = PlanMetrics::from_results(&results);

        assert_eq!(metrics.total_steps, 3);
        assert_eq!(metrics.successful_steps, 2);
        assert_eq!(metrics.failed_steps, 1);
        assert_eq!(metrics.total_tokens, TokenUsage::new(110, 55));
        assert!((metrics.total_cost - 0.012).abs() < 1e-9);
        assert_eq!(metrics.total_execution_time, Duration::from_secs(1));
        assert_eq!(metrics.chunked_steps, 1);
        assert_eq!(metrics.fallback_steps, 1);
        assert_eq!(metrics.provider_usage.get("groq"), Some(&1));
        assert!((metrics.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_results() {
        let metrics = PlanMetrics::from_results(&HashMap::new());
        assert_eq!(metrics.total_steps, 0);
        assert_eq!(metrics.success_rate(), 0.0);
    }
}
