//! Goal-planning specialist. Computes months-to-target from a linear
//! contribution schedule; the upstream planner layers in tax-wrapper and
//! scenario logic that is out of scope here.

use crate::envelope::Specialist;
use crate::market_context::GoalData;
use crate::money::{Currency, Money};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

pub struct GoalPlannerAgent;

#[async_trait]
impl Specialist for GoalPlannerAgent {
    fn name(&self) -> &str {
        "GoalPlannerAgent"
    }

    fn cache_key(&self, _input: &Value) -> Option<String> {
        None
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn analyze(&self, input: Value) -> Result<Value, String> {
        let goal_name = input.get("goal_name").and_then(|v| v.as_str()).unwrap_or("Untitled goal").to_string();
        let target: Decimal = input
            .get("target_amount")
            .and_then(|v| v.as_str())
            .ok_or("missing target_amount")?
            .parse()
            .map_err(|_| "validation_error: target_amount must be decimal")?;
        let current: Decimal = input
            .get("current_amount")
            .and_then(|v| v.as_str())
            .unwrap_or("0")
            .parse()
            .map_err(|_| "validation_error: current_amount must be decimal")?;
        let monthly: Decimal = input
            .get("monthly_contribution")
            .and_then(|v| v.as_str())
            .ok_or("missing monthly_contribution")?
            .parse()
            .map_err(|_| "validation_error: monthly_contribution must be decimal")?;

        if monthly <= Decimal::ZERO {
            return Err("validation_error: monthly_contribution must be positive".to_string());
        }

        let remaining = (target - current).max(Decimal::ZERO);
        let months = (remaining / monthly).ceil();
        let months_to_target: u32 = months.trunc().to_string().parse().unwrap_or(0);

        let data = GoalData {
            goal_name: goal_name.clone(),
            target_amount: Money::new(target, Currency::Gbp),
            monthly_contribution: Money::new(monthly, Currency::Gbp),
            months_to_target,
            plan: format!(
                "Contribute {monthly} per month toward \"{goal_name}\" to reach {target} in approximately {months_to_target} months."
            ),
        };
        serde_json::to_value(data).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn computes_months_to_target() {
        let agent = GoalPlannerAgent;
        let input = serde_json::json!({
            "goal_name": "House deposit",
            "target_amount": "12000",
            "current_amount": "0",
            "monthly_contribution": "1000"
        });
        let data: GoalData = serde_json::from_value(agent.analyze(input).await.unwrap()).unwrap();
        assert_eq!(data.months_to_target, 12);
    }

    #[tokio::test]
    async fn zero_contribution_is_validation_error() {
        let agent = GoalPlannerAgent;
        let input = serde_json::json!({
            "goal_name": "x", "target_amount": "100", "current_amount": "0", "monthly_contribution": "0"
        });
        assert!(agent.analyze(input).await.is_err());
    }
}
