use crate::domains::family::types::Family;
use crate::errors::DomainResult;
use async_trait::async_trait;

/// Boolean gate consulted before an export job is created
#[async_trait]
pub trait ExportEntitlement: Send + Sync {
    async fn can_export(&self, family: &Family) -> DomainResult<bool>;
}

/// Grants export to families whose stored plan tier allows it
#[derive(Debug, Default, Clone)]
pub struct PlanTierEntitlement;

#[async_trait]
impl ExportEntitlement for PlanTierEntitlement {
    async fn can_export(&self, family: &Family) -> DomainResult<bool> {
        Ok(family.plan_tier.allows_export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanTier;
    use chrono::Utc;
    use uuid::Uuid;

    fn family(plan_tier: PlanTier) -> Family {
        Family {
            id: Uuid::new_v4(),
            name: "Okafor".to_string(),
            owner_user_id: Uuid::new_v4(),
            plan_tier,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_plan_tier_entitlement() {
        let gate = PlanTierEntitlement;
        assert!(!gate.can_export(&family(PlanTier::Free)).await.unwrap());
        assert!(gate.can_export(&family(PlanTier::Premium)).await.unwrap());
    }
}
