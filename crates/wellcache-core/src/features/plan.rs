use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::mapping::RowMapping;
use crate::models::{PlanDay, PlanDocument, PlanKind};
use crate::mutation::{Committed, LoadSource, ManagedResource};
use crate::remote::{Query, RemoteDataService, RemoteError};

use super::{FeatureContext, FeatureError};

/// The current meal or workout plan of the signed-in user.
pub struct PlanFeature {
    ctx: FeatureContext,
    kind: PlanKind,
    plan: ManagedResource<Option<PlanDocument>>,
}

impl PlanFeature {
    pub fn new(ctx: FeatureContext, kind: PlanKind) -> Self {
        let plan = ctx.coordinator.manage(ctx.key(kind.cache_resource()), None);
        Self { ctx, kind, plan }
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn resource(&self) -> &ManagedResource<Option<PlanDocument>> {
        &self.plan
    }

    pub fn current(&self) -> Option<PlanDocument> {
        self.plan.current()
    }

    /// Show the cached plan, fetching the latest one when the cache is stale.
    pub async fn load(&self) -> Result<LoadSource, RemoteError> {
        let remote = self.ctx.remote.clone();
        let user_id = self.ctx.user_id.clone();
        let kind = self.kind;
        self.ctx
            .coordinator
            .load(&self.plan, self.ctx.ttl.plan, move || fetch_latest(remote, user_id, kind))
            .await
    }

    /// Mark `day` as done, optimistically.
    pub async fn complete_day(&self, day: u32) -> Result<Committed<Option<PlanDocument>>, FeatureError> {
        let current = self.plan.current().ok_or(FeatureError::NoPlan)?;
        if !current.has_day(day) {
            return Err(FeatureError::UnknownDay(day));
        }

        let remote = self.ctx.remote.clone();
        let committed = self
            .ctx
            .coordinator
            .mutate_queued(
                &self.plan,
                |plan| plan.as_ref().map(|p| p.complete_day(day)),
                move |pending| write_plan(remote, pending.optimistic),
            )
            .await?;
        Ok(committed)
    }

    /// Replace the plan with a freshly generated one.
    ///
    /// `generate` receives the kind and the number of days to produce. The new
    /// plan is shown as soon as it is generated; it then gets its id from the
    /// remote store, or the previous plan comes back if the write fails.
    pub async fn regenerate<G, Fut>(&self, generate: G) -> Result<PlanDocument, FeatureError>
    where
        G: FnOnce(PlanKind, u32) -> Fut,
        Fut: Future<Output = Result<Vec<PlanDay>, RemoteError>>,
    {
        let user_id = self.ctx.require_user()?.to_string();
        let days = generate(self.kind, self.kind.days()).await?;
        debug!(kind = %self.kind, days = days.len(), "Generated new plan");

        let fresh = PlanDocument {
            id: None,
            user_id,
            kind: self.kind,
            days,
            generated_at: self.ctx.coordinator.cache().now(),
        };

        let remote = self.ctx.remote.clone();
        let committed = self
            .ctx
            .coordinator
            .mutate_queued(
                &self.plan,
                move |_| Some(fresh),
                move |pending| write_plan(remote, pending.optimistic),
            )
            .await?;
        committed.value.ok_or(FeatureError::NoPlan)
    }
}

async fn fetch_latest(
    remote: Arc<dyn RemoteDataService>,
    user_id: Option<String>,
    kind: PlanKind,
) -> Result<Option<PlanDocument>, RemoteError> {
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    let query = Query::new()
        .eq("user_id", user_id)
        .eq("kind", kind.as_str())
        .order_desc("created_at")
        .range(0, 1);
    let rows = remote.read(PlanDocument::RESOURCE, &query).await?;
    match rows.first() {
        Some(row) => Ok(Some(PlanDocument::from_row(row)?)),
        None => Ok(None),
    }
}

async fn write_plan(
    remote: Arc<dyn RemoteDataService>,
    plan: Option<PlanDocument>,
) -> Result<Option<PlanDocument>, RemoteError> {
    let Some(plan) = plan else {
        return Ok(None);
    };
    let row = remote.write(PlanDocument::RESOURCE, plan.to_row()).await?;
    Ok(Some(PlanDocument::from_row(&row)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::clock::ManualClock;
    use crate::config::TtlPolicy;
    use crate::mutation::Coordinator;
    use crate::remote::MemoryRemote;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use serde_json::json;

    fn setup(user: Option<&str>) -> (PlanFeature, Arc<MemoryRemote>, Arc<ManualClock>) {
        let remote = Arc::new(MemoryRemote::new());
        let clock = Arc::new(ManualClock::starting_now());
        let cache = CacheStore::new(Arc::new(MemoryStore::new()), clock.clone());
        let ctx = FeatureContext::new(
            remote.clone(),
            Coordinator::new(cache),
            "wellness",
            user.map(String::from),
            TtlPolicy::default(),
        );
        (PlanFeature::new(ctx, PlanKind::Meal), remote, clock)
    }

    fn seed_plan(remote: &MemoryRemote) {
        let days: Vec<_> = (1..=7)
            .map(|d| json!({"day": d, "title": format!("Day {}", d), "details": "", "completed": false}))
            .collect();
        remote.seed(
            "plans",
            [json!({
                "id": "plan-1",
                "user_id": "u1",
                "kind": "meal",
                "days": days,
                "created_at": "2024-06-01T07:00:00Z"
            })],
        );
    }

    fn days(n: u32) -> Vec<PlanDay> {
        (1..=n)
            .map(|day| PlanDay {
                day,
                title: format!("New {}", day),
                details: String::new(),
                completed: false,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_load_then_cached_within_ttl() {
        let (feature, remote, clock) = setup(Some("u1"));
        seed_plan(&remote);

        assert_eq!(feature.load().await.unwrap(), LoadSource::Remote);
        assert_eq!(feature.current().unwrap().id.as_deref(), Some("plan-1"));

        clock.advance(Duration::minutes(59));
        assert_eq!(feature.load().await.unwrap(), LoadSource::Cache);
        assert_eq!(remote.read_count(), 1);

        clock.advance(Duration::minutes(2));
        assert_eq!(feature.load().await.unwrap(), LoadSource::Remote);
        assert_eq!(remote.read_count(), 2);
    }

    #[tokio::test]
    async fn test_complete_day_rolls_back_on_failure() {
        let (feature, remote, _) = setup(Some("u1"));
        seed_plan(&remote);
        feature.load().await.unwrap();

        remote.fail_writes(true);
        let err = feature.complete_day(2).await.unwrap_err();
        assert!(matches!(err, FeatureError::Mutation(_)));
        assert_eq!(feature.current().unwrap().completed_count(), 0);

        remote.fail_writes(false);
        let committed = feature.complete_day(2).await.unwrap();
        assert!(!committed.reconciled);
        assert!(feature.current().unwrap().days[1].completed);
    }

    #[tokio::test]
    async fn test_complete_day_needs_a_known_day() {
        let (feature, remote, _) = setup(Some("u1"));
        assert!(matches!(feature.complete_day(1).await, Err(FeatureError::NoPlan)));

        seed_plan(&remote);
        feature.load().await.unwrap();
        assert!(matches!(feature.complete_day(8).await, Err(FeatureError::UnknownDay(8))));
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_regenerate_assigns_id() {
        let (feature, remote, _) = setup(Some("u1"));
        let plan = feature
            .regenerate(|kind, n| async move {
                assert_eq!(kind, PlanKind::Meal);
                Ok::<_, RemoteError>(days(n))
            })
            .await
            .unwrap();

        assert_eq!(plan.days.len(), 7);
        assert!(plan.id.is_some());
        assert_eq!(feature.current(), Some(plan));
        assert_eq!(remote.rows("plans").len(), 1);
    }

    #[tokio::test]
    async fn test_regenerate_failure_restores_previous_plan() {
        let (feature, remote, _) = setup(Some("u1"));
        seed_plan(&remote);
        feature.load().await.unwrap();
        let before = feature.current();

        remote.fail_writes(true);
        let result = feature
            .regenerate(|_, n| async move { Ok::<_, RemoteError>(days(n)) })
            .await;
        assert!(result.is_err());
        assert_eq!(feature.current(), before);
    }

    #[tokio::test]
    async fn test_signed_out_user_cannot_regenerate() {
        let (feature, _, _) = setup(None);
        assert_eq!(feature.load().await.unwrap(), LoadSource::Remote);
        assert_eq!(feature.current(), None);
        let result = feature
            .regenerate(|_, n| async move { Ok::<_, RemoteError>(days(n)) })
            .await;
        assert!(matches!(result, Err(FeatureError::NotSignedIn)));
    }
}
