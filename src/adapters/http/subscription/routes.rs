//! Axum router configuration for plan and subscription endpoints.

use axum::routing::{get, post, put};
use axum::Router;

use super::handlers::{
    assign_plan, cancel_plan, get_active_plan, get_plan, get_plan_history, list_expiring,
    list_plans, list_user_subscriptions, renew_plan, set_plan_activation, trigger_sweep,
    SubscriptionAppState,
};

/// Create the subscription API router, to be nested under `/api`.
///
/// # Routes
///
/// ## Plans
/// - `GET /plans` - List plans open for assignment
/// - `GET /plans/:plan_id` - Get a plan
/// - `PUT /plans/:plan_id/activation` - Open or close a plan
///
/// ## Users
/// - `POST /users/:user_id/plan` - Assign a plan
/// - `GET /users/:user_id/plan` - Get the active subscription
/// - `DELETE /users/:user_id/plan` - Cancel the active subscription
/// - `PUT /users/:user_id/plan/renewal` - Move the expiry
/// - `GET /users/:user_id/plan/history` - Plan history
/// - `GET /users/:user_id/subscriptions` - Every subscription period
///
/// ## Expiry
/// - `GET /subscriptions/expiring` - Active subscriptions ending soon
/// - `POST /admin/sweeps` - Run one expiration sweep
pub fn subscription_routes() -> Router<SubscriptionAppState> {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/plans/:plan_id", get(get_plan))
        .route("/plans/:plan_id/activation", put(set_plan_activation))
        .route(
            "/users/:user_id/plan",
            post(assign_plan).get(get_active_plan).delete(cancel_plan),
        )
        .route("/users/:user_id/plan/renewal", put(renew_plan))
        .route("/users/:user_id/plan/history", get(get_plan_history))
        .route("/users/:user_id/subscriptions", get(list_user_subscriptions))
        .route("/subscriptions/expiring", get(list_expiring))
        .route("/admin/sweeps", post(trigger_sweep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::FixedClock;
    use crate::adapters::memory::InMemorySubscriptionStore;
    use crate::application::{ExpirationSweeper, PlanCatalog, SubscriptionLedger};
    use crate::domain::foundation::{PlanId, Timestamp};
    use crate::domain::subscription::Plan;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        store: InMemorySubscriptionStore,
        monthly: Plan,
    }

    fn test_app() -> TestApp {
        let monthly = Plan::new(PlanId::new(), "Monthly", 30).unwrap();
        let retired = Plan::new(PlanId::new(), "Legacy", 90)
            .unwrap()
            .with_active(false);
        let store = InMemorySubscriptionStore::new()
            .with_plan(monthly.clone())
            .with_plan(retired);
        let clock = Arc::new(FixedClock::new(Timestamp::from_datetime(
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        )));

        let ledger = SubscriptionLedger::new(
            PlanCatalog::new(Arc::new(store.clone())),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
        );
        let sweeper =
            ExpirationSweeper::new(Arc::new(store.clone()), Arc::new(store.clone()), clock.clone());

        let state = SubscriptionAppState {
            ledger: Arc::new(ledger),
            sweeper: Arc::new(sweeper),
            clock,
        };

        TestApp {
            app: Router::new()
                .nest("/api", subscription_routes())
                .with_state(state),
            store,
            monthly,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn list_plans_hides_inactive_plans() {
        let t = test_app();
        let (status, body) = send(&t.app, "GET", "/api/plans", None).await;

        assert_eq!(status, StatusCode::OK);
        let plans = body.as_array().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0]["name"], "Monthly");
    }

    #[tokio::test]
    async fn assign_returns_created_subscription() {
        let t = test_app();
        let (status, body) = send(
            &t.app,
            "POST",
            "/api/users/user-1/plan",
            Some(serde_json::json!({ "plan_id": t.monthly.id.to_string() })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "active");
        assert_eq!(body["plan_id"], t.monthly.id.to_string());
        assert_eq!(t.store.all_history().len(), 1);
    }

    #[tokio::test]
    async fn assign_unknown_plan_is_not_found() {
        let t = test_app();
        let (status, body) = send(
            &t.app,
            "POST",
            "/api/users/user-1/plan",
            Some(serde_json::json!({ "plan_id": PlanId::new().to_string() })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "PLAN_NOT_FOUND");
    }

    #[tokio::test]
    async fn assign_with_malformed_plan_id_is_bad_request() {
        let t = test_app();
        let (status, body) = send(
            &t.app,
            "POST",
            "/api/users/user-1/plan",
            Some(serde_json::json!({ "plan_id": "monthly" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn get_active_without_subscription_is_not_found() {
        let t = test_app();
        let (status, body) = send(&t.app, "GET", "/api/users/nobody/plan", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NO_ACTIVE_SUBSCRIPTION");
    }

    #[tokio::test]
    async fn renew_accepts_bare_date() {
        let t = test_app();
        let assign = serde_json::json!({ "plan_id": t.monthly.id.to_string() });
        send(&t.app, "POST", "/api/users/user-1/plan", Some(assign)).await;

        let (status, body) = send(
            &t.app,
            "PUT",
            "/api/users/user-1/plan/renewal",
            Some(serde_json::json!({ "expires_at": "2024-06-30" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["expires_at"]
            .as_str()
            .unwrap()
            .starts_with("2024-06-30T00:00:00"));
    }

    #[tokio::test]
    async fn cancel_then_history_lists_both_actions() {
        let t = test_app();
        let assign = serde_json::json!({ "plan_id": t.monthly.id.to_string() });
        send(&t.app, "POST", "/api/users/user-1/plan", Some(assign)).await;

        let (status, _) = send(&t.app, "DELETE", "/api/users/user-1/plan", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&t.app, "GET", "/api/users/user-1/plan/history", None).await;
        assert_eq!(status, StatusCode::OK);
        let actions: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions.len(), 2);
        assert!(actions.contains(&"assign"));
        assert!(actions.contains(&"cancel"));
    }

    #[tokio::test]
    async fn deactivating_plan_blocks_assignment() {
        let t = test_app();
        let uri = format!("/api/plans/{}/activation", t.monthly.id);
        let (status, body) = send(
            &t.app,
            "PUT",
            &uri,
            Some(serde_json::json!({ "is_active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_active"], false);

        let assign = serde_json::json!({ "plan_id": t.monthly.id.to_string() });
        let (status, _) = send(&t.app, "POST", "/api/users/user-1/plan", Some(assign)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sweep_at_future_instant_expires_subscription() {
        let t = test_app();
        let assign = serde_json::json!({ "plan_id": t.monthly.id.to_string() });
        send(&t.app, "POST", "/api/users/user-1/plan", Some(assign)).await;

        let (status, body) = send(
            &t.app,
            "POST",
            "/api/admin/sweeps?at=2024-03-01T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, body) = send(
            &t.app,
            "POST",
            "/api/admin/sweeps?at=2024-03-01T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn expiring_listing_respects_window() {
        let t = test_app();
        let assign = serde_json::json!({ "plan_id": t.monthly.id.to_string() });
        send(&t.app, "POST", "/api/users/user-1/plan", Some(assign)).await;

        let (_, body) = send(&t.app, "GET", "/api/subscriptions/expiring?days=7", None).await;
        assert_eq!(body.as_array().unwrap().len(), 0);

        let (_, body) = send(&t.app, "GET", "/api/subscriptions/expiring?days=30", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expiring_listing_rejects_out_of_range_window() {
        let t = test_app();
        let uri = format!("/api/subscriptions/expiring?days={}", u32::MAX);

        let (status, body) = send(&t.app, "GET", &uri, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }
}
