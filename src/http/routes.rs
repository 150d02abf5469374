//! `/api` route groups and their per-group policies.
//!
//! # Responsibilities
//! - Accept domain routers from collaborators (auth, AI, uploads, reports)
//! - Bind each group to its limiter and cache policy
//! - Wrap the whole `/api` tree, unmatched paths included, in the general
//!   limiter
//!
//! # Layering per group (outermost first)
//! ```text
//! general limiter → group limiter → Cache-Control → handler
//! ```

use axum::{http::StatusCode, middleware, response::IntoResponse, Json, Router};
use serde_json::json;

use crate::http::cache_control::{cache_control_middleware, CachePolicy};
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{LimiterBank, LimiterKind};

/// Collaborator routers sharing one mount, each already wrapped in its
/// cache policy.
struct RouteGroup {
    mount: &'static str,
    limiter: LimiterKind,
    router: Router,
}

/// Domain routes plugged into the pipeline.
///
/// Paths inside each router are relative to the group's mount point. A group
/// builder may be called more than once; the routers are merged under the
/// mount and keep their own cache policies. The same path registered twice
/// still panics, as with [`Router::merge`].
#[derive(Default)]
pub struct ApiRoutes {
    groups: Vec<RouteGroup>,
}

impl ApiRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes under `/api` guarded by the general limiter only.
    pub fn general(self, router: Router, cache: CachePolicy) -> Self {
        self.group("", LimiterKind::General, router, cache)
    }

    /// `/api/auth`: failed attempts count, successful ones are given back.
    pub fn auth(self, router: Router, cache: CachePolicy) -> Self {
        self.group("/auth", LimiterKind::Auth, router, cache)
    }

    /// `/api/ai`: LLM calls.
    pub fn ai(self, router: Router, cache: CachePolicy) -> Self {
        self.group("/ai", LimiterKind::Ai, router, cache)
    }

    /// `/api/sequences`: FASTA uploads and sequence CRUD.
    pub fn uploads(self, router: Router, cache: CachePolicy) -> Self {
        self.group("/sequences", LimiterKind::Upload, router, cache)
    }

    /// `/api/storage`: cloud storage saves, counted as uploads.
    pub fn storage(self, router: Router, cache: CachePolicy) -> Self {
        self.group("/storage", LimiterKind::Upload, router, cache)
    }

    /// `/api/reports`: PDF/HTML report generation.
    pub fn reports(self, router: Router, cache: CachePolicy) -> Self {
        self.group("/reports", LimiterKind::Report, router, cache)
    }

    fn group(
        mut self,
        mount: &'static str,
        limiter: LimiterKind,
        router: Router,
        cache: CachePolicy,
    ) -> Self {
        let router = router.layer(middleware::from_fn_with_state(
            cache,
            cache_control_middleware,
        ));

        match self.groups.iter_mut().find(|g| g.mount == mount) {
            Some(existing) => {
                let merged = std::mem::take(&mut existing.router).merge(router);
                existing.router = merged;
            }
            None => self.groups.push(RouteGroup {
                mount,
                limiter,
                router,
            }),
        }
        self
    }

    /// Assemble the `/api` tree. `health` is mounted at `/api/health`.
    pub fn into_router(self, bank: &LimiterBank, health: Router) -> Router {
        let health = health.layer(middleware::from_fn_with_state(
            CachePolicy::none(),
            cache_control_middleware,
        ));
        let mut api = Router::new().nest("/health", health);

        for group in self.groups {
            let mut router = group.router;
            if bank.enabled() && group.limiter != LimiterKind::General {
                router = router.layer(middleware::from_fn_with_state(
                    bank.guard(group.limiter),
                    rate_limit_middleware,
                ));
            }

            api = if group.mount.is_empty() {
                api.merge(router)
            } else {
                api.nest(group.mount, router)
            };
        }

        // Before the general limiter, so unknown paths are counted too.
        api = api.fallback(not_found);

        if bank.enabled() {
            api = api.layer(middleware::from_fn_with_state(
                bank.guard(LimiterKind::General),
                rate_limit_middleware,
            ));
        }

        Router::new().nest("/api", api)
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
