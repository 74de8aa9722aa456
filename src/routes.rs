use crate::{
    access::client_ip::ClientIpKeyExtractor,
    api::{access, admin, attendance, employee},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{Governor, GovernorConfigBuilder, governor::middleware::NoOpMiddleware};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

type Limiter = Arc<Governor<ClientIpKeyExtractor, NoOpMiddleware>>;

// Helper to build per-route limiter
fn build_limiter(
    requests_per_min: u32,
    key: ClientIpKeyExtractor,
) -> anyhow::Result<Governor<ClientIpKeyExtractor, NoOpMiddleware>> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(key)
        .finish()
        .ok_or_else(|| {
            anyhow::anyhow!("unusable rate limit of {} requests per minute", requests_per_min)
        })?;
    Ok(Governor::new(&cfg))
}

/// Built once and shared by every worker, so quotas are per process.
#[derive(Clone)]
pub struct RateLimiters {
    login: Limiter,
    protected: Limiter,
}

impl RateLimiters {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let key = ClientIpKeyExtractor::new(config.trust_proxy_headers);
        Ok(Self {
            login: Arc::new(build_limiter(config.rate_login_per_min, key)?),
            protected: Arc::new(build_limiter(config.rate_protected_per_min, key)?),
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    let login_limiter = limiters.login.clone();
    let protected_limiter = limiters.protected.clone();

    cfg.service(
        web::scope(&config.api_prefix)
            // Public, login-rate limited; verify/logout authenticate themselves
            .service(
                web::scope("/auth")
                    .service(
                        web::resource("/login")
                            .wrap(login_limiter.clone())
                            .route(web::post().to(handlers::login)),
                    )
                    .service(
                        web::resource("/forgot-password")
                            .wrap(login_limiter.clone())
                            .route(web::post().to(handlers::forgot_password)),
                    )
                    .service(
                        web::resource("/reset-password")
                            .wrap(login_limiter.clone())
                            .route(web::post().to(handlers::reset_password)),
                    )
                    .service(
                        web::resource("/verify")
                            .wrap(from_fn(auth_middleware))
                            .wrap(protected_limiter.clone())
                            .route(web::get().to(handlers::verify)),
                    )
                    .service(
                        web::resource("/logout")
                            .wrap(from_fn(auth_middleware))
                            .wrap(protected_limiter.clone())
                            .route(web::post().to(handlers::logout)),
                    ),
            )
            // Protected routes
            .service(
                web::resource("/check-access")
                    .wrap(from_fn(auth_middleware))
                    .wrap(protected_limiter.clone())
                    .route(web::get().to(access::check_access)),
            )
            .service(
                web::scope("/attendance")
                    .wrap(from_fn(auth_middleware))
                    .wrap(protected_limiter.clone())
                    .route("/check-in", web::post().to(attendance::check_in))
                    .route("/check-out", web::post().to(attendance::check_out))
                    .route("/report", web::get().to(attendance::report))
                    .route("/recent", web::get().to(attendance::recent))
                    .route("/me", web::get().to(attendance::me)),
            )
            .service(
                web::scope("/admin")
                    .wrap(from_fn(auth_middleware))
                    .wrap(protected_limiter)
                    .route("/add-ip", web::post().to(admin::add_ip))
                    .route("/allowlist", web::get().to(admin::list_ips))
                    .service(
                        web::resource("/shift-policy")
                            .route(web::get().to(admin::get_shift_policy))
                            .route(web::put().to(admin::put_shift_policy)),
                    )
                    .route("/dashboard/stats", web::get().to(admin::dashboard_stats))
                    .route("/reconcile", web::post().to(admin::reconcile))
                    // /admin/employees
                    .service(
                        web::resource("/employees")
                            .route(web::get().to(employee::list_employees))
                            .route(web::post().to(employee::create_employee)),
                    )
                    // /admin/employees/{id}
                    .service(
                        web::resource("/employees/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(
                        web::resource("/employees/{id}/attendance")
                            .route(web::get().to(employee::employee_attendance)),
                    ),
            ),
    );
}
