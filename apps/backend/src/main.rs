use actix_extensible_rate_limit::backend::memory::InMemoryBackend;
use actix_extensible_rate_limit::RateLimiter;
use actix_web::{web, App, HttpServer};
use backend::config::ServerConfig;
use backend::infra::state::build_state;
use backend::middleware::cors::cors_middleware;
use backend::middleware::rate_limit::listing_rate_limit_config;
use backend::middleware::request_trace::RequestTrace;
use backend::middleware::structured_logger::StructuredLogger;
use backend::middleware::trace_span::TraceSpan;
use backend::routes;
use tracing::{error, info};

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment:
    // - Docker: docker-compose env_file or docker run --env-file
    // - Local dev: source env files manually (set -a; . ./.env; set +a)
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };
    let (host, port) = (config.host.clone(), config.port);

    let app_state = match build_state().with_config(config).build().await {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "failed to build application state");
            std::process::exit(1);
        }
    };

    info!(host = %host, port, "starting game server");

    let data = web::Data::new(app_state);
    // Shared across workers so the limit is per process, not per worker.
    let listing_backend = InMemoryBackend::builder().build();

    HttpServer::new(move || {
        let listing_limiter = RateLimiter::builder(
            listing_backend.clone(),
            listing_rate_limit_config().build(),
        )
        .add_headers()
        .build();

        App::new()
            .wrap(cors_middleware())
            .wrap(StructuredLogger)
            .wrap(TraceSpan)
            .wrap(RequestTrace)
            .app_data(data.clone())
            .service(
                web::scope("/api/games")
                    .wrap(listing_limiter)
                    .configure(routes::games::configure_routes),
            )
            .configure(routes::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
