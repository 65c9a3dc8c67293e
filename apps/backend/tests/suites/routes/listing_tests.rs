// Listing and health over the full middleware stack

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use backend::infra::state::build_state;
use backend::middleware::request_trace::RequestTrace;
use backend::middleware::structured_logger::StructuredLogger;
use backend::middleware::trace_span::TraceSpan;
use backend::routes;
use backend_test_support::problem_details::assert_problem_details;

#[actix_web::test]
async fn invalid_listing_parameters_are_problem_details() {
    let state = build_state().build().await.unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .wrap(StructuredLogger)
            .wrap(TraceSpan)
            .wrap(RequestTrace)
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/games?nbPerPage=0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = test::read_body(resp).await;

    assert_problem_details(
        status,
        &headers,
        &body,
        "VALIDATION_ERROR",
        StatusCode::BAD_REQUEST,
        Some("nbPerPage"),
    );
    // The problem's trace id is the request's trace id.
    assert_eq!(headers.get("x-trace-id"), headers.get("x-request-id"));
}

#[actix_web::test]
async fn empty_listing_and_health() {
    let state = build_state().build().await.unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .wrap(RequestTrace)
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/games").to_request();
    let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        json,
        serde_json::json!({"success": true, "games": [], "page": 1, "length": 0})
    );

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
