//! Problem Details assertions that do not depend on backend types.

use actix_web::http::header::HeaderMap;
use actix_web::http::StatusCode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ProblemDetailsLike {
    #[serde(rename = "type")]
    type_: String,
    status: u16,
    detail: String,
    code: String,
    trace_id: String,
}

/// Assert the stable error contract: status, content type, code, and a
/// body `trace_id` equal to the `x-trace-id` header.
pub fn assert_problem_details(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    expected_code: &str,
    expected_status: StatusCode,
    expected_detail_contains: Option<&str>,
) {
    assert_eq!(status, expected_status);
    assert_eq!(
        headers.get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/problem+json")
    );

    let problem: ProblemDetailsLike =
        serde_json::from_slice(body).expect("body should be Problem Details JSON");
    let header_trace = headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .expect("x-trace-id header should be present");

    assert_eq!(problem.trace_id, header_trace);
    assert_eq!(problem.code, expected_code);
    assert_eq!(problem.status, expected_status.as_u16());
    assert!(problem.type_.ends_with(expected_code), "type: {}", problem.type_);

    if let Some(expected) = expected_detail_contains {
        assert!(
            problem.detail.contains(expected),
            "expected detail to contain '{expected}', got '{}'",
            problem.detail
        );
    }
}
