//! The tide routes for the development gateway and the logic to fulfill the
//! responses for each route against a PollLedger.
//!
//! Callers identify themselves with `Authorization: Bearer <principal>`; no
//! header means anonymous. This is a development stand-in and trusts whatever
//! principal it is given.
use log::*;
use tide::{Request, Response, StatusCode};

use crate::ledger::PollLedger;
use crate::models::Identity;
use crate::normalize::is_auth_error;
use crate::remote::http::{POLL_PATH, RESULTS_PATH, STATUS_PATH, VOTE_PATH};
use crate::remote::RemoteError;

/**
 * Build the gateway app around a ledger
 */
pub fn app(ledger: PollLedger) -> tide::Server<PollLedger> {
    let mut app = tide::with_state(ledger);
    app.with(tide::log::LogMiddleware::new());
    app.at("/").get(index);
    app.at(STATUS_PATH).get(poll::status);
    app.at(RESULTS_PATH).get(poll::results);
    app.at(VOTE_PATH).post(poll::vote);
    app.at(POLL_PATH).put(poll::define).delete(poll::reset);
    app
}

/**
 *  GET /
 */
pub async fn index(_req: Request<PollLedger>) -> tide::Result<String> {
    Ok(format!("livepoll {}", env!("CARGO_PKG_VERSION")))
}

fn identity(req: &Request<PollLedger>) -> Identity {
    let principal = req
        .header("Authorization")
        .and_then(|values| values.as_str().strip_prefix("Bearer "))
        .map(String::from);

    Identity::from_principal(principal)
}

/**
 * Turn a ledger refusal into a response carrying its text
 */
fn refusal(err: RemoteError) -> Response {
    let status = match &err {
        RemoteError::Rejected(_) if is_auth_error(&err) => StatusCode::Unauthorized,
        RemoteError::Rejected(_) => StatusCode::Conflict,
        RemoteError::Transport(_) => StatusCode::InternalServerError,
    };
    debug!("Refusing request with {}: {}", status, err);

    Response::builder(status).body(err.to_string()).build()
}

pub mod poll {
    use tide::{Body, Request, Response, StatusCode};

    use super::{identity, refusal};
    use crate::api_models::{Ballot, PollDefinition};
    use crate::ledger::PollLedger;

    /**
     * GET /api/v1/poll/status
     */
    pub async fn status(req: Request<PollLedger>) -> tide::Result<Body> {
        Body::from_json(&req.state().status())
    }

    /**
     * GET /api/v1/poll/results
     */
    pub async fn results(req: Request<PollLedger>) -> tide::Result<Body> {
        Body::from_json(&req.state().results())
    }

    /**
     *  POST /api/v1/poll/vote
     */
    pub async fn vote(mut req: Request<PollLedger>) -> tide::Result<Response> {
        let ballot: Ballot = req.body_json().await?;
        let caller = identity(&req);

        Ok(match req.state().vote(&caller, &ballot.candidate) {
            Ok(marker) => Response::builder(StatusCode::Ok).body(marker).build(),
            Err(err) => refusal(err),
        })
    }

    /**
     *  PUT /api/v1/poll
     */
    pub async fn define(mut req: Request<PollLedger>) -> tide::Result<Response> {
        let definition: PollDefinition = req.body_json().await?;
        let caller = identity(&req);

        Ok(match req.state().create_or_update(&caller, definition) {
            Ok(()) => Response::new(StatusCode::NoContent),
            Err(err) => refusal(err),
        })
    }

    /**
     *  DELETE /api/v1/poll
     */
    pub async fn reset(req: Request<PollLedger>) -> tide::Result<Response> {
        let caller = identity(&req);

        Ok(match req.state().reset(&caller) {
            Ok(()) => Response::new(StatusCode::NoContent),
            Err(err) => refusal(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tide::http::{Method, Request, Response, Url};
    use tide::{Body, StatusCode};

    use super::*;
    use crate::api_models::{Ballot, PollDefinition, ResultsReport, StatusReport};
    use crate::models::PollStatus;
    use crate::time::ManualClock;

    fn gateway() -> tide::Server<PollLedger> {
        app(PollLedger::new(Arc::new(ManualClock::new(0)), ["admin"]))
    }

    fn request(method: Method, path: &str, principal: Option<&str>) -> Request {
        let url = Url::parse("http://localhost").unwrap().join(path).unwrap();
        let mut req = Request::new(method, url);
        if let Some(principal) = principal {
            req.insert_header("Authorization", format!("Bearer {}", principal));
        }
        req
    }

    async fn define(app: &tide::Server<PollLedger>, principal: &str) -> Response {
        let mut req = request(Method::Put, POLL_PATH, Some(principal));
        let definition = PollDefinition {
            candidates: vec!["Alice".into(), "Bob".into()],
            end_time: None,
        };
        req.set_body(Body::from_json(&definition).unwrap());
        app.respond(req).await.unwrap()
    }

    async fn vote(app: &tide::Server<PollLedger>, principal: Option<&str>, candidate: &str) -> Response {
        let mut req = request(Method::Post, VOTE_PATH, principal);
        let ballot = Ballot {
            candidate: candidate.into(),
        };
        req.set_body(Body::from_json(&ballot).unwrap());
        app.respond(req).await.unwrap()
    }

    #[async_std::test]
    async fn test_status_when_absent() {
        let app = gateway();
        let mut res: Response = app.respond(request(Method::Get, STATUS_PATH, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::Ok);

        let report: StatusReport = res.body_json().await.unwrap();
        assert_eq!(report.status, PollStatus::Absent);
        assert_eq!(report.poll, None);
    }

    #[async_std::test]
    async fn test_define_vote_and_results() {
        let app = gateway();
        assert_eq!(define(&app, "admin").await.status(), StatusCode::NoContent);

        let mut res = vote(&app, Some("v1"), "Alice").await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_string().await.unwrap(), "Vote successful");

        let mut res = vote(&app, Some("v1"), "Bob").await;
        assert_eq!(res.status(), StatusCode::Conflict);
        assert!(res.body_string().await.unwrap().contains("already voted"));

        let mut res: Response = app.respond(request(Method::Get, RESULTS_PATH, None)).await.unwrap();
        let report: ResultsReport = res.body_json().await.unwrap();
        assert_eq!(report.status, PollStatus::Ongoing);
        assert_eq!(report.candidates.unwrap()[0].votes, 1);
    }

    #[async_std::test]
    async fn test_refusals_carry_service_text() {
        let app = gateway();

        let mut res = define(&app, "v1").await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
        assert_eq!(
            res.body_string().await.unwrap(),
            "Unauthorized: Only admins can manage the poll"
        );

        let mut res = vote(&app, None, "Alice").await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
        assert!(res.body_string().await.unwrap().starts_with("Unauthorized"));
    }

    #[async_std::test]
    async fn test_reset() {
        let app = gateway();
        define(&app, "admin").await;

        let res: Response = app.respond(request(Method::Delete, POLL_PATH, Some("admin"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NoContent);

        let mut res: Response = app.respond(request(Method::Get, STATUS_PATH, None)).await.unwrap();
        let report: StatusReport = res.body_json().await.unwrap();
        assert_eq!(report.status, PollStatus::Absent);
    }
}
