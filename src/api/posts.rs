//! Direct dashboard fetch
//!
//! `GET /posts?offset=N` returns one page of the dashboard as JSON.
//! Unauthenticated or malformed requests, and API failures, end with an
//! empty 200 response.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::HttpSession;
use crate::service::DashboardQuery;

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    offset: Option<String>,
}

impl PostsQuery {
    fn offset(&self) -> Option<u64> {
        self.offset.as_deref()?.trim().parse().ok()
    }
}

fn empty() -> Response {
    ().into_response()
}

/// GET /posts
pub async fn list_posts(
    State(state): State<AppState>,
    session: HttpSession,
    query: Result<Query<PostsQuery>, QueryRejection>,
) -> Response {
    let Some(token) = session.data.access_token() else {
        return empty();
    };
    let Some(offset) = query.ok().and_then(|Query(query)| query.offset()) else {
        return empty();
    };

    match state
        .dashboard
        .fetch(token, DashboardQuery::Offset(offset))
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(error) => {
            tracing::error!(%error, offset, "Dashboard fetch failed");
            empty()
        }
    }
}
