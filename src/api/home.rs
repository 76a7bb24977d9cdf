//! Home page

use axum::response::{Html, IntoResponse, Redirect, Response};

use crate::auth::HttpSession;

/// Minimal shell that opens the stream; asset serving lives elsewhere
const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Dashfeed</title></head>
<body>
    <div id="posts"></div>
    <script src="/js/dashboard.js"></script>
</body>
</html>
"#;

/// GET /
///
/// Sends anyone without an authorized session into the handshake.
pub async fn home(session: HttpSession) -> Response {
    if !session.data.is_authenticated() {
        return Redirect::to("/auth").into_response();
    }

    Html(HOME_PAGE).into_response()
}
