//! Server-rendered pages: the dashboard and the scan/capture page.
//!
//! The capture form itself runs client-side against the JSON API; these
//! pages only carry the data a field worker needs on screen.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
};
use shared::ActivityRecord;

use crate::db::Farm;
use crate::rest::AppState;

/// Axum handler for GET / — recent activities plus the farm list.
pub async fn dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let activities = match state.lookup_service.synced_activities().await {
        Ok(activities) => activities,
        Err(e) => {
            tracing::error!("Error loading dashboard activities: {:?}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error loading dashboard").into_response();
        }
    };
    let farms = match state.lookup_service.farms().await {
        Ok(farms) => farms,
        Err(e) => {
            tracing::error!("Error loading farms: {:?}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error loading dashboard").into_response();
        }
    };

    Html(dashboard_html(&activities, &farms)).into_response()
}

/// Axum handler for GET /scan/ — farm context for the capture page.
pub async fn scan(State(state): State<AppState>) -> impl IntoResponse {
    match state.lookup_service.farms().await {
        Ok(farms) => Html(scan_html(&farms)).into_response(),
        Err(e) => {
            tracing::error!("Error loading farms: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error loading scan page").into_response()
        }
    }
}

/// Escape text for interpolation into HTML bodies and attributes.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
         <body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    )
}

fn farm_list_html(farms: &[Farm]) -> String {
    let mut out = String::from("<ul class=\"farms\">\n");
    for farm in farms {
        if farm.location.is_empty() {
            out.push_str(&format!("<li>{}</li>\n", escape(&farm.name)));
        } else {
            out.push_str(&format!(
                "<li>{} <small>{}</small></li>\n",
                escape(&farm.name),
                escape(&farm.location)
            ));
        }
    }
    out.push_str("</ul>\n");
    out
}

fn dashboard_html(activities: &[ActivityRecord], farms: &[Farm]) -> String {
    let mut body = String::from("<h1>Farm Tracker</h1>\n<h2>Synced activities</h2>\n");
    body.push_str("<table class=\"activities\">\n");
    body.push_str(
        "<tr><th>Activity</th><th>Tree</th><th>Farm</th><th>Date</th><th>Quantity</th><th>Notes</th></tr>\n",
    );
    for activity in activities {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(activity.display_label()),
            escape(&activity.tree_id),
            escape(&activity.farm_name),
            activity.date,
            escape(&activity.quantity),
            escape(&activity.notes),
        ));
    }
    body.push_str("</table>\n<h2>Farms</h2>\n");
    body.push_str(&farm_list_html(farms));
    page("Farm Tracker", &body)
}

fn scan_html(farms: &[Farm]) -> String {
    let mut body = String::from("<h1>Scan a tree</h1>\n");
    body.push_str("<div id=\"scanner\"></div>\n");
    body.push_str("<h2>Farms</h2>\n");
    body.push_str(&farm_list_html(farms));
    page("Scan", &body)
}
