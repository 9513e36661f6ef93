use crate::classify::CategoryConfig;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let seed_demo = req
        .params
        .get("seedDemo")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match db::open_db(&path) {
        Ok(conn) => {
            if seed_demo {
                if let Err(e) = db::seed_demo_data(&conn) {
                    return err(&req.id, "db_seed_failed", format!("{e:?}"), None);
                }
            }
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

// The UI owns the config file; the daemon only holds the parsed mapping for
// the session, so the classifier never reads ambient state.
fn handle_set_categories(state: &mut AppState, req: &Request) -> serde_json::Value {
    match serde_json::from_value::<CategoryConfig>(req.params.clone()) {
        Ok(config) => {
            let count = config.categories.len();
            state.categories = config;
            ok(&req.id, json!({ "categories": count }))
        }
        Err(e) => err(
            &req.id,
            "bad_params",
            format!("categories must be [{{name, keywords}}]: {}", e),
            None,
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.setCategories" => Some(handle_set_categories(state, req)),
        _ => None,
    }
}
