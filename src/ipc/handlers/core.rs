use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::seed;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "pageSize": state.config.page_size,
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
        .get("seed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match db::open_db(&path) {
        Ok(mut conn) => {
            let mut seeded = false;
            if seed_demo {
                match seed::seed_demo(&mut conn) {
                    Ok(Some(summary)) => {
                        tracing::info!(
                            class_types = summary.class_types,
                            positions = summary.positions,
                            employees = summary.employees,
                            subjects = summary.subjects,
                            classes = summary.classes,
                            students = summary.students,
                            schedules = summary.schedules,
                            "seeded demo data"
                        );
                        seeded = true;
                    }
                    Ok(None) => {}
                    Err(e) => return err(&req.id, "seed_failed", format!("{e:?}"), None),
                }
            }

            tracing::info!(path = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "seeded": seeded }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
