//! Saved plan files.

use super::plan::{Plan, PLAN_FORMAT_VERSION};
use crate::error::{PlanError, Result};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Writes `plan` to `path` as JSON.
///
/// The file is written next to its destination and renamed into place,
/// so readers never see a partial plan.
///
/// # Errors
///
/// Returns an error if the plan cannot be serialized or written.
pub async fn save_plan(plan: &Plan, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(plan)
        .map_err(|e| PlanError::plan_file(path, format!("Failed to serialize plan: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PlanError::plan_file(path, format!("Failed to create directory: {e}")))?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| PlanError::plan_file(path, format!("Failed to create temp file: {e}")))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| PlanError::plan_file(path, format!("Failed to write plan: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| PlanError::plan_file(path, format!("Failed to sync plan: {e}")))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|e| PlanError::plan_file(path, format!("Failed to rename plan file: {e}")))?;

    info!("Saved plan {} to {}", plan.id, path.display());
    Ok(())
}

/// Reads a plan written by [`save_plan`].
///
/// # Errors
///
/// Returns an error if the file is missing, malformed, or from another
/// format version.
pub async fn load_plan(path: &Path) -> Result<Plan> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| PlanError::plan_file(path, format!("Failed to read plan: {e}")))?;
    let plan: Plan = serde_json::from_str(&content)
        .map_err(|e| PlanError::plan_file(path, format!("Failed to parse plan: {e}")))?;
    if plan.format_version != PLAN_FORMAT_VERSION {
        return Err(PlanError::plan_file(
            path,
            format!(
                "Unsupported plan format version {} (expected {PLAN_FORMAT_VERSION})",
                plan.format_version
            ),
        )
        .into());
    }
    debug!("Loaded plan {} ({} changes)", plan.id, plan.changes.len());
    Ok(plan)
}

/// True if `path` looks like a saved plan rather than a configuration.
#[must_use]
pub fn is_plan_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "json" || ext == "plan")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::addrs::ResourceAddress;
    use crate::planner::{Action, ChangeReason, ChangeRecord, PlanMode};
    use crate::value::{Mark, MarkedValue};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("tfplan.json");

        let mut plan = Plan::new(PlanMode::Normal, "hash", "fp");
        let mut change = ChangeRecord::new(
            ResourceAddress::new("null_resource", "a"),
            Action::Create,
            ChangeReason::NotInState,
        );
        change.after = Some(MarkedValue::object_from([
            ("id", MarkedValue::unknown()),
            ("secret", MarkedValue::string("s").mark(Mark::Sensitive)),
        ]));
        plan.changes.push(change);
        plan.variables.insert("n".into(), MarkedValue::number(2.0));

        save_plan(&plan, &path).await.unwrap();
        assert!(is_plan_file(&path));
        assert!(!path.with_extension("tmp").exists());

        let loaded = load_plan(&path).await.unwrap();
        assert_eq!(loaded, plan);
        let after = loaded.changes[0].after.clone().unwrap();
        assert!(!after.get_attr("id").unwrap().is_known());
        assert!(after.get_attr("secret").unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn test_rejects_other_versions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.json");
        let mut plan = Plan::new(PlanMode::Destroy, "hash", "fp");
        plan.format_version = 7;
        save_plan(&plan, &path).await.unwrap();
        let err = load_plan(&path).await.unwrap_err();
        assert!(err.to_string().contains("format version 7"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(load_plan(&dir.path().join("nope.json")).await.is_err());
    }
}
