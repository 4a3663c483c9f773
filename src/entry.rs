use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::gateway::{Gateway, Query, Table};
use crate::models::{Application, Identity};

/// Fields an admin supplies when logging an application by hand.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewApplication {
    pub company: String,
    pub job_title: String,
    pub client_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub date_applied: Option<NaiveDate>,
    pub source: Option<String>,
    pub source_link: Option<String>,
    pub application_link: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub resume_used: Option<String>,
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
}

fn require_admin(identity: &Identity, action: &str) -> Result<()> {
    if !identity.is_admin() {
        bail!("Only admins can {} applications ({} is a {})", action, identity.name, identity.role.as_str());
    }
    Ok(())
}

pub fn add_application(
    gateway: &dyn Gateway,
    identity: &Identity,
    new: NewApplication,
    today: NaiveDate,
) -> Result<Application> {
    require_admin(identity, "add")?;
    if new.company.trim().is_empty() || new.job_title.trim().is_empty() {
        bail!("Company and job title are required");
    }

    let date = new.date_applied.unwrap_or(today);
    let Value::Object(mut row) = serde_json::to_value(&new)? else {
        return Err(anyhow!("application did not serialize to an object"));
    };
    row.insert("date_applied".to_string(), json!(date.format("%Y-%m-%d").to_string()));
    row.insert("is_deleted".to_string(), json!(false));

    let stored = gateway
        .insert(Table::Applications, &row)
        .context("Failed to save application")?;
    let app: Application =
        serde_json::from_value(Value::Object(stored)).context("Backend returned an unreadable application")?;
    info!(id = %app.id, company = %app.company, "application added");
    Ok(app)
}

fn patch_one(gateway: &dyn Gateway, id: Uuid, patch: Value) -> Result<()> {
    let Value::Object(patch) = patch else {
        return Err(anyhow!("patch must be an object"));
    };
    let changed = gateway
        .update(&Query::from(Table::Applications).eq("id", id), &patch)
        .context("Failed to update application")?;
    if changed == 0 {
        bail!("No application with id {}", id);
    }
    Ok(())
}

/// Hides an application from every list without removing the row.
pub fn soft_delete(gateway: &dyn Gateway, identity: &Identity, id: Uuid) -> Result<()> {
    require_admin(identity, "delete")?;
    patch_one(gateway, id, json!({"is_deleted": true}))?;
    info!(%id, "application deleted");
    Ok(())
}

pub fn set_flag(gateway: &dyn Gateway, identity: &Identity, id: Uuid, reason: Option<&str>) -> Result<()> {
    require_admin(identity, "flag")?;
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    patch_one(gateway, id, json!({"is_flagged": true, "flag_reason": reason}))?;
    info!(%id, "application flagged");
    Ok(())
}

pub fn clear_flag(gateway: &dyn Gateway, identity: &Identity, id: Uuid) -> Result<()> {
    require_admin(identity, "unflag")?;
    patch_one(gateway, id, json!({"is_flagged": false, "flag_reason": null}))?;
    info!(%id, "application unflagged");
    Ok(())
}
