//! The application query and its client-side join.
//!
//! Loading a page of applications is:
//! 1. look up demo clients and demo specialists,
//! 2. query applications scoped by identity and filters, excluding demo refs,
//! 3. bulk-fetch display names for the ids the result references,
//! 4. drop anything that still points at demo data, attach names, count.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::dates::DateRange;
use crate::gateway::{fetch, Direction, Gateway, Query, Table};
use crate::models::{Application, ApplicationRecord, ApplicationStats, Client, Identity};

const UNKNOWN: &str = "Unknown";

/// Everything that narrows one application load.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationQuery {
    pub range: DateRange,
    pub client_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub flagged_only: bool,
}

impl ApplicationQuery {
    /// Specialists are always pinned to their own applications; admins never are.
    pub fn scoped(identity: &Identity, range: DateRange, client_id: Option<Uuid>, flagged_only: bool) -> Self {
        Self {
            range,
            client_id,
            specialist_id: (!identity.is_admin()).then_some(identity.user_id),
            flagged_only,
        }
    }

    pub fn to_query(&self, demo: &DemoIds) -> Query {
        let (start, end) = self.range.bounds();
        let mut query = Query::from(Table::Applications)
            .eq("is_deleted", false)
            .gte("date_applied", start)
            .lte("date_applied", end)
            .not_in_ids("client_id", demo.clients.iter().copied())
            .not_in_ids("specialist_id", demo.specialists.iter().copied())
            .order("date_applied", Direction::Desc)
            .order("created_at", Direction::Desc);

        if let Some(client_id) = self.client_id {
            query = query.eq("client_id", client_id);
        }
        if let Some(specialist_id) = self.specialist_id {
            query = query.eq("specialist_id", specialist_id);
        }
        if self.flagged_only {
            query = query.eq("is_flagged", true);
        }
        query
    }
}

/// Ids of clients and users marked as seed/test data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoIds {
    pub clients: BTreeSet<Uuid>,
    pub specialists: BTreeSet<Uuid>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SpecialistName {
    id: Uuid,
    name: Option<String>,
    #[serde(default)]
    is_demo: Option<bool>,
}

pub fn fetch_demo_ids(gateway: &dyn Gateway) -> Result<DemoIds> {
    let clients: Vec<IdRow> = fetch(gateway, &Query::from(Table::Clients).select(&["id"]).eq("is_demo", true))
        .context("Failed to look up demo clients")?;
    let specialists: Vec<IdRow> = fetch(gateway, &Query::from(Table::Users).select(&["id"]).eq("is_demo", true))
        .context("Failed to look up demo users")?;
    Ok(DemoIds {
        clients: clients.into_iter().map(|r| r.id).collect(),
        specialists: specialists.into_iter().map(|r| r.id).collect(),
    })
}

#[derive(Debug, Clone, PartialEq)]
struct NameEntry {
    name: String,
    is_demo: bool,
}

/// Display names and demo flags for the ids one result set references.
#[derive(Debug, Default)]
pub struct NameLookup {
    clients: HashMap<Uuid, NameEntry>,
    specialists: HashMap<Uuid, NameEntry>,
}

impl NameLookup {
    /// One query per table, whatever the size of `applications`.
    pub fn fetch(gateway: &dyn Gateway, applications: &[Application]) -> Result<Self> {
        let client_ids: BTreeSet<Uuid> = applications.iter().filter_map(|a| a.client_id).collect();
        let specialist_ids: BTreeSet<Uuid> = applications.iter().filter_map(|a| a.specialist_id).collect();

        let clients: Vec<Client> = fetch(
            gateway,
            &Query::from(Table::Clients)
                .select(&["id", "first_name", "last_name", "is_demo"])
                .in_ids("id", client_ids),
        )
        .context("Failed to look up client names")?;

        let specialists: Vec<SpecialistName> = fetch(
            gateway,
            &Query::from(Table::Users)
                .select(&["id", "name", "is_demo"])
                .in_ids("id", specialist_ids),
        )
        .context("Failed to look up specialist names")?;

        let mut lookup = NameLookup::default();
        for client in clients {
            lookup.clients.insert(
                client.id,
                NameEntry { name: name_or_unknown(client.display_name()), is_demo: client.is_demo },
            );
        }
        for specialist in specialists {
            lookup.specialists.insert(
                specialist.id,
                NameEntry {
                    name: name_or_unknown(specialist.name.unwrap_or_default()),
                    is_demo: specialist.is_demo.unwrap_or(false),
                },
            );
        }
        Ok(lookup)
    }

    fn client(&self, id: Option<Uuid>) -> Option<&NameEntry> {
        id.and_then(|id| self.clients.get(&id))
    }

    fn specialist(&self, id: Option<Uuid>) -> Option<&NameEntry> {
        id.and_then(|id| self.specialists.get(&id))
    }

    #[cfg(test)]
    fn with_client(mut self, id: Uuid, name: &str, is_demo: bool) -> Self {
        self.clients.insert(id, NameEntry { name: name.to_string(), is_demo });
        self
    }

    #[cfg(test)]
    fn with_specialist(mut self, id: Uuid, name: &str, is_demo: bool) -> Self {
        self.specialists.insert(id, NameEntry { name: name.to_string(), is_demo });
        self
    }
}

// Blank names read as missing.
fn name_or_unknown(name: String) -> String {
    if name.trim().is_empty() { UNKNOWN.to_string() } else { name }
}

/// Drops demo, deleted and out-of-range rows and attaches display names.
/// Order of the input is preserved.
pub fn enrich(applications: Vec<Application>, names: &NameLookup, range: DateRange) -> Vec<ApplicationRecord> {
    let before = applications.len();
    let records: Vec<ApplicationRecord> = applications
        .into_iter()
        .filter(|a| !a.is_deleted && range.contains(a.date_applied))
        .filter(|a| {
            !names.client(a.client_id).is_some_and(|c| c.is_demo)
                && !names.specialist(a.specialist_id).is_some_and(|s| s.is_demo)
        })
        .map(|a| ApplicationRecord {
            client_name: names.client(a.client_id).map_or_else(|| UNKNOWN.to_string(), |c| c.name.clone()),
            specialist_name: names
                .specialist(a.specialist_id)
                .map_or_else(|| UNKNOWN.to_string(), |s| s.name.clone()),
            application: a,
        })
        .collect();

    if records.len() != before {
        debug!(dropped = before - records.len(), "excluded rows after join");
    }
    records
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedApplications {
    pub records: Vec<ApplicationRecord>,
    pub stats: ApplicationStats,
}

/// Runs the whole pipeline for one load.
pub fn load_applications(
    gateway: &dyn Gateway,
    params: &ApplicationQuery,
    today: NaiveDate,
) -> Result<LoadedApplications> {
    let demo = fetch_demo_ids(gateway)?;
    let applications: Vec<Application> =
        fetch(gateway, &params.to_query(&demo)).context("Failed to load applications")?;
    let names = NameLookup::fetch(gateway, &applications)?;

    let records = enrich(applications, &names, params.range);
    let stats = ApplicationStats::compute(&records, today);
    debug!(total = stats.total, flagged = stats.flagged, "applications loaded");
    Ok(LoadedApplications { records, stats })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub specialist_id: Option<Uuid>,
    pub specialist_name: String,
    pub applications: usize,
    pub flagged: usize,
}

/// Per-specialist counts over already enriched records, busiest first.
pub fn leaderboard(records: &[ApplicationRecord]) -> Vec<LeaderboardEntry> {
    let mut by_specialist: HashMap<Option<Uuid>, LeaderboardEntry> = HashMap::new();
    for record in records {
        let entry = by_specialist
            .entry(record.application.specialist_id)
            .or_insert_with(|| LeaderboardEntry {
                specialist_id: record.application.specialist_id,
                specialist_name: record.specialist_name.clone(),
                applications: 0,
                flagged: 0,
            });
        entry.applications += 1;
        if record.application.is_flagged {
            entry.flagged += 1;
        }
    }

    let mut entries: Vec<LeaderboardEntry> = by_specialist.into_values().collect();
    entries.sort_by(|a, b| {
        b.applications
            .cmp(&a.applications)
            .then_with(|| a.specialist_name.cmp(&b.specialist_name))
    });
    entries
}
