use anyhow::{Context, Result};
use tracing::info;

use crate::gateway::{fetch, Direction, Gateway, Query, Table};
use crate::models::{Client, ClientAssignment, Identity};

const CLIENT_COLUMNS: &[&str] = &["id", "first_name", "last_name", "is_demo"];

/// Clients the identity may filter by: every real client for admins, the
/// actively assigned ones for specialists.
pub fn load_clients(gateway: &dyn Gateway, identity: &Identity) -> Result<Vec<Client>> {
    if identity.is_admin() {
        let query = Query::from(Table::Clients)
            .select(CLIENT_COLUMNS)
            .eq("is_demo", false)
            .order("first_name", Direction::Asc);
        return fetch(gateway, &query).context("Failed to load clients");
    }

    let assignments: Vec<ClientAssignment> = fetch(
        gateway,
        &Query::from(Table::ClientAssignments)
            .select(&["id", "specialist_id", "client_id", "is_active"])
            .eq("specialist_id", identity.user_id)
            .eq("is_active", true),
    )
    .context("Failed to load client assignments")?;

    if assignments.is_empty() {
        info!(user = %identity.user_id, "no active client assignments");
        return Ok(Vec::new());
    }

    let mut ids: Vec<_> = assignments.iter().map(|a| a.client_id).collect();
    ids.sort();
    ids.dedup();

    let query = Query::from(Table::Clients)
        .select(CLIENT_COLUMNS)
        .in_ids("id", ids)
        .eq("is_demo", false)
        .order("first_name", Direction::Asc);
    fetch(gateway, &query).context("Failed to load assigned clients")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::gateway::testing::RecordingGateway;
    use crate::models::Role;
    use serde_json::json;
    use uuid::Uuid;

    fn add(db: &Database, table: Table, row: serde_json::Value) {
        let serde_json::Value::Object(row) = row else { panic!("row must be an object") };
        db.insert(table, &row).unwrap();
    }

    fn seeded() -> (Database, Uuid) {
        let db = Database::in_memory().unwrap();
        let me = Uuid::new_v4();
        let (zoe, amy, demo, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        add(&db, Table::Users, json!({"id": me.to_string(), "name": "Sam", "role": "specialist"}));
        add(&db, Table::Clients, json!({"id": zoe.to_string(), "first_name": "Zoe", "last_name": "Ng"}));
        add(&db, Table::Clients, json!({"id": amy.to_string(), "first_name": "Amy"}));
        add(&db, Table::Clients, json!({"id": demo.to_string(), "first_name": "Demo", "is_demo": true}));
        add(&db, Table::Clients, json!({"id": other.to_string(), "first_name": "Other"}));
        for (client, active) in [(zoe, true), (amy, true), (demo, true), (other, false)] {
            add(
                &db,
                Table::ClientAssignments,
                json!({"specialist_id": me.to_string(), "client_id": client.to_string(), "is_active": active}),
            );
        }
        (db, me)
    }

    #[test]
    fn test_admin_sees_all_real_clients_alphabetically() {
        let (db, _) = seeded();
        let admin = Identity::new(Uuid::new_v4(), "Root", Role::Admin);
        let names: Vec<String> = load_clients(&db, &admin).unwrap().iter().map(Client::display_name).collect();
        assert_eq!(names, vec!["Amy", "Other", "Zoe Ng"]);
    }

    #[test]
    fn test_specialist_sees_only_active_assigned_non_demo() {
        let (db, me) = seeded();
        let specialist = Identity::new(me, "Sam", Role::Specialist);
        let names: Vec<String> = load_clients(&db, &specialist)
            .unwrap()
            .iter()
            .map(Client::display_name)
            .collect();
        assert_eq!(names, vec!["Amy", "Zoe Ng"]);
    }

    #[test]
    fn test_zero_assignments_is_empty_not_an_error() {
        let gateway = RecordingGateway::default();
        let specialist = Identity::new(Uuid::new_v4(), "New Hire", Role::Specialist);

        let clients = load_clients(&gateway, &specialist).unwrap();
        assert!(clients.is_empty());
        assert!(gateway.queries_for(Table::Clients).is_empty());
    }

    #[test]
    fn test_failed_assignment_query_is_reported() {
        let gateway = RecordingGateway::default().fail_on(Table::ClientAssignments);
        let specialist = Identity::new(Uuid::new_v4(), "Sam", Role::Specialist);

        let err = load_clients(&gateway, &specialist).unwrap_err();
        assert!(format!("{:#}", err).contains("client assignments"));
    }
}
