//! Applications page view-model: filter state, load bookkeeping, search.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use tracing::warn;
use uuid::Uuid;

use crate::clients::load_clients;
use crate::dates::DatePreset;
use crate::enrich::{load_applications, ApplicationQuery, LoadedApplications};
use crate::gateway::Gateway;
use crate::models::{ApplicationRecord, ApplicationStats, Client, Identity};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub client_id: Option<Uuid>,
    pub range: DatePreset,
    pub search: String,
    pub flagged_only: bool,
}

/// A load that has been started but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub token: u64,
    pub params: ApplicationQuery,
    pub today: NaiveDate,
}

impl LoadRequest {
    pub fn run(&self, gateway: &dyn Gateway) -> Result<LoadedApplications> {
        load_applications(gateway, &self.params, self.today)
    }
}

pub struct ApplicationsView {
    identity: Identity,
    filters: FilterState,
    clients: Vec<Client>,
    records: Vec<ApplicationRecord>,
    stats: ApplicationStats,
    loading: bool,
    last_error: Option<String>,
    // Kept apart from `last_error` so an application reload can't hide it.
    clients_error: Option<String>,
    latest_token: u64,
    latest_clients_token: u64,
    expanded: Option<Uuid>,
}

impl ApplicationsView {
    pub fn new(identity: Identity, filters: FilterState) -> Self {
        Self {
            identity,
            filters,
            clients: Vec::new(),
            records: Vec::new(),
            stats: ApplicationStats::default(),
            loading: false,
            last_error: None,
            clients_error: None,
            latest_token: 0,
            latest_clients_token: 0,
            expanded: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn records(&self) -> &[ApplicationRecord] {
        &self.records
    }

    pub fn stats(&self) -> ApplicationStats {
        self.stats
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clients_error(&self) -> Option<&str> {
        self.clients_error.as_deref()
    }

    pub fn selected_client_name(&self) -> Option<String> {
        let id = self.filters.client_id?;
        self.clients.iter().find(|c| c.id == id).map(Client::display_name)
    }

    // --- Filter changes. Each returns the reload it triggers. ---

    pub fn set_client(&mut self, client_id: Option<Uuid>, today: NaiveDate) -> LoadRequest {
        self.filters.client_id = client_id;
        self.begin_load(today)
    }

    pub fn set_range(&mut self, range: DatePreset, today: NaiveDate) -> LoadRequest {
        self.filters.range = range;
        self.begin_load(today)
    }

    pub fn set_flagged_only(&mut self, flagged_only: bool, today: NaiveDate) -> LoadRequest {
        self.filters.flagged_only = flagged_only;
        self.begin_load(today)
    }

    /// Search narrows the loaded list only; nothing is re-queried.
    pub fn set_search(&mut self, term: impl Into<String>) {
        self.filters.search = term.into();
    }

    /// Client filter after the current one in dropdown order; `None` ("All
    /// Clients") follows the last.
    pub fn next_client(&self) -> Option<Uuid> {
        match self.filters.client_id {
            None => self.clients.first().map(|c| c.id),
            Some(current) => {
                let idx = self.clients.iter().position(|c| c.id == current)?;
                self.clients.get(idx + 1).map(|c| c.id)
            }
        }
    }

    // --- Loading ---

    /// Marks a new client-list load as the latest and returns its token.
    pub fn begin_clients_load(&mut self) -> u64 {
        self.latest_clients_token += 1;
        self.latest_clients_token
    }

    /// Applies a finished client-list load. Stale results are dropped and
    /// a failure keeps the previous list.
    pub fn apply_clients(&mut self, token: u64, result: Result<Vec<Client>>) -> bool {
        if token != self.latest_clients_token {
            return false;
        }
        match result {
            Ok(clients) => {
                self.clients = clients;
                self.clients_error = None;
            }
            Err(e) => {
                warn!("Error loading clients: {:#}", e);
                self.clients_error = Some(format!("Could not load clients: {:#}", e));
            }
        }
        true
    }

    /// Marks a new load as the latest; older in-flight loads become stale.
    pub fn begin_load(&mut self, today: NaiveDate) -> LoadRequest {
        self.latest_token += 1;
        self.loading = true;
        let params = ApplicationQuery::scoped(
            &self.identity,
            self.filters.range.resolve(today),
            self.filters.client_id,
            self.filters.flagged_only,
        );
        LoadRequest { token: self.latest_token, params, today }
    }

    /// Applies a finished load. Returns false when the result was stale and
    /// discarded. A failure keeps the previous list and stats.
    pub fn finish_load(&mut self, token: u64, result: Result<LoadedApplications>) -> bool {
        if token != self.latest_token {
            return false;
        }
        self.loading = false;
        match result {
            Ok(loaded) => {
                self.records = loaded.records;
                self.stats = loaded.stats;
                self.last_error = None;
                if let Some(id) = self.expanded {
                    if !self.records.iter().any(|r| r.application.id == id) {
                        self.expanded = None;
                    }
                }
            }
            Err(e) => {
                warn!("Error loading applications: {:#}", e);
                self.last_error = Some(format!("Could not load applications: {:#}", e));
            }
        }
        true
    }

    /// Loads clients then applications in place, on the calling thread.
    pub fn refresh(&mut self, gateway: &dyn Gateway) {
        self.refresh_at(gateway, Local::now().date_naive());
    }

    pub fn refresh_at(&mut self, gateway: &dyn Gateway, today: NaiveDate) {
        let token = self.begin_clients_load();
        self.apply_clients(token, load_clients(gateway, &self.identity));
        let request = self.begin_load(today);
        let result = request.run(gateway);
        self.finish_load(request.token, result);
    }

    // --- Presentation ---

    /// Loaded records matching the search term.
    pub fn visible(&self) -> Vec<&ApplicationRecord> {
        self.records
            .iter()
            .filter(|r| matches_search(r, &self.filters.search))
            .collect()
    }

    /// At most one row is expanded; expanding another collapses the first.
    pub fn toggle_expanded(&mut self, id: Uuid) {
        self.expanded = if self.expanded == Some(id) { None } else { Some(id) };
    }

    pub fn is_expanded(&self, id: Uuid) -> bool {
        self.expanded == Some(id)
    }
}

/// Case-insensitive substring match on company, title, client and location.
pub fn matches_search(record: &ApplicationRecord, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    let app = &record.application;
    [
        Some(app.company.as_str()),
        Some(app.job_title.as_str()),
        Some(record.client_name.as_str()),
        app.location.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::gateway::testing::RecordingGateway;
    use crate::gateway::Table;
    use crate::models::fixtures::record;
    use crate::models::Role;
    use anyhow::anyhow;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn loaded(companies: &[&str]) -> LoadedApplications {
        let records: Vec<_> = companies.iter().map(|c| record(c, "2026-10-17")).collect();
        let stats = ApplicationStats::compute(&records, today());
        LoadedApplications { records, stats }
    }

    fn specialist_view() -> ApplicationsView {
        ApplicationsView::new(Identity::new(Uuid::new_v4(), "Sam", Role::Specialist), FilterState::default())
    }

    #[test]
    fn test_stale_responses_are_discarded() {
        let mut view = specialist_view();
        let first = view.set_range(DatePreset::Last30Days, today());
        let second = view.set_flagged_only(true, today());
        assert!(second.token > first.token);

        assert!(view.finish_load(second.token, Ok(loaded(&["Fresh"]))));
        assert!(!view.finish_load(first.token, Ok(loaded(&["Stale", "Older"]))));

        assert_eq!(view.records().len(), 1);
        assert_eq!(view.records()[0].application.company, "Fresh");
        assert!(!view.is_loading());
    }

    #[test]
    fn test_loading_stays_on_until_latest_finishes() {
        let mut view = specialist_view();
        let first = view.begin_load(today());
        let second = view.begin_load(today());

        view.finish_load(first.token, Ok(loaded(&["Stale"])));
        assert!(view.is_loading());
        view.finish_load(second.token, Ok(loaded(&[])));
        assert!(!view.is_loading());
    }

    #[test]
    fn test_failed_load_keeps_previous_list_and_surfaces_error() {
        let mut view = specialist_view();
        let ok = view.begin_load(today());
        view.finish_load(ok.token, Ok(loaded(&["Acme", "Globex"])));
        let before = view.stats();

        let failing = view.begin_load(today());
        view.finish_load(failing.token, Err(anyhow!("connection reset")));

        assert_eq!(view.records().len(), 2);
        assert_eq!(view.stats(), before);
        assert!(!view.is_loading());
        assert!(view.last_error().unwrap().contains("connection reset"));

        let again = view.begin_load(today());
        view.finish_load(again.token, Ok(loaded(&[])));
        assert!(view.last_error().is_none());
        assert!(view.records().is_empty());
    }

    #[test]
    fn test_filter_changes_build_scoped_requests() {
        let mut view = specialist_view();
        let client = Uuid::new_v4();
        let request = view.set_client(Some(client), today());

        assert_eq!(request.params.client_id, Some(client));
        assert_eq!(request.params.specialist_id, Some(view.identity().user_id));
        assert_eq!(request.params.range, DatePreset::MonthToDate.resolve(today()));

        let request = view.set_range(DatePreset::Yesterday, today());
        assert_eq!(request.params.range.start, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
    }

    #[test]
    fn test_search_does_not_reload() {
        let mut view = specialist_view();
        let request = view.begin_load(today());
        view.finish_load(request.token, Ok(loaded(&["Acme", "Globex"])));

        view.set_search("acm");
        assert!(!view.is_loading());
        let visible: Vec<&str> = view.visible().iter().map(|r| r.application.company.as_str()).collect();
        assert_eq!(visible, vec!["Acme"]);
    }

    #[test]
    fn test_search_matches_every_field_case_insensitively() {
        let mut r = record("Acme Corp", "2026-10-17");
        r.application.job_title = "Staff Platform Engineer".to_string();
        r.application.location = Some("Austin, TX".to_string());
        r.client_name = "Grace Hopper".to_string();

        for term in ["", "ACME", "corp", "platform", "hOPPer", "austin", ", tx"] {
            assert!(matches_search(&r, term), "term {:?}", term);
        }
        assert!(!matches_search(&r, "remote"));
        // The specialist name is not searchable.
        assert!(!matches_search(&r, "sam specialist"));

        r.application.location = None;
        assert!(!matches_search(&r, "austin"));
    }

    #[test]
    fn test_single_expanded_row() {
        let mut view = specialist_view();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        view.toggle_expanded(a);
        assert!(view.is_expanded(a));
        view.toggle_expanded(b);
        assert!(view.is_expanded(b));
        assert!(!view.is_expanded(a));
        view.toggle_expanded(b);
        assert!(!view.is_expanded(b));
    }

    #[test]
    fn test_expanded_row_cleared_when_it_leaves_the_list() {
        let mut view = specialist_view();
        let request = view.begin_load(today());
        view.finish_load(request.token, Ok(loaded(&["Acme"])));
        let id = view.records()[0].application.id;
        view.toggle_expanded(id);

        let request = view.begin_load(today());
        view.finish_load(request.token, Ok(loaded(&["Globex"])));
        assert!(!view.is_expanded(id));
    }

    #[test]
    fn test_specialist_without_assignments_still_loads_own_applications() {
        let gateway = RecordingGateway::default();
        let mut view = specialist_view();
        view.refresh_at(&gateway, today());

        assert!(view.clients().is_empty());
        assert!(view.last_error().is_none());
        let app_queries = gateway.queries_for(Table::Applications);
        assert_eq!(app_queries.len(), 1);
        let scoped = crate::gateway::Filter::Eq("specialist_id", view.identity().user_id.into());
        assert!(app_queries[0].filters.contains(&scoped));
    }

    #[test]
    fn test_client_load_failure_survives_application_load() {
        let gateway = RecordingGateway::default().fail_on(Table::ClientAssignments);
        let mut view = specialist_view();
        view.refresh_at(&gateway, today());

        assert!(view.clients().is_empty());
        assert!(view.clients_error().unwrap().contains("client assignments"));
        // The applications load itself went through.
        assert!(view.last_error().is_none());
        assert!(!view.is_loading());

        let request = view.begin_load(today());
        view.finish_load(request.token, Ok(loaded(&["Acme"])));
        assert!(view.clients_error().is_some());
    }

    #[test]
    fn test_stale_client_lists_are_discarded() {
        let mut view = specialist_view();
        let client = |name: &str| Client {
            id: Uuid::new_v4(),
            first_name: name.to_string(),
            last_name: None,
            is_demo: false,
        };
        let first = view.begin_clients_load();
        let second = view.begin_clients_load();

        assert!(view.apply_clients(second, Ok(vec![client("Fresh")])));
        assert!(!view.apply_clients(first, Err(anyhow!("timed out"))));
        assert_eq!(view.clients().len(), 1);
        assert!(view.clients_error().is_none());

        let third = view.begin_clients_load();
        view.apply_clients(third, Err(anyhow!("timed out")));
        assert_eq!(view.clients()[0].first_name, "Fresh");
        assert!(view.clients_error().is_some());
    }

    #[test]
    fn test_next_client_cycles_through_dropdown() {
        let db = Database::in_memory().unwrap();
        for name in ["Bea", "Al"] {
            let mut row = crate::gateway::Row::new();
            row.insert("first_name".to_string(), serde_json::json!(name));
            db.insert(Table::Clients, &row).unwrap();
        }
        let mut view = ApplicationsView::new(Identity::new(Uuid::new_v4(), "Root", Role::Admin), FilterState::default());
        view.refresh_at(&db, today());

        let al = view.next_client();
        assert!(al.is_some());
        view.set_client(al, today());
        assert_eq!(view.selected_client_name().as_deref(), Some("Al"));
        let bea = view.next_client();
        view.set_client(bea, today());
        assert_eq!(view.selected_client_name().as_deref(), Some("Bea"));
        assert_eq!(view.next_client(), None);
    }
}
