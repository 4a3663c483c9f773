//! Which screen a path leads to for a given session.

use crate::models::Identity;

const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    Applications,
    Interviews,
    Leaderboard,
    Wins,
    Admin,
    AdminApplications,
    AdminClients,
    AdminEntry,
    AdminInterviews,
    AdminSettings,
    AdminSpecialist(String),
}

impl Route {
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            ["login"] => Route::Login,
            ["dashboard"] => Route::Dashboard,
            ["applications"] => Route::Applications,
            ["interviews"] => Route::Interviews,
            ["leaderboard"] => Route::Leaderboard,
            ["wins"] => Route::Wins,
            ["admin"] => Route::Admin,
            ["admin", "applications"] => Route::AdminApplications,
            ["admin", "clients"] => Route::AdminClients,
            ["admin", "entry"] => Route::AdminEntry,
            ["admin", "interviews"] => Route::AdminInterviews,
            ["admin", "settings"] => Route::AdminSettings,
            ["admin", "specialist", id] => Route::AdminSpecialist(id.to_string()),
            _ => return None,
        };
        Some(route)
    }

    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            Route::Admin
                | Route::AdminApplications
                | Route::AdminClients
                | Route::AdminEntry
                | Route::AdminInterviews
                | Route::AdminSettings
                | Route::AdminSpecialist(_)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Session<'a> {
    Loading,
    SignedOut,
    SignedIn(&'a Identity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Loading,
    Render(Route),
    Redirect(&'static str),
}

pub fn resolve(path: &str, session: Session<'_>) -> Navigation {
    let is_root = path.trim().trim_end_matches('/').is_empty();

    if !is_root {
        match Route::parse(path) {
            Some(Route::Login) => return Navigation::Render(Route::Login),
            Some(_) => {}
            None => return Navigation::Redirect("/"),
        }
    }

    let identity = match session {
        Session::Loading => return Navigation::Loading,
        Session::SignedOut => return Navigation::Redirect("/login"),
        Session::SignedIn(identity) => identity,
    };

    if is_root {
        return if identity.is_admin() {
            Navigation::Redirect("/admin")
        } else {
            Navigation::Redirect("/dashboard")
        };
    }

    match Route::parse(path) {
        Some(route) if route.admin_only() && !identity.is_admin() => Navigation::Redirect("/dashboard"),
        Some(route) => Navigation::Render(route),
        None => Navigation::Redirect("/"),
    }
}

/// Follows redirects until something renders. Returns the final path too.
pub fn follow(path: &str, session: Session<'_>) -> (String, Navigation) {
    let mut current = path.to_string();
    for _ in 0..MAX_REDIRECTS {
        match resolve(&current, session) {
            Navigation::Redirect(next) => current = next.to_string(),
            done => return (current, done),
        }
    }
    let last = resolve(&current, session);
    (current, last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use uuid::Uuid;

    fn admin() -> Identity {
        Identity::new(Uuid::new_v4(), "Root", Role::Admin)
    }

    fn specialist() -> Identity {
        Identity::new(Uuid::new_v4(), "Sam", Role::Specialist)
    }

    #[test]
    fn test_login_always_renders() {
        assert_eq!(resolve("/login", Session::Loading), Navigation::Render(Route::Login));
        assert_eq!(resolve("/login/", Session::SignedOut), Navigation::Render(Route::Login));
    }

    #[test]
    fn test_signed_out_goes_to_login() {
        assert_eq!(resolve("/applications", Session::SignedOut), Navigation::Redirect("/login"));
        assert_eq!(resolve("/admin/entry", Session::SignedOut), Navigation::Redirect("/login"));
        assert_eq!(resolve("/", Session::SignedOut), Navigation::Redirect("/login"));
    }

    #[test]
    fn test_loading_session_waits() {
        assert_eq!(resolve("/dashboard", Session::Loading), Navigation::Loading);
    }

    #[test]
    fn test_root_depends_on_role() {
        let (a, s) = (admin(), specialist());
        assert_eq!(resolve("/", Session::SignedIn(&a)), Navigation::Redirect("/admin"));
        assert_eq!(resolve("", Session::SignedIn(&s)), Navigation::Redirect("/dashboard"));
    }

    #[test]
    fn test_admin_paths_bounce_specialists() {
        let (a, s) = (admin(), specialist());
        for path in ["/admin", "/admin/applications", "/admin/settings", "/admin/specialist/42"] {
            assert_eq!(resolve(path, Session::SignedIn(&s)), Navigation::Redirect("/dashboard"), "{}", path);
            assert!(matches!(resolve(path, Session::SignedIn(&a)), Navigation::Render(_)), "{}", path);
        }
        assert_eq!(
            resolve("/admin/specialist/42", Session::SignedIn(&a)),
            Navigation::Render(Route::AdminSpecialist("42".to_string()))
        );
        assert_eq!(
            resolve("/applications", Session::SignedIn(&s)),
            Navigation::Render(Route::Applications)
        );
    }

    #[test]
    fn test_unknown_paths_go_home() {
        let s = specialist();
        assert_eq!(resolve("/nope", Session::SignedIn(&s)), Navigation::Redirect("/"));
        assert_eq!(resolve("/admin/nope", Session::SignedOut), Navigation::Redirect("/"));
    }

    #[test]
    fn test_follow_chains_redirects() {
        let s = specialist();
        let (path, nav) = follow("/admin/clients", Session::SignedIn(&s));
        assert_eq!(path, "/dashboard");
        assert_eq!(nav, Navigation::Render(Route::Dashboard));

        let (path, nav) = follow("/whatever", Session::SignedOut);
        assert_eq!(path, "/login");
        assert_eq!(nav, Navigation::Render(Route::Login));
    }
}
