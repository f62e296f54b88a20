//! Roles, the capability table, and route guards.
//!
//! Every "may this role see X" question goes through [`Role::can`]; nothing
//! else compares role strings.

use std::fmt;
use std::str::FromStr;

pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Student,
    Registrar,
    Librarian,
    Cashier,
    Accounting,
    Sao,
    Dean,
    ProgramHead,
    Guidance,
    Adviser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Dashboard,
    Requirements,
    SignRequirements,
    Students,
    Permits,
    ScanPermits,
    Sms,
    Analytics,
    Users,
    Notifications,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Registrar => "registrar",
            Role::Librarian => "librarian",
            Role::Cashier => "cashier",
            Role::Accounting => "accounting",
            Role::Sao => "sao",
            Role::Dean => "dean",
            Role::ProgramHead => "program-head",
            Role::Guidance => "guidance",
            Role::Adviser => "adviser",
        }
    }

    pub fn landing_route(self) -> &'static str {
        match self {
            Role::Admin => "/admin-side",
            Role::Student => "/student-side",
            _ => "/clearing-officer",
        }
    }

    pub fn can(self, view: View) -> bool {
        use View::*;
        match self {
            Role::Admin => true,
            Role::Student => matches!(view, Dashboard | Requirements | Permits | Notifications),
            Role::Registrar => matches!(
                view,
                Dashboard
                    | Requirements
                    | SignRequirements
                    | Students
                    | Permits
                    | ScanPermits
                    | Sms
                    | Analytics
                    | Notifications
            ),
            Role::Sao | Role::Dean | Role::ProgramHead => matches!(
                view,
                Dashboard
                    | Requirements
                    | SignRequirements
                    | Students
                    | ScanPermits
                    | Sms
                    | Analytics
                    | Notifications
            ),
            Role::Librarian | Role::Cashier | Role::Accounting | Role::Guidance | Role::Adviser => {
                matches!(
                    view,
                    Dashboard
                        | Requirements
                        | SignRequirements
                        | Students
                        | Analytics
                        | Notifications
                )
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            "registrar" => Ok(Role::Registrar),
            "librarian" => Ok(Role::Librarian),
            "cashier" => Ok(Role::Cashier),
            "accounting" => Ok(Role::Accounting),
            "sao" => Ok(Role::Sao),
            "dean" => Ok(Role::Dean),
            "program-head" => Ok(Role::ProgramHead),
            "guidance" => Ok(Role::Guidance),
            "adviser" | "advisor" | "class-adviser" => Ok(Role::Adviser),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Who is looking at the page. The role stays a raw string until a guard
/// needs it, since the backend may hand out roles this client does not know.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub is_authenticated: bool,
    pub role: Option<String>,
    pub user_id: Option<String>,
}

impl AuthContext {
    pub fn new(is_authenticated: bool, role: Option<&str>) -> Self {
        Self {
            is_authenticated,
            role: role.map(|r| r.to_string()),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(|u| u.to_string());
        self
    }

    pub fn known_role(&self) -> Option<Role> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    Redirect(&'static str),
}

/// Guard for guest-only pages. Signed-in users with a known role are sent to
/// their landing page, except on the login page itself.
pub fn guest_guard(ctx: &AuthContext, path: &str) -> RouteDecision {
    if !ctx.is_authenticated || path == LOGIN_ROUTE {
        return RouteDecision::Render;
    }
    match ctx.known_role() {
        Some(role) => RouteDecision::Redirect(role.landing_route()),
        None => RouteDecision::Render,
    }
}

pub fn protected_guard(ctx: &AuthContext, view: View) -> RouteDecision {
    if !ctx.is_authenticated {
        return RouteDecision::Redirect(LOGIN_ROUTE);
    }
    match ctx.known_role() {
        Some(role) if role.can(view) => RouteDecision::Render,
        Some(role) => RouteDecision::Redirect(role.landing_route()),
        None => RouteDecision::Redirect(LOGIN_ROUTE),
    }
}

/// Guard for one student's records. Roles with the `Students` view see
/// anyone; a student sees only their own id.
pub fn student_records_guard(ctx: &AuthContext, student_id: &str) -> RouteDecision {
    if !ctx.is_authenticated {
        return RouteDecision::Redirect(LOGIN_ROUTE);
    }
    match ctx.known_role() {
        Some(role) if role.can(View::Students) => RouteDecision::Render,
        Some(Role::Student) if ctx.user_id.as_deref() == Some(student_id) => RouteDecision::Render,
        Some(role) => RouteDecision::Redirect(role.landing_route()),
        None => RouteDecision::Redirect(LOGIN_ROUTE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFICER_ROLES: [Role; 9] = [
        Role::Registrar,
        Role::Librarian,
        Role::Cashier,
        Role::Accounting,
        Role::Sao,
        Role::Dean,
        Role::ProgramHead,
        Role::Guidance,
        Role::Adviser,
    ];

    #[test]
    fn admin_is_sent_to_admin_side() {
        let ctx = AuthContext::new(true, Some("admin"));
        assert_eq!(
            guest_guard(&ctx, "/dashboard"),
            RouteDecision::Redirect("/admin-side")
        );
    }

    #[test]
    fn login_page_is_never_redirected() {
        let ctx = AuthContext::new(true, Some("cashier"));
        assert_eq!(guest_guard(&ctx, "/login"), RouteDecision::Render);
    }

    #[test]
    fn guests_and_unknown_roles_stay_put() {
        assert_eq!(
            guest_guard(&AuthContext::new(false, Some("admin")), "/dashboard"),
            RouteDecision::Render
        );
        assert_eq!(
            guest_guard(&AuthContext::new(true, Some("janitor")), "/dashboard"),
            RouteDecision::Render
        );
        assert_eq!(
            guest_guard(&AuthContext::new(true, None), "/dashboard"),
            RouteDecision::Render
        );
    }

    #[test]
    fn officers_share_a_landing_route() {
        for role in OFFICER_ROLES {
            let ctx = AuthContext::new(true, Some(role.as_str()));
            assert_eq!(
                guest_guard(&ctx, "/"),
                RouteDecision::Redirect("/clearing-officer"),
                "{role}"
            );
        }
    }

    #[test]
    fn role_strings_parse_loosely() {
        assert_eq!("SAO".parse::<Role>(), Ok(Role::Sao));
        assert_eq!("Program Head".parse::<Role>(), Ok(Role::ProgramHead));
        assert_eq!("class_adviser".parse::<Role>(), Ok(Role::Adviser));
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn capability_table_limits_students() {
        assert!(Role::Student.can(View::Permits));
        assert!(!Role::Student.can(View::SignRequirements));
        assert!(!Role::Cashier.can(View::Sms));
        assert!(Role::Sao.can(View::ScanPermits));
        assert!(Role::Admin.can(View::Users));
    }

    #[test]
    fn protected_views_redirect_by_capability() {
        let anon = AuthContext::default();
        assert_eq!(
            protected_guard(&anon, View::Dashboard),
            RouteDecision::Redirect(LOGIN_ROUTE)
        );

        let student = AuthContext::new(true, Some("student"));
        assert_eq!(
            protected_guard(&student, View::Analytics),
            RouteDecision::Redirect("/student-side")
        );
        assert_eq!(
            protected_guard(&student, View::Permits),
            RouteDecision::Render
        );

        let unknown = AuthContext::new(true, Some("janitor"));
        assert_eq!(
            protected_guard(&unknown, View::Dashboard),
            RouteDecision::Redirect(LOGIN_ROUTE)
        );
    }

    #[test]
    fn students_only_see_their_own_records() {
        let own = AuthContext::new(true, Some("student")).with_user_id(Some("2021-0001"));
        assert_eq!(
            student_records_guard(&own, "2021-0001"),
            RouteDecision::Render
        );
        assert_eq!(
            student_records_guard(&own, "2021-0002"),
            RouteDecision::Redirect("/student-side")
        );

        let anonymous_student = AuthContext::new(true, Some("student"));
        assert_eq!(
            student_records_guard(&anonymous_student, "2021-0001"),
            RouteDecision::Redirect("/student-side")
        );

        let cashier = AuthContext::new(true, Some("cashier"));
        assert_eq!(
            student_records_guard(&cashier, "2021-0002"),
            RouteDecision::Render
        );
        assert_eq!(
            student_records_guard(&AuthContext::default(), "2021-0001"),
            RouteDecision::Redirect(LOGIN_ROUTE)
        );
    }
}
