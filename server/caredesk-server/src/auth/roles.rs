//! Staff roles and the page allow-list each role may navigate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Receptionist,
    Pharmacist,
    LabTechnician,
}

/// Top-level navigation pages of the staff shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Dashboard,
    Patients,
    Appointments,
    MedicalRecords,
    Billing,
    Pharmacy,
    LabTests,
    Reports,
    Admin,
}

/// Page every role lands on and falls back to.
pub const DEFAULT_PAGE: Page = Page::Dashboard;

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Doctor,
        Role::Nurse,
        Role::Receptionist,
        Role::Pharmacist,
        Role::LabTechnician,
    ];

    /// Ordered pages this role may open.
    pub fn allowed_pages(self) -> &'static [Page] {
        use Page::*;
        match self {
            Role::Admin => &[
                Dashboard,
                Patients,
                Appointments,
                MedicalRecords,
                Billing,
                Pharmacy,
                LabTests,
                Reports,
                Admin,
            ],
            Role::Doctor => &[Dashboard, Patients, Appointments, MedicalRecords, LabTests, Reports],
            Role::Nurse => &[Dashboard, Patients, Appointments, MedicalRecords],
            Role::Receptionist => &[Dashboard, Patients, Appointments, Billing],
            Role::Pharmacist => &[Dashboard, Pharmacy, Reports],
            Role::LabTechnician => &[Dashboard, LabTests],
        }
    }

    pub fn can_access(self, page: Page) -> bool {
        self.allowed_pages().contains(&page)
    }

    /// Whether the role may open at least one of `pages`.
    pub fn can_access_any(self, pages: &[Page]) -> bool {
        pages.iter().any(|page| self.can_access(*page))
    }

    /// The page to show when `requested` is selected: the page itself if
    /// allowed, otherwise the default page.
    pub fn navigate(self, requested: Option<Page>) -> Page {
        match requested {
            Some(page) if self.can_access(page) => page,
            _ => DEFAULT_PAGE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Receptionist => "receptionist",
            Role::Pharmacist => "pharmacist",
            Role::LabTechnician => "lab-technician",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Page {
    pub const ALL: [Page; 9] = [
        Page::Dashboard,
        Page::Patients,
        Page::Appointments,
        Page::MedicalRecords,
        Page::Billing,
        Page::Pharmacy,
        Page::LabTests,
        Page::Reports,
        Page::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Page::Dashboard => "dashboard",
            Page::Patients => "patients",
            Page::Appointments => "appointments",
            Page::MedicalRecords => "medical-records",
            Page::Billing => "billing",
            Page::Pharmacy => "pharmacy",
            Page::LabTests => "lab-tests",
            Page::Reports => "reports",
            Page::Admin => "admin",
        }
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Page::ALL
            .into_iter()
            .find(|page| page.as_str() == s)
            .ok_or_else(|| format!("Unknown page '{s}'"))
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nurse_allow_list() {
        assert_eq!(
            Role::Nurse.allowed_pages(),
            &[Page::Dashboard, Page::Patients, Page::Appointments, Page::MedicalRecords]
        );
    }

    #[test]
    fn test_disallowed_page_redirects_to_dashboard() {
        assert_eq!(Role::Nurse.navigate(Some(Page::Admin)), Page::Dashboard);
        assert_eq!(Role::Nurse.navigate(Some(Page::Appointments)), Page::Appointments);
        assert_eq!(Role::Pharmacist.navigate(None), Page::Dashboard);
    }

    #[test]
    fn test_every_role_sees_dashboard_first() {
        for role in Role::ALL {
            assert_eq!(role.allowed_pages().first(), Some(&Page::Dashboard));
        }
        assert_eq!(Role::Admin.allowed_pages().len(), Page::ALL.len());
    }

    #[test]
    fn test_page_parsing() {
        assert_eq!("lab-tests".parse::<Page>().unwrap(), Page::LabTests);
        assert!("settings".parse::<Page>().is_err());
        assert_eq!(serde_json::to_value(Role::LabTechnician).unwrap(), "lab-technician");
    }
}
