//! Restore domain selection and overwrite policy.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::MarketTable;

/// A slice of application state that can be included in, or excluded from, a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataDomain {
    Beats,
    Genres,
    Users,
    Purchases,
    Customers,
    Payments,
    Settings,
    Files,
}

impl DataDomain {
    pub const ALL: [DataDomain; 8] = [
        DataDomain::Beats,
        DataDomain::Genres,
        DataDomain::Users,
        DataDomain::Purchases,
        DataDomain::Customers,
        DataDomain::Payments,
        DataDomain::Settings,
        DataDomain::Files,
    ];

    /// The database table backing this domain, `None` for uploaded media files.
    pub fn table(&self) -> Option<MarketTable> {
        match self {
            DataDomain::Beats => Some(MarketTable::Beats),
            DataDomain::Genres => Some(MarketTable::Genres),
            DataDomain::Users => Some(MarketTable::Users),
            DataDomain::Purchases => Some(MarketTable::Purchases),
            DataDomain::Customers => Some(MarketTable::Customers),
            DataDomain::Payments => Some(MarketTable::Payments),
            DataDomain::Settings => Some(MarketTable::Settings),
            DataDomain::Files => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataDomain::Beats => "beats",
            DataDomain::Genres => "genres",
            DataDomain::Users => "users",
            DataDomain::Purchases => "purchases",
            DataDomain::Customers => "customers",
            DataDomain::Payments => "payments",
            DataDomain::Settings => "settings",
            DataDomain::Files => "files",
        }
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing restore selection.
///
/// Users are excluded by default: restoring accounts from an archive can
/// silently replace admin credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOptions {
    pub beats: bool,
    pub genres: bool,
    pub users: bool,
    pub purchases: bool,
    pub customers: bool,
    pub payments: bool,
    pub settings: bool,
    pub files: bool,
    pub overwrite_existing: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            beats: true,
            genres: true,
            users: false,
            purchases: true,
            customers: true,
            payments: true,
            settings: true,
            files: true,
            overwrite_existing: false,
        }
    }
}

impl RestoreOptions {
    pub fn includes(&self, domain: DataDomain) -> bool {
        match domain {
            DataDomain::Beats => self.beats,
            DataDomain::Genres => self.genres,
            DataDomain::Users => self.users,
            DataDomain::Purchases => self.purchases,
            DataDomain::Customers => self.customers,
            DataDomain::Payments => self.payments,
            DataDomain::Settings => self.settings,
            DataDomain::Files => self.files,
        }
    }

    pub fn set(&mut self, domain: DataDomain, enabled: bool) {
        let flag = match domain {
            DataDomain::Beats => &mut self.beats,
            DataDomain::Genres => &mut self.genres,
            DataDomain::Users => &mut self.users,
            DataDomain::Purchases => &mut self.purchases,
            DataDomain::Customers => &mut self.customers,
            DataDomain::Payments => &mut self.payments,
            DataDomain::Settings => &mut self.settings,
            DataDomain::Files => &mut self.files,
        };
        *flag = enabled;
    }

    pub fn selected_domains(&self) -> Vec<DataDomain> {
        DataDomain::ALL
            .into_iter()
            .filter(|d| self.includes(*d))
            .collect()
    }

    /// Reduces the selection to the payload sent alongside the uploaded archive.
    pub fn to_request(&self) -> RestoreRequestOptions {
        RestoreRequestOptions {
            clear_existing: self.overwrite_existing,
            restore_files: self.files,
            beats: self.beats,
            genres: self.genres,
            users: self.users,
            purchases: self.purchases,
            customers: self.customers,
            payments: self.payments,
            settings: self.settings,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The `options` form field of the restore endpoints.
///
/// `clearExisting` and `restoreFiles` are the historical fields; domain flags
/// missing from a request fall back to the [`RestoreOptions`] defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequestOptions {
    #[serde(default)]
    pub clear_existing: bool,
    #[serde(default = "default_true")]
    pub restore_files: bool,
    #[serde(default = "default_true")]
    pub beats: bool,
    #[serde(default = "default_true")]
    pub genres: bool,
    #[serde(default)]
    pub users: bool,
    #[serde(default = "default_true")]
    pub purchases: bool,
    #[serde(default = "default_true")]
    pub customers: bool,
    #[serde(default = "default_true")]
    pub payments: bool,
    #[serde(default = "default_true")]
    pub settings: bool,
}

impl Default for RestoreRequestOptions {
    fn default() -> Self {
        RestoreOptions::default().to_request()
    }
}

impl From<RestoreRequestOptions> for RestoreOptions {
    fn from(request: RestoreRequestOptions) -> Self {
        Self {
            beats: request.beats,
            genres: request.genres,
            users: request.users,
            purchases: request.purchases,
            customers: request.customers,
            payments: request.payments,
            settings: request.settings,
            files: request.restore_files,
            overwrite_existing: request.clear_existing,
        }
    }
}
