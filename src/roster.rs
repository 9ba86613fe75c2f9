//! Account roster, loaded once at startup.
//!
//! Maps each upstream account to a display name and static medical metadata.
//! The roster drives everything downstream: fetches iterate it, tables join
//! against it, and its row order is the display order. A reading from an
//! account outside the roster cannot enter the pipeline because fetches only
//! target roster ids.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// One roster row, post-cleanup.
#[derive(Debug, Clone)]
pub struct Account {
    /// Upstream subdomain and join key.
    pub id: String,
    pub name: String,
    pub fasting_sugar: String,
    pub a1c: String,
    /// Medication names, comma-joined. Blank and single-character noise
    /// cells are dropped before joining.
    pub medications: String,
}

/// Raw CSV row as exported from the sheet. Only `account` and `name` are
/// required columns.
#[derive(Debug, Deserialize)]
struct RosterRow {
    account: String,
    name: String,
    #[serde(default)]
    fasting_sugar: String,
    #[serde(default)]
    a1c: String,
    #[serde(default)]
    sugar_med_1: String,
    #[serde(default)]
    sugar_med_2: String,
    #[serde(default)]
    sugar_med_3: String,
    #[serde(default)]
    sugar_med_4: String,
}

/// Ordered roster with id lookup. Row order is preserved through every table
/// the dashboard serves.
#[derive(Debug, Clone)]
pub struct Roster {
    accounts: Vec<Account>,
}

impl Roster {
    /// Load from a CSV file. Rows with a blank account are skipped (the
    /// sheet keeps people without a CGM account). Fails on unreadable files,
    /// missing required columns, or a roster with zero usable accounts.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut accounts = Vec::new();
        for row in reader.deserialize::<RosterRow>() {
            let row = row?;
            if row.account.is_empty() {
                continue;
            }
            accounts.push(Account {
                id: row.account,
                name: row.name,
                fasting_sugar: row.fasting_sugar,
                a1c: row.a1c,
                medications: collapse_meds(&[
                    row.sugar_med_1,
                    row.sugar_med_2,
                    row.sugar_med_3,
                    row.sugar_med_4,
                ]),
            });
        }

        let roster = Self::from_accounts(accounts)?;
        info!(
            accounts = roster.len(),
            path = %path.display(),
            "roster loaded"
        );
        Ok(roster)
    }

    pub fn from_accounts(accounts: Vec<Account>) -> Result<Self> {
        if accounts.is_empty() {
            return Err(Error::EmptyRoster);
        }
        Ok(Self { accounts })
    }

    /// Accounts in sheet order.
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Join medication cells with commas, dropping empties and one-character
/// placeholder cells ("-", "?") left in the sheet.
fn collapse_meds(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| c.trim())
        .filter(|c| c.chars().count() > 1)
        .collect::<Vec<_>>()
        .join(",")
}
