//! Shared test fixtures and helpers.
//!
//! Reusable constructors for domain types used across multiple test modules.
//! Avoids duplicating reading and roster builders in every `#[cfg(test)]`
//! block.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::roster::{Account, Roster};
use crate::types::Reading;

/// Display zone all fixtures use.
pub(crate) const TZ: Tz = chrono_tz::Asia::Jerusalem;

/// UTC instant from an RFC 3339 literal (test convenience).
pub(crate) fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// `Reading` in the fixture zone.
pub(crate) fn reading(account: &str, taken_at: &str, sgv: i32) -> Reading {
    Reading::new(account, utc(taken_at), TZ, sgv)
}

/// Roster of (id, name) pairs with empty metadata.
pub(crate) fn roster(entries: &[(&str, &str)]) -> Roster {
    Roster::from_accounts(
        entries
            .iter()
            .map(|(id, name)| Account {
                id: (*id).to_string(),
                name: (*name).to_string(),
                fasting_sugar: String::new(),
                a1c: String::new(),
                medications: String::new(),
            })
            .collect(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Shared JSON fixtures (used by fetch unit tests)
// ---------------------------------------------------------------------------

/// 3-entry `sgv.json` response with the full production field set.
pub(crate) const SGV_JSON_3E: &str = r#"[{"_id":"64e8570c9f3b2a0004d1e001","device":"xDrip-DexcomG5","date":1692953580000,"dateString":"2023-08-25T08:53:00.000Z","sgv":145,"direction":"Flat","type":"sgv","utcOffset":0,"sysTime":"2023-08-25T08:53:00.000Z","rssi":100,"rawbg":0},{"_id":"64e855e09f3b2a0004d1e000","device":"xDrip-DexcomG5","date":1692953280000,"dateString":"2023-08-25T08:48:00.000Z","sgv":141,"direction":"Flat","type":"sgv","utcOffset":0,"sysTime":"2023-08-25T08:48:00.000Z","rssi":100,"rawbg":0},{"_id":"64e854b49f3b2a0004d1dfff","device":"xDrip-DexcomG5","date":1692952980000,"dateString":"2023-08-25T08:43:00.000Z","sgv":138,"direction":"FortyFiveUp","type":"sgv","utcOffset":0,"sysTime":"2023-08-25T08:43:00.000Z","rssi":100,"rawbg":0}]"#;
