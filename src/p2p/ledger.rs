//! Ledger state reported by peers, and the merged view across all of them.
use super::prelude::*;

use parking_lot::Mutex;

use std::collections::HashMap;

/// A peer's report about one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerContext {
    pub address: String,
    pub signature_index: i64,
    pub balance: i64,
}

impl LedgerContext {
    pub fn from_report(report: &Command) -> Option<LedgerContext> {
        if report.kind() != CommandKind::LedgerState {
            return None;
        }
        Some(LedgerContext {
            address: report.message("address")?.to_owned(),
            signature_index: report.integer("signature_index")?,
            balance: report.integer("balance")?,
        })
    }
}

/// Keeps, per address, the report with the highest signature index. On a tie the existing entry
/// stays. Returns whether `report` was taken.
pub fn merge_report(entries: &mut HashMap<String, LedgerContext>, report: LedgerContext) -> bool {
    match entries.get(&report.address) {
        Some(existing) if existing.signature_index >= report.signature_index => false,
        _ => {
            let _ = entries.insert(report.address.clone(), report);
            true
        }
    }
}

/// Ledger reports of every peer, merged. Survives peer churn; cleared on shutdown.
#[derive(Default)]
pub struct LedgerView {
    entries: Mutex<HashMap<String, LedgerContext>>,
}

impl LedgerView {
    pub fn new() -> Self {
        LedgerView::default()
    }

    pub fn merge(&self, report: LedgerContext) -> bool {
        merge_report(&mut self.entries.lock(), report)
    }

    pub fn signature_index(&self, address: &str) -> Option<i64> {
        self.entries.lock().get(address).map(|context| context.signature_index)
    }

    pub fn snapshot(&self) -> HashMap<String, LedgerContext> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(index: i64, balance: i64) -> LedgerContext {
        LedgerContext { address: "V5Ujv72h".to_string(), signature_index: index, balance }
    }

    #[test]
    fn test_highest_signature_index_wins() {
        let view = LedgerView::new();
        for (index, balance) in [(5, 100), (9, 70), (7, 80)].iter() {
            let _ = view.merge(context(*index, *balance));
        }
        assert_eq!(view.signature_index("V5Ujv72h"), Some(9));
        assert_eq!(view.snapshot()["V5Ujv72h"].balance, 70);
        assert_eq!(view.signature_index("unknown"), None);
    }

    #[test]
    fn test_tie_keeps_existing_report() {
        let view = LedgerView::new();
        assert!(view.merge(context(4, 100)));
        assert!(!view.merge(context(4, 999)));
        assert_eq!(view.snapshot()["V5Ujv72h"].balance, 100);
    }

    #[test]
    fn test_report_is_read_from_ledger_state_only() {
        let report = Command::ledger_state(1, "V5Ujv72h", 3, 12).unwrap();
        assert_eq!(LedgerContext::from_report(&report), Some(context(3, 12)));
        assert_eq!(LedgerContext::from_report(&Command::ping(1, 1)), None);
    }
}
