//! Row selection over a server-paginated collection that is never fully loaded.

use std::collections::{BTreeSet, HashSet};

use shared::{
    domain::{FilterSignature, RowId},
    protocol::Directive,
};
use tracing::{debug, error};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    /// Rows toggled on individually; inert while `all_matching_filter` is set.
    pub explicit_ids: BTreeSet<RowId>,
    pub all_matching_filter: bool,
    /// Rows toggled off while `all_matching_filter` is set; inert otherwise.
    pub excluded_ids: BTreeSet<RowId>,
    pub loaded_page_ids: Vec<RowId>,
    pub total_matching_filter: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    state: SelectionState,
    signature: FilterSignature,
    /// Ids delivered by any page since the selection began.
    seen_ids: HashSet<RowId>,
}

impl SelectionController {
    pub fn new(signature: FilterSignature) -> Self {
        Self {
            signature,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn signature(&self) -> &FilterSignature {
        &self.signature
    }

    pub fn toggle_row(&mut self, id: RowId) {
        if self.state.all_matching_filter {
            if self.state.excluded_ids.remove(&id) {
                return;
            }
            let seen = self.seen_ids.contains(&id);
            debug_assert!(seen, "excluded row {id} was never displayed");
            if !seen {
                error!(row = %id, "refusing to exclude a row that was never displayed");
                return;
            }
            self.state.excluded_ids.insert(id);
        } else if !self.state.explicit_ids.remove(&id) {
            self.state.explicit_ids.insert(id);
        }
    }

    pub fn toggle_current_page(&mut self) {
        if self.state.loaded_page_ids.is_empty() {
            return;
        }

        let select = !self.is_current_page_fully_selected();
        let ids = self.state.loaded_page_ids.clone();
        for id in ids {
            match (self.state.all_matching_filter, select) {
                (true, true) => {
                    self.state.excluded_ids.remove(&id);
                }
                (true, false) => {
                    self.state.excluded_ids.insert(id);
                }
                (false, true) => {
                    self.state.explicit_ids.insert(id);
                }
                (false, false) => {
                    self.state.explicit_ids.remove(&id);
                }
            }
        }
    }

    /// Whether the host should offer "select all N matching rows".
    pub fn can_select_all_matching_filter(&self) -> bool {
        !self.state.all_matching_filter
            && self.is_current_page_fully_selected()
            && self.state.total_matching_filter > self.state.loaded_page_ids.len() as u64
    }

    pub fn select_all_matching_filter(&mut self) {
        let offered = self.can_select_all_matching_filter();
        debug_assert!(offered, "select_all_matching_filter called while not offered");
        if !offered {
            error!(
                loaded = self.state.loaded_page_ids.len(),
                total = self.state.total_matching_filter,
                all_matching = self.state.all_matching_filter,
                "select-all-matching requested while not offered"
            );
            return;
        }

        self.state.all_matching_filter = true;
        self.state.explicit_ids.clear();
        self.state.excluded_ids.clear();
        debug!(total = self.state.total_matching_filter, "selected all matching rows");
    }

    /// Leaves all-matching mode and drops every selected row.
    pub fn clear_all_matching_filter(&mut self) {
        self.reset();
    }

    pub fn is_selected(&self, id: &RowId) -> bool {
        if self.state.all_matching_filter {
            !self.state.excluded_ids.contains(id)
        } else {
            self.state.explicit_ids.contains(id)
        }
    }

    pub fn is_current_page_fully_selected(&self) -> bool {
        !self.state.loaded_page_ids.is_empty()
            && self
                .state
                .loaded_page_ids
                .iter()
                .all(|id| self.is_selected(id))
    }

    /// Some, but not all, loaded rows are selected (tri-state header checkbox).
    pub fn is_current_page_partially_selected(&self) -> bool {
        let selected = self
            .state
            .loaded_page_ids
            .iter()
            .filter(|id| self.is_selected(id))
            .count();
        selected > 0 && selected < self.state.loaded_page_ids.len()
    }

    pub fn effective_count(&self) -> u64 {
        if self.state.all_matching_filter {
            self.state
                .total_matching_filter
                .saturating_sub(self.state.excluded_ids.len() as u64)
        } else {
            // Rows removed elsewhere can leave ids behind that no longer match.
            (self.state.explicit_ids.len() as u64).min(self.state.total_matching_filter)
        }
    }

    pub fn has_selection(&self) -> bool {
        self.effective_count() > 0
    }

    pub fn effective_directive(&self) -> Directive {
        if self.state.all_matching_filter {
            Directive::AllExcept {
                filter_signature: self.signature.clone(),
                excluded_ids: self.state.excluded_ids.clone(),
            }
        } else {
            Directive::Explicit {
                ids: self.state.explicit_ids.clone(),
            }
        }
    }

    /// Replaces the visible page. Selection survives page navigation.
    pub fn on_page_changed(&mut self, ids: Vec<RowId>, total: u64) {
        self.seen_ids.extend(ids.iter().cloned());
        self.state.loaded_page_ids = ids;
        self.state.total_matching_filter = total;
    }

    pub fn on_filter_signature_changed(&mut self, signature: FilterSignature) {
        if signature == self.signature {
            return;
        }
        debug!(
            from = %self.signature,
            to = %signature,
            "filter signature changed; resetting selection"
        );
        self.reset();
        self.signature = signature;
    }

    pub fn reset(&mut self) {
        self.state.explicit_ids.clear();
        self.state.all_matching_filter = false;
        self.state.excluded_ids.clear();
        self.seen_ids.clear();
        self.seen_ids.extend(self.state.loaded_page_ids.iter().cloned());
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
