use crate::cell::SyncedCell;
use std::collections::HashSet;

/// Toggle a block of ids in the selection.
///
/// When every id in `ids` is already selected they are all removed; otherwise the missing ones are
/// appended after the existing selection.
pub fn select_all(selected: &SyncedCell<Vec<String>>, ids: &[String]) {
    selected.update(|current| toggle_all(current, ids));
}

pub(crate) fn toggle_all(current: &[String], ids: &[String]) -> Vec<String> {
    let selected: HashSet<&str> = current.iter().map(String::as_str).collect();
    let all_selected = ids.iter().all(|id| selected.contains(id.as_str()));
    if all_selected {
        let removed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        current
            .iter()
            .filter(|id| !removed.contains(id.as_str()))
            .cloned()
            .collect()
    } else {
        let mut seen = selected;
        let mut next = current.to_vec();
        for id in ids {
            if seen.insert(id.as_str()) {
                next.push(id.clone());
            }
        }
        next
    }
}
