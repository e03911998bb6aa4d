// Lorekeep: Sliding window
//
// The last `keep_recent` messages always stay verbatim. Everything older that
// has not been summarized yet is a candidate; once at least `min_batch`
// candidates exist, a pass summarizes them and (optionally) hides them from
// the host prompt.
//
//   index:  0 ........ summarized_until | candidates ... | keep_recent tail
//
// The window position survives restarts through the store's `meta` table.

use log::{debug, warn};

use crate::atoms::constants::META_SUMMARIZED_UNTIL;
use crate::atoms::error::LoreResult;
use crate::atoms::types::{ChatMessage, WindowConfig, WindowPlan, WindowState};
use crate::engine::store::Store;

/// Decide which messages a window pass should summarize.
pub fn plan_window(messages: &[ChatMessage], state: &WindowState, config: &WindowConfig) -> WindowPlan {
    let boundary = messages.len().saturating_sub(config.keep_recent);
    let start = state.summarized_until.map(|i| i + 1).unwrap_or(0);

    let candidates: Vec<usize> = messages
        .iter()
        .take(boundary)
        .filter(|m| m.index >= start && !m.is_system && !m.text.trim().is_empty())
        .map(|m| m.index)
        .collect();

    if candidates.len() < config.min_batch.max(1) {
        debug!(
            "[lorekeep:window] {} candidate(s) below min_batch {}; nothing to do",
            candidates.len(),
            config.min_batch
        );
        return WindowPlan::default();
    }

    let to_hide = if config.hide_summarized {
        candidates.clone()
    } else {
        Vec::new()
    };
    WindowPlan { candidates, to_hide }
}

/// Read the persisted window position. A corrupt value resets the window.
pub fn load_state(store: &Store) -> LoreResult<WindowState> {
    let summarized_until = match store.get_meta(META_SUMMARIZED_UNTIL)? {
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(i) => Some(i),
            Err(_) => {
                warn!("[lorekeep:window] Ignoring corrupt window state {:?}", raw);
                None
            }
        },
        None => None,
    };
    Ok(WindowState { summarized_until })
}

pub fn save_state(store: &Store, state: &WindowState) -> LoreResult<()> {
    match state.summarized_until {
        Some(i) => store.set_meta(META_SUMMARIZED_UNTIL, &i.to_string()),
        None => store.delete_meta(META_SUMMARIZED_UNTIL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| ChatMessage::new(i, "Kael", format!("message {i}")))
            .collect()
    }

    fn config(keep_recent: usize, min_batch: usize) -> WindowConfig {
        WindowConfig {
            keep_recent,
            min_batch,
            ..Default::default()
        }
    }

    #[test]
    fn plans_everything_outside_the_recent_tail() {
        let plan = plan_window(&chat(30), &WindowState::default(), &config(20, 10));
        assert_eq!(plan.candidates, (0..10).collect::<Vec<_>>());
        assert_eq!(plan.to_hide, plan.candidates);
    }

    #[test]
    fn too_few_candidates_plans_nothing() {
        let plan = plan_window(&chat(29), &WindowState::default(), &config(20, 10));
        assert!(plan.is_empty());
        assert!(plan.to_hide.is_empty());
        assert!(plan_window(&chat(5), &WindowState::default(), &config(20, 1)).is_empty());
    }

    #[test]
    fn resumes_after_summarized_until() {
        let state = WindowState { summarized_until: Some(9) };
        let plan = plan_window(&chat(40), &state, &config(20, 10));
        assert_eq!(plan.candidates, (10..20).collect::<Vec<_>>());
        let state = WindowState { summarized_until: Some(19) };
        assert!(plan_window(&chat(40), &state, &config(20, 10)).is_empty());
    }

    #[test]
    fn system_messages_and_hiding_flag() {
        let mut msgs = chat(12);
        msgs[1].is_system = true;
        let cfg = WindowConfig {
            hide_summarized: false,
            ..config(2, 3)
        };
        let plan = plan_window(&msgs, &WindowState::default(), &cfg);
        assert_eq!(plan.candidates.len(), 9);
        assert!(!plan.candidates.contains(&1));
        assert!(plan.to_hide.is_empty());
    }

    #[test]
    fn state_persists_through_meta() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(load_state(&store).unwrap(), WindowState::default());
        save_state(&store, &WindowState { summarized_until: Some(41) }).unwrap();
        assert_eq!(load_state(&store).unwrap().summarized_until, Some(41));

        store.set_meta(META_SUMMARIZED_UNTIL, "banana").unwrap();
        assert_eq!(load_state(&store).unwrap().summarized_until, None);

        save_state(&store, &WindowState::default()).unwrap();
        assert_eq!(store.get_meta(META_SUMMARIZED_UNTIL).unwrap(), None);
    }
}
