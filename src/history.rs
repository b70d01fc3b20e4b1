use crate::models::Interaction;
use std::collections::VecDeque;

/// Session-scoped log of asked questions. Not persisted.
#[derive(Debug, Default, Clone)]
pub struct InteractionHistory {
    entries: VecDeque<Interaction>,
    capacity: Option<usize>,
}

impl InteractionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` entries, evicting the oldest first.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: Some(capacity),
        }
    }

    pub fn push(&mut self, interaction: Interaction) {
        self.entries.push_back(interaction);
        if let Some(max) = self.capacity {
            while self.entries.len() > max {
                self.entries.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn latest(&self) -> Option<&Interaction> {
        self.entries.back()
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &Interaction> {
        self.entries.iter().rev()
    }

    /// 1-based position counted from the newest entry, as listed by `newest_first`.
    pub fn nth_newest(&self, position: usize) -> Option<&Interaction> {
        position.checked_sub(1).and_then(|index| self.newest_first().nth(index))
    }
}

#[cfg(test)]
mod tests {
    use super::InteractionHistory;
    use crate::models::Interaction;
    use chrono::Utc;

    fn interaction(question: &str) -> Interaction {
        Interaction {
            id: format!("id-{}", question),
            timestamp: Utc::now(),
            question: question.to_string(),
            answer: "ok".to_string(),
            sql: None,
            failed: false,
        }
    }

    #[test]
    fn bounded_history_evicts_oldest() {
        let mut history = InteractionHistory::bounded(2);
        history.push(interaction("a"));
        history.push(interaction("b"));
        history.push(interaction("c"));

        let questions: Vec<&str> = history.newest_first().map(|entry| entry.question.as_str()).collect();
        assert_eq!(questions, vec!["c", "b"]);
        assert!(history.newest_first().all(|entry| entry.id != "id-a"));
        assert_eq!(history.nth_newest(2).map(|entry| entry.question.as_str()), Some("b"));
        assert!(history.nth_newest(0).is_none());
    }

    #[test]
    fn clear_empties_history() {
        let mut history = InteractionHistory::new();
        history.push(interaction("a"));
        assert_eq!(history.latest().map(|entry| entry.question.as_str()), Some("a"));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.len(), 0);
    }
}
