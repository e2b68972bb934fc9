use serde::{Deserialize, Serialize};
use tracing::info;

use crate::persist::PersistentStore;
use crate::storage::SlotStorage;

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub is_dark: bool,
}

/// Dark/light flag kept in the `theme` slot.
#[derive(Debug)]
pub struct ThemeState<S> {
    persist: PersistentStore<S>,
    theme: Theme,
}

impl<S: SlotStorage> ThemeState<S> {
    pub fn open(persist: PersistentStore<S>) -> Self {
        let theme = persist.load(THEME_KEY, Theme::default());
        Self { persist, theme }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn is_dark(&self) -> bool {
        self.theme.is_dark
    }

    pub fn toggle(&mut self) -> Theme {
        self.set_dark(!self.theme.is_dark)
    }

    pub fn set_dark(&mut self, is_dark: bool) -> Theme {
        self.theme = Theme { is_dark };
        info!(is_dark, "theme changed");
        self.persist.save(THEME_KEY, &self.theme);
        self.theme
    }
}

#[cfg(test)]
mod tests {
    use super::{THEME_KEY, ThemeState};
    use crate::persist::PersistentStore;
    use crate::storage::{MemoryStorage, SlotStorage};

    #[test]
    fn defaults_to_light() {
        let state = ThemeState::open(PersistentStore::new(MemoryStorage::new()));
        assert!(!state.is_dark());
    }

    #[test]
    fn toggle_persists_is_dark_object() {
        let storage = MemoryStorage::new();
        let mut state = ThemeState::open(PersistentStore::new(storage.clone()));
        assert!(state.toggle().is_dark);
        assert_eq!(
            storage.get_item(THEME_KEY).expect("get").as_deref(),
            Some("{\"isDark\":true}")
        );

        let reopened = ThemeState::open(PersistentStore::new(storage));
        assert!(reopened.is_dark());
    }
}
