#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Screen {
    Home,
    Solitaire,
    Agents,
    Forge,
    Lock,
    Version,
    Logs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub screen: Screen,
    pub label: &'static str,
    pub hint: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct MenuSection {
    pub title: &'static str,
    pub items: &'static [MenuItem],
}

pub const SECTIONS: &[MenuSection] = &[
    MenuSection {
        title: "Modules",
        items: &[MenuItem {
            screen: Screen::Solitaire,
            label: "Solitaire",
            hint: "klondike, draw one",
        }],
    },
    MenuSection {
        title: "Tools",
        items: &[
            MenuItem {
                screen: Screen::Agents,
                label: "Agent Sessions",
                hint: "parallel AI CLI conversations",
            },
            MenuItem {
                screen: Screen::Forge,
                label: "Web Forge",
                hint: "start and watch the web backend",
            },
            MenuItem {
                screen: Screen::Lock,
                label: "Screen Lock",
                hint: "lock the terminal now",
            },
        ],
    },
    MenuSection {
        title: "Dev Tools",
        items: &[
            MenuItem {
                screen: Screen::Version,
                label: "Version Info",
                hint: "build number and changelog",
            },
            MenuItem {
                screen: Screen::Logs,
                label: "Logs",
                hint: "tail of the session log",
            },
        ],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Content,
}

#[derive(Debug, Clone)]
pub struct MenuState {
    selected: usize,
    focus: Focus,
    screen: Screen,
}

impl Default for MenuState {
    fn default() -> Self {
        Self {
            selected: 0,
            focus: Focus::Sidebar,
            screen: Screen::Home,
        }
    }
}

impl MenuState {
    /// Flat list of `(section index, item)` in display order.
    pub fn items() -> impl Iterator<Item = (usize, &'static MenuItem)> {
        SECTIONS
            .iter()
            .enumerate()
            .flat_map(|(section, s)| s.items.iter().map(move |item| (section, item)))
    }

    pub fn item_count() -> usize {
        SECTIONS.iter().map(|section| section.items.len()).sum()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> &'static MenuItem {
        Self::items()
            .nth(self.selected)
            .map(|(_, item)| item)
            .unwrap_or(&SECTIONS[0].items[0])
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn move_up(&mut self) {
        let count = Self::item_count();
        self.selected = (self.selected + count - 1) % count;
    }

    pub fn move_down(&mut self) {
        self.selected = (self.selected + 1) % Self::item_count();
    }

    pub fn enter(&mut self) -> Screen {
        self.screen = self.selected_item().screen;
        self.focus = Focus::Content;
        self.screen
    }

    /// Content focus falls back to the sidebar; sidebar focus falls back to Home.
    pub fn back(&mut self) {
        match self.focus {
            Focus::Content => self.focus = Focus::Sidebar,
            Focus::Sidebar => self.screen = Screen::Home,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Sidebar if self.screen != Screen::Home => Focus::Content,
            _ => Focus::Sidebar,
        };
    }

    pub fn select_by_id(&mut self, screen: Screen) -> bool {
        match Self::items().position(|(_, item)| item.screen == screen) {
            Some(index) => {
                self.selected = index;
                true
            }
            None => false,
        }
    }

    pub fn breadcrumb(&self) -> String {
        if self.screen == Screen::Home {
            return "Home".to_string();
        }
        Self::items()
            .find(|(_, item)| item.screen == self.screen)
            .map(|(section, item)| format!("{} › {}", SECTIONS[section].title, item.label))
            .unwrap_or_else(|| "Home".to_string())
    }
}

#[cfg(test)]
#[path = "../tests/unit/menu_tests.rs"]
mod tests;
