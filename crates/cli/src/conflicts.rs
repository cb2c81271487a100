//! Conflict listing and interactive per-object decisions.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Select;

use modelrepo_core::conflict::{Choice, ConflictEntry, DecisionPolicy};

use crate::style;

/// Print one row per conflicting path with its current choice.
pub fn print_table(entries: &[ConflictEntry]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Path", "Status", "Ours", "Theirs", "Choice"]);

    for entry in entries {
        let side = |choice| {
            entry
                .side(choice)
                .map(|s| s.kind.to_string())
                .unwrap_or_else(|| "(deleted)".to_string())
        };
        table.add_row(vec![
            Cell::new(&entry.path),
            Cell::new(entry.status()),
            Cell::new(side(Choice::Ours)),
            Cell::new(side(Choice::Theirs)),
            Cell::new(entry.choice),
        ]);
    }

    println!("{}", table);
}

/// Asks on the terminal for every entry. Escape aborts the resolution.
pub struct InteractivePolicy {
    position: usize,
    total: usize,
    /// Set when the terminal could not be read.
    pub failure: Option<std::io::Error>,
}

impl InteractivePolicy {
    pub fn new(total: usize) -> Self {
        Self {
            position: 0,
            total,
            failure: None,
        }
    }
}

impl DecisionPolicy for InteractivePolicy {
    fn choose(&mut self, entry: &ConflictEntry) -> Option<Choice> {
        self.position += 1;
        println!();
        println!(
            "{} {}",
            style::header(&format!("[{}/{}] {}", self.position, self.total, entry.path)),
            style::status(entry.status())
        );

        let label = |choice: Choice| match entry.side(choice) {
            Some(side) => format!("Keep {choice}: {}", side.kind),
            None => format!("Keep {choice}: delete the file"),
        };
        let items = [label(Choice::Ours), label(Choice::Theirs)];
        let default = match entry.choice {
            Choice::Ours => 0,
            Choice::Theirs => 1,
        };

        match Select::new()
            .with_prompt("Which side wins? (Esc aborts the merge)")
            .items(&items)
            .default(default)
            .interact_opt()
        {
            Ok(Some(0)) => Some(Choice::Ours),
            Ok(Some(_)) => Some(Choice::Theirs),
            Ok(None) => None,
            Err(dialoguer::Error::IO(e)) => {
                self.failure = Some(e);
                None
            }
        }
    }
}
