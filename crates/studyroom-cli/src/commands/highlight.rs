use chrono::Utc;
use clap::Subcommand;
use studyroom_core::Database;

#[derive(Subcommand)]
pub enum HighlightAction {
    /// Save a highlight
    Add {
        #[arg(long)]
        book: String,
        /// Highlighted passage
        #[arg(long)]
        text: String,
        /// Optional note attached to the passage
        #[arg(long)]
        note: Option<String>,
    },
    /// List highlights of a book, oldest first
    List {
        #[arg(long)]
        book: String,
    },
}

pub fn run(action: HighlightAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        HighlightAction::Add { book, text, note } => {
            if text.trim().is_empty() {
                return Err("highlight text must not be empty".into());
            }
            let highlight = db.add_highlight(&book, &text, note.as_deref(), Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&highlight)?);
        }
        HighlightAction::List { book } => {
            let list = db.list_highlights(&book)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }
    Ok(())
}
