//! Domain types shared by every component: conversation state, filters,
//! ranked items, comparison tables, and history windowing.

pub mod filters;
pub mod history;
pub mod item;
pub mod state;
pub mod table;

pub use filters::{CatalogSchema, Certainty, FilterSnapshot, FilterValue, PreferenceSnapshot};
pub use history::{HistoryPolicy, Message, Speaker};
pub use item::{DEFAULT_MAX_RESULTS, RankedItem, dedupe_and_cap};
pub use state::{ConversationState, StateSummary};
pub use table::{ComparisonRow, ComparisonTable};
