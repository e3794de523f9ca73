//! Domain types: items, their types, and the views built from them

pub mod item;
pub mod item_type;
pub mod owners;
pub mod views;

pub use item::{Approval, Item, ItemDraft, ItemInfo, Ownership};
pub use item_type::ItemType;
pub use owners::AllowedOwners;
pub use views::{Format, FullItem, ItemView, LinkDepth, LinkedItems, ListedItem, Page, SummaryItem};
