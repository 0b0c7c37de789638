//! The edits applied to the game's containers.
//!
//! Every procedure works on [`ObjectTable`](crate::ObjectTable)s and treats a failure on a single
//! object as "leave it unchanged": it is logged and counted, never propagated.

pub mod fonts;
pub mod reference;
pub mod repack;
pub mod text;
pub mod title;

use rabex::objects::pptr::PathId;

/// An object picked for patching, addressed by the bundle entry that holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLocation {
    pub table: String,
    pub path_id: PathId,
    pub name: String,
}

/// The last component of a stream path like `archive:/CAB-…/CAB-….resS`.
pub fn stream_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
