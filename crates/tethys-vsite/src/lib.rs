//! Virtual interaction sites.
//!
//! A virtual site is a massless particle whose position is a function of
//! other particles' positions. Sites may depend on other sites, so the
//! table levels them into stages at construction: positions are computed
//! in increasing stage order, and forces accumulated on sites are pushed
//! back onto their parents in decreasing stage order so that a force
//! landing on an intermediate site is itself redistributed afterwards.

pub mod rules;
mod table;

pub use rules::{VirtualSite, VirtualSiteRule};
pub use table::VirtualSiteTable;
