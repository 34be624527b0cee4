//! Pure scheduling logic: draft assembly, slot expansion and heat-map
//! aggregation. Nothing in here touches the network or the database.

pub mod draft;
pub mod heatmap;
pub mod slots;
